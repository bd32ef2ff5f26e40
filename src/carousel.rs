//! Ephemeral paginated selections ("carousels").
//!
//! Each browse command (`/channels`, `/channel`, `/search`) gets a session
//! keyed by its response message. Buttons on that message navigate or pick an
//! entry. Sessions idle for longer than the timeout are rejected on access and
//! evicted by a periodic sweep.

use dashmap::{mapref::entry::Entry, DashMap};
use parking_lot::Mutex;
use std::{fmt, future::Future, sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use crate::error::{PlayerError, Result};

pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
pub const DEFAULT_SWEEP_INTERVAL: Duration = Duration::from_secs(60);

/// Identificador de sesión (id del mensaje que la originó)
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SessionId(pub u64);

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Previous,
    Next,
}

#[derive(Debug)]
struct CarouselSession<T> {
    entries: Vec<T>,
    index: usize,
    last_interaction: Instant,
}

impl<T: Clone> CarouselSession<T> {
    fn is_expired(&self, timeout: Duration) -> bool {
        self.last_interaction.elapsed() > timeout
    }

    fn page(&self, id: SessionId) -> CarouselPage<T> {
        CarouselPage {
            session_id: id,
            entry: self.entries[self.index].clone(),
            index: self.index,
            total: self.entries.len(),
        }
    }
}

/// Lo que se muestra en un momento dado
#[derive(Debug, Clone, PartialEq)]
pub struct CarouselPage<T> {
    pub session_id: SessionId,
    pub entry: T,
    pub index: usize,
    pub total: usize,
}

impl<T> CarouselPage<T> {
    pub fn has_prev(&self) -> bool {
        self.index > 0
    }

    pub fn has_next(&self) -> bool {
        self.index + 1 < self.total
    }
}

/// Sesiones de carrusel con expiración por inactividad
pub struct CarouselManager<T> {
    sessions: DashMap<SessionId, CarouselSession<T>>,
    timeout: Duration,
    sweep_interval: Duration,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl<T> CarouselManager<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new(timeout: Duration, sweep_interval: Duration) -> Arc<Self> {
        Arc::new(Self {
            sessions: DashMap::new(),
            timeout,
            sweep_interval,
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    /// Crea (o reemplaza) la sesión de `owner_key` y devuelve la primera página
    pub fn create(&self, owner_key: u64, entries: Vec<T>) -> Result<CarouselPage<T>> {
        if entries.is_empty() {
            return Err(PlayerError::EmptyCarousel);
        }

        let id = SessionId(owner_key);
        let session = CarouselSession {
            entries,
            index: 0,
            last_interaction: Instant::now(),
        };
        let page = session.page(id);
        self.sessions.insert(id, session);

        debug!("🎠 Carrusel {} creado ({} entradas)", id, page.total);
        Ok(page)
    }

    /// Publica la primera página sin botones, registra la sesión sobre el
    /// mensaje resultante y solo entonces muestra los controles.
    ///
    /// `post` devuelve el id del mensaje publicado. Si falla no queda sesión.
    pub async fn open<E, Post, PostFut, Controls, ControlsFut>(
        &self,
        entries: Vec<T>,
        post: Post,
        controls: Controls,
    ) -> std::result::Result<SessionId, E>
    where
        E: From<PlayerError>,
        Post: FnOnce(T, usize) -> PostFut,
        PostFut: Future<Output = std::result::Result<u64, E>>,
        Controls: FnOnce(CarouselPage<T>) -> ControlsFut,
        ControlsFut: Future<Output = std::result::Result<(), E>>,
    {
        let first = entries.first().cloned().ok_or(PlayerError::EmptyCarousel)?;
        let message_id = post(first, entries.len()).await?;
        let page = self.create(message_id, entries)?;
        let id = page.session_id;
        controls(page).await?;
        Ok(id)
    }

    /// Mueve el índice una posición; en los extremos se queda donde está
    pub fn navigate(&self, id: SessionId, direction: Direction) -> Result<CarouselPage<T>> {
        self.with_live_session(id, |session| {
            session.index = match direction {
                Direction::Previous => session.index.saturating_sub(1),
                Direction::Next => (session.index + 1).min(session.entries.len() - 1),
            };
            session.last_interaction = Instant::now();
            Ok(session.page(id))
        })
    }

    /// Elige la entrada `index`
    pub fn select(&self, id: SessionId, index: usize) -> Result<T> {
        self.with_live_session(id, |session| {
            let entry = session
                .entries
                .get(index)
                .cloned()
                .ok_or(PlayerError::IndexOutOfRange {
                    index,
                    len: session.entries.len(),
                })?;
            session.index = index;
            session.last_interaction = Instant::now();
            Ok(entry)
        })
    }

    /// Página actual, sin refrescar la sesión
    pub fn current(&self, id: SessionId) -> Result<CarouselPage<T>> {
        self.with_live_session(id, |session| Ok(session.page(id)))
    }

    /// Runs `f` on a non-expired session; expired ones are removed here.
    fn with_live_session<R>(
        &self,
        id: SessionId,
        f: impl FnOnce(&mut CarouselSession<T>) -> Result<R>,
    ) -> Result<R> {
        match self.sessions.entry(id) {
            Entry::Occupied(entry) if entry.get().is_expired(self.timeout) => {
                entry.remove();
                debug!("⌛ Carrusel {} expirado", id);
                Err(PlayerError::NotFound)
            }
            Entry::Occupied(mut entry) => f(entry.get_mut()),
            Entry::Vacant(_) => Err(PlayerError::NotFound),
        }
    }

    /// Elimina la sesión (idempotente)
    pub fn destroy(&self, id: SessionId) {
        if self.sessions.remove(&id).is_some() {
            debug!("🗑️ Carrusel {} cerrado", id);
        }
    }

    pub fn len(&self) -> usize {
        self.sessions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sessions.is_empty()
    }

    /// Evicta sesiones inactivas. Returns how many were removed.
    pub fn sweep(&self) -> usize {
        let before = self.sessions.len();
        self.sessions
            .retain(|_, session| !session.is_expired(self.timeout));
        let removed = before.saturating_sub(self.sessions.len());

        if removed > 0 {
            debug!("🧹 Limpiados {} carruseles expirados", removed);
        }
        removed
    }

    /// Arranca la limpieza periódica
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let manager = Arc::clone(self);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(manager.sweep_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        manager.sweep();
                    }
                }
            }
        }));
        info!(
            "🎠 Limpieza de carruseles cada {:?} (expiran tras {:?})",
            self.sweep_interval, self.timeout
        );
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
        self.sessions.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn manager() -> Arc<CarouselManager<&'static str>> {
        CarouselManager::new(DEFAULT_TIMEOUT, DEFAULT_SWEEP_INTERVAL)
    }

    #[tokio::test(start_paused = true)]
    async fn test_navigation_clamps() {
        let carousel = manager();
        let page = carousel.create(1, vec!["a", "b"]).unwrap();
        assert!(!page.has_prev());
        assert!(page.has_next());

        let id = page.session_id;
        assert_eq!(carousel.navigate(id, Direction::Previous).unwrap().entry, "a");
        assert_eq!(carousel.navigate(id, Direction::Next).unwrap().entry, "b");
        let last = carousel.navigate(id, Direction::Next).unwrap();
        assert_eq!((last.entry, last.index, last.has_next()), ("b", 1, false));
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_registers_session_before_controls() {
        let carousel = manager();
        let id = carousel
            .open(
                vec!["a", "b"],
                |first, total| async move {
                    assert_eq!((first, total), ("a", 2));
                    Ok::<_, PlayerError>(42)
                },
                |page| {
                    // Un clic inmediato en los botones ya encuentra la sesión
                    let next = carousel.navigate(page.session_id, Direction::Next);
                    async move {
                        assert_eq!(next.unwrap().entry, "b");
                        Ok(())
                    }
                },
            )
            .await
            .unwrap();

        assert_eq!(id, SessionId(42));
        assert_eq!(carousel.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_open_failed_post_leaves_no_session() {
        let carousel = manager();
        let result = carousel
            .open(
                vec!["a"],
                |_, _| async { Err(PlayerError::SinkClosed) },
                |_| async { Ok(()) },
            )
            .await;

        assert!(matches!(result, Err(PlayerError::SinkClosed)));
        assert!(carousel.is_empty());
        assert!(matches!(
            carousel
                .open(Vec::new(), |_, _| async { Ok::<_, PlayerError>(1) }, |_| async { Ok(()) })
                .await,
            Err(PlayerError::EmptyCarousel)
        ));
    }

    #[tokio::test(start_paused = true)]
    async fn test_empty_and_unknown() {
        let carousel = manager();
        assert!(matches!(
            carousel.create(1, Vec::new()),
            Err(PlayerError::EmptyCarousel)
        ));
        assert!(matches!(
            carousel.current(SessionId(9)),
            Err(PlayerError::NotFound)
        ));
        carousel.destroy(SessionId(9));
    }

    #[tokio::test(start_paused = true)]
    async fn test_select_out_of_range() {
        let carousel = manager();
        let id = carousel.create(1, vec!["a", "b", "c"]).unwrap().session_id;

        assert_eq!(carousel.select(id, 2).unwrap(), "c");
        assert!(matches!(
            carousel.select(id, 3),
            Err(PlayerError::IndexOutOfRange { index: 3, len: 3 })
        ));
        assert_eq!(carousel.current(id).unwrap().index, 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_session_rejected_on_access() {
        let carousel = manager();
        let id = carousel.create(1, vec!["a", "b"]).unwrap().session_id;

        tokio::time::advance(Duration::from_secs(301)).await;

        assert!(matches!(
            carousel.navigate(id, Direction::Next),
            Err(PlayerError::NotFound)
        ));
        assert_eq!(carousel.len(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_sweep_evicts_idle_sessions() {
        let carousel = manager();
        carousel.start();
        carousel.create(1, vec!["a"]).unwrap();

        tokio::time::sleep(Duration::from_secs(361)).await;

        assert_eq!(carousel.len(), 0);
        carousel.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_interaction_keeps_session_alive() {
        let carousel = manager();
        carousel.start();
        let id = carousel.create(1, vec!["a", "b"]).unwrap().session_id;
        let idle = carousel.create(2, vec!["x"]).unwrap().session_id;

        for _ in 0..3 {
            tokio::time::sleep(Duration::from_secs(200)).await;
            carousel.navigate(id, Direction::Next).unwrap();
        }

        assert!(carousel.current(id).is_ok());
        assert!(matches!(carousel.current(idle), Err(PlayerError::NotFound)));
        carousel.stop().await;
    }

    #[tokio::test(start_paused = true)]
    async fn test_create_replaces_same_owner() {
        let carousel = manager();
        carousel.create(1, vec!["a", "b"]).unwrap();
        let page = carousel.create(1, vec!["z"]).unwrap();

        assert_eq!(page.total, 1);
        assert_eq!(carousel.len(), 1);
        carousel.destroy(page.session_id);
        carousel.destroy(page.session_id);
        assert!(carousel.is_empty());
    }
}
