use bytes::BytesMut;
use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{io::AsyncReadExt, sync::watch, task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::{
    audio::{
        history::{
            HistoryEntry, HistoryKind, HistoryRing, PlaybackOutcome, DEFAULT_RECENT,
            DEFAULT_UPCOMING,
        },
        queue::{BoundedQueue, QueuedItem, DEFAULT_CAPACITY},
        resource::{AudioReader, ReleaseGuard, ResourceHandle},
    },
    error::{PlayerError, Result},
    events::{EventSender, RadioEvent},
    sources::{ContentSource, Track},
    voice::{state::ConnectionTracker, VoiceSink},
};

/// Bytes por lectura: 20 ms de PCM f32 estéreo a 48 kHz
const CHUNK: usize = 48_000 / 50 * 2 * 4;
/// Tracks que una lista aleatoria mantiene en cola
pub const PLAYLIST_DEPTH: usize = 5;
/// Máximo a esperar a que el sink cierre un track
const SINK_TIMEOUT: Duration = Duration::from_secs(10);

/// Estado de reproducción publicado por el motor
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PlaybackState {
    Idle,
    Playing {
        track: Track,
        started_at: DateTime<Utc>,
    },
    Paused {
        track: Track,
        started_at: DateTime<Utc>,
    },
    Stopping,
    Stopped,
}

impl PlaybackState {
    pub fn track(&self) -> Option<&Track> {
        match self {
            Self::Playing { track, .. } | Self::Paused { track, .. } => Some(track),
            _ => None,
        }
    }

    pub fn is_active(&self) -> bool {
        matches!(self, Self::Playing { .. } | Self::Paused { .. })
    }
}

/// Qué tipo de contenido ocupa la cola
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlayMode {
    Live,
    Archive,
    /// Canciones archivadas al azar de uno o más canales
    Random,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub queue_capacity: usize,
    pub recent_capacity: usize,
    pub upcoming_capacity: usize,
    pub stop_grace: Duration,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_CAPACITY,
            recent_capacity: DEFAULT_RECENT,
            upcoming_capacity: DEFAULT_UPCOMING,
            stop_grace: Duration::from_secs(5),
        }
    }
}

/// Resumen para `/status`
#[derive(Debug, Clone)]
pub struct EngineStatus {
    pub state: PlaybackState,
    pub mode: Option<PlayMode>,
    pub repeat: bool,
    pub queued: usize,
    pub capacity: usize,
}

struct ActiveTrack {
    cancel: CancellationToken,
    /// `None` mientras el stream todavía se está abriendo
    guard: Option<ReleaseGuard>,
}

/// Máquina de estados de la reproducción: un track activo a la vez.
///
/// The loop pulls from the bounded queue, opens the stream lazily, pumps PCM
/// into the voice sink and releases the handle before dequeuing again.
/// Per-track failures end up in the history and never stop the loop.
pub struct PlaybackEngine {
    queue: BoundedQueue<QueuedItem>,
    history: HistoryRing,
    source: Arc<dyn ContentSource>,
    sink: Arc<dyn VoiceSink>,
    connection: Arc<ConnectionTracker>,
    state: watch::Sender<PlaybackState>,
    paused: watch::Sender<bool>,
    current: Mutex<Option<ActiveTrack>>,
    mode: Mutex<Option<PlayMode>>,
    /// Canciones candidatas de la lista aleatoria en curso
    playlist: Mutex<Vec<Track>>,
    repeat: AtomicBool,
    shutdown: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
    grace: Duration,
    events: EventSender,
}

impl PlaybackEngine {
    pub fn new(
        config: EngineConfig,
        source: Arc<dyn ContentSource>,
        sink: Arc<dyn VoiceSink>,
        connection: Arc<ConnectionTracker>,
        events: EventSender,
    ) -> Arc<Self> {
        Arc::new(Self {
            queue: BoundedQueue::new(config.queue_capacity),
            history: HistoryRing::new(config.recent_capacity, config.upcoming_capacity),
            source,
            sink,
            connection,
            state: watch::channel(PlaybackState::Idle).0,
            paused: watch::channel(false).0,
            current: Mutex::new(None),
            mode: Mutex::new(None),
            playlist: Mutex::new(Vec::new()),
            repeat: AtomicBool::new(false),
            shutdown: CancellationToken::new(),
            task: Mutex::new(None),
            grace: config.stop_grace,
            events,
        })
    }

    /// Arranca el bucle de reproducción (no-op si ya corre)
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) || self.shutdown.is_cancelled() {
            return;
        }

        let engine = Arc::clone(self);
        *task = Some(tokio::spawn(async move { engine.run().await }));
    }

    async fn run(self: Arc<Self>) {
        info!("▶️ Bucle de reproducción iniciado");

        loop {
            let (item, cancel) = tokio::select! {
                _ = self.shutdown.cancelled() => break,
                next = self.queue.dequeue_with(|item| self.activate(item)) => match next {
                    Ok(next) => next,
                    Err(_) => break,
                },
            };

            self.play_item(item, cancel).await;

            if self.shutdown.is_cancelled() {
                break;
            }
            self.refill_playlist();
            self.finish_cycle();
        }

        self.state.send_replace(PlaybackState::Stopped);
        info!("⏹️ Bucle de reproducción terminado");
    }

    /// Convierte el item recién sacado en el actual. Runs under the queue lock,
    /// so `stop` either drains the item or finds it here.
    fn activate(&self, item: &QueuedItem) -> CancellationToken {
        let cancel = self.shutdown.child_token();
        *self.current.lock() = Some(ActiveTrack {
            cancel: cancel.clone(),
            guard: None,
        });
        self.history.consume_upcoming(item.track.id());
        cancel
    }

    async fn play_item(&self, mut item: QueuedItem, cancel: CancellationToken) {
        let track = item.track.clone();

        if !self.connection.is_connected() || !self.sink.is_connected() {
            warn!("⚠️ Sin conexión de voz, se descarta: {}", track.title());
            self.clear_current();
            self.record(track, PlaybackOutcome::Failed(PlayerError::NotConnected.to_string()));
            return;
        }

        let handle = match item.take_handle() {
            Some(handle) => Ok(handle),
            None => {
                tokio::select! {
                    _ = cancel.cancelled() => Err(None),
                    res = self.source.fetch_stream(&track) => res.map_err(Some),
                }
            }
        };

        let mut handle = match handle {
            Ok(handle) => handle,
            Err(None) => {
                self.clear_current();
                self.record(track, PlaybackOutcome::Interrupted);
                return;
            }
            Err(Some(e)) => {
                warn!("⚠️ No se pudo abrir {}: {}", track.title(), e);
                self.clear_current();
                self.record(track, PlaybackOutcome::Failed(e.to_string()));
                return;
            }
        };

        if let Some(active) = self.current.lock().as_mut() {
            active.guard = Some(handle.guard());
        }

        let outcome = match handle.take_reader() {
            Some(mut reader) if !cancel.is_cancelled() => {
                self.state.send_replace(PlaybackState::Playing {
                    track: track.clone(),
                    started_at: Utc::now(),
                });
                let _ = self.events.send(RadioEvent::TrackStarted(track.clone()));
                info!("🎵 Reproduciendo: {}", track.display_name());

                self.stream(&track, &mut reader, &cancel).await
            }
            Some(_) => PlaybackOutcome::Interrupted,
            None => PlaybackOutcome::Failed("stream ya consumido".to_string()),
        };

        self.release(&mut handle);
        self.clear_current();

        let completed = outcome == PlaybackOutcome::Completed;
        self.record(track.clone(), outcome);

        if completed && !track.is_live() && self.repeat.load(Ordering::SeqCst) {
            self.requeue(track);
        }
    }

    async fn stream(
        &self,
        track: &Track,
        reader: &mut AudioReader,
        cancel: &CancellationToken,
    ) -> PlaybackOutcome {
        if let Err(e) = self.sink.begin(track).await {
            warn!("⚠️ El sink rechazó {}: {}", track.title(), e);
            return PlaybackOutcome::Failed(e.to_string());
        }

        let pumped = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            res = self.pump(reader) => Some(res),
        };

        match pumped {
            None => {
                self.abort_sink(track).await;
                debug!("⏭️ Interrumpido: {}", track.title());
                PlaybackOutcome::Interrupted
            }
            Some(Ok(())) => {
                let finished = tokio::select! {
                    biased;
                    _ = cancel.cancelled() => None,
                    res = timeout(SINK_TIMEOUT, self.sink.finish()) => Some(res),
                };
                match finished {
                    None => {
                        self.abort_sink(track).await;
                        PlaybackOutcome::Interrupted
                    }
                    Some(Ok(Ok(()))) => PlaybackOutcome::Completed,
                    Some(Ok(Err(e))) => PlaybackOutcome::Failed(e.to_string()),
                    Some(Err(_)) => {
                        warn!("⚠️ El sink no cerró {} a tiempo", track.title());
                        PlaybackOutcome::Failed("sink sin respuesta".to_string())
                    }
                }
            }
            Some(Err(e)) => {
                self.abort_sink(track).await;
                if e.is_track_local() {
                    warn!("⚠️ Falló la reproducción de {}: {}", track.title(), e);
                } else {
                    error!("❌ Error inesperado reproduciendo {}: {}", track.title(), e);
                }
                PlaybackOutcome::Failed(e.to_string())
            }
        }
    }

    async fn abort_sink(&self, track: &Track) {
        if timeout(SINK_TIMEOUT, self.sink.abort()).await.is_err() {
            warn!("⚠️ El sink no abortó {} a tiempo", track.title());
        }
    }

    /// Copia PCM del proceso al sink hasta EOF
    async fn pump(&self, reader: &mut AudioReader) -> Result<()> {
        let mut paused = self.paused.subscribe();
        let mut buf = BytesMut::with_capacity(CHUNK);

        loop {
            if *paused.borrow_and_update() {
                paused
                    .wait_for(|p| !*p)
                    .await
                    .map_err(|_| PlayerError::Closed)?;
            }

            buf.reserve(CHUNK);
            if reader.read_buf(&mut buf).await? == 0 {
                return Ok(());
            }

            self.sink.write(buf.split().freeze()).await?;
            self.connection.note_activity();
        }
    }

    fn release(&self, handle: &mut ResourceHandle) {
        handle.release();
        debug!("🧹 Handle liberado: {}", handle.track_id());
    }

    fn clear_current(&self) {
        *self.current.lock() = None;
    }

    fn record(&self, track: Track, outcome: PlaybackOutcome) {
        let entry = HistoryEntry::new(track, outcome);
        self.history.push_recent(entry.clone());
        let _ = self.events.send(RadioEvent::TrackFinished(entry));
    }

    /// Admite en la cola y anota en "upcoming" bajo el mismo lock
    fn admit(&self, item: QueuedItem) -> Result<usize> {
        self.queue.enqueue_with(item, |item| {
            self.history
                .push_upcoming(HistoryEntry::new(item.track.clone(), PlaybackOutcome::Queued));
        })
    }

    /// Descarta items sacados de la cola. Dropping them releases any bound handle.
    fn discard(&self, items: Vec<QueuedItem>) -> usize {
        for item in &items {
            self.history.consume_upcoming(item.track.id());
        }
        items.len()
    }

    fn requeue(&self, track: Track) {
        // Tras un stop el modo es None y no se repite
        let mode = self.mode.lock();
        if *mode != Some(PlayMode::Archive) {
            return;
        }
        match self.admit(QueuedItem::new(track.clone())) {
            Ok(_) => debug!("🔁 Repetición: {}", track.title()),
            Err(e) => warn!("⚠️ No se pudo repetir {}: {}", track.title(), e),
        }
    }

    /// Completa la cola de la lista aleatoria hasta `PLAYLIST_DEPTH`
    fn refill_playlist(&self) -> usize {
        let mode = self.mode.lock();
        if *mode != Some(PlayMode::Random) {
            return 0;
        }

        let pool = self.playlist.lock();
        if pool.is_empty() {
            return 0;
        }

        let missing = PLAYLIST_DEPTH.saturating_sub(self.queue.len());
        let mut added = 0;
        for _ in 0..missing {
            let track = pool[fastrand::usize(..pool.len())].clone();
            match self.admit(QueuedItem::new(track)) {
                Ok(_) => added += 1,
                Err(e) => {
                    warn!("⚠️ No se pudo ampliar la lista aleatoria: {}", e);
                    break;
                }
            }
        }
        added
    }

    fn finish_cycle(&self) {
        {
            let mut mode = self.mode.lock();
            if self.queue.is_empty() {
                *mode = None;
            }
        }
        self.paused.send_replace(false);
        self.state.send_replace(PlaybackState::Idle);
    }

    /// Admite un track en la cola
    pub fn enqueue(&self, track: Track) -> Result<usize> {
        self.enqueue_item(QueuedItem::new(track))
    }

    pub fn enqueue_item(&self, item: QueuedItem) -> Result<usize> {
        let title = item.track.title().to_string();
        let wanted = if item.track.is_live() {
            PlayMode::Live
        } else {
            PlayMode::Archive
        };

        let position = {
            let mut mode = self.mode.lock();
            match (*mode, wanted) {
                (Some(PlayMode::Live), _) => {
                    return Err(PlayerError::InvalidMode(
                        "Ya hay una emisión en vivo, usa `/stop` primero".to_string(),
                    ))
                }
                (Some(_), PlayMode::Live) => {
                    return Err(PlayerError::InvalidMode(
                        "Hay canciones en cola, usa `/stop` primero".to_string(),
                    ))
                }
                _ => {}
            }

            let position = self.admit(item)?;
            // Una lista aleatoria sigue siéndolo aunque se agreguen canciones
            mode.get_or_insert(wanted);
            position
        };

        debug!("➕ En cola ({}): {}", position, title);
        Ok(position)
    }

    /// Arranca una lista aleatoria sobre `pool`. Returns how many tracks were queued.
    pub fn start_playlist(&self, pool: Vec<Track>) -> Result<usize> {
        if pool.is_empty() {
            return Err(PlayerError::NoResults("lista aleatoria".to_string()));
        }

        {
            let mut mode = self.mode.lock();
            if mode.is_some() {
                return Err(PlayerError::InvalidMode(
                    "Ya hay algo sonando, usa `/stop` primero".to_string(),
                ));
            }
            *self.playlist.lock() = pool;
            *mode = Some(PlayMode::Random);
        }

        let added = self.refill_playlist();
        if added == 0 {
            let mut mode = self.mode.lock();
            if *mode == Some(PlayMode::Random) && self.queue.is_empty() {
                *mode = None;
                self.playlist.lock().clear();
            }
            return Err(PlayerError::Closed);
        }

        info!("🎲 Lista aleatoria iniciada ({} en cola)", added);
        Ok(added)
    }

    /// Corta el track actual y vacía la cola. Returns how many pending items were dropped.
    pub async fn stop(&self) -> usize {
        let drained = {
            let mut mode = self.mode.lock();
            *mode = None;
            self.playlist.lock().clear();
            self.queue.drain()
        };
        let dropped = self.discard(drained);

        self.paused.send_replace(false);
        let interrupted = self.interrupt_current(true).await;

        if interrupted || dropped > 0 {
            info!("⏹️ Reproducción detenida ({} pendientes descartados)", dropped);
            let _ = self.events.send(RadioEvent::Stopped);
        }
        dropped
    }

    /// Salta al siguiente track. Returns `false` when nothing was playing.
    pub async fn skip(&self) -> Result<bool> {
        if *self.mode.lock() == Some(PlayMode::Live) {
            return Err(PlayerError::InvalidMode(
                "No se puede saltar una emisión en vivo".to_string(),
            ));
        }

        self.paused.send_replace(false);
        let skipped = self.interrupt_current(false).await;
        if skipped {
            info!("⏭️ Track saltado");
        }
        Ok(skipped)
    }

    /// Cancela el track activo y espera su liberación, forzándola tras el periodo de gracia
    async fn interrupt_current(&self, stopping: bool) -> bool {
        let active = self
            .current
            .lock()
            .as_ref()
            .map(|a| (a.cancel.clone(), a.guard.clone()));
        let Some((cancel, guard)) = active else {
            return false;
        };

        if stopping {
            self.state.send_if_modified(|state| {
                if state.is_active() {
                    *state = PlaybackState::Stopping;
                    true
                } else {
                    false
                }
            });
        }

        cancel.cancel();

        if let Some(guard) = guard {
            if timeout(self.grace, guard.wait_released()).await.is_err() {
                warn!("⚠️ El track no se liberó a tiempo, forzando cierre");
                guard.release();
            }
        }
        true
    }

    pub async fn pause(&self) -> Result<()> {
        let changed = self.state.send_if_modified(|state| match state {
            PlaybackState::Playing { track, started_at } => {
                *state = PlaybackState::Paused {
                    track: track.clone(),
                    started_at: *started_at,
                };
                true
            }
            _ => false,
        });

        if !changed {
            return Err(PlayerError::NothingPlaying);
        }
        self.paused.send_replace(true);
        self.sink.set_paused(true).await;
        info!("⏸️ Reproducción pausada");
        Ok(())
    }

    pub async fn resume(&self) -> Result<()> {
        let changed = self.state.send_if_modified(|state| match state {
            PlaybackState::Paused { track, started_at } => {
                *state = PlaybackState::Playing {
                    track: track.clone(),
                    started_at: *started_at,
                };
                true
            }
            _ => false,
        });

        if !changed {
            return Err(PlayerError::NothingPlaying);
        }
        self.sink.set_paused(false).await;
        self.paused.send_replace(false);
        info!("▶️ Reproducción reanudada");
        Ok(())
    }

    /// Apaga el motor: cierra la cola, corta el track y libera todo
    pub async fn shutdown(&self) {
        info!("🔌 Apagando motor de reproducción");
        self.queue.shutdown();
        self.shutdown.cancel();

        let task = self.task.lock().take();
        if let Some(task) = task {
            let abort = task.abort_handle();
            if timeout(self.grace, task).await.is_err() {
                warn!("⚠️ El bucle no terminó a tiempo, abortando");
                abort.abort();
            }
        }

        if let Some(active) = self.current.lock().take() {
            if let Some(guard) = active.guard {
                guard.release();
            }
        }
        self.discard(self.queue.drain());
        *self.mode.lock() = None;
        self.playlist.lock().clear();
        self.state.send_replace(PlaybackState::Stopped);
    }

    pub fn set_repeat(&self, enabled: bool) -> Result<()> {
        match self.play_mode() {
            Some(PlayMode::Live) => {
                return Err(PlayerError::InvalidMode(
                    "No se puede repetir una emisión en vivo".to_string(),
                ))
            }
            Some(PlayMode::Random) => {
                return Err(PlayerError::InvalidMode(
                    "La lista aleatoria no admite repetición".to_string(),
                ))
            }
            Some(PlayMode::Archive) | None => {}
        }

        self.repeat.store(enabled, Ordering::SeqCst);
        info!("🔁 Repetición {}", if enabled { "activada" } else { "desactivada" });
        Ok(())
    }

    pub fn repeat(&self) -> bool {
        self.repeat.load(Ordering::SeqCst)
    }

    pub fn play_mode(&self) -> Option<PlayMode> {
        *self.mode.lock()
    }

    pub fn state(&self) -> PlaybackState {
        self.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<PlaybackState> {
        self.state.subscribe()
    }

    pub fn history(&self) -> &HistoryRing {
        &self.history
    }

    /// Tracks admitidos que aún no empezaron, en orden de reproducción
    pub fn upcoming(&self) -> Vec<Track> {
        let capacity = self.history.capacity(HistoryKind::Upcoming);
        let mut entries = self.history.snapshot_upcoming(capacity);
        entries.reverse();
        entries.into_iter().map(|entry| entry.track).collect()
    }

    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        self.history.snapshot_recent(n)
    }

    pub fn status(&self) -> EngineStatus {
        EngineStatus {
            state: self.state(),
            mode: self.play_mode(),
            repeat: self.repeat(),
            queued: self.queue.len(),
            capacity: self.queue.capacity(),
        }
    }
}
