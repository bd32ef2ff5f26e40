//! The radio session: one playback engine, one voice connection.
//!
//! Commands from the Discord layer land here. The session decides when to
//! join voice, when a new request has to stop what is playing (live and
//! archive content never share the queue) and how `/reset` swaps in a fresh
//! engine.

use async_trait::async_trait;
use parking_lot::RwLock;
use std::{sync::Arc, time::Duration};
use tokio::sync::broadcast;
use tracing::info;

use crate::{
    audio::{EngineConfig, EngineStatus, HistoryEntry, PlayMode, PlaybackEngine},
    error::{PlayerError, Result},
    events::{EventSender, RadioEvent},
    sources::{Channel, ContentSource, Track},
    voice::{
        state::{ConnectionState, ConnectionTracker},
        supervisor::{StopPlayback, VoiceSupervisor},
        ChannelRef, VoiceConnector, VoiceSink,
    },
};

/// Resultados máximos de una búsqueda
pub const SEARCH_LIMIT: usize = 10;
/// Canciones distintas necesarias por defecto para una lista aleatoria
pub const DEFAULT_PLAYLIST_THRESHOLD: usize = 40;

/// Motor actual; `/reset` lo reemplaza
pub struct EngineSlot(RwLock<Arc<PlaybackEngine>>);

impl EngineSlot {
    pub fn get(&self) -> Arc<PlaybackEngine> {
        Arc::clone(&self.0.read())
    }

    fn replace(&self, engine: Arc<PlaybackEngine>) -> Arc<PlaybackEngine> {
        std::mem::replace(&mut *self.0.write(), engine)
    }
}

#[async_trait]
impl StopPlayback for EngineSlot {
    async fn stop_playback(&self) {
        self.get().stop().await;
    }
}

/// Estado combinado para `/status`
#[derive(Debug, Clone)]
pub struct SessionStatus {
    pub engine: EngineStatus,
    pub connection: ConnectionState,
    pub listeners: usize,
    pub source: &'static str,
}

pub struct RadioSession {
    engine_config: EngineConfig,
    source: Arc<dyn ContentSource>,
    sink: Arc<dyn VoiceSink>,
    tracker: Arc<ConnectionTracker>,
    slot: Arc<EngineSlot>,
    supervisor: Arc<VoiceSupervisor>,
    events: EventSender,
}

impl RadioSession {
    pub fn new(
        engine_config: EngineConfig,
        source: Arc<dyn ContentSource>,
        sink: Arc<dyn VoiceSink>,
        connector: Arc<dyn VoiceConnector>,
        events: EventSender,
        voice_timeout: Duration,
        voice_check_interval: Duration,
    ) -> Self {
        let tracker = Arc::new(ConnectionTracker::new());
        let engine = PlaybackEngine::new(
            engine_config.clone(),
            Arc::clone(&source),
            Arc::clone(&sink),
            Arc::clone(&tracker),
            events.clone(),
        );
        let slot = Arc::new(EngineSlot(RwLock::new(engine)));
        let supervisor = VoiceSupervisor::new(
            Arc::clone(&tracker),
            connector,
            slot.clone(),
            events.clone(),
            voice_timeout,
            voice_check_interval,
        );

        Self {
            engine_config,
            source,
            sink,
            tracker,
            slot,
            supervisor,
            events,
        }
    }

    /// Arranca el bucle de reproducción y la supervisión de voz
    pub fn start(&self) {
        self.engine().start();
        self.supervisor.start();
    }

    pub fn engine(&self) -> Arc<PlaybackEngine> {
        self.slot.get()
    }

    pub fn source(&self) -> &Arc<dyn ContentSource> {
        &self.source
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RadioEvent> {
        self.events.subscribe()
    }

    pub fn connection(&self) -> ConnectionState {
        self.tracker.state()
    }

    /// Une el bot al canal de voz indicado
    pub async fn summon(&self, channel: ChannelRef) -> Result<()> {
        self.supervisor.connect(channel).await
    }

    async fn ensure_voice(&self, user_channel: Option<ChannelRef>) -> Result<()> {
        if self.tracker.is_connected() {
            return Ok(());
        }
        match user_channel {
            Some(channel) => self.summon(channel).await,
            None => Err(PlayerError::NotConnected),
        }
    }

    /// Reproduce la emisión en vivo de un canal, reemplazando lo que suene
    pub async fn play_live(&self, channel: &Channel, user_channel: Option<ChannelRef>) -> Result<Track> {
        self.ensure_voice(user_channel).await?;

        let engine = self.engine();
        if engine.play_mode().is_some() {
            engine.stop().await;
        }

        let track = Track::live(channel);
        engine.enqueue(track.clone())?;
        info!("📻 Emisión en vivo: {}", channel.pretty_name());
        Ok(track)
    }

    /// Encola un track archivado. Returns its position in the queue.
    pub async fn play_archive(&self, track: Track, user_channel: Option<ChannelRef>) -> Result<usize> {
        self.ensure_voice(user_channel).await?;

        let engine = self.engine();
        if engine.play_mode() == Some(PlayMode::Live) {
            engine.stop().await;
        }
        engine.enqueue(track)
    }

    /// Lista aleatoria con las canciones archivadas de `channels`.
    ///
    /// Needs at least `threshold` distinct songs. Whatever is playing gets
    /// stopped first. Returns how many songs the pool holds.
    pub async fn play_playlist(
        &self,
        channels: &[Channel],
        threshold: usize,
        user_channel: Option<ChannelRef>,
    ) -> Result<usize> {
        let required = threshold.max(1);
        let ids: Vec<String> = channels.iter().map(|c| c.id.clone()).collect();
        let pool = self.source.channel_songs(&ids).await?;
        if pool.len() < required {
            return Err(PlayerError::NotEnoughSongs {
                found: pool.len(),
                required,
            });
        }

        self.ensure_voice(user_channel).await?;

        let engine = self.engine();
        if engine.play_mode().is_some() {
            engine.stop().await;
        }

        let songs = pool.len();
        engine.start_playlist(pool)?;
        info!("🎲 Lista aleatoria de {} canciones en {:?}", songs, ids);
        Ok(songs)
    }

    /// Busca y encola: coincidencia exacta de id primero, si no el primer resultado
    pub async fn play_query(
        &self,
        query: &str,
        user_channel: Option<ChannelRef>,
    ) -> Result<(Track, usize)> {
        let results = self.search(query).await?;
        let track = results
            .iter()
            .find(|t| t.id() == query)
            .or_else(|| results.first())
            .cloned()
            .ok_or_else(|| PlayerError::NoResults(query.to_string()))?;

        let position = self
            .play_archive(track.clone(), user_channel)
            .await?;
        Ok((track, position))
    }

    pub async fn search(&self, query: &str) -> Result<Vec<Track>> {
        self.source.search(query, SEARCH_LIMIT).await
    }

    pub async fn channels(&self) -> Result<Vec<Channel>> {
        self.source.list_channels().await
    }

    pub async fn skip(&self) -> Result<()> {
        if self.engine().skip().await? {
            Ok(())
        } else {
            Err(PlayerError::NothingPlaying)
        }
    }

    /// Detiene todo y sale del canal de voz
    pub async fn stop(&self) -> Result<()> {
        let engine = self.engine();
        let was_active = engine.state().is_active() || engine.status().queued > 0;

        engine.stop().await;
        let left = self.supervisor.disconnect().await;

        if was_active || left {
            Ok(())
        } else {
            Err(PlayerError::NothingPlaying)
        }
    }

    pub async fn pause(&self) -> Result<()> {
        self.engine().pause().await
    }

    pub async fn resume(&self) -> Result<()> {
        self.engine().resume().await
    }

    pub fn set_repeat(&self, enabled: bool) -> Result<()> {
        self.engine().set_repeat(enabled)
    }

    /// Reinicio completo: sale de voz y crea un motor nuevo
    pub async fn reset(&self) {
        info!("♻️ Reiniciando reproductor");
        self.supervisor.disconnect().await;

        let fresh = PlaybackEngine::new(
            self.engine_config.clone(),
            Arc::clone(&self.source),
            Arc::clone(&self.sink),
            Arc::clone(&self.tracker),
            self.events.clone(),
        );
        let old = self.slot.replace(Arc::clone(&fresh));
        old.shutdown().await;
        old.history().clear();

        fresh.start();
    }

    pub fn recent(&self, n: usize) -> Vec<HistoryEntry> {
        self.engine().recent(n)
    }

    pub fn upcoming(&self) -> Vec<Track> {
        self.engine().upcoming()
    }

    pub fn current_track(&self) -> Option<Track> {
        self.engine().state().track().cloned()
    }

    /// Personas (no bots) en nuestro canal de voz
    pub fn set_listener_count(&self, count: usize) {
        self.tracker.set_listener_count(count);
    }

    pub fn voice_channel(&self) -> Option<ChannelRef> {
        self.tracker.channel()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            engine: self.engine().status(),
            connection: self.tracker.state(),
            listeners: self.tracker.listeners(),
            source: self.source.source_name(),
        }
    }

    /// Apagado ordenado
    pub async fn shutdown(&self) {
        self.supervisor.stop().await;
        self.engine().shutdown().await;
        self.supervisor.disconnect().await;
        info!("👋 Sesión de radio cerrada");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{
        audio::{PlaybackOutcome, PlaybackState},
        events,
        testing::{archive_track, wait_until, FakeSink, FakeSource, FakeStream},
        voice::MockVoiceConnector,
    };
    use pretty_assertions::assert_eq;

    const USER_CHANNEL: ChannelRef = ChannelRef {
        guild_id: 10,
        channel_id: 20,
    };

    fn channel(id: &str, number: u32) -> Channel {
        Channel {
            id: id.to_string(),
            name: id.to_uppercase(),
            number: Some(number),
            genre: None,
            description: None,
            image_url: None,
        }
    }

    fn session() -> (RadioSession, Arc<FakeSource>) {
        let source = Arc::new(FakeSource::new());
        source.set_stream("live:pulse", FakeStream::Endless);
        source.set_stream("live:octave", FakeStream::Endless);

        let mut connector = MockVoiceConnector::new();
        connector.expect_join().returning(|_| Ok(()));
        connector.expect_leave().returning(|| Ok(()));

        let session = RadioSession::new(
            EngineConfig {
                stop_grace: Duration::from_secs(1),
                ..EngineConfig::default()
            },
            source.clone(),
            Arc::new(FakeSink::new()),
            Arc::new(connector),
            events::channel(),
            Duration::from_secs(300),
            Duration::from_secs(60),
        );
        session.start();
        (session, source)
    }

    async fn wait_current(session: &RadioSession, id: &str) {
        wait_until(|| session.current_track().is_some_and(|t| t.id() == id)).await;
    }

    #[tokio::test]
    async fn test_play_requires_voice() {
        let (session, _) = session();
        assert!(matches!(
            session.play_live(&channel("pulse", 15), None).await,
            Err(PlayerError::NotConnected)
        ));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_switching_live_channels() {
        let (session, source) = session();
        session
            .play_live(&channel("pulse", 15), Some(USER_CHANNEL))
            .await
            .unwrap();
        assert_eq!(session.voice_channel(), Some(USER_CHANNEL));
        wait_current(&session, "live:pulse").await;

        session.play_live(&channel("octave", 9), None).await.unwrap();
        wait_current(&session, "live:octave").await;

        assert_eq!(session.recent(1)[0].outcome, PlaybackOutcome::Interrupted);
        assert_eq!(source.counter.count(), 1);
        session.shutdown().await;
        assert_eq!(source.counter.count(), 2);
    }

    #[tokio::test]
    async fn test_archive_replaces_live_and_skip() {
        let (session, _) = session();
        session
            .play_live(&channel("pulse", 15), Some(USER_CHANNEL))
            .await
            .unwrap();
        wait_current(&session, "live:pulse").await;
        assert!(matches!(session.skip().await, Err(PlayerError::InvalidMode(_))));

        session
            .play_archive(archive_track("a"), None)
            .await
            .unwrap();

        wait_until(|| session.recent(1).first().is_some_and(|e| e.track.id() == "a")).await;
        wait_until(|| session.engine().state() == PlaybackState::Idle).await;
        assert_eq!(session.recent(1)[0].outcome, PlaybackOutcome::Completed);
        assert!(matches!(session.skip().await, Err(PlayerError::NothingPlaying)));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_play_query_prefers_exact_id() {
        let (session, source) = session();
        session.summon(USER_CHANNEL).await.unwrap();

        let (track, position) = session
            .play_query("song-1", None)
            .await
            .unwrap();
        assert_eq!(position, 1);
        assert_eq!(track.id(), "song-1-0");

        wait_until(|| source.fetched() == vec!["song-1-0".to_string()]).await;
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_stop_disconnects() {
        let (session, source) = session();
        session
            .play_live(&channel("pulse", 15), Some(USER_CHANNEL))
            .await
            .unwrap();
        wait_current(&session, "live:pulse").await;

        session.stop().await.unwrap();

        assert_eq!(session.connection(), ConnectionState::Disconnected);
        assert_eq!(source.counter.count(), 1);
        assert!(matches!(session.stop().await, Err(PlayerError::NothingPlaying)));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_playlist_needs_threshold() {
        let (session, source) = session();
        source.set_library("pulse", 3);
        source.set_library("octave", 2);
        let channels = [channel("pulse", 15), channel("octave", 9)];

        assert!(matches!(
            session.play_playlist(&channels, 6, Some(USER_CHANNEL)).await,
            Err(PlayerError::NotEnoughSongs { found: 5, required: 6 })
        ));
        // Sin canciones suficientes ni siquiera se une a voz
        assert_eq!(session.connection(), ConnectionState::Disconnected);
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_playlist_replaces_live() {
        let (session, source) = session();
        source.set_library("pulse", 4);
        for i in 0..4 {
            source.set_stream(&format!("pulse-{}", i), FakeStream::Endless);
        }
        session
            .play_live(&channel("pulse", 15), Some(USER_CHANNEL))
            .await
            .unwrap();
        wait_current(&session, "live:pulse").await;

        let songs = session
            .play_playlist(&[channel("pulse", 15)], 4, None)
            .await
            .unwrap();
        assert_eq!(songs, 4);

        wait_until(|| session.current_track().is_some_and(|t| t.id().starts_with("pulse-"))).await;
        assert_eq!(session.engine().play_mode(), Some(PlayMode::Random));
        assert!(matches!(
            session.set_repeat(true),
            Err(PlayerError::InvalidMode(_))
        ));
        session.shutdown().await;
    }

    #[tokio::test]
    async fn test_reset_swaps_engine() {
        let (session, _) = session();
        session.summon(USER_CHANNEL).await.unwrap();
        session.play_archive(archive_track("a"), None).await.unwrap();
        wait_until(|| !session.recent(1).is_empty()).await;

        let before = session.engine();
        session.reset().await;

        assert!(!Arc::ptr_eq(&before, &session.engine()));
        assert_eq!(before.state(), PlaybackState::Stopped);
        assert!(session.recent(10).is_empty());
        assert_eq!(session.connection(), ConnectionState::Disconnected);

        session.summon(USER_CHANNEL).await.unwrap();
        session.play_archive(archive_track("b"), None).await.unwrap();
        wait_until(|| !session.recent(1).is_empty()).await;
        session.shutdown().await;
    }
}
