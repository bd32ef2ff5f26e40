//! In-memory fakes for unit tests.

use async_trait::async_trait;
use bytes::Bytes;
use parking_lot::Mutex;
use std::{
    collections::HashMap,
    io,
    sync::{
        atomic::{AtomicBool, AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};

use crate::{
    audio::resource::{AudioProcess, ResourceHandle},
    error::{PlayerError, Result},
    sources::{Channel, ContentSource, Locator, Track},
    voice::VoiceSink,
};

/// Cuenta cuántas veces se terminó algún proceso
#[derive(Clone, Default)]
pub struct ReleaseCounter(Arc<AtomicUsize>);

impl ReleaseCounter {
    pub fn count(&self) -> usize {
        self.0.load(Ordering::SeqCst)
    }
}

pub struct FakeProcess {
    counter: ReleaseCounter,
    error: Option<io::Error>,
}

impl FakeProcess {
    pub fn new(counter: &ReleaseCounter) -> Self {
        Self {
            counter: counter.clone(),
            error: None,
        }
    }

    pub fn failing(counter: &ReleaseCounter, error: io::Error) -> Self {
        Self {
            counter: counter.clone(),
            error: Some(error),
        }
    }
}

impl AudioProcess for FakeProcess {
    fn terminate(&mut self) -> io::Result<()> {
        self.counter.0.fetch_add(1, Ordering::SeqCst);
        match self.error.take() {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

/// Espera (tiempo real, máx. 5 s) hasta que `cond` se cumpla
pub async fn wait_until(mut cond: impl FnMut() -> bool) {
    tokio::time::timeout(Duration::from_secs(5), async {
        while !cond() {
            tokio::time::sleep(Duration::from_millis(2)).await;
        }
    })
    .await
    .expect("condition not met in time");
}

/// Handle con `len` bytes de silencio
pub fn fake_handle(track_id: &str, len: usize, counter: &ReleaseCounter) -> ResourceHandle {
    let reader = std::io::Cursor::new(vec![0u8; len]);
    ResourceHandle::new(track_id, FakeProcess::new(counter), Box::new(reader))
}

/// Handle que nunca llega a EOF
pub fn endless_handle(track_id: &str, counter: &ReleaseCounter) -> ResourceHandle {
    ResourceHandle::new(track_id, FakeProcess::new(counter), Box::new(tokio::io::repeat(0)))
}

pub fn archive_track(id: &str) -> Track {
    Track::new(
        id,
        format!("Song {}", id),
        Locator::Archive {
            path: format!("/archive/{}.mp3", id).into(),
        },
    )
}

pub fn live_track(channel_id: &str) -> Track {
    Track::new(
        format!("live:{}", channel_id),
        channel_id,
        Locator::Live {
            channel_id: channel_id.to_string(),
        },
    )
}

#[derive(Debug, Clone, Copy)]
pub enum FakeStream {
    Finite(usize),
    Endless,
    Unavailable,
}

/// Fuente en memoria; por defecto cada track dura 64 KiB
pub struct FakeSource {
    streams: Mutex<HashMap<String, FakeStream>>,
    library: Mutex<HashMap<String, usize>>,
    pub counter: ReleaseCounter,
    fetched: Mutex<Vec<String>>,
}

impl FakeSource {
    pub fn new() -> Self {
        Self {
            streams: Mutex::new(HashMap::new()),
            library: Mutex::new(HashMap::new()),
            counter: ReleaseCounter::default(),
            fetched: Mutex::new(Vec::new()),
        }
    }

    /// `count` canciones archivadas distintas en `channel_id`
    pub fn set_library(&self, channel_id: &str, count: usize) {
        self.library.lock().insert(channel_id.to_string(), count);
    }

    pub fn set_stream(&self, track_id: &str, stream: FakeStream) {
        self.streams.lock().insert(track_id.to_string(), stream);
    }

    pub fn fetched(&self) -> Vec<String> {
        self.fetched.lock().clone()
    }
}

#[async_trait]
impl ContentSource for FakeSource {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        Ok(Vec::new())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        Ok((0..limit.min(3))
            .map(|i| archive_track(&format!("{}-{}", query, i)))
            .collect())
    }

    async fn channel_songs(&self, channel_ids: &[String]) -> Result<Vec<Track>> {
        let library = self.library.lock();
        Ok(channel_ids
            .iter()
            .flat_map(|channel| {
                let count = library.get(channel).copied().unwrap_or(0);
                (0..count).map(move |i| {
                    archive_track(&format!("{}-{}", channel, i)).with_channel(channel.clone())
                })
            })
            .collect())
    }

    async fn fetch_stream(&self, track: &Track) -> Result<ResourceHandle> {
        self.fetched.lock().push(track.id().to_string());
        let stream = self
            .streams
            .lock()
            .get(track.id())
            .copied()
            .unwrap_or(FakeStream::Finite(64 * 1024));

        match stream {
            FakeStream::Finite(len) => Ok(fake_handle(track.id(), len, &self.counter)),
            FakeStream::Endless => Ok(endless_handle(track.id(), &self.counter)),
            FakeStream::Unavailable => Err(PlayerError::SourceUnavailable("404".to_string())),
        }
    }

    fn source_name(&self) -> &'static str {
        "fake"
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkEvent {
    Begin(String),
    Finish(String),
    Abort(String),
}

/// Sink que registra eventos y puede cerrarse a mitad de un track
#[derive(Default)]
pub struct FakeSink {
    events: Mutex<Vec<SinkEvent>>,
    current: Mutex<Option<String>>,
    writes: AtomicUsize,
    fail_on: Mutex<Option<(String, usize)>>,
    stall_abort: AtomicBool,
}

impl FakeSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// `write` devolverá `SinkClosed` tras `after` escrituras de ese track
    pub fn fail_on(&self, track_id: &str, after: usize) {
        *self.fail_on.lock() = Some((track_id.to_string(), after));
    }

    /// `abort` quedará colgado para siempre, como un transporte bloqueado
    pub fn stall_abort(&self) {
        self.stall_abort.store(true, Ordering::SeqCst);
    }

    pub fn events(&self) -> Vec<SinkEvent> {
        self.events.lock().clone()
    }

    pub fn begun(&self) -> Vec<String> {
        self.events()
            .into_iter()
            .filter_map(|e| match e {
                SinkEvent::Begin(id) => Some(id),
                _ => None,
            })
            .collect()
    }

    fn current_id(&self) -> String {
        self.current.lock().clone().unwrap_or_default()
    }
}

#[async_trait]
impl VoiceSink for FakeSink {
    async fn begin(&self, track: &Track) -> Result<()> {
        *self.current.lock() = Some(track.id().to_string());
        self.writes.store(0, Ordering::SeqCst);
        self.events.lock().push(SinkEvent::Begin(track.id().to_string()));
        Ok(())
    }

    async fn write(&self, _pcm: Bytes) -> Result<()> {
        let written = self.writes.fetch_add(1, Ordering::SeqCst) + 1;
        let current = self.current_id();
        if let Some((id, after)) = self.fail_on.lock().as_ref() {
            if *id == current && written > *after {
                return Err(PlayerError::SinkClosed);
            }
        }
        tokio::time::sleep(Duration::from_micros(200)).await;
        Ok(())
    }

    async fn finish(&self) -> Result<()> {
        let id = self.current_id();
        self.events.lock().push(SinkEvent::Finish(id));
        Ok(())
    }

    async fn abort(&self) {
        let id = self.current_id();
        self.events.lock().push(SinkEvent::Abort(id));
        if self.stall_abort.load(Ordering::SeqCst) {
            std::future::pending::<()>().await;
        }
    }

    fn is_connected(&self) -> bool {
        true
    }
}
