//! Songbird-backed voice sink and connector.
//!
//! PCM chunks written by the engine travel through a bounded flume channel to
//! a [`PcmReceiver`], which songbird reads as a raw f32 stream through
//! [`RawAdapter`]. Reads never block the mixer for long: a starved receiver
//! hands back silence. Dropping the sender ends the songbird track; songbird
//! dropping the receiver makes the next write fail with `SinkClosed`.

use async_trait::async_trait;
use bytes::{Buf, Bytes};
use parking_lot::{Mutex, RwLock};
use songbird::{
    id::{ChannelId, GuildId},
    input::{Input, RawAdapter},
    tracks::TrackHandle,
    Call, CoreEvent, Event, EventContext, EventHandler as VoiceEventHandler, Songbird, TrackEvent,
};
use std::{
    io::{self, Read, Seek, SeekFrom},
    num::NonZeroU64,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
    time::Duration,
};
use symphonia::core::io::MediaSource;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

use super::{ChannelRef, VoiceConnector, VoiceSink};
use crate::{
    audio::resource::{CHANNELS, SAMPLE_RATE},
    error::{PlayerError, Result},
    sources::Track,
};

/// Chunks en vuelo entre el motor y songbird (~640 ms)
const BUFFERED_CHUNKS: usize = 32;
/// Máximo a esperar a que songbird vacíe el buffer al terminar un track
const DRAIN_TIMEOUT: Duration = Duration::from_secs(5);
/// Espera máxima por PCM antes de entregar silencio al mezclador
const STALL_TIMEOUT: Duration = Duration::from_millis(10);
/// Bytes de un frame f32 estéreo
const FRAME_BYTES: usize = 4 * CHANNELS as usize;

/// Lado de lectura del canal de PCM, visto por songbird como un archivo sin seek
pub struct PcmReceiver {
    rx: flume::Receiver<Bytes>,
    pending: Bytes,
}

impl PcmReceiver {
    pub fn new(rx: flume::Receiver<Bytes>) -> Self {
        Self {
            rx,
            pending: Bytes::new(),
        }
    }
}

impl Read for PcmReceiver {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        if buf.is_empty() {
            return Ok(0);
        }

        while !self.pending.has_remaining() {
            match self.rx.recv_timeout(STALL_TIMEOUT) {
                Ok(chunk) => self.pending = chunk,
                // El mezclador no puede bloquearse: si no llega audio, silencio
                Err(flume::RecvTimeoutError::Timeout) => {
                    let n = buf.len() - buf.len() % FRAME_BYTES;
                    if n > 0 {
                        buf[..n].fill(0);
                        return Ok(n);
                    }
                }
                // Sender cerrado: fin del track
                Err(flume::RecvTimeoutError::Disconnected) => return Ok(0),
            }
        }

        let n = buf.len().min(self.pending.remaining());
        self.pending.copy_to_slice(&mut buf[..n]);
        Ok(n)
    }
}

impl Seek for PcmReceiver {
    fn seek(&mut self, _pos: SeekFrom) -> io::Result<u64> {
        Err(io::Error::new(
            io::ErrorKind::Unsupported,
            "PCM stream is not seekable",
        ))
    }
}

impl MediaSource for PcmReceiver {
    fn is_seekable(&self) -> bool {
        false
    }

    fn byte_len(&self) -> Option<u64> {
        None
    }
}

struct ActiveInput {
    tx: Option<flume::Sender<Bytes>>,
    handle: TrackHandle,
    ended: Option<oneshot::Receiver<()>>,
}

/// Sink y conector de voz sobre el manager de songbird
pub struct SongbirdVoice {
    manager: Arc<Songbird>,
    call: RwLock<Option<(GuildId, Arc<tokio::sync::Mutex<Call>>)>>,
    driver_up: Arc<AtomicBool>,
    active: Mutex<Option<ActiveInput>>,
}

impl SongbirdVoice {
    pub fn new(manager: Arc<Songbird>) -> Self {
        Self {
            manager,
            call: RwLock::new(None),
            driver_up: Arc::new(AtomicBool::new(false)),
            active: Mutex::new(None),
        }
    }

    fn current_call(&self) -> Result<Arc<tokio::sync::Mutex<Call>>> {
        self.call
            .read()
            .as_ref()
            .map(|(_, call)| Arc::clone(call))
            .ok_or(PlayerError::NotConnected)
    }

    fn stop_active(&self) {
        if let Some(active) = self.active.lock().take() {
            if let Err(e) = active.handle.stop() {
                debug!("Track de songbird ya terminado: {}", e);
            }
        }
    }
}

fn to_id(raw: u64) -> Result<NonZeroU64> {
    NonZeroU64::new(raw).ok_or_else(|| PlayerError::ConnectFailed("id de Discord inválido".to_string()))
}

#[async_trait]
impl VoiceConnector for SongbirdVoice {
    async fn join(&self, channel: ChannelRef) -> Result<()> {
        let guild_id = GuildId::from(to_id(channel.guild_id)?);
        let channel_id = ChannelId::from(to_id(channel.channel_id)?);

        let call = self
            .manager
            .join(guild_id, channel_id)
            .await
            .map_err(|e| PlayerError::ConnectFailed(e.to_string()))?;

        {
            let mut handler = call.lock().await;
            handler.remove_all_global_events();
            for event in [
                CoreEvent::DriverConnect,
                CoreEvent::DriverReconnect,
                CoreEvent::DriverDisconnect,
            ] {
                handler.add_global_event(
                    Event::Core(event),
                    DriverStatusHandler {
                        up: Arc::clone(&self.driver_up),
                        guild_id: channel.guild_id,
                    },
                );
            }
        }

        self.driver_up.store(true, Ordering::SeqCst);
        *self.call.write() = Some((guild_id, call));
        Ok(())
    }

    async fn leave(&self) -> Result<()> {
        self.stop_active();
        self.driver_up.store(false, Ordering::SeqCst);

        let Some((guild_id, _)) = self.call.write().take() else {
            return Ok(());
        };

        match self.manager.remove(guild_id).await {
            Ok(()) | Err(songbird::error::JoinError::NoCall) => Ok(()),
            Err(e) => Err(PlayerError::ConnectFailed(e.to_string())),
        }
    }
}

#[async_trait]
impl VoiceSink for SongbirdVoice {
    async fn begin(&self, track: &Track) -> Result<()> {
        let call = self.current_call()?;
        self.stop_active();

        let (tx, rx) = flume::bounded(BUFFERED_CHUNKS);
        let input: Input = RawAdapter::new(PcmReceiver::new(rx), SAMPLE_RATE, CHANNELS).into();

        let handle = call.lock().await.play_only_input(input);

        let (ended_tx, ended_rx) = oneshot::channel();
        if let Err(e) = handle.add_event(
            Event::Track(TrackEvent::End),
            TrackEndNotifier(Mutex::new(Some(ended_tx))),
        ) {
            warn!("⚠️ No se pudo registrar fin de track: {}", e);
        }

        debug!("🔊 Songbird reproduciendo {}", track.title());
        *self.active.lock() = Some(ActiveInput {
            tx: Some(tx),
            handle,
            ended: Some(ended_rx),
        });
        Ok(())
    }

    async fn write(&self, pcm: Bytes) -> Result<()> {
        let tx = self
            .active
            .lock()
            .as_ref()
            .and_then(|active| active.tx.clone())
            .ok_or(PlayerError::SinkClosed)?;

        tx.send_async(pcm).await.map_err(|_| PlayerError::SinkClosed)
    }

    async fn finish(&self) -> Result<()> {
        let ended = self.active.lock().as_mut().and_then(|active| {
            active.tx = None;
            active.ended.take()
        });

        // Deja que songbird reproduzca lo que queda en el buffer
        if let Some(ended) = ended {
            if tokio::time::timeout(DRAIN_TIMEOUT, ended).await.is_err() {
                warn!("⚠️ Songbird no terminó el track a tiempo");
            }
        }
        self.active.lock().take();
        Ok(())
    }

    async fn abort(&self) {
        self.stop_active();
    }

    async fn set_paused(&self, paused: bool) {
        if let Some(active) = self.active.lock().as_ref() {
            let result = if paused {
                active.handle.pause()
            } else {
                active.handle.play()
            };
            if let Err(e) = result {
                debug!("No se pudo cambiar pausa en songbird: {}", e);
            }
        }
    }

    fn is_connected(&self) -> bool {
        self.driver_up.load(Ordering::SeqCst) && self.call.read().is_some()
    }
}

/// Sigue el estado del driver de voz
struct DriverStatusHandler {
    up: Arc<AtomicBool>,
    guild_id: u64,
}

#[async_trait]
impl VoiceEventHandler for DriverStatusHandler {
    async fn act(&self, ctx: &EventContext<'_>) -> Option<Event> {
        match ctx {
            EventContext::DriverConnect(_) => {
                self.up.store(true, Ordering::SeqCst);
                info!("🔗 Driver de voz conectado en guild {}", self.guild_id);
            }
            EventContext::DriverReconnect(_) => {
                self.up.store(true, Ordering::SeqCst);
                info!("🔄 Driver de voz reconectado en guild {}", self.guild_id);
            }
            EventContext::DriverDisconnect(_) => {
                self.up.store(false, Ordering::SeqCst);
                warn!("🔌 Driver de voz desconectado en guild {}", self.guild_id);
            }
            _ => {}
        }
        None
    }
}

/// Avisa una vez cuando songbird termina el track
struct TrackEndNotifier(Mutex<Option<oneshot::Sender<()>>>);

#[async_trait]
impl VoiceEventHandler for TrackEndNotifier {
    async fn act(&self, _ctx: &EventContext<'_>) -> Option<Event> {
        if let Some(tx) = self.0.lock().take() {
            let _ = tx.send(());
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_pcm_receiver_reads_across_chunks() {
        let (tx, rx) = flume::bounded(4);
        tx.send(Bytes::from_static(&[1, 2, 3])).unwrap();
        tx.send(Bytes::from_static(&[4, 5])).unwrap();
        drop(tx);

        let mut reader = PcmReceiver::new(rx);
        let mut out = Vec::new();
        reader.read_to_end(&mut out).unwrap();

        assert_eq!(out, vec![1, 2, 3, 4, 5]);
        assert!(!reader.is_seekable());
        assert!(reader.seek(SeekFrom::Start(0)).is_err());
    }

    #[test]
    fn test_pcm_receiver_partial_reads() {
        let (tx, rx) = flume::bounded(1);
        tx.send(Bytes::from_static(&[9; 10])).unwrap();
        drop(tx);

        let mut reader = PcmReceiver::new(rx);
        let mut buf = [0u8; 4];
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(reader.read(&mut buf).unwrap(), 4);
        assert_eq!(reader.read(&mut buf).unwrap(), 2);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }

    #[test]
    fn test_pcm_receiver_fills_silence_while_starved() {
        let (tx, rx) = flume::bounded(1);
        let mut reader = PcmReceiver::new(rx);

        let mut buf = [7u8; 20];
        let started = std::time::Instant::now();
        assert_eq!(reader.read(&mut buf).unwrap(), 16);
        assert!(started.elapsed() < Duration::from_secs(1));
        assert_eq!(&buf[..16], &[0u8; 16]);
        assert_eq!(&buf[16..], &[7u8; 4]);

        // Cuando llega audio se entrega tal cual
        tx.send(Bytes::from_static(&[1, 2, 3])).unwrap();
        assert_eq!(reader.read(&mut buf).unwrap(), 3);
        assert_eq!(&buf[..3], &[1, 2, 3]);

        drop(tx);
        assert_eq!(reader.read(&mut buf).unwrap(), 0);
    }
}
