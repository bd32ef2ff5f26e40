//! # Voice Module
//!
//! Everything between the playback engine and the voice transport:
//!
//! - [`VoiceSink`]: where decoded PCM goes, one track at a time
//! - [`VoiceConnector`]: joining and leaving a voice channel
//! - [`state::ConnectionTracker`]: shared connection state and listener activity
//! - [`supervisor::VoiceSupervisor`]: connect/disconnect plus the inactivity check
//! - [`songbird::SongbirdVoice`]: the serenity/songbird implementation of both traits

pub mod songbird;
pub mod state;
pub mod supervisor;

use async_trait::async_trait;
use bytes::Bytes;
use std::fmt;

use crate::{error::Result, sources::Track};

/// Canal de voz de un servidor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ChannelRef {
    pub guild_id: u64,
    pub channel_id: u64,
}

impl ChannelRef {
    pub fn new(guild_id: u64, channel_id: u64) -> Self {
        Self {
            guild_id,
            channel_id,
        }
    }
}

impl fmt::Display for ChannelRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "<#{}>", self.channel_id)
    }
}

/// Destino del audio decodificado
#[async_trait]
pub trait VoiceSink: Send + Sync {
    /// Prepara la salida para un nuevo track
    async fn begin(&self, track: &Track) -> Result<()>;

    /// Escribe PCM f32le 48 kHz estéreo. Fails with `SinkClosed` once the
    /// transport is gone.
    async fn write(&self, pcm: Bytes) -> Result<()>;

    /// Fin normal del track
    async fn finish(&self) -> Result<()>;

    /// Corta el track actual inmediatamente
    async fn abort(&self);

    /// Pausa o reanuda la salida sin soltar el track
    async fn set_paused(&self, _paused: bool) {}

    fn is_connected(&self) -> bool;
}

/// Entrada y salida de canales de voz
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait VoiceConnector: Send + Sync {
    async fn join(&self, channel: ChannelRef) -> Result<()>;
    async fn leave(&self) -> Result<()>;
}
