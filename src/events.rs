use tokio::sync::broadcast;

use crate::{audio::history::HistoryEntry, sources::Track, voice::ChannelRef};

/// Notificaciones del reproductor hacia la capa de Discord
#[derive(Debug, Clone)]
pub enum RadioEvent {
    TrackStarted(Track),
    TrackFinished(HistoryEntry),
    /// Desconectado por inactividad
    VoiceTimeout(ChannelRef),
    /// Reproducción detenida y cola vaciada
    Stopped,
}

pub type EventSender = broadcast::Sender<RadioEvent>;

pub fn channel() -> EventSender {
    broadcast::channel(64).0
}
