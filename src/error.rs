//! Error types for the radio player core.
//!
//! Every operation that a user can trigger returns a [`PlayerError`] which the
//! bot layer turns into a chat message through [`PlayerError::user_message`].
//! Nothing in this taxonomy is process-fatal.

use thiserror::Error;

/// Result type alias for player operations
pub type Result<T> = std::result::Result<T, PlayerError>;

#[derive(Debug, Error)]
pub enum PlayerError {
    /// Admission rejected by the bounded queue
    #[error("queue is full (capacity {capacity})")]
    QueueFull { capacity: usize },

    /// The queue (or engine) was shut down
    #[error("queue is closed")]
    Closed,

    /// Upstream fetch or subprocess spawn failed for one track
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Voice transport went away mid-write
    #[error("voice sink closed")]
    SinkClosed,

    /// Unknown or expired carousel session
    #[error("session not found")]
    NotFound,

    #[error("index {index} out of range (0..{len})")]
    IndexOutOfRange { index: usize, len: usize },

    /// A carousel needs at least one entry
    #[error("carousel has no entries")]
    EmptyCarousel,

    /// Voice join failed or timed out
    #[error("failed to connect to voice: {0}")]
    ConnectFailed(String),

    #[error("not connected to a voice channel")]
    NotConnected,

    /// Search returned nothing
    #[error("no results for {0}")]
    NoResults(String),

    /// Too few archived songs to start a random playlist
    #[error("not enough songs ({found} < {required})")]
    NotEnoughSongs { found: usize, required: usize },

    /// Skip/pause with nothing active
    #[error("nothing is playing")]
    NothingPlaying,

    /// Operation not allowed for the current play mode (live vs archive)
    #[error("invalid for current mode: {0}")]
    InvalidMode(String),

    /// HTTP error talking to the upstream catalog
    #[error("upstream request failed: {0}")]
    Upstream(#[from] reqwest::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    /// Mensaje corto para mostrar al usuario en Discord
    pub fn user_message(&self) -> String {
        match self {
            Self::QueueFull { capacity } => {
                format!("❌ La cola está llena (máximo {} elementos)", capacity)
            }
            Self::Closed => "❌ El reproductor se está apagando".to_string(),
            Self::SourceUnavailable(_) => "❌ Esa emisión no está disponible ahora mismo".to_string(),
            Self::SinkClosed => "❌ Se perdió la conexión de voz".to_string(),
            Self::NotFound => "⌛ Este menú expiró, vuelve a ejecutar el comando".to_string(),
            Self::IndexOutOfRange { .. } => "❌ Esa entrada no existe".to_string(),
            Self::EmptyCarousel => "📭 No hay nada que mostrar".to_string(),
            Self::ConnectFailed(_) => "❌ No pude unirme a tu canal de voz".to_string(),
            Self::NotConnected => "❌ No estoy en un canal de voz, usa `/summon`".to_string(),
            Self::NoResults(query) => format!("🔍 No encontré nada para `{}`", query),
            Self::NotEnoughSongs { found, required } => format!(
                "📭 No hay suficientes canciones archivadas ({} de {})",
                found, required
            ),
            Self::NothingPlaying => "🔇 No hay nada reproduciéndose".to_string(),
            Self::InvalidMode(reason) => format!("❌ {}", reason),
            Self::Upstream(_) => "❌ El servicio de radio no respondió".to_string(),
            Self::Io(_) => "❌ Error interno".to_string(),
        }
    }

    /// Errors that only affect one track and must not stop the playback loop
    pub fn is_track_local(&self) -> bool {
        matches!(
            self,
            Self::SourceUnavailable(_) | Self::SinkClosed | Self::Io(_) | Self::NotConnected
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_track_local_errors() {
        assert!(PlayerError::SinkClosed.is_track_local());
        assert!(PlayerError::SourceUnavailable("404".into()).is_track_local());
        assert!(!PlayerError::QueueFull { capacity: 1 }.is_track_local());
        assert!(!PlayerError::NotFound.is_track_local());
    }

    #[test]
    fn test_user_message_mentions_capacity() {
        let msg = PlayerError::QueueFull { capacity: 100 }.user_message();
        assert!(msg.contains("100"));
    }
}
