//! # Audio Module
//!
//! Playback core of the radio player.
//!
//! ## Architecture
//!
//! ### [`resource`] - Resource Handles
//! - One handle per decoding process (ffmpeg + its stdout)
//! - Idempotent release from any path, including `Drop`
//!
//! ### [`queue`] - Bounded Queue
//! - Fixed-capacity FIFO between `/play` and the playback loop
//! - Rejects on overflow instead of growing
//!
//! ### [`history`] - History Rings
//! - Recent plays and recent admissions, metadata only
//!
//! ### [`engine`] - Playback Engine
//! - Single active track, lazy stream binding
//! - Stop/skip with a grace period and forced release
//!
//! ## Audio Format
//!
//! - **Sample Rate**: 48kHz (Discord standard)
//! - **Sample Format**: 32-bit float, little endian
//! - **Channels**: Stereo (2 channels)

pub mod engine;
pub mod history;
pub mod queue;
pub mod resource;

pub use engine::{EngineConfig, EngineStatus, PlayMode, PlaybackEngine, PlaybackState};
pub use history::{HistoryEntry, HistoryKind, HistoryRing, PlaybackOutcome};
pub use queue::{BoundedQueue, QueuedItem};
pub use resource::{ReleaseGuard, ResourceHandle};
