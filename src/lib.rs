//! # Open Radio
//!
//! Discord bot that streams radio channels and archived songs from an HLS
//! proxy into a voice channel.
//!
//! - [`audio`]: bounded queue, history rings and the playback engine
//! - [`voice`]: voice sink/connector traits, songbird backend, inactivity supervision
//! - [`sources`]: channel catalog, archive search and stream decoding
//! - [`carousel`]: expiring paginated selections behind the browse commands
//! - [`session`]: ties engine, voice and source together for the bot layer
//! - [`bot`] and [`ui`]: serenity event handler, slash commands and embeds

pub mod audio;
pub mod bot;
pub mod carousel;
pub mod config;
pub mod error;
pub mod events;
pub mod session;
pub mod sources;
pub mod ui;
pub mod voice;

#[cfg(test)]
mod testing;
