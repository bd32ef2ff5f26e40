//! Discord presentation: embeds and carousel buttons.

pub mod buttons;
pub mod embeds;

use crate::sources::{Channel, Track};

/// Entrada navegable de un carrusel
#[derive(Debug, Clone, PartialEq)]
pub enum BrowseEntry {
    Channel(Channel),
    Track(Track),
}

impl BrowseEntry {
    pub fn label(&self) -> String {
        match self {
            Self::Channel(channel) => channel.pretty_name(),
            Self::Track(track) => track.display_name(),
        }
    }
}
