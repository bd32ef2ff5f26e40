//! # Sources Module
//!
//! Upstream radio catalog and stream acquisition.
//!
//! The player core only depends on the [`ContentSource`] trait: listing the
//! available channels, searching archived songs, and turning a [`Track`] into a
//! live [`ResourceHandle`] (an ffmpeg process decoding the stream to PCM).
//!
//! [`http::HttpContentSource`] is the production implementation, talking to an
//! HLS proxy that exposes the channel catalog and archived song index as JSON.

pub mod http;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::{collections::HashSet, path::PathBuf, time::Duration};

use crate::{audio::resource::ResourceHandle, error::Result};

pub use http::HttpContentSource;

/// Trait común para el catálogo de radio
#[async_trait]
pub trait ContentSource: Send + Sync {
    /// Lista de canales disponibles, en el orden del catálogo
    async fn list_channels(&self) -> Result<Vec<Channel>>;

    /// Busca canciones archivadas
    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>>;

    /// Canciones archivadas de los canales dados, una por título y artista
    async fn channel_songs(&self, channel_ids: &[String]) -> Result<Vec<Track>>;

    /// Abre el stream de audio de un track.
    ///
    /// The returned handle owns the decoding process; dropping or releasing it
    /// terminates the process. Fails with `SourceUnavailable` when the stream
    /// cannot be opened.
    async fn fetch_stream(&self, track: &Track) -> Result<ResourceHandle>;

    /// Nombre de la fuente
    fn source_name(&self) -> &'static str;
}

/// Canal de radio del catálogo
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Channel {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub number: Option<u32>,
    #[serde(default)]
    pub genre: Option<String>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub image_url: Option<String>,
}

impl Channel {
    pub fn pretty_name(&self) -> String {
        match self.number {
            Some(number) => format!("#{} {}", number, self.name),
            None => self.name.clone(),
        }
    }
}

/// Dónde vive el audio de un track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Locator {
    /// Emisión en vivo de un canal (HLS)
    Live { channel_id: String },
    /// Archivo de audio archivado en disco
    Archive { path: PathBuf },
    /// URL directa
    Uri(String),
}

/// Metadatos inmutables de un track
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Track {
    id: String,
    title: String,
    artist: Option<String>,
    locator: Locator,
    duration: Option<Duration>,
    channel_id: Option<String>,
    image_url: Option<String>,
}

impl Track {
    pub fn new(id: impl Into<String>, title: impl Into<String>, locator: Locator) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            artist: None,
            locator,
            duration: None,
            channel_id: None,
            image_url: None,
        }
    }

    /// Track que representa la emisión en vivo de un canal
    pub fn live(channel: &Channel) -> Self {
        let mut track = Self::new(
            format!("live:{}", channel.id),
            channel.pretty_name(),
            Locator::Live {
                channel_id: channel.id.clone(),
            },
        );
        track.channel_id = Some(channel.id.clone());
        track.image_url = channel.image_url.clone();
        track
    }

    // Getters
    pub fn id(&self) -> &str {
        &self.id
    }
    pub fn title(&self) -> &str {
        &self.title
    }
    pub fn artist(&self) -> Option<&str> {
        self.artist.as_deref()
    }
    pub fn locator(&self) -> &Locator {
        &self.locator
    }
    pub fn duration(&self) -> Option<Duration> {
        self.duration
    }
    pub fn channel_id(&self) -> Option<&str> {
        self.channel_id.as_deref()
    }
    pub fn image_url(&self) -> Option<&str> {
        self.image_url.as_deref()
    }

    pub fn is_live(&self) -> bool {
        matches!(self.locator, Locator::Live { .. })
    }

    /// "Título - Artista" para mensajes
    pub fn display_name(&self) -> String {
        match &self.artist {
            Some(artist) => format!("{} - {}", self.title, artist),
            None => self.title.clone(),
        }
    }

    // Setters
    pub fn with_artist(mut self, artist: impl Into<String>) -> Self {
        self.artist = Some(artist.into());
        self
    }

    pub fn with_duration(mut self, duration: Duration) -> Self {
        self.duration = Some(duration);
        self
    }

    pub fn with_channel(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    pub fn with_image(mut self, image_url: impl Into<String>) -> Self {
        self.image_url = Some(image_url.into());
        self
    }
}

/// Resuelve un canal por id, número o nombre parcial (sin distinguir mayúsculas)
pub fn find_channel<'a>(channels: &'a [Channel], input: &str) -> Option<&'a Channel> {
    let needle = input.trim().trim_start_matches('#').to_lowercase();
    if needle.is_empty() {
        return None;
    }

    channels
        .iter()
        .find(|c| c.id.to_lowercase() == needle)
        .or_else(|| {
            needle
                .parse::<u32>()
                .ok()
                .and_then(|n| channels.iter().find(|c| c.number == Some(n)))
        })
        .or_else(|| {
            channels
                .iter()
                .find(|c| c.name.to_lowercase().contains(&needle))
        })
}

/// Resuelve una lista separada por comas, ignorando entradas desconocidas.
/// Each channel appears once, in the order it was first matched.
pub fn find_channels<'a>(channels: &'a [Channel], input: &str) -> Vec<&'a Channel> {
    let mut seen = HashSet::new();
    input
        .split(',')
        .filter_map(|part| find_channel(channels, part))
        .filter(|channel| seen.insert(channel.id.as_str()))
        .collect()
}

/// Deja una canción por título y artista (sin distinguir mayúsculas)
pub fn unique_songs(tracks: Vec<Track>) -> Vec<Track> {
    let mut seen = HashSet::new();
    tracks
        .into_iter()
        .filter(|track| {
            seen.insert((
                track.title().to_lowercase(),
                track.artist().map(str::to_lowercase),
            ))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn channel(id: &str, name: &str, number: u32) -> Channel {
        Channel {
            id: id.to_string(),
            name: name.to_string(),
            number: Some(number),
            genre: None,
            description: None,
            image_url: None,
        }
    }

    fn catalog() -> Vec<Channel> {
        vec![
            channel("octave", "The 90s on 9", 9),
            channel("thepulse", "The Pulse", 15),
            channel("9450", "Lithium", 34),
        ]
    }

    #[test]
    fn test_find_channel_by_id_number_and_name() {
        let channels = catalog();
        assert_eq!(find_channel(&channels, "THEPULSE").map(|c| c.number), Some(Some(15)));
        assert_eq!(find_channel(&channels, "#34").map(|c| c.id.as_str()), Some("9450"));
        assert_eq!(find_channel(&channels, "lith").map(|c| c.id.as_str()), Some("9450"));
        assert!(find_channel(&channels, "polka").is_none());
        assert!(find_channel(&channels, "  ").is_none());
    }

    #[test]
    fn test_id_match_wins_over_number() {
        // "9450" es un id, no el número 9450
        let channels = catalog();
        assert_eq!(find_channel(&channels, "9450").map(|c| c.name.as_str()), Some("Lithium"));
    }

    #[test]
    fn test_find_channels_skips_unknown() {
        let channels = catalog();
        let found: Vec<&str> = find_channels(&channels, "9, nope, pulse")
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(found, vec!["octave", "thepulse"]);
    }

    #[test]
    fn test_find_channels_lists_each_channel_once() {
        let channels = catalog();
        let found: Vec<&str> = find_channels(&channels, "pulse, 9, #15, thepulse, octave")
            .into_iter()
            .map(|c| c.id.as_str())
            .collect();
        assert_eq!(found, vec!["thepulse", "octave"]);
    }

    #[test]
    fn test_unique_songs_by_title_and_artist() {
        let song = |id: &str, title: &str, artist: &str| {
            Track::new(id, title, Locator::Uri(format!("file:///{}", id))).with_artist(artist)
        };
        let songs = unique_songs(vec![
            song("1", "Creep", "Radiohead"),
            song("2", "creep", "RADIOHEAD"),
            song("3", "Creep", "TLC"),
            song("4", "Zombie", "The Cranberries"),
        ]);
        let ids: Vec<&str> = songs.iter().map(|t| t.id()).collect();
        assert_eq!(ids, vec!["1", "3", "4"]);
    }

    #[test]
    fn test_live_track_display() {
        let track = Track::live(&channel("thepulse", "The Pulse", 15));
        assert!(track.is_live());
        assert_eq!(track.title(), "#15 The Pulse");
        assert_eq!(track.channel_id(), Some("thepulse"));
        assert_eq!(
            Track::new("a", "Song", Locator::Uri("http://x".into()))
                .with_artist("Band")
                .display_name(),
            "Song - Band"
        );
    }
}
