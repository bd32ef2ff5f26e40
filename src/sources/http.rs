use async_trait::async_trait;
use serde::Deserialize;
use std::{
    path::{Path, PathBuf},
    time::Duration,
};
use tracing::{debug, info, warn};
use url::Url;

use super::{unique_songs, Channel, ContentSource, Locator, Track};
use crate::{
    audio::resource::{FfmpegProcess, ResourceHandle},
    error::{PlayerError, Result},
};

/// Cliente del proxy HTTP de radio (catálogo JSON + streams HLS)
pub struct HttpContentSource {
    client: reqwest::Client,
    base: Url,
    archive_dir: Option<PathBuf>,
    ffmpeg_path: String,
}

#[derive(Debug, Deserialize)]
struct RawSong {
    #[serde(alias = "guid")]
    id: String,
    title: String,
    #[serde(default)]
    artist: Option<String>,
    file_path: PathBuf,
    #[serde(default, alias = "channel")]
    channel_id: Option<String>,
    #[serde(default)]
    duration: Option<f64>,
    #[serde(default)]
    image_url: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawChannel {
    #[serde(alias = "channel_id")]
    id: String,
    name: String,
    #[serde(default, alias = "channel_number")]
    number: Option<NumberLike>,
    #[serde(default)]
    genre: Option<String>,
    #[serde(default, alias = "short_description")]
    description: Option<String>,
    #[serde(default)]
    image_url: Option<String>,
}

/// El proxy envía el número de canal como texto o como entero
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum NumberLike {
    Int(u32),
    Text(String),
}

impl NumberLike {
    fn as_u32(&self) -> Option<u32> {
        match self {
            Self::Int(n) => Some(*n),
            Self::Text(s) => s.trim().parse().ok(),
        }
    }
}

impl From<RawChannel> for Channel {
    fn from(raw: RawChannel) -> Self {
        Self {
            id: raw.id,
            name: raw.name,
            number: raw.number.as_ref().and_then(NumberLike::as_u32),
            genre: raw.genre,
            description: raw.description,
            image_url: raw.image_url,
        }
    }
}

impl HttpContentSource {
    pub fn new(
        upstream_url: &str,
        archive_dir: Option<PathBuf>,
        ffmpeg_path: impl Into<String>,
    ) -> anyhow::Result<Self> {
        let mut base = Url::parse(upstream_url)?;
        // `join` reemplaza el último segmento si la base no termina en '/'
        if !base.path().ends_with('/') {
            base.set_path(&format!("{}/", base.path()));
        }

        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(15))
            .user_agent(concat!("open-radio/", env!("CARGO_PKG_VERSION")))
            .build()?;

        info!("📡 Fuente de radio: {}", base);
        Ok(Self {
            client,
            base,
            archive_dir,
            ffmpeg_path: ffmpeg_path.into(),
        })
    }

    fn endpoint(&self, path: &str) -> Result<Url> {
        self.base
            .join(path)
            .map_err(|e| PlayerError::SourceUnavailable(format!("URL inválida {}: {}", path, e)))
    }

    /// URL del stream en vivo de un canal
    pub fn live_url(&self, channel_id: &str) -> Result<Url> {
        self.endpoint(&format!("{}.m3u8", channel_id))
    }

    fn resolve_archive(&self, path: &Path) -> PathBuf {
        match &self.archive_dir {
            Some(dir) if path.is_relative() => dir.join(path),
            _ => path.to_path_buf(),
        }
    }

    fn song_to_track(&self, song: RawSong) -> Track {
        let mut track = Track::new(
            song.id,
            song.title,
            Locator::Archive {
                path: self.resolve_archive(&song.file_path),
            },
        );
        if let Some(artist) = song.artist {
            track = track.with_artist(artist);
        }
        if let Some(secs) = song.duration.filter(|d| d.is_finite() && *d > 0.0) {
            track = track.with_duration(Duration::from_secs_f64(secs));
        }
        if let Some(channel) = song.channel_id {
            track = track.with_channel(channel);
        }
        if let Some(image) = song.image_url {
            track = track.with_image(image);
        }
        track
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn list_channels(&self) -> Result<Vec<Channel>> {
        let url = self.endpoint("channels")?;
        let channels: Vec<RawChannel> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        debug!("📻 {} canales en el catálogo", channels.len());
        Ok(channels.into_iter().map(Channel::from).collect())
    }

    async fn search(&self, query: &str, limit: usize) -> Result<Vec<Track>> {
        let mut url = self.endpoint("songs")?;
        url.query_pairs_mut()
            .append_pair("q", query)
            .append_pair("limit", &limit.to_string());

        info!("🔍 Buscando en el archivo: {}", query);
        let songs: Vec<RawSong> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        Ok(songs
            .into_iter()
            .take(limit)
            .map(|song| self.song_to_track(song))
            .collect())
    }

    async fn channel_songs(&self, channel_ids: &[String]) -> Result<Vec<Track>> {
        let mut url = self.endpoint("songs")?;
        url.query_pairs_mut()
            .append_pair("channels", &channel_ids.join(","));

        let songs: Vec<RawSong> = self
            .client
            .get(url)
            .send()
            .await?
            .error_for_status()?
            .json()
            .await?;

        let tracks = unique_songs(songs.into_iter().map(|song| self.song_to_track(song)).collect());
        debug!("🎲 {} canciones archivadas en {:?}", tracks.len(), channel_ids);
        Ok(tracks)
    }

    async fn fetch_stream(&self, track: &Track) -> Result<ResourceHandle> {
        match track.locator() {
            Locator::Live { channel_id } => {
                let url = self.live_url(channel_id)?;
                FfmpegProcess::spawn(&self.ffmpeg_path, url.as_str(), track.id())
            }
            Locator::Archive { path } => {
                if let Err(e) = tokio::fs::metadata(path).await {
                    warn!("⚠️ Archivo no encontrado {}: {}", path.display(), e);
                    return Err(PlayerError::SourceUnavailable(format!(
                        "archivo no encontrado: {}",
                        path.display()
                    )));
                }
                let input = path.to_string_lossy();
                FfmpegProcess::spawn(&self.ffmpeg_path, &input, track.id())
            }
            Locator::Uri(uri) => FfmpegProcess::spawn(&self.ffmpeg_path, uri, track.id()),
        }
    }

    fn source_name(&self) -> &'static str {
        "http"
    }
}
