use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::{path::PathBuf, str::FromStr, time::Duration};

use crate::audio::EngineConfig;

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    // Discord
    pub discord_token: String,
    pub application_id: u64,
    pub guild_id: Option<u64>, // Para comandos de desarrollo
    pub output_channel_id: Option<u64>,

    // Fuente
    pub upstream_url: String,
    pub archive_dir: Option<PathBuf>,
    pub ffmpeg_path: String,

    // Capacidades
    pub queue_capacity: usize,
    pub recent_capacity: usize,
    pub upcoming_capacity: usize,

    // Tiempos (en segundos)
    pub carousel_timeout: u64,
    pub carousel_sweep_interval: u64,
    pub voice_timeout: u64,
    pub voice_check_interval: u64,
    pub stop_grace_period: u64,
}

impl Config {
    pub fn load() -> Result<Self> {
        dotenvy::dotenv().ok();
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Construye la configuración a partir de una función de búsqueda de variables
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let discord_token = lookup("DISCORD_TOKEN").context("DISCORD_TOKEN no definido")?;
        if discord_token.trim().is_empty() {
            anyhow::bail!("DISCORD_TOKEN está vacío");
        }

        let config = Self {
            // Discord
            discord_token,
            application_id: lookup("APPLICATION_ID")
                .context("APPLICATION_ID no definido")?
                .parse()
                .context("APPLICATION_ID inválido")?,
            guild_id: lookup("GUILD_ID").and_then(|s| s.parse().ok()),
            output_channel_id: lookup("OUTPUT_CHANNEL_ID").and_then(|s| s.parse().ok()),

            // Fuente
            upstream_url: lookup("UPSTREAM_URL").unwrap_or(defaults.upstream_url),
            archive_dir: lookup("ARCHIVE_DIR")
                .filter(|s| !s.trim().is_empty())
                .map(PathBuf::from),
            ffmpeg_path: lookup("FFMPEG_PATH").unwrap_or(defaults.ffmpeg_path),

            // Capacidades
            queue_capacity: parse_or(&lookup, "QUEUE_CAPACITY", defaults.queue_capacity)?,
            recent_capacity: parse_or(&lookup, "RECENT_CAPACITY", defaults.recent_capacity)?,
            upcoming_capacity: parse_or(&lookup, "UPCOMING_CAPACITY", defaults.upcoming_capacity)?,

            // Tiempos
            carousel_timeout: parse_or(&lookup, "CAROUSEL_TIMEOUT", defaults.carousel_timeout)?,
            carousel_sweep_interval: parse_or(
                &lookup,
                "CAROUSEL_SWEEP_INTERVAL",
                defaults.carousel_sweep_interval,
            )?,
            voice_timeout: parse_or(&lookup, "VOICE_TIMEOUT", defaults.voice_timeout)?,
            voice_check_interval: parse_or(
                &lookup,
                "VOICE_CHECK_INTERVAL",
                defaults.voice_check_interval,
            )?,
            stop_grace_period: parse_or(&lookup, "STOP_GRACE_PERIOD", defaults.stop_grace_period)?,
        };

        // Validate configuration before returning
        config.validate()?;

        Ok(config)
    }

    /// Validates configuration values for correctness.
    ///
    /// # Validation Rules
    ///
    /// - Queue and history capacities must be > 0
    /// - Carousel sweep interval must be at most half the carousel timeout
    /// - Voice check interval must not exceed the voice timeout
    /// - Every interval and the stop grace period must be > 0
    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            anyhow::bail!("Queue capacity must be greater than 0");
        }
        if self.recent_capacity == 0 || self.upcoming_capacity == 0 {
            anyhow::bail!("History capacities must be greater than 0");
        }

        if self.carousel_sweep_interval == 0 || self.voice_check_interval == 0 {
            anyhow::bail!("Check intervals must be greater than 0");
        }
        if self.carousel_sweep_interval > self.carousel_timeout / 2 {
            anyhow::bail!(
                "Carousel sweep interval ({}s) must be at most half the carousel timeout ({}s)",
                self.carousel_sweep_interval,
                self.carousel_timeout
            );
        }
        if self.voice_check_interval > self.voice_timeout {
            anyhow::bail!(
                "Voice check interval ({}s) cannot exceed the voice timeout ({}s)",
                self.voice_check_interval,
                self.voice_timeout
            );
        }
        if self.stop_grace_period == 0 {
            anyhow::bail!("Stop grace period must be greater than 0");
        }

        url::Url::parse(&self.upstream_url)
            .with_context(|| format!("UPSTREAM_URL inválida: {}", self.upstream_url))?;

        Ok(())
    }

    pub fn carousel_timeout(&self) -> Duration {
        Duration::from_secs(self.carousel_timeout)
    }

    pub fn carousel_sweep_interval(&self) -> Duration {
        Duration::from_secs(self.carousel_sweep_interval)
    }

    pub fn voice_timeout(&self) -> Duration {
        Duration::from_secs(self.voice_timeout)
    }

    pub fn voice_check_interval(&self) -> Duration {
        Duration::from_secs(self.voice_check_interval)
    }

    pub fn engine(&self) -> EngineConfig {
        EngineConfig {
            queue_capacity: self.queue_capacity,
            recent_capacity: self.recent_capacity,
            upcoming_capacity: self.upcoming_capacity,
            stop_grace: Duration::from_secs(self.stop_grace_period),
        }
    }

    /// Returns a summary of the current configuration for logging.
    ///
    /// Excludes the token.
    pub fn summary(&self) -> String {
        format!(
            "Config Summary:\n  \
            Discord: App ID {} (Guild: {}, Output: {})\n  \
            Upstream: {} (archive: {}, ffmpeg: {})\n  \
            Capacities: {} queue, {} recent, {} upcoming\n  \
            Carousel: {} timeout, sweep every {}\n  \
            Voice: {} timeout, check every {}, {} stop grace",
            self.application_id,
            self.guild_id.map_or("global".to_string(), |id| id.to_string()),
            self.output_channel_id
                .map_or("none".to_string(), |id| id.to_string()),
            self.upstream_url,
            self.archive_dir
                .as_ref()
                .map_or("none".to_string(), |p| p.display().to_string()),
            self.ffmpeg_path,
            self.queue_capacity,
            self.recent_capacity,
            self.upcoming_capacity,
            humantime::format_duration(self.carousel_timeout()),
            humantime::format_duration(self.carousel_sweep_interval()),
            humantime::format_duration(self.voice_timeout()),
            humantime::format_duration(self.voice_check_interval()),
            humantime::format_duration(Duration::from_secs(self.stop_grace_period))
        )
    }
}

fn parse_or<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    match lookup(key) {
        Some(value) if !value.trim().is_empty() => value
            .trim()
            .parse()
            .with_context(|| format!("{} inválido: {}", key, value)),
        _ => Ok(default),
    }
}

/// Default configuration values.
///
/// Used as fallbacks when environment variables are not provided.
impl Default for Config {
    fn default() -> Self {
        Self {
            // Discord (no defaults - must be provided)
            discord_token: String::new(),
            application_id: 0,
            guild_id: None,
            output_channel_id: None,

            upstream_url: "http://127.0.0.1:9999".to_string(),
            archive_dir: None,
            ffmpeg_path: "ffmpeg".to_string(),

            queue_capacity: 100,
            recent_capacity: 10,
            upcoming_capacity: 50,

            carousel_timeout: 300,
            carousel_sweep_interval: 60,
            voice_timeout: 300,
            voice_check_interval: 60,
            stop_grace_period: 5,
        }
    }
}
