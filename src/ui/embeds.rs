use chrono::{DateTime, Utc};
use serenity::{
    all::Timestamp,
    builder::{CreateEmbed, CreateEmbedFooter},
};
use std::time::Duration;

use super::BrowseEntry;
use crate::{
    audio::{HistoryEntry, PlayMode, PlaybackOutcome, PlaybackState},
    session::SessionStatus,
    sources::{Channel, Track},
};

/// Paleta de colores estandarizada para el bot
pub mod colors {
    use serenity::all::Colour;

    pub const SUCCESS_GREEN: Colour = Colour::from_rgb(67, 181, 129);
    pub const ERROR_RED: Colour = Colour::from_rgb(220, 53, 69);
    pub const WARNING_ORANGE: Colour = Colour::from_rgb(255, 193, 7);
    pub const INFO_BLUE: Colour = Colour::from_rgb(52, 144, 220);
    pub const RADIO_PURPLE: Colour = Colour::from_rgb(138, 43, 226);
    pub const NEUTRAL_GRAY: Colour = Colour::from_rgb(108, 117, 125);
}

/// Footer estandarizado para todos los embeds
const STANDARD_FOOTER: &str = "📻 Open Radio";

/// Entradas máximas en listas de texto (límite de Discord para descripciones)
const MAX_LIST_LINES: usize = 20;

fn footer() -> CreateEmbedFooter {
    CreateEmbedFooter::new(STANDARD_FOOTER)
}

/// Embed de lo que suena ahora
pub fn now_playing_embed(state: &PlaybackState) -> Option<CreateEmbed> {
    let (track, started_at, paused) = match state {
        PlaybackState::Playing { track, started_at } => (track, started_at, false),
        PlaybackState::Paused { track, started_at } => (track, started_at, true),
        _ => return None,
    };

    let title = match (track.is_live(), paused) {
        (_, true) => "⏸️ En Pausa",
        (true, false) => "🔴 En Vivo",
        (false, false) => "🎵 Reproduciendo Ahora",
    };

    let mut embed = track_fields(
        CreateEmbed::default()
            .title(title)
            .description(format!("**{}**", track.title()))
            .color(if paused {
                colors::WARNING_ORANGE
            } else {
                colors::SUCCESS_GREEN
            }),
        track,
    )
    .field("🕐 Desde", relative_time(started_at), true);

    if let Some(image) = track.image_url() {
        embed = embed.thumbnail(image);
    }

    Some(embed.timestamp(Timestamp::now()).footer(footer()))
}

fn track_fields(mut embed: CreateEmbed, track: &Track) -> CreateEmbed {
    if let Some(artist) = track.artist() {
        embed = embed.field("🎤 Artista", artist, true);
    }

    let duration = match (track.is_live(), track.duration()) {
        (true, _) => "🔴 En vivo".to_string(),
        (false, Some(duration)) => format_duration(duration),
        (false, None) => "Desconocida".to_string(),
    };
    embed = embed.field("⏱️ Duración", duration, true);

    if let Some(channel) = track.channel_id() {
        embed = embed.field("📻 Canal", format!("`{}`", channel), true);
    }
    embed
}

/// Embed de confirmación al encolar
pub fn track_added_embed(track: &Track, position: usize, requested_by: u64) -> CreateEmbed {
    let mut embed = track_fields(
        CreateEmbed::default()
            .title("✅ Canción Agregada")
            .description(format!("**{}**", track.display_name()))
            .color(colors::SUCCESS_GREEN),
        track,
    )
    .field("📋 Posición", position.to_string(), true)
    .field("👤 Solicitado por", format!("<@{}>", requested_by), true);

    if let Some(image) = track.image_url() {
        embed = embed.thumbnail(image);
    }
    embed.timestamp(Timestamp::now()).footer(footer())
}

/// Embed al sintonizar un canal en vivo
pub fn live_embed(channel: &Channel) -> CreateEmbed {
    channel_embed(channel)
        .title(format!("🔴 Sintonizando {}", channel.pretty_name()))
        .color(colors::SUCCESS_GREEN)
}

/// Embed al arrancar una lista aleatoria
pub fn playlist_embed(channels: &[Channel], songs: usize) -> CreateEmbed {
    success_embed(
        "Lista aleatoria",
        &format!("🎲 {} canciones de {}", songs, channel_summary(channels)),
    )
}

/// Hasta tres nombres de canal, el resto como `(+N más)`
fn channel_summary(channels: &[Channel]) -> String {
    const SHOWN: usize = 3;
    let names: Vec<String> = channels.iter().take(SHOWN).map(Channel::pretty_name).collect();
    let mut summary = names.join(", ");
    if channels.len() > SHOWN {
        summary.push_str(&format!(" (+{} más)", channels.len() - SHOWN));
    }
    summary
}

/// Ficha de un canal del catálogo
pub fn channel_embed(channel: &Channel) -> CreateEmbed {
    let mut embed = CreateEmbed::default()
        .title(format!("📻 {}", channel.pretty_name()))
        .color(colors::RADIO_PURPLE)
        .field("🆔 Id", format!("`{}`", channel.id), true);

    if let Some(description) = &channel.description {
        embed = embed.description(description);
    }
    if let Some(genre) = &channel.genre {
        embed = embed.field("🎼 Género", genre, true);
    }
    if let Some(image) = &channel.image_url {
        embed = embed.thumbnail(image);
    }
    embed.footer(footer())
}

/// Página de un carrusel
pub fn carousel_embed(entry: &BrowseEntry, index: usize, total: usize) -> CreateEmbed {
    let embed = match entry {
        BrowseEntry::Channel(channel) => channel_embed(channel),
        BrowseEntry::Track(track) => {
            let mut embed = track_fields(
                CreateEmbed::default()
                    .title(format!("🎵 {}", track.title()))
                    .color(colors::RADIO_PURPLE),
                track,
            )
            .field("🆔 Id", format!("`{}`", track.id()), true);
            if let Some(image) = track.image_url() {
                embed = embed.thumbnail(image);
            }
            embed
        }
    };

    embed.footer(CreateEmbedFooter::new(format!(
        "{} de {} • {}",
        index + 1,
        total,
        STANDARD_FOOTER
    )))
}

/// Historial de reproducción, el más reciente primero
pub fn recent_embed(entries: &[HistoryEntry]) -> CreateEmbed {
    let description = if entries.is_empty() {
        "Todavía no ha sonado nada".to_string()
    } else {
        entries
            .iter()
            .take(MAX_LIST_LINES)
            .enumerate()
            .map(|(i, entry)| format!("`{}.` {}", i + 1, history_line(entry)))
            .collect::<Vec<_>>()
            .join("\n")
    };

    CreateEmbed::default()
        .title("🕘 Reproducido Recientemente")
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(footer())
}

/// Cola pendiente en orden de reproducción
pub fn upcoming_embed(tracks: &[Track], capacity: usize) -> CreateEmbed {
    let mut description = if tracks.is_empty() {
        "La cola está vacía".to_string()
    } else {
        tracks
            .iter()
            .take(MAX_LIST_LINES)
            .enumerate()
            .map(|(i, track)| format!("`{}.` {}", i + 1, track_line(track)))
            .collect::<Vec<_>>()
            .join("\n")
    };
    if tracks.len() > MAX_LIST_LINES {
        description.push_str(&format!("\n… y {} más", tracks.len() - MAX_LIST_LINES));
    }

    CreateEmbed::default()
        .title("📜 Próximas Canciones")
        .description(description)
        .color(colors::INFO_BLUE)
        .footer(CreateEmbedFooter::new(format!(
            "{}/{} en cola • {}",
            tracks.len(),
            capacity,
            STANDARD_FOOTER
        )))
}

/// Estado general del reproductor
pub fn status_embed(status: &SessionStatus) -> CreateEmbed {
    let playing = status
        .engine
        .state
        .track()
        .map(track_line)
        .unwrap_or_else(|| "Nada".to_string());

    let mode = match status.engine.mode {
        Some(PlayMode::Live) => "🔴 En vivo",
        Some(PlayMode::Archive) => "💿 Archivo",
        Some(PlayMode::Random) => "🎲 Aleatorio",
        None => "—",
    };

    let voice = match status.connection.channel() {
        Some(channel) => format!("{} en {}", status.connection.as_str(), channel),
        None => status.connection.as_str().to_string(),
    };

    CreateEmbed::default()
        .title("📊 Estado del Reproductor")
        .color(colors::NEUTRAL_GRAY)
        .field("🎵 Sonando", playing, false)
        .field("🎚️ Modo", mode, true)
        .field(
            "🔁 Repetición",
            if status.engine.repeat { "Sí" } else { "No" },
            true,
        )
        .field(
            "📋 Cola",
            format!("{}/{}", status.engine.queued, status.engine.capacity),
            true,
        )
        .field("🔊 Voz", voice, true)
        .field("👥 Oyentes", status.listeners.to_string(), true)
        .field("📡 Fuente", status.source, true)
        .timestamp(Timestamp::now())
        .footer(footer())
}

pub fn error_embed(description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title("❌ Error")
        .description(description)
        .color(colors::ERROR_RED)
        .footer(footer())
}

pub fn success_embed(title: &str, description: &str) -> CreateEmbed {
    CreateEmbed::default()
        .title(format!("✅ {}", title))
        .description(description)
        .color(colors::SUCCESS_GREEN)
        .footer(footer())
}

fn track_line(track: &Track) -> String {
    match track.duration() {
        Some(duration) if !track.is_live() => {
            format!("**{}** `[{}]`", track.display_name(), format_duration(duration))
        }
        _ => format!("**{}**", track.display_name()),
    }
}

fn history_line(entry: &HistoryEntry) -> String {
    let marker = match &entry.outcome {
        PlaybackOutcome::Completed | PlaybackOutcome::Queued => "",
        PlaybackOutcome::Interrupted => " ⏭️",
        PlaybackOutcome::Failed(_) => " ⚠️",
    };
    format!(
        "{}{} • {}",
        track_line(&entry.track),
        marker,
        relative_time(&entry.at)
    )
}

/// Marca de tiempo relativa de Discord (`hace 3 minutos`)
fn relative_time(at: &DateTime<Utc>) -> String {
    format!("<t:{}:R>", at.timestamp())
}

pub fn format_duration(duration: Duration) -> String {
    let total_seconds = duration.as_secs();
    let hours = total_seconds / 3600;
    let minutes = (total_seconds % 3600) / 60;
    let seconds = total_seconds % 60;

    if hours > 0 {
        format!("{}:{:02}:{:02}", hours, minutes, seconds)
    } else {
        format!("{}:{:02}", minutes, seconds)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{archive_track, live_track};
    use pretty_assertions::assert_eq;

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(Duration::from_secs(59)), "0:59");
        assert_eq!(format_duration(Duration::from_secs(181)), "3:01");
        assert_eq!(format_duration(Duration::from_secs(3725)), "1:02:05");
    }

    #[test]
    fn test_track_line_hides_live_duration() {
        let archived = archive_track("a").with_duration(Duration::from_secs(200));
        assert!(track_line(&archived).ends_with("`[3:20]`"));

        let live = live_track("thepulse").with_duration(Duration::from_secs(200));
        assert!(!track_line(&live).contains('['));
    }

    #[test]
    fn test_history_line_marks_failures() {
        let failed = HistoryEntry::new(archive_track("a"), PlaybackOutcome::Failed("404".into()));
        let done = HistoryEntry::new(archive_track("b"), PlaybackOutcome::Completed);

        assert!(history_line(&failed).contains("⚠️"));
        assert!(!history_line(&done).contains("⚠️"));
        assert!(history_line(&done).contains(&format!("<t:{}:R>", done.at.timestamp())));
    }

    #[test]
    fn test_channel_summary_caps_names() {
        let channel = |id: &str| Channel {
            id: id.to_string(),
            name: id.to_uppercase(),
            number: None,
            genre: None,
            description: None,
            image_url: None,
        };
        let two = [channel("a"), channel("b")];
        let five: Vec<Channel> = ["a", "b", "c", "d", "e"].into_iter().map(channel).collect();

        assert!(!channel_summary(&two).contains("más"));
        assert!(channel_summary(&five).ends_with("(+2 más)"));
        assert_eq!(channel_summary(&five).matches(", ").count(), 2);
    }

    #[test]
    fn test_now_playing_only_for_active_states() {
        assert!(now_playing_embed(&PlaybackState::Idle).is_none());
        assert!(now_playing_embed(&PlaybackState::Playing {
            track: archive_track("a"),
            started_at: Utc::now(),
        })
        .is_some());
    }
}
