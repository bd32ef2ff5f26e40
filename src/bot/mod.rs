//! # Bot Module
//!
//! Discord glue for Open Radio.
//!
//! [`RadioBot`] implements Serenity's [`EventHandler`] and owns:
//!
//! - the [`RadioSession`] (playback engine + voice supervision)
//! - the carousel sessions behind `/channels`, `/channel` and `/search`
//!
//! Player events are forwarded to Discord by a background task started on
//! `ready`: presence updates and, when `OUTPUT_CHANNEL_ID` is set, a message
//! per track and per inactivity disconnect.

use anyhow::Result;
use chrono::Utc;
use serenity::{
    all::{
        ActivityData, ChannelId, Context, CreateMessage, EventHandler, GuildId, Interaction, Ready,
        UserId, VoiceState,
    },
    async_trait,
    builder::CreateEmbed,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc,
};
use tokio::sync::broadcast::{self, error::RecvError};
use tracing::{debug, error, info, warn};

pub mod commands;
pub mod handlers;

use crate::{
    audio::PlaybackState,
    carousel::CarouselManager,
    config::Config,
    events::RadioEvent,
    session::RadioSession,
    ui::{embeds, BrowseEntry},
    voice::ChannelRef,
};

/// Handler principal del bot de radio
pub struct RadioBot {
    config: Arc<Config>,
    pub session: Arc<RadioSession>,
    pub carousels: Arc<CarouselManager<BrowseEntry>>,
    started: AtomicBool,
}

impl RadioBot {
    pub fn new(config: Arc<Config>, session: Arc<RadioSession>) -> Self {
        let carousels =
            CarouselManager::new(config.carousel_timeout(), config.carousel_sweep_interval());

        Self {
            config,
            session,
            carousels,
            started: AtomicBool::new(false),
        }
    }

    /// Registers slash commands, per guild when `GUILD_ID` is set (instant
    /// propagation) or globally otherwise.
    async fn register_commands(&self, ctx: &Context) -> Result<()> {
        info!("📝 Registrando comandos slash...");
        info!("🔧 Application ID: {}", self.config.application_id);

        match self.config.guild_id {
            Some(guild_id) => {
                let guild_id = GuildId::new(guild_id);

                if !ctx.cache.guilds().contains(&guild_id) {
                    warn!("⚠️ El bot no está en la guild especificada: {}", guild_id);
                    return Ok(());
                }

                commands::register_guild_commands(ctx, guild_id).await?;
                info!("✅ Comandos de guild registrados para: {}", guild_id);
            }
            None => {
                commands::register_global_commands(ctx).await?;
                info!("✅ Comandos globales registrados");
            }
        }

        Ok(())
    }

    /// Recalcula los oyentes de nuestro canal de voz a partir de la caché
    pub fn refresh_listeners(&self, ctx: &Context) {
        let Some(channel) = self.session.voice_channel() else {
            return;
        };
        let me = ctx.cache.current_user().id;
        let count = count_listeners(ctx, channel, me);
        debug!("👥 {} oyentes en {}", count, channel);
        self.session.set_listener_count(count);
    }

    /// Detiene tareas de fondo y cierra la sesión de radio
    pub async fn shutdown(&self) {
        self.carousels.stop().await;
        self.session.shutdown().await;
    }
}

/// Personas (no bots) en un canal de voz
fn count_listeners(ctx: &Context, channel: ChannelRef, me: UserId) -> usize {
    let Some(guild) = ctx.cache.guild(GuildId::new(channel.guild_id)) else {
        return 0;
    };
    let target = ChannelId::new(channel.channel_id);

    guild
        .voice_states
        .values()
        .filter(|vs| vs.channel_id == Some(target) && vs.user_id != me)
        .filter(|vs| !vs.member.as_ref().is_some_and(|m| m.user.bot))
        .count()
}

#[async_trait]
impl EventHandler for RadioBot {
    async fn ready(&self, ctx: Context, ready: Ready) {
        info!("🤖 {} está en línea!", ready.user.name);
        info!("📊 Conectado a {} servidores", ready.guilds.len());

        if let Err(e) = self.register_commands(&ctx).await {
            error!("❌ Error al registrar comandos: {:?}", e);
        }

        // `ready` se repite tras cada reconexión del gateway
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        self.carousels.start();
        let output = self.config.output_channel_id.map(ChannelId::new);
        tokio::spawn(forward_events(ctx, self.session.subscribe(), output));
    }

    async fn interaction_create(&self, ctx: Context, interaction: Interaction) {
        match interaction {
            Interaction::Command(command) => {
                if let Err(e) = handlers::handle_command(&ctx, command, self).await {
                    error!("Error manejando comando: {:?}", e);
                }
            }
            Interaction::Component(component) => {
                if let Err(e) = handlers::handle_component(&ctx, component, self).await {
                    error!("Error manejando componente: {:?}", e);
                }
            }
            _ => {}
        }
    }

    async fn voice_state_update(&self, ctx: Context, old: Option<VoiceState>, new: VoiceState) {
        let me = ctx.cache.current_user().id;

        // Nos sacaron del canal desde Discord
        if new.user_id == me
            && new.channel_id.is_none()
            && old.as_ref().is_some_and(|o| o.channel_id.is_some())
        {
            info!("🔌 Bot desconectado del canal de voz");
            if let Err(e) = self.session.stop().await {
                debug!("Nada que detener tras la desconexión: {}", e);
            }
            return;
        }

        self.refresh_listeners(&ctx);
    }
}

/// Reenvía eventos del reproductor a la presencia y al canal de salida
async fn forward_events(
    ctx: Context,
    mut events: broadcast::Receiver<RadioEvent>,
    output: Option<ChannelId>,
) {
    loop {
        let event = match events.recv().await {
            Ok(event) => event,
            Err(RecvError::Lagged(missed)) => {
                warn!("⚠️ Se perdieron {} eventos del reproductor", missed);
                continue;
            }
            Err(RecvError::Closed) => break,
        };

        match event {
            RadioEvent::TrackStarted(track) => {
                ctx.set_activity(Some(ActivityData::listening(track.display_name())));
                let state = PlaybackState::Playing {
                    track,
                    started_at: Utc::now(),
                };
                if let Some(embed) = embeds::now_playing_embed(&state) {
                    post(&ctx, output, embed).await;
                }
            }
            RadioEvent::TrackFinished(entry) if entry.is_error() => {
                post(
                    &ctx,
                    output,
                    embeds::error_embed(&format!(
                        "No se pudo reproducir **{}**",
                        entry.track.display_name()
                    )),
                )
                .await;
            }
            RadioEvent::TrackFinished(_) => {}
            RadioEvent::VoiceTimeout(channel) => {
                ctx.set_activity(None);
                post(
                    &ctx,
                    output,
                    embeds::success_embed(
                        "Desconectado",
                        &format!("Salí de {} porque no había nadie escuchando", channel),
                    ),
                )
                .await;
            }
            RadioEvent::Stopped => ctx.set_activity(None),
        }
    }
    debug!("Reenvío de eventos terminado");
}

async fn post(ctx: &Context, output: Option<ChannelId>, embed: CreateEmbed) {
    let Some(channel) = output else {
        return;
    };
    if let Err(e) = channel
        .send_message(&ctx.http, CreateMessage::new().embed(embed))
        .await
    {
        warn!("⚠️ No se pudo publicar en {}: {}", channel, e);
    }
}
