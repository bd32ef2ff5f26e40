use anyhow::Result;
use serenity::{
    builder::{
        CreateEmbed, CreateInteractionResponse, CreateInteractionResponseFollowup,
        CreateInteractionResponseMessage, EditInteractionResponse,
    },
    model::{
        application::{CommandInteraction, ComponentInteraction},
        id::{GuildId, UserId},
    },
    prelude::Context,
};
use tracing::{debug, info, warn};

use crate::{
    bot::RadioBot,
    carousel::{Direction, SessionId},
    error::PlayerError,
    session::DEFAULT_PLAYLIST_THRESHOLD,
    sources::{find_channels, Channel, Track},
    ui::{
        buttons::{carousel_buttons, CarouselAction},
        embeds, BrowseEntry,
    },
    voice::ChannelRef,
};

/// Entradas máximas de `/recent`
const MAX_RECENT: i64 = 20;
const DEFAULT_RECENT: i64 = 10;

/// Error con un mensaje ya pensado para el usuario
#[derive(Debug, thiserror::Error)]
#[error("{0}")]
struct UserError(String);

/// Texto a mostrar para un error de un comando o botón
fn describe(error: &anyhow::Error) -> String {
    if let Some(e) = error.downcast_ref::<PlayerError>() {
        e.user_message()
    } else if let Some(e) = error.downcast_ref::<UserError>() {
        e.0.clone()
    } else {
        "❌ Algo salió mal, inténtalo de nuevo".to_string()
    }
}

/// Maneja comandos slash
pub async fn handle_command(ctx: &Context, command: CommandInteraction, bot: &RadioBot) -> Result<()> {
    info!(
        "📝 Comando /{} usado por {} en guild {:?}",
        command.data.name, command.user.name, command.guild_id
    );

    // Todo puede tardar más de 3 s (red, voz, periodo de gracia)
    command
        .create_response(
            &ctx.http,
            CreateInteractionResponse::Defer(CreateInteractionResponseMessage::new()),
        )
        .await?;

    if let Err(e) = dispatch_command(ctx, &command, bot).await {
        warn!("⚠️ /{} falló: {:#}", command.data.name, e);
        reply_command_error(ctx, &command, &describe(&e)).await?;
    }
    Ok(())
}

async fn dispatch_command(ctx: &Context, command: &CommandInteraction, bot: &RadioBot) -> Result<()> {
    let guild_id = command
        .guild_id
        .ok_or_else(|| UserError("❌ Este comando solo funciona en un servidor".to_string()))?;
    let user_id = command.user.id;
    let session = &bot.session;

    match command.data.name.as_str() {
        "channels" => {
            let entries = session
                .channels()
                .await?
                .into_iter()
                .map(BrowseEntry::Channel)
                .collect();
            open_carousel(ctx, command, bot, entries).await
        }
        "channel" => {
            let name = required_string(command, "name")?;
            let channels = session.channels().await?;
            let matches: Vec<Channel> = find_channels(&channels, name).into_iter().cloned().collect();

            match matches.len() {
                0 => Err(PlayerError::NoResults(name.to_string()).into()),
                1 => {
                    let embed = play_channel(ctx, bot, guild_id, user_id, &matches[0]).await?;
                    respond_embed(ctx, command, embed).await
                }
                _ => {
                    let entries = matches.into_iter().map(BrowseEntry::Channel).collect();
                    open_carousel(ctx, command, bot, entries).await
                }
            }
        }
        "search" => {
            let query = required_string(command, "query")?;
            let results = session.search(query).await?;
            if results.is_empty() {
                return Err(PlayerError::NoResults(query.to_string()).into());
            }
            let entries = results.into_iter().map(BrowseEntry::Track).collect();
            open_carousel(ctx, command, bot, entries).await
        }
        "play" => {
            let query = required_string(command, "query")?;
            let voice = user_voice_channel(ctx, guild_id, user_id);
            let (track, position) = session.play_query(query, voice).await?;
            bot.refresh_listeners(ctx);
            respond_embed(
                ctx,
                command,
                embeds::track_added_embed(&track, position, user_id.get()),
            )
            .await
        }
        "playlist" => {
            let input = required_string(command, "channels")?;
            let catalog = session.channels().await?;
            let channels: Vec<Channel> = find_channels(&catalog, input).into_iter().cloned().collect();
            if channels.is_empty() {
                return Err(UserError(format!("❌ No encontré canales en `{}`", input)).into());
            }
            let threshold = int_option(command, "threshold")
                .unwrap_or(DEFAULT_PLAYLIST_THRESHOLD as i64)
                .max(1) as usize;

            let voice = user_voice_channel(ctx, guild_id, user_id);
            let songs = session.play_playlist(&channels, threshold, voice).await?;
            bot.refresh_listeners(ctx);
            respond_embed(ctx, command, embeds::playlist_embed(&channels, songs)).await
        }
        "playing" => {
            let embed = embeds::now_playing_embed(&session.engine().state())
                .ok_or(PlayerError::NothingPlaying)?;
            respond_embed(ctx, command, embed).await
        }
        "recent" => {
            let count = int_option(command, "count")
                .unwrap_or(DEFAULT_RECENT)
                .clamp(1, MAX_RECENT) as usize;
            respond_embed(ctx, command, embeds::recent_embed(&session.recent(count))).await
        }
        "upcoming" => {
            let capacity = session.status().engine.capacity;
            respond_embed(
                ctx,
                command,
                embeds::upcoming_embed(&session.upcoming(), capacity),
            )
            .await
        }
        "skip" => {
            session.skip().await?;
            respond_text(ctx, command, "⏭️ Canción saltada").await
        }
        "stop" => {
            session.stop().await?;
            respond_text(ctx, command, "⏹️ Reproducción detenida").await
        }
        "pause" => {
            session.pause().await?;
            respond_text(ctx, command, "⏸️ Reproducción pausada").await
        }
        "resume" => {
            session.resume().await?;
            respond_text(ctx, command, "▶️ Reproducción reanudada").await
        }
        "repeat" => {
            let enabled = bool_option(command, "enabled").unwrap_or(!session.engine().repeat());
            session.set_repeat(enabled)?;
            let text = if enabled {
                "🔁 Repetición activada"
            } else {
                "➡️ Repetición desactivada"
            };
            respond_text(ctx, command, text).await
        }
        "summon" => {
            let voice = user_voice_channel(ctx, guild_id, user_id)
                .ok_or_else(|| UserError("❌ Debes estar en un canal de voz".to_string()))?;
            session.summon(voice).await?;
            bot.refresh_listeners(ctx);
            respond_text(ctx, command, &format!("🔊 Conectado a {}", voice)).await
        }
        "reset" => {
            session.reset().await;
            respond_text(ctx, command, "♻️ Reproductor reiniciado").await
        }
        "status" => respond_embed(ctx, command, embeds::status_embed(&session.status())).await,
        other => Err(UserError(format!("❌ Comando no reconocido: {}", other)).into()),
    }
}

/// Maneja los botones de los carruseles
pub async fn handle_component(
    ctx: &Context,
    component: ComponentInteraction,
    bot: &RadioBot,
) -> Result<()> {
    info!(
        "🔘 Botón {} presionado por {} en guild {:?}",
        component.data.custom_id, component.user.name, component.guild_id
    );

    let Some(action) = CarouselAction::parse(&component.data.custom_id) else {
        debug!("Componente desconocido: {}", component.data.custom_id);
        return reply_component_error(ctx, &component, "❌ Acción no reconocida").await;
    };

    if let Err(e) = dispatch_component(ctx, &component, bot, action).await {
        warn!("⚠️ Botón {} falló: {:#}", component.data.custom_id, e);
        reply_component_error(ctx, &component, &describe(&e)).await?;
    }
    Ok(())
}

async fn dispatch_component(
    ctx: &Context,
    component: &ComponentInteraction,
    bot: &RadioBot,
    action: CarouselAction,
) -> Result<()> {
    let session_id = SessionId(component.message.id.get());

    match action {
        CarouselAction::Previous | CarouselAction::Next => {
            let direction = if action == CarouselAction::Previous {
                Direction::Previous
            } else {
                Direction::Next
            };
            let page = bot.carousels.navigate(session_id, direction)?;

            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new()
                            .embed(embeds::carousel_embed(&page.entry, page.index, page.total))
                            .components(carousel_buttons(page.index, page.total)),
                    ),
                )
                .await?;
        }
        CarouselAction::Select(index) => {
            let entry = bot.carousels.select(session_id, index)?;
            let guild_id = component
                .guild_id
                .ok_or_else(|| UserError("❌ Solo funciona en un servidor".to_string()))?;

            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::Defer(
                        CreateInteractionResponseMessage::new().ephemeral(true),
                    ),
                )
                .await?;

            let result = match &entry {
                BrowseEntry::Channel(channel) => {
                    play_channel(ctx, bot, guild_id, component.user.id, channel).await
                }
                BrowseEntry::Track(track) => {
                    play_track(ctx, bot, guild_id, component.user.id, track).await
                }
            };

            let response = match result {
                Ok(embed) => EditInteractionResponse::new().embed(embed),
                Err(e) => {
                    warn!("⚠️ No se pudo reproducir {}: {:#}", entry.label(), e);
                    EditInteractionResponse::new().content(describe(&e))
                }
            };
            component.edit_response(&ctx.http, response).await?;
        }
        CarouselAction::Close => {
            bot.carousels.destroy(session_id);
            component
                .create_response(
                    &ctx.http,
                    CreateInteractionResponse::UpdateMessage(
                        CreateInteractionResponseMessage::new().components(vec![]),
                    ),
                )
                .await?;
        }
    }

    Ok(())
}

// Reproducción

async fn play_channel(
    ctx: &Context,
    bot: &RadioBot,
    guild_id: GuildId,
    user_id: UserId,
    channel: &Channel,
) -> Result<CreateEmbed> {
    let voice = user_voice_channel(ctx, guild_id, user_id);
    bot.session.play_live(channel, voice).await?;
    bot.refresh_listeners(ctx);
    Ok(embeds::live_embed(channel))
}

async fn play_track(
    ctx: &Context,
    bot: &RadioBot,
    guild_id: GuildId,
    user_id: UserId,
    track: &Track,
) -> Result<CreateEmbed> {
    let voice = user_voice_channel(ctx, guild_id, user_id);
    let position = bot
        .session
        .play_archive(track.clone(), voice)
        .await?;
    bot.refresh_listeners(ctx);
    Ok(embeds::track_added_embed(track, position, user_id.get()))
}

/// Muestra la primera página y abre una sesión de carrusel sobre el mensaje
async fn open_carousel(
    ctx: &Context,
    command: &CommandInteraction,
    bot: &RadioBot,
    entries: Vec<BrowseEntry>,
) -> Result<()> {
    bot.carousels
        .open(
            entries,
            |first, total| async move {
                let message = command
                    .edit_response(
                        &ctx.http,
                        EditInteractionResponse::new().embed(embeds::carousel_embed(&first, 0, total)),
                    )
                    .await?;
                Ok::<_, anyhow::Error>(message.id.get())
            },
            |page| async move {
                command
                    .edit_response(
                        &ctx.http,
                        EditInteractionResponse::new()
                            .embed(embeds::carousel_embed(&page.entry, page.index, page.total))
                            .components(carousel_buttons(page.index, page.total)),
                    )
                    .await?;
                Ok(())
            },
        )
        .await?;
    Ok(())
}

// Respuestas

async fn respond_embed(ctx: &Context, command: &CommandInteraction, embed: CreateEmbed) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().embed(embed))
        .await?;
    Ok(())
}

async fn respond_text(ctx: &Context, command: &CommandInteraction, text: &str) -> Result<()> {
    command
        .edit_response(&ctx.http, EditInteractionResponse::new().content(text))
        .await?;
    Ok(())
}

/// Reemplaza la respuesta diferida por un mensaje efímero
async fn reply_command_error(ctx: &Context, command: &CommandInteraction, message: &str) -> Result<()> {
    if let Err(e) = command.delete_response(&ctx.http).await {
        debug!("No se pudo borrar la respuesta diferida: {}", e);
    }
    command
        .create_followup(
            &ctx.http,
            CreateInteractionResponseFollowup::new()
                .content(message)
                .ephemeral(true),
        )
        .await?;
    Ok(())
}

async fn reply_component_error(
    ctx: &Context,
    component: &ComponentInteraction,
    message: &str,
) -> Result<()> {
    let response = CreateInteractionResponse::Message(
        CreateInteractionResponseMessage::new()
            .content(message)
            .ephemeral(true),
    );
    // Si ya se respondió, va como followup
    if component.create_response(&ctx.http, response).await.is_err() {
        component
            .create_followup(
                &ctx.http,
                CreateInteractionResponseFollowup::new()
                    .content(message)
                    .ephemeral(true),
            )
            .await?;
    }
    Ok(())
}

// Funciones auxiliares

fn required_string<'a>(command: &'a CommandInteraction, name: &str) -> Result<&'a str> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_str())
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .ok_or_else(|| UserError(format!("❌ Falta `{}`", name)).into())
}

fn int_option(command: &CommandInteraction, name: &str) -> Option<i64> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_i64())
}

fn bool_option(command: &CommandInteraction, name: &str) -> Option<bool> {
    command
        .data
        .options
        .iter()
        .find(|opt| opt.name == name)
        .and_then(|opt| opt.value.as_bool())
}

/// Canal de voz del usuario según la caché
fn user_voice_channel(ctx: &Context, guild_id: GuildId, user_id: UserId) -> Option<ChannelRef> {
    let guild = guild_id.to_guild_cached(&ctx.cache)?;
    let channel_id = guild.voice_states.get(&user_id)?.channel_id?;
    Some(ChannelRef::new(guild_id.get(), channel_id.get()))
}
