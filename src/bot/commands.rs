use anyhow::Result;
use serenity::{
    builder::{CreateCommand, CreateCommandOption},
    model::{application::CommandOptionType, id::GuildId},
    prelude::Context,
};

/// Todos los comandos slash del bot
pub fn all_commands() -> Vec<CreateCommand> {
    vec![
        channels_command(),
        channel_command(),
        search_command(),
        play_command(),
        playlist_command(),
        playing_command(),
        recent_command(),
        upcoming_command(),
        skip_command(),
        stop_command(),
        pause_command(),
        resume_command(),
        repeat_command(),
        summon_command(),
        reset_command(),
        status_command(),
    ]
}

/// Registra comandos globales
pub async fn register_global_commands(ctx: &Context) -> Result<()> {
    for command in all_commands() {
        ctx.http.create_global_command(&command).await?;
    }
    Ok(())
}

/// Registra comandos para una guild específica (desarrollo)
pub async fn register_guild_commands(ctx: &Context, guild_id: GuildId) -> Result<()> {
    guild_id.set_commands(&ctx.http, all_commands()).await?;
    Ok(())
}

// Catálogo

fn channels_command() -> CreateCommand {
    CreateCommand::new("channels").description("Explora los canales de radio disponibles")
}

fn channel_command() -> CreateCommand {
    CreateCommand::new("channel")
        .description("Sintoniza un canal en vivo")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "name",
                "Id, número o nombre del canal (varios separados por comas)",
            )
            .required(true),
        )
}

fn search_command() -> CreateCommand {
    CreateCommand::new("search")
        .description("Busca canciones en el archivo")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Id, título o artista",
            )
            .required(true),
        )
}

fn play_command() -> CreateCommand {
    CreateCommand::new("play")
        .description("Reproduce una canción del archivo")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "query",
                "Id, título o artista",
            )
            .required(true),
        )
}

fn playlist_command() -> CreateCommand {
    CreateCommand::new("playlist")
        .description("Lista aleatoria con las canciones archivadas de uno o más canales")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::String,
                "channels",
                "Canales separados por comas (id, número o nombre)",
            )
            .required(true),
        )
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "threshold",
                "Canciones distintas necesarias (40 por defecto)",
            )
            .min_int_value(1),
        )
}

// Información

fn playing_command() -> CreateCommand {
    CreateCommand::new("playing").description("Muestra lo que suena ahora")
}

fn recent_command() -> CreateCommand {
    CreateCommand::new("recent")
        .description("Muestra lo último que sonó")
        .add_option(
            CreateCommandOption::new(
                CommandOptionType::Integer,
                "count",
                "Cuántas entradas mostrar",
            )
            .min_int_value(1)
            .max_int_value(20),
        )
}

fn upcoming_command() -> CreateCommand {
    CreateCommand::new("upcoming").description("Muestra la cola pendiente")
}

fn status_command() -> CreateCommand {
    CreateCommand::new("status").description("Estado del reproductor y la conexión de voz")
}

// Control

fn skip_command() -> CreateCommand {
    CreateCommand::new("skip").description("Salta a la siguiente canción")
}

fn stop_command() -> CreateCommand {
    CreateCommand::new("stop").description("Detiene la reproducción, vacía la cola y sale del canal")
}

fn pause_command() -> CreateCommand {
    CreateCommand::new("pause").description("Pausa la reproducción actual")
}

fn resume_command() -> CreateCommand {
    CreateCommand::new("resume").description("Reanuda la reproducción pausada")
}

fn repeat_command() -> CreateCommand {
    CreateCommand::new("repeat")
        .description("Repite las canciones del archivo al terminar")
        .add_option(CreateCommandOption::new(
            CommandOptionType::Boolean,
            "enabled",
            "Activar o desactivar (si se omite, alterna)",
        ))
}

fn summon_command() -> CreateCommand {
    CreateCommand::new("summon").description("Une el bot a tu canal de voz")
}

fn reset_command() -> CreateCommand {
    CreateCommand::new("reset").description("Reinicia el reproductor por completo")
}
