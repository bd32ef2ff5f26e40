use anyhow::Result;
use serenity::{model::gateway::GatewayIntents, Client};
use songbird::{SerenityInit, Songbird};
use std::sync::Arc;
use tracing::{error, info};

use open_radio::{
    bot::RadioBot,
    config::Config,
    events,
    session::RadioSession,
    sources::HttpContentSource,
    voice::songbird::SongbirdVoice,
};

#[tokio::main]
async fn main() -> Result<()> {
    // Inicializar logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("open_radio=debug".parse()?)
                .add_directive("serenity=info".parse()?)
                .add_directive("songbird=info".parse()?),
        )
        .init();

    // El health check no necesita credenciales
    if std::env::args().any(|arg| arg == "--health-check") {
        return health_check().await;
    }

    info!("📻 Iniciando Open Radio v{}", env!("CARGO_PKG_VERSION"));

    let config = Arc::new(Config::load()?);
    info!("{}", config.summary());

    // Voz: un único manager de songbird compartido con serenity
    let songbird = Songbird::serenity();
    let voice = Arc::new(SongbirdVoice::new(Arc::clone(&songbird)));

    let source = Arc::new(HttpContentSource::new(
        &config.upstream_url,
        config.archive_dir.clone(),
        config.ffmpeg_path.clone(),
    )?);

    let session = Arc::new(RadioSession::new(
        config.engine(),
        source,
        voice.clone(),
        voice,
        events::channel(),
        config.voice_timeout(),
        config.voice_check_interval(),
    ));
    session.start();

    let bot = Arc::new(RadioBot::new(Arc::clone(&config), session));

    // Solo hace falta saber quién está en cada canal de voz
    let intents = GatewayIntents::GUILDS | GatewayIntents::GUILD_VOICE_STATES;

    let mut client = Client::builder(&config.discord_token, intents)
        .event_handler_arc(Arc::clone(&bot))
        .register_songbird_with(songbird)
        .await?;

    // Manejar shutdown graceful
    let shard_manager = Arc::clone(&client.shard_manager);
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("❌ Error al registrar Ctrl+C: {:?}", e);
            return;
        }
        info!("⚠️ Señal de shutdown recibida, cerrando...");
        bot.shutdown().await;
        shard_manager.shutdown_all().await;
    });

    info!("🚀 Bot iniciado exitosamente");
    if let Err(why) = client.start().await {
        error!("Error al ejecutar cliente: {:?}", why);
    }

    Ok(())
}

async fn health_check() -> Result<()> {
    let ffmpeg_path = std::env::var("FFMPEG_PATH").unwrap_or_else(|_| "ffmpeg".to_string());

    let ffmpeg = async_process::Command::new(&ffmpeg_path)
        .arg("-version")
        .output()
        .await?;

    if ffmpeg.status.success() {
        println!("OK");
        Ok(())
    } else {
        anyhow::bail!("ffmpeg no disponible en {}", ffmpeg_path);
    }
}
