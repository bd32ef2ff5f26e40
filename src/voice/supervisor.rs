use async_trait::async_trait;
use parking_lot::Mutex;
use std::{sync::Arc, time::Duration};
use tokio::{task::JoinHandle, time::timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::{
    state::{ConnectionState, ConnectionTracker},
    ChannelRef, VoiceConnector,
};
use crate::{
    error::{PlayerError, Result},
    events::{EventSender, RadioEvent},
};

const JOIN_TIMEOUT: Duration = Duration::from_secs(30);
const LEAVE_TIMEOUT: Duration = Duration::from_secs(10);

/// Lo que el supervisor necesita del reproductor
#[cfg_attr(test, mockall::automock)]
#[async_trait]
pub trait StopPlayback: Send + Sync {
    async fn stop_playback(&self);
}

/// Ciclo de vida de la conexión de voz y desconexión por inactividad
pub struct VoiceSupervisor {
    tracker: Arc<ConnectionTracker>,
    connector: Arc<dyn VoiceConnector>,
    playback: Arc<dyn StopPlayback>,
    events: EventSender,
    absence_timeout: Duration,
    check_interval: Duration,
    // Serializa connect/disconnect
    op_lock: tokio::sync::Mutex<()>,
    cancel: CancellationToken,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl VoiceSupervisor {
    pub fn new(
        tracker: Arc<ConnectionTracker>,
        connector: Arc<dyn VoiceConnector>,
        playback: Arc<dyn StopPlayback>,
        events: EventSender,
        absence_timeout: Duration,
        check_interval: Duration,
    ) -> Arc<Self> {
        Arc::new(Self {
            tracker,
            connector,
            playback,
            events,
            absence_timeout,
            check_interval,
            op_lock: tokio::sync::Mutex::new(()),
            cancel: CancellationToken::new(),
            task: Mutex::new(None),
        })
    }

    pub fn tracker(&self) -> &Arc<ConnectionTracker> {
        &self.tracker
    }

    pub fn state(&self) -> ConnectionState {
        self.tracker.state()
    }

    /// Se une a `channel` (o se mueve a él)
    pub async fn connect(&self, channel: ChannelRef) -> Result<()> {
        let _op = self.op_lock.lock().await;

        if self.tracker.channel() == Some(channel) {
            debug!("🔊 Ya conectado a {}", channel);
            return Ok(());
        }

        self.tracker.set_state(ConnectionState::Connecting);
        info!("🔊 Conectando al canal de voz {}", channel.channel_id);

        let result = match timeout(JOIN_TIMEOUT, self.connector.join(channel)).await {
            Ok(Ok(())) => Ok(()),
            Ok(Err(e)) => Err(PlayerError::ConnectFailed(e.to_string())),
            Err(_) => Err(PlayerError::ConnectFailed(format!(
                "timeout tras {:?}",
                JOIN_TIMEOUT
            ))),
        };

        match result {
            Ok(()) => {
                self.tracker.set_state(ConnectionState::Connected {
                    channel,
                    last_activity: tokio::time::Instant::now(),
                });
                info!("✅ Conectado a {}", channel.channel_id);
                Ok(())
            }
            Err(e) => {
                warn!("❌ No se pudo conectar a {}: {}", channel.channel_id, e);
                self.tracker.set_state(ConnectionState::Disconnected);
                Err(e)
            }
        }
    }

    /// Sale del canal de voz. Returns `false` if there was nothing to leave.
    pub async fn disconnect(&self) -> bool {
        let _op = self.op_lock.lock().await;

        let leaving = self.tracker.transition(
            |s| !matches!(s, ConnectionState::Disconnected),
            ConnectionState::Disconnecting,
        );
        if !leaving {
            return false;
        }

        match timeout(LEAVE_TIMEOUT, self.connector.leave()).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => warn!("⚠️ Error al salir del canal de voz: {}", e),
            Err(_) => warn!("⚠️ Timeout al salir del canal de voz"),
        }

        self.tracker.set_state(ConnectionState::Disconnected);
        self.tracker.set_listener_count(0);
        info!("👋 Desconectado del canal de voz");
        true
    }

    /// Desconecta y detiene la reproducción si el canal lleva demasiado tiempo sin oyentes
    pub async fn check_liveness(&self) -> bool {
        if self.tracker.listeners() > 0 {
            return false;
        }
        let Some(idle) = self.tracker.idle_for() else {
            return false;
        };
        if idle <= self.absence_timeout {
            return false;
        }

        let channel = self.tracker.channel();
        info!("💤 Sin oyentes durante {:?}, saliendo del canal", idle);

        if !self.disconnect().await {
            return false;
        }
        self.playback.stop_playback().await;

        if let Some(channel) = channel {
            let _ = self.events.send(RadioEvent::VoiceTimeout(channel));
        }
        true
    }

    /// Arranca la comprobación periódica
    pub fn start(self: &Arc<Self>) {
        let mut task = self.task.lock();
        if task.as_ref().is_some_and(|t| !t.is_finished()) {
            return;
        }

        let supervisor = Arc::clone(self);
        let cancel = self.cancel.clone();
        *task = Some(tokio::spawn(async move {
            let mut interval = tokio::time::interval(supervisor.check_interval);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            interval.tick().await;

            loop {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = interval.tick() => {
                        supervisor.check_liveness().await;
                    }
                }
            }
        }));
        info!(
            "⏱️ Supervisión de voz cada {:?} (timeout {:?})",
            self.check_interval, self.absence_timeout
        );
    }

    pub async fn stop(&self) {
        self.cancel.cancel();
        let task = self.task.lock().take();
        if let Some(task) = task {
            let _ = task.await;
        }
    }
}
