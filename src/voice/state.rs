use parking_lot::RwLock;
use std::sync::atomic::{AtomicUsize, Ordering};
use tokio::time::Instant;

use super::ChannelRef;

/// Estado de la conexión de voz
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    Connecting,
    Connected {
        channel: ChannelRef,
        last_activity: Instant,
    },
    Disconnecting,
}

impl ConnectionState {
    pub fn is_connected(&self) -> bool {
        matches!(self, Self::Connected { .. })
    }

    pub fn channel(&self) -> Option<ChannelRef> {
        match self {
            Self::Connected { channel, .. } => Some(*channel),
            _ => None,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Disconnected => "desconectado",
            Self::Connecting => "conectando",
            Self::Connected { .. } => "conectado",
            Self::Disconnecting => "desconectando",
        }
    }
}

/// Estado de conexión compartido entre el supervisor y el motor.
///
/// Only the supervisor moves the state machine; the engine and the gateway
/// handlers only report activity and listener counts.
#[derive(Debug)]
pub struct ConnectionTracker {
    state: RwLock<ConnectionState>,
    listeners: AtomicUsize,
}

impl Default for ConnectionTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectionTracker {
    pub fn new() -> Self {
        Self {
            state: RwLock::new(ConnectionState::Disconnected),
            listeners: AtomicUsize::new(0),
        }
    }

    pub fn state(&self) -> ConnectionState {
        *self.state.read()
    }

    pub fn is_connected(&self) -> bool {
        self.state.read().is_connected()
    }

    pub fn channel(&self) -> Option<ChannelRef> {
        self.state.read().channel()
    }

    pub(crate) fn set_state(&self, state: ConnectionState) {
        *self.state.write() = state;
    }

    /// Cambia el estado solo si el actual cumple `pred`. Returns whether it changed.
    pub(crate) fn transition(
        &self,
        pred: impl FnOnce(&ConnectionState) -> bool,
        next: ConnectionState,
    ) -> bool {
        let mut state = self.state.write();
        if pred(&state) {
            *state = next;
            true
        } else {
            false
        }
    }

    /// Registra actividad de oyentes. Ignored while nobody is listening, so an
    /// empty channel still times out.
    pub fn note_activity(&self) {
        if self.listeners() == 0 {
            return;
        }
        self.touch();
    }

    fn touch(&self) {
        if let ConnectionState::Connected { last_activity, .. } = &mut *self.state.write() {
            *last_activity = Instant::now();
        }
    }

    /// Número de personas (no bots) en nuestro canal. Any arrival or departure
    /// counts as activity, so the absence countdown starts when the last
    /// listener leaves.
    pub fn set_listener_count(&self, count: usize) {
        let previous = self.listeners.swap(count, Ordering::SeqCst);
        if count > 0 || previous > 0 {
            self.touch();
        }
    }

    pub fn listeners(&self) -> usize {
        self.listeners.load(Ordering::SeqCst)
    }

    /// Tiempo desde la última actividad, si estamos conectados
    pub fn idle_for(&self) -> Option<std::time::Duration> {
        match *self.state.read() {
            ConnectionState::Connected { last_activity, .. } => Some(last_activity.elapsed()),
            _ => None,
        }
    }
}
