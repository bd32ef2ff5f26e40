use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::Serialize;
use std::collections::VecDeque;

use crate::sources::Track;

pub const DEFAULT_RECENT: usize = 10;
pub const DEFAULT_UPCOMING: usize = 50;

/// Cómo terminó (o en qué estado está) un track del historial
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub enum PlaybackOutcome {
    /// Admitido en la cola
    Queued,
    Completed,
    /// Cortado por skip/stop/shutdown
    Interrupted,
    Failed(String),
}

/// Entrada del historial (solo metadatos)
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct HistoryEntry {
    pub track: Track,
    pub at: DateTime<Utc>,
    pub outcome: PlaybackOutcome,
}

impl HistoryEntry {
    pub fn new(track: Track, outcome: PlaybackOutcome) -> Self {
        Self {
            track,
            at: Utc::now(),
            outcome,
        }
    }

    pub fn is_error(&self) -> bool {
        matches!(self.outcome, PlaybackOutcome::Failed(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HistoryKind {
    Recent,
    Upcoming,
}

/// Dos anillos de capacidad fija: lo que sonó y lo que se admitió
#[derive(Debug)]
pub struct HistoryRing {
    recent: RwLock<VecDeque<HistoryEntry>>,
    upcoming: RwLock<VecDeque<HistoryEntry>>,
    recent_capacity: usize,
    upcoming_capacity: usize,
}

impl Default for HistoryRing {
    fn default() -> Self {
        Self::new(DEFAULT_RECENT, DEFAULT_UPCOMING)
    }
}

impl HistoryRing {
    pub fn new(recent_capacity: usize, upcoming_capacity: usize) -> Self {
        Self {
            recent: RwLock::new(VecDeque::with_capacity(recent_capacity)),
            upcoming: RwLock::new(VecDeque::with_capacity(upcoming_capacity)),
            recent_capacity,
            upcoming_capacity,
        }
    }

    pub fn push_recent(&self, entry: HistoryEntry) {
        Self::push(&self.recent, self.recent_capacity, entry);
    }

    pub fn push_upcoming(&self, entry: HistoryEntry) {
        Self::push(&self.upcoming, self.upcoming_capacity, entry);
    }

    /// Quita la entrada más antigua de "upcoming" si es `track_id`.
    ///
    /// Upcoming mirrors the queue's FIFO order, so the track that starts
    /// playing is always the oldest entry unless it was already evicted.
    pub fn consume_upcoming(&self, track_id: &str) -> bool {
        let mut ring = self.upcoming.write();
        if ring.back().is_some_and(|e| e.track.id() == track_id) {
            ring.pop_back();
            true
        } else {
            false
        }
    }

    fn push(ring: &RwLock<VecDeque<HistoryEntry>>, capacity: usize, entry: HistoryEntry) {
        if capacity == 0 {
            return;
        }
        let mut ring = ring.write();
        if ring.len() == capacity {
            ring.pop_back();
        }
        ring.push_front(entry);
    }

    /// Hasta `n` entradas, la más nueva primero
    pub fn snapshot(&self, kind: HistoryKind, n: usize) -> Vec<HistoryEntry> {
        let ring = match kind {
            HistoryKind::Recent => self.recent.read(),
            HistoryKind::Upcoming => self.upcoming.read(),
        };
        ring.iter().take(n).cloned().collect()
    }

    pub fn snapshot_recent(&self, n: usize) -> Vec<HistoryEntry> {
        self.snapshot(HistoryKind::Recent, n)
    }

    pub fn snapshot_upcoming(&self, n: usize) -> Vec<HistoryEntry> {
        self.snapshot(HistoryKind::Upcoming, n)
    }

    pub fn len(&self, kind: HistoryKind) -> usize {
        match kind {
            HistoryKind::Recent => self.recent.read().len(),
            HistoryKind::Upcoming => self.upcoming.read().len(),
        }
    }

    pub fn capacity(&self, kind: HistoryKind) -> usize {
        match kind {
            HistoryKind::Recent => self.recent_capacity,
            HistoryKind::Upcoming => self.upcoming_capacity,
        }
    }

    /// Vacía ambos anillos (solo para reset completo)
    pub fn clear(&self) {
        self.recent.write().clear();
        self.upcoming.write().clear();
    }
}
