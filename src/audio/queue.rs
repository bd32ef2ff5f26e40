use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use std::{
    collections::VecDeque,
    sync::atomic::{AtomicBool, Ordering},
};
use tokio::sync::Notify;
use tracing::debug;

use crate::{
    audio::resource::ResourceHandle,
    error::{PlayerError, Result},
    sources::Track,
};

/// Capacidad por defecto de la cola de reproducción
pub const DEFAULT_CAPACITY: usize = 100;

/// Elemento pendiente de reproducir
#[derive(Debug)]
pub struct QueuedItem {
    pub track: Track,
    handle: Option<ResourceHandle>,
    pub enqueued_at: DateTime<Utc>,
}

impl QueuedItem {
    pub fn new(track: Track) -> Self {
        Self {
            track,
            handle: None,
            enqueued_at: Utc::now(),
        }
    }

    /// Asocia un recurso ya abierto. Normally the engine binds at play time.
    pub fn bind(mut self, handle: ResourceHandle) -> Self {
        self.handle = Some(handle);
        self
    }

    pub fn take_handle(&mut self) -> Option<ResourceHandle> {
        self.handle.take()
    }
}

/// Cola FIFO de capacidad fija entre quien encola y el bucle de reproducción.
///
/// Admission is synchronous and never blocks: a full queue rejects with
/// `QueueFull`. `dequeue` suspends until an item arrives or the queue is shut
/// down. Rejected or drained items are dropped by value, which releases any
/// bound handle.
#[derive(Debug)]
pub struct BoundedQueue<T> {
    items: Mutex<VecDeque<T>>,
    capacity: usize,
    closed: AtomicBool,
    notify: Notify,
}

impl<T> BoundedQueue<T> {
    pub fn new(capacity: usize) -> Self {
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(1024))),
            capacity,
            closed: AtomicBool::new(false),
            notify: Notify::new(),
        }
    }

    /// Encola al final. Returns the 1-based position of the new item.
    pub fn enqueue(&self, item: T) -> Result<usize> {
        self.enqueue_with(item, |_| ())
    }

    /// Como `enqueue`; `on_push` corre con la cola bloqueada tras admitir el elemento
    pub fn enqueue_with(&self, item: T, on_push: impl FnOnce(&T)) -> Result<usize> {
        if self.is_closed() {
            return Err(PlayerError::Closed);
        }

        let position = {
            let mut items = self.items.lock();
            if items.len() >= self.capacity {
                return Err(PlayerError::QueueFull {
                    capacity: self.capacity,
                });
            }
            on_push(&item);
            items.push_back(item);
            items.len()
        };

        self.notify.notify_one();
        Ok(position)
    }

    /// Espera el siguiente elemento (FIFO)
    pub async fn dequeue(&self) -> Result<T> {
        self.dequeue_with(|_| ()).await.map(|(item, ())| item)
    }

    /// Como `dequeue`, pero `on_pop` corre con la cola bloqueada.
    ///
    /// A concurrent `drain` either sees the item still queued or runs after
    /// `on_pop` has returned, never in between.
    pub async fn dequeue_with<R>(&self, mut on_pop: impl FnMut(&T) -> R) -> Result<(T, R)> {
        loop {
            let notified = self.notify.notified();
            tokio::pin!(notified);
            // Registrarse antes de mirar la cola para no perder un notify
            notified.as_mut().enable();

            if self.is_closed() {
                return Err(PlayerError::Closed);
            }
            {
                let mut items = self.items.lock();
                if let Some(item) = items.pop_front() {
                    let popped = on_pop(&item);
                    return Ok((item, popped));
                }
            }

            notified.await;
        }
    }

    /// Cierra la cola y despierta a todos los que esperan
    pub fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            debug!("🔒 Cola cerrada");
        }
        self.notify.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Quita todos los elementos pendientes
    pub fn drain(&self) -> Vec<T> {
        self.items.lock().drain(..).collect()
    }

    /// Vista de los elementos pendientes, en orden
    pub fn snapshot<R>(&self, f: impl Fn(&T) -> R) -> Vec<R> {
        self.items.lock().iter().map(f).collect()
    }

    pub fn len(&self) -> usize {
        self.items.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.items.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{archive_track, fake_handle, ReleaseCounter};
    use pretty_assertions::assert_eq;
    use std::{sync::Arc, time::Duration};

    #[tokio::test]
    async fn test_admission_scenario() {
        let queue = BoundedQueue::new(2);

        assert_eq!(queue.enqueue("A").unwrap(), 1);
        assert_eq!(queue.enqueue("B").unwrap(), 2);
        assert!(matches!(
            queue.enqueue("C"),
            Err(PlayerError::QueueFull { capacity: 2 })
        ));
        assert_eq!(queue.len(), 2);

        assert_eq!(queue.dequeue().await.unwrap(), "A");
        assert_eq!(queue.enqueue("C").unwrap(), 2);
        assert_eq!(queue.snapshot(|s| *s), vec!["B", "C"]);
    }

    #[tokio::test]
    async fn test_fifo_order() {
        let queue = BoundedQueue::new(DEFAULT_CAPACITY);
        for i in 0..10 {
            queue.enqueue(i).unwrap();
        }

        let mut out = Vec::new();
        while !queue.is_empty() {
            out.push(queue.dequeue().await.unwrap());
        }
        assert_eq!(out, (0..10).collect::<Vec<_>>());
    }

    #[tokio::test]
    async fn test_dequeue_waits_for_enqueue() {
        let queue = Arc::new(BoundedQueue::new(4));
        let consumer = {
            let queue = Arc::clone(&queue);
            tokio::spawn(async move { queue.dequeue().await })
        };

        tokio::time::sleep(Duration::from_millis(10)).await;
        assert!(!consumer.is_finished());

        queue.enqueue(7u32).unwrap();
        assert_eq!(consumer.await.unwrap().unwrap(), 7);
    }

    #[tokio::test]
    async fn test_shutdown_wakes_waiters() {
        let queue = Arc::new(BoundedQueue::<u32>::new(4));
        let waiters: Vec<_> = (0..3)
            .map(|_| {
                let queue = Arc::clone(&queue);
                tokio::spawn(async move { queue.dequeue().await })
            })
            .collect();

        tokio::task::yield_now().await;
        queue.shutdown();

        for waiter in waiters {
            assert!(matches!(waiter.await.unwrap(), Err(PlayerError::Closed)));
        }
        assert!(matches!(queue.enqueue(1), Err(PlayerError::Closed)));
    }

    #[test]
    fn test_rejected_item_releases_handle() {
        let counter = ReleaseCounter::default();
        let queue = BoundedQueue::new(1);
        queue.enqueue(QueuedItem::new(archive_track("a"))).unwrap();

        let bound = QueuedItem::new(archive_track("b")).bind(fake_handle("b", 8, &counter));
        assert!(queue.enqueue(bound).is_err());

        assert_eq!(counter.count(), 1);
        assert_eq!(queue.len(), 1);
    }

    #[test]
    fn test_drain_releases_bound_items() {
        let counter = ReleaseCounter::default();
        let queue = BoundedQueue::new(4);
        for id in ["a", "b"] {
            let item = QueuedItem::new(archive_track(id)).bind(fake_handle(id, 8, &counter));
            queue.enqueue(item).unwrap();
        }

        let drained = queue.drain();
        assert_eq!(drained.len(), 2);
        assert!(queue.is_empty());
        drop(drained);

        assert_eq!(counter.count(), 2);
    }

    #[test]
    fn test_snapshot_lists_pending_tracks_in_order() {
        let queue = BoundedQueue::new(4);
        queue.enqueue(QueuedItem::new(archive_track("x"))).unwrap();
        queue.enqueue(QueuedItem::new(archive_track("y"))).unwrap();

        let ids = queue.snapshot(|item| item.track.id().to_string());
        assert_eq!(ids, vec!["x", "y"]);
    }

    #[tokio::test]
    async fn test_dequeue_with_runs_hook_for_popped_item() {
        let queue = BoundedQueue::new(4);
        queue.enqueue("a").unwrap();
        queue.enqueue("b").unwrap();

        let (item, seen) = queue.dequeue_with(|item| item.to_uppercase()).await.unwrap();
        assert_eq!((item, seen.as_str()), ("a", "A"));
        assert_eq!(queue.drain(), vec!["b"]);
    }
}
