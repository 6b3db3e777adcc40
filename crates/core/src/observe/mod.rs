use std::sync::{Arc, Mutex};

use arc_swap::ArcSwap;
use crossbeam_channel::{unbounded, Receiver, Sender};

/// Push-updated value container for state the presentation layer watches.
///
/// The latest value is published through an [`ArcSwap`] so readers take a
/// lock-free snapshot at any time, while subscribers receive every update on
/// a channel. Senders with a hung-up receiver are pruned on the next publish.
pub struct Observable<T> {
    current: ArcSwap<T>,
    subscribers: Mutex<Vec<Sender<Arc<T>>>>,
}

impl<T> Observable<T> {
    pub fn new(initial: T) -> Self {
        Self {
            current: ArcSwap::from_pointee(initial),
            subscribers: Mutex::new(Vec::new()),
        }
    }

    /// Returns a snapshot of the latest published value.
    pub fn get(&self) -> Arc<T> {
        self.current.load_full()
    }

    /// Registers a new subscriber that will receive every future publish.
    pub fn subscribe(&self) -> Receiver<Arc<T>> {
        let (tx, rx) = unbounded();
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.push(tx);
        }
        rx
    }

    /// Stores a new value and pushes it to all live subscribers.
    pub fn publish(&self, value: T) {
        let value = Arc::new(value);
        self.current.store(value.clone());
        if let Ok(mut subs) = self.subscribers.lock() {
            subs.retain(|tx| tx.send(value.clone()).is_ok());
        }
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T: std::fmt::Debug> std::fmt::Debug for Observable<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Observable")
            .field("current", &self.current.load())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn snapshot_reflects_latest_publish() {
        let value = Observable::new(1);
        value.publish(2);
        value.publish(3);
        assert_eq!(*value.get(), 3);
    }

    #[test]
    fn subscribers_receive_every_update() {
        let value = Observable::new(0);
        let rx = value.subscribe();

        value.publish(10);
        value.publish(20);

        assert_eq!(*rx.recv().unwrap(), 10);
        assert_eq!(*rx.recv().unwrap(), 20);
    }

    #[test]
    fn dropped_subscribers_are_pruned() {
        let value = Observable::new(0);
        let rx = value.subscribe();
        drop(rx);

        value.publish(1);
        value.publish(2);
        assert_eq!(*value.get(), 2);
    }
}
