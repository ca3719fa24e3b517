use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use parking_lot::RwLock;

/// Handle returned by [`Listeners::subscribe`], used to unsubscribe.
#[derive(Debug, Copy, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct SubscriptionId(pub u64);

type Callback<T> = Arc<dyn Fn(&T) + Send + Sync>;

/// Typed, fire-and-forget notification channel for one event kind.
///
/// Listeners are invoked synchronously in subscription order. The listener
/// list is snapshotted before dispatch, so a callback may subscribe or
/// unsubscribe without deadlocking; such changes take effect on the next emit.
pub struct Listeners<T> {
    next_id: AtomicU64,
    callbacks: RwLock<Vec<(SubscriptionId, Callback<T>)>>,
}

impl<T> Default for Listeners<T> {
    fn default() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            callbacks: RwLock::new(Vec::new()),
        }
    }
}

impl<T> std::fmt::Debug for Listeners<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Listeners")
            .field("len", &self.len())
            .finish()
    }
}

impl<T> Listeners<T> {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, callback: impl Fn(&T) + Send + Sync + 'static) -> SubscriptionId {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.callbacks.write().push((id, Arc::new(callback)));
        id
    }

    /// Returns `true` if the subscription existed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        let mut callbacks = self.callbacks.write();
        let before = callbacks.len();
        callbacks.retain(|(sid, _)| *sid != id);
        callbacks.len() != before
    }

    pub fn len(&self) -> usize {
        self.callbacks.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn emit(&self, event: &T) {
        let snapshot: Vec<Callback<T>> = self
            .callbacks
            .read()
            .iter()
            .map(|(_, cb)| Arc::clone(cb))
            .collect();
        for cb in snapshot {
            cb(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::Listeners;

    #[test]
    fn emits_in_subscription_order() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let bus: Listeners<u32> = Listeners::new();

        let a = Arc::clone(&seen);
        bus.subscribe(move |v| a.lock().push(format!("a{v}")));
        let b = Arc::clone(&seen);
        bus.subscribe(move |v| b.lock().push(format!("b{v}")));

        bus.emit(&7);
        assert_eq!(*seen.lock(), vec!["a7".to_string(), "b7".to_string()]);
    }

    #[test]
    fn unsubscribe_stops_delivery() {
        let count = Arc::new(Mutex::new(0));
        let bus: Listeners<()> = Listeners::new();
        let c = Arc::clone(&count);
        let id = bus.subscribe(move |_| *c.lock() += 1);

        bus.emit(&());
        assert!(bus.unsubscribe(id));
        assert!(!bus.unsubscribe(id));
        bus.emit(&());
        assert_eq!(*count.lock(), 1);
        assert!(bus.is_empty());
    }

    #[test]
    fn reentrant_subscribe_does_not_deadlock() {
        let bus: Arc<Listeners<u8>> = Arc::new(Listeners::new());
        let inner = Arc::clone(&bus);
        bus.subscribe(move |_| {
            inner.subscribe(|_| {});
        });
        bus.emit(&1);
        assert_eq!(bus.len(), 2);
    }
}
