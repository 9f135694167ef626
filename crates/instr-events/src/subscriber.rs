//! Subscriber notification
//!
//! Subscribers are called in registration order. A subscriber that returns an
//! error or panics is logged and skipped; the rest are still notified.

use crate::delta::ElementDelta;
use instr_core::ElementHandle;
use parking_lot::Mutex;
use std::any::Any;
use std::fmt;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;

/// Receives host element changes
pub trait Subscriber: Send + Sync {
    fn update(&self, added: &[ElementHandle], removed: &[ElementHandle]) -> anyhow::Result<()>;

    /// Label used in logs
    fn name(&self) -> &str {
        "subscriber"
    }
}

/// Adapter turning a closure into a [`Subscriber`]
pub struct FnSubscriber<F> {
    name: String,
    callback: F,
}

impl<F> FnSubscriber<F>
where
    F: Fn(&[ElementHandle], &[ElementHandle]) -> anyhow::Result<()> + Send + Sync,
{
    pub fn new(name: impl Into<String>, callback: F) -> Self {
        Self {
            name: name.into(),
            callback,
        }
    }
}

impl<F> Subscriber for FnSubscriber<F>
where
    F: Fn(&[ElementHandle], &[ElementHandle]) -> anyhow::Result<()> + Send + Sync,
{
    fn update(&self, added: &[ElementHandle], removed: &[ElementHandle]) -> anyhow::Result<()> {
        (self.callback)(added, removed)
    }

    fn name(&self) -> &str {
        &self.name
    }
}

impl<F> fmt::Debug for FnSubscriber<F> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FnSubscriber")
            .field("name", &self.name)
            .finish_non_exhaustive()
    }
}

/// Registration token for [`Publisher::unsubscribe`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriberId(u64);

/// Outcome of one [`Publisher::publish`]
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PublishReport {
    pub delivered: usize,
    /// Names of subscribers that failed or panicked
    pub failed: Vec<String>,
}

#[derive(Default)]
struct Subscribers {
    next_id: u64,
    entries: Vec<(SubscriberId, Arc<dyn Subscriber>)>,
}

/// Ordered subscriber list
#[derive(Default)]
pub struct Publisher {
    inner: Mutex<Subscribers>,
}

impl Publisher {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self, subscriber: Arc<dyn Subscriber>) -> SubscriberId {
        let mut inner = self.inner.lock();
        let id = SubscriberId(inner.next_id);
        inner.next_id += 1;
        inner.entries.push((id, subscriber));
        id
    }

    pub fn subscribe_fn<F>(&self, name: impl Into<String>, callback: F) -> SubscriberId
    where
        F: Fn(&[ElementHandle], &[ElementHandle]) -> anyhow::Result<()> + Send + Sync + 'static,
    {
        self.subscribe(Arc::new(FnSubscriber::new(name, callback)))
    }

    /// Remove a subscriber; `false` if it was not registered
    pub fn unsubscribe(&self, id: SubscriberId) -> bool {
        let mut inner = self.inner.lock();
        let before = inner.entries.len();
        inner.entries.retain(|(entry, _)| *entry != id);
        inner.entries.len() != before
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.inner.lock().entries.is_empty()
    }

    /// Notify every subscriber in registration order.
    ///
    /// The subscriber list is snapshotted first, so callbacks may subscribe or
    /// unsubscribe without deadlocking.
    pub fn publish(&self, delta: &ElementDelta) -> PublishReport {
        let subscribers: Vec<Arc<dyn Subscriber>> = self
            .inner
            .lock()
            .entries
            .iter()
            .map(|(_, s)| s.clone())
            .collect();

        let mut report = PublishReport::default();
        for subscriber in subscribers {
            let outcome = panic::catch_unwind(AssertUnwindSafe(|| {
                subscriber.update(&delta.added, &delta.removed)
            }));
            match outcome {
                Ok(Ok(())) => report.delivered += 1,
                Ok(Err(err)) => {
                    tracing::warn!("Subscriber {} failed: {err:#}", subscriber.name());
                    report.failed.push(subscriber.name().to_string());
                }
                Err(payload) => {
                    tracing::warn!(
                        "Subscriber {} panicked: {}",
                        subscriber.name(),
                        panic_message(payload.as_ref())
                    );
                    report.failed.push(subscriber.name().to_string());
                }
            }
        }
        report
    }
}

impl fmt::Debug for Publisher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = self.inner.lock();
        let names: Vec<&str> = inner.entries.iter().map(|(_, s)| s.name()).collect();
        f.debug_struct("Publisher")
            .field("subscribers", &names)
            .finish()
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(message) = payload.downcast_ref::<&str>() {
        *message
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.as_str()
    } else {
        "non-string panic payload"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn delta() -> ElementDelta {
        ElementDelta {
            added: vec![ElementHandle::new(4)],
            removed: vec![ElementHandle::new(1)],
        }
    }

    #[test]
    fn test_notifies_in_registration_order() {
        let publisher = Publisher::new();
        let seen = Arc::new(Mutex::new(Vec::new()));
        for name in ["first", "second", "third"] {
            let seen = seen.clone();
            publisher.subscribe_fn(name, move |_, _| {
                seen.lock().push(name);
                Ok(())
            });
        }

        let report = publisher.publish(&delta());
        assert_eq!(report.delivered, 3);
        assert_eq!(*seen.lock(), vec!["first", "second", "third"]);
    }

    #[test]
    fn test_failing_subscribers_are_isolated() {
        let publisher = Publisher::new();
        let reached = Arc::new(Mutex::new(false));
        publisher.subscribe_fn("errors", |_, _| anyhow::bail!("disk full"));
        publisher.subscribe_fn("panics", |_, _| panic!("boom"));
        let flag = reached.clone();
        publisher.subscribe_fn("last", move |added, removed| {
            assert_eq!(added, &[ElementHandle::new(4)]);
            assert_eq!(removed, &[ElementHandle::new(1)]);
            *flag.lock() = true;
            Ok(())
        });

        let report = publisher.publish(&delta());
        assert!(*reached.lock());
        assert_eq!(report.delivered, 1);
        assert_eq!(report.failed, vec!["errors".to_string(), "panics".to_string()]);
    }

    #[test]
    fn test_unsubscribe() {
        let publisher = Publisher::new();
        let id = publisher.subscribe_fn("gone", |_, _| Ok(()));
        assert_eq!(publisher.len(), 1);
        assert!(publisher.unsubscribe(id));
        assert!(!publisher.unsubscribe(id));
        assert!(publisher.is_empty());
        assert_eq!(publisher.publish(&delta()).delivered, 0);
    }

    #[test]
    fn test_panic_message_extraction() {
        let owned: Box<dyn Any + Send> = Box::new(String::from("owned"));
        let borrowed: Box<dyn Any + Send> = Box::new("static");
        assert_eq!(panic_message(owned.as_ref()), "owned");
        assert_eq!(panic_message(borrowed.as_ref()), "static");
    }
}
