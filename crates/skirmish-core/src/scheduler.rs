//! Period-based update dispatch with deferred subscription changes.
//!
//! Structural changes never touch the set being dispatched: every
//! subscribe/unsubscribe request lands in a queue that is drained at the
//! start of the next [`UpdateScheduler::tick`]. Callbacks that need to
//! (un)subscribe capture a [`SchedulerHandle`].
//!
//! An unsubscribe is queued like any other change, but the handle stops
//! being live immediately, so a subscription removed mid-pass is not
//! invoked again, not even later in the same pass.

use std::collections::HashSet;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

/// Callback invoked with the seconds elapsed since its previous invocation.
pub type UpdateCallback = Box<dyn FnMut(f64) + Send>;

/// Stable, comparable identity of a subscription.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionHandle(pub u64);

/// Rejected scheduler requests.
#[derive(Debug, Clone, Copy, PartialEq, thiserror::Error)]
pub enum SchedulerError {
    /// The handle is not (or no longer) subscribed.
    #[error("unknown subscription {0:?}")]
    UnknownSubscription(SubscriptionHandle),

    /// The period is not a number.
    #[error("invalid update period {0}")]
    InvalidPeriod(f64),
}

struct Subscription {
    handle: SubscriptionHandle,
    callback: UpdateCallback,
    period: f64,
    last_call: f64,
    next_call: f64,
}

enum PendingOp {
    Subscribe(Subscription),
    Unsubscribe(SubscriptionHandle),
}

#[derive(Default)]
struct Shared {
    pending: Vec<PendingOp>,
    live: HashSet<SubscriptionHandle>,
    next_id: u64,
    now: f64,
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Cloneable front end for queuing subscription changes, usable from inside
/// dispatched callbacks.
#[derive(Clone)]
pub struct SchedulerHandle {
    shared: Arc<Mutex<Shared>>,
}

impl SchedulerHandle {
    /// Queues a subscription invoked every `period` seconds (every tick when
    /// `period <= 0`). It is first considered on the next pass.
    pub fn subscribe<F>(&self, period: f64, callback: F) -> Result<SubscriptionHandle, SchedulerError>
    where
        F: FnMut(f64) + Send + 'static,
    {
        if period.is_nan() {
            return Err(SchedulerError::InvalidPeriod(period));
        }
        let mut shared = lock(&self.shared);
        let handle = SubscriptionHandle(shared.next_id);
        shared.next_id += 1;

        let now = shared.now;
        shared.live.insert(handle);
        shared.pending.push(PendingOp::Subscribe(Subscription {
            handle,
            callback: Box::new(callback),
            period,
            last_call: now,
            next_call: now + period.max(0.0),
        }));
        Ok(handle)
    }

    /// Queues removal of `handle`. The subscription is never invoked again
    /// once this returns.
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SchedulerError> {
        let mut shared = lock(&self.shared);
        if !shared.live.remove(&handle) {
            return Err(SchedulerError::UnknownSubscription(handle));
        }
        shared.pending.push(PendingOp::Unsubscribe(handle));
        Ok(())
    }

    /// Returns `true` if `handle` is subscribed (or queued to be).
    pub fn is_subscribed(&self, handle: SubscriptionHandle) -> bool {
        lock(&self.shared).live.contains(&handle)
    }
}

impl std::fmt::Debug for SchedulerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let shared = lock(&self.shared);
        f.debug_struct("SchedulerHandle")
            .field("live", &shared.live.len())
            .field("pending", &shared.pending.len())
            .finish()
    }
}

/// Owner of the subscription set; drives dispatch passes.
pub struct UpdateScheduler {
    handle: SchedulerHandle,
    subscriptions: Vec<Subscription>,
}

impl Default for UpdateScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl UpdateScheduler {
    /// Creates an empty scheduler at time zero.
    pub fn new() -> Self {
        Self {
            handle: SchedulerHandle {
                shared: Arc::new(Mutex::new(Shared::default())),
            },
            subscriptions: Vec::new(),
        }
    }

    /// Returns a handle for queuing changes.
    pub fn handle(&self) -> SchedulerHandle {
        self.handle.clone()
    }

    /// See [`SchedulerHandle::subscribe`].
    pub fn subscribe<F>(&self, period: f64, callback: F) -> Result<SubscriptionHandle, SchedulerError>
    where
        F: FnMut(f64) + Send + 'static,
    {
        self.handle.subscribe(period, callback)
    }

    /// See [`SchedulerHandle::unsubscribe`].
    pub fn unsubscribe(&self, handle: SubscriptionHandle) -> Result<(), SchedulerError> {
        self.handle.unsubscribe(handle)
    }

    /// Runs one dispatch pass at `current_time` seconds. Returns the number
    /// of callbacks invoked.
    pub fn tick(&mut self, current_time: f64) -> usize {
        let pending = {
            let mut shared = lock(&self.handle.shared);
            shared.now = current_time;
            std::mem::take(&mut shared.pending)
        };
        if !pending.is_empty() {
            tracing::trace!("Scheduler applying {} queued changes", pending.len());
        }
        for op in pending {
            match op {
                PendingOp::Subscribe(subscription) => self.subscriptions.push(subscription),
                PendingOp::Unsubscribe(handle) => {
                    self.subscriptions.retain(|s| s.handle != handle);
                }
            }
        }

        let mut invoked = 0;
        for subscription in &mut self.subscriptions {
            if current_time < subscription.next_call {
                continue;
            }
            // The lock is released before the callback runs so it can queue changes.
            if !self.handle.is_subscribed(subscription.handle) {
                continue;
            }
            (subscription.callback)(current_time - subscription.last_call);
            subscription.last_call = current_time;
            subscription.next_call = current_time + subscription.period.max(0.0);
            invoked += 1;
        }
        invoked
    }

    /// Number of subscriptions in the dispatch set.
    pub fn len(&self) -> usize {
        self.subscriptions.len()
    }

    /// Returns `true` if the dispatch set is empty.
    pub fn is_empty(&self) -> bool {
        self.subscriptions.is_empty()
    }

    /// Number of queued changes awaiting the next pass.
    pub fn pending_len(&self) -> usize {
        lock(&self.handle.shared).pending.len()
    }
}

impl std::fmt::Debug for UpdateScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UpdateScheduler")
            .field("subscriptions", &self.subscriptions.len())
            .field("handle", &self.handle)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn recorder() -> (Arc<Mutex<Vec<f64>>>, impl FnMut(f64) + Send + 'static) {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&calls);
        (calls, move |elapsed| sink.lock().unwrap().push(elapsed))
    }

    #[test]
    fn test_subscription_starts_on_next_pass() {
        let mut scheduler = UpdateScheduler::new();
        let (calls, callback) = recorder();
        scheduler.subscribe(0.0, callback).unwrap();
        assert_eq!(scheduler.len(), 0);
        assert_eq!(scheduler.pending_len(), 1);

        assert_eq!(scheduler.tick(0.0), 1);
        assert_eq!(scheduler.tick(0.5), 1);
        assert_eq!(*calls.lock().unwrap(), vec![0.0, 0.5]);
    }

    #[test]
    fn test_period_gates_invocations() {
        let mut scheduler = UpdateScheduler::new();
        let (calls, callback) = recorder();
        scheduler.subscribe(1.0, callback).unwrap();

        for t in [0.0, 0.5, 1.0, 1.5, 2.25, 3.0, 3.25] {
            scheduler.tick(t);
        }
        assert_eq!(*calls.lock().unwrap(), vec![1.0, 1.25, 1.0]);
    }

    #[test]
    fn test_subscribe_during_pass_waits_for_next_pass() {
        let mut scheduler = UpdateScheduler::new();
        let handle = scheduler.handle();
        let inner_calls = Arc::new(Mutex::new(0));

        let counter = Arc::clone(&inner_calls);
        let mut added = false;
        scheduler
            .subscribe(0.0, move |_| {
                if !added {
                    added = true;
                    let counter = Arc::clone(&counter);
                    handle
                        .subscribe(0.0, move |_| *counter.lock().unwrap() += 1)
                        .unwrap();
                }
            })
            .unwrap();

        scheduler.tick(0.0); // outer runs and adds inner
        assert_eq!(*inner_calls.lock().unwrap(), 0);
        assert_eq!(scheduler.len(), 1);
        assert_eq!(scheduler.pending_len(), 1);

        scheduler.tick(1.0);
        assert_eq!(*inner_calls.lock().unwrap(), 1);
        assert_eq!(scheduler.len(), 2);
    }

    #[test]
    fn test_unsubscribe_during_pass_stops_invocations() {
        let mut scheduler = UpdateScheduler::new();
        let handle = scheduler.handle();
        let victim_calls = Arc::new(Mutex::new(0));

        // Subscriber 0 removes subscriber 1 on its first invocation.
        let victim = SubscriptionHandle(1);
        scheduler
            .subscribe(0.0, move |_| {
                let _ = handle.unsubscribe(victim);
            })
            .unwrap();
        let counter = Arc::clone(&victim_calls);
        assert_eq!(
            scheduler
                .subscribe(0.0, move |_| *counter.lock().unwrap() += 1)
                .unwrap(),
            victim
        );

        scheduler.tick(0.0);
        assert_eq!(*victim_calls.lock().unwrap(), 0, "removed before its turn");
        scheduler.tick(1.0);
        scheduler.tick(2.0);
        assert_eq!(*victim_calls.lock().unwrap(), 0);
        assert_eq!(scheduler.len(), 1);
    }

    #[test]
    fn test_self_unsubscribe_is_safe() {
        let mut scheduler = UpdateScheduler::new();
        let handle = scheduler.handle();
        let calls = Arc::new(Mutex::new(0));
        let counter = Arc::clone(&calls);
        scheduler
            .subscribe(0.0, move |_| {
                *counter.lock().unwrap() += 1;
                let _ = handle.unsubscribe(SubscriptionHandle(0));
            })
            .unwrap();

        for t in 0..5 {
            scheduler.tick(t as f64);
        }
        assert_eq!(*calls.lock().unwrap(), 1);
        assert!(scheduler.is_empty());
    }

    #[test]
    fn test_unknown_and_invalid_requests() {
        let scheduler = UpdateScheduler::new();
        assert_eq!(
            scheduler.unsubscribe(SubscriptionHandle(42)),
            Err(SchedulerError::UnknownSubscription(SubscriptionHandle(42)))
        );
        assert!(matches!(
            scheduler.subscribe(f64::NAN, |_| {}),
            Err(SchedulerError::InvalidPeriod(_))
        ));

        let handle = scheduler.subscribe(1.0, |_| {}).unwrap();
        scheduler.unsubscribe(handle).unwrap();
        assert_eq!(
            scheduler.unsubscribe(handle),
            Err(SchedulerError::UnknownSubscription(handle))
        );
    }

    #[test]
    fn test_subscription_removed_before_activation() {
        let mut scheduler = UpdateScheduler::new();
        let (calls, callback) = recorder();
        let handle = scheduler.subscribe(0.0, callback).unwrap();
        scheduler.unsubscribe(handle).unwrap();

        scheduler.tick(0.0);
        assert!(calls.lock().unwrap().is_empty());
        assert!(scheduler.is_empty());
    }
}
