use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use dashmap::DashMap;
use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tokio::sync::oneshot;

type SharedOutcome<T> = Shared<BoxFuture<'static, Option<T>>>;

/// Collapses concurrent work on the same key into one execution.
///
/// The first caller for a key becomes the leader and owns the pending slot;
/// later callers attach to the leader's outcome. The slot is removed when
/// the leader completes or is dropped, so idle keys cost nothing.
pub struct KeyedFlights<T> {
    flights: Arc<DashMap<String, (u64, SharedOutcome<T>)>>,
    next_id: Arc<AtomicU64>,
}

impl<T> Clone for KeyedFlights<T> {
    fn clone(&self) -> Self {
        Self {
            flights: Arc::clone(&self.flights),
            next_id: Arc::clone(&self.next_id),
        }
    }
}

impl<T> Default for KeyedFlights<T>
where
    T: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}

pub enum Flight<T>
where
    T: Clone + Send + Sync + 'static,
{
    Leader(FlightLeader<T>),
    Follower(FlightWaiter<T>),
}

impl<T> KeyedFlights<T>
where
    T: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self {
            flights: Arc::new(DashMap::new()),
            next_id: Arc::new(AtomicU64::new(0)),
        }
    }

    pub fn join_or_lead(&self, key: &str) -> Flight<T> {
        use dashmap::mapref::entry::Entry;

        match self.flights.entry(key.to_string()) {
            Entry::Occupied(occupied) => Flight::Follower(FlightWaiter {
                outcome: occupied.get().1.clone(),
            }),
            Entry::Vacant(vacant) => {
                let (sender, receiver) = oneshot::channel();
                let outcome = receiver.map(Result::ok).boxed().shared();
                let id = self.next_id.fetch_add(1, Ordering::Relaxed);
                vacant.insert((id, outcome.clone()));
                Flight::Leader(FlightLeader {
                    sender,
                    outcome,
                    slot: FlightSlot {
                        key: key.to_string(),
                        id,
                        flights: Arc::clone(&self.flights),
                    },
                })
            }
        }
    }

    pub fn is_in_flight(&self, key: &str) -> bool {
        self.flights.contains_key(key)
    }

    /// Number of keys with pending work.
    pub fn len(&self) -> usize {
        self.flights.len()
    }

    pub fn is_empty(&self) -> bool {
        self.flights.is_empty()
    }
}

/// Handle owned by the caller that performs the work.
pub struct FlightLeader<T>
where
    T: Clone + Send + Sync + 'static,
{
    sender: oneshot::Sender<T>,
    outcome: SharedOutcome<T>,
    slot: FlightSlot<T>,
}

impl<T> FlightLeader<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// A waiter for the leader's own outcome.
    pub fn waiter(&self) -> FlightWaiter<T> {
        FlightWaiter {
            outcome: self.outcome.clone(),
        }
    }

    /// Release the key, then publish `value` to every waiter.
    ///
    /// A caller that arrives once the value is observable starts a new
    /// flight instead of joining a settled one.
    pub fn complete(self, value: T) {
        let FlightLeader { sender, slot, .. } = self;
        drop(slot);
        let _ = sender.send(value);
    }
}

pub struct FlightWaiter<T>
where
    T: Clone + Send + Sync + 'static,
{
    outcome: SharedOutcome<T>,
}

impl<T> FlightWaiter<T>
where
    T: Clone + Send + Sync + 'static,
{
    /// Wait for the leader. `None` when the leader was dropped without
    /// completing.
    pub async fn wait(self) -> Option<T> {
        self.outcome.await
    }
}

struct FlightSlot<T> {
    key: String,
    id: u64,
    flights: Arc<DashMap<String, (u64, SharedOutcome<T>)>>,
}

impl<T> Drop for FlightSlot<T> {
    fn drop(&mut self) {
        let id = self.id;
        self.flights
            .remove_if(&self.key, |_, (slot_id, _)| *slot_id == id);
    }
}

#[cfg(test)]
mod tests {
    use std::future::Future;
    use std::sync::atomic::AtomicBool;
    use std::task::{Context, Poll};

    use futures::task::{ArcWake, waker};

    use super::*;

    struct KeyStateAtWake {
        flights: KeyedFlights<u32>,
        woken: AtomicBool,
        in_flight: AtomicBool,
    }

    impl ArcWake for KeyStateAtWake {
        fn wake_by_ref(arc_self: &Arc<Self>) {
            arc_self
                .in_flight
                .store(arc_self.flights.is_in_flight("acme"), Ordering::SeqCst);
            arc_self.woken.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn followers_receive_leader_outcome() {
        let flights = KeyedFlights::<u32>::new();
        let Flight::Leader(leader) = flights.join_or_lead("acme") else {
            panic!("first caller must lead");
        };
        let Flight::Follower(follower) = flights.join_or_lead("acme") else {
            panic!("second caller must follow");
        };
        let own = leader.waiter();

        leader.complete(7);

        assert_eq!(follower.wait().await, Some(7));
        assert_eq!(own.wait().await, Some(7));
        assert!(flights.is_empty());
    }

    #[tokio::test]
    async fn distinct_keys_lead_independently() {
        let flights = KeyedFlights::<u32>::new();
        assert!(matches!(flights.join_or_lead("a"), Flight::Leader(_)));
        // the previous leader was dropped, releasing "a"
        assert!(matches!(flights.join_or_lead("a"), Flight::Leader(_)));
        let _b = flights.join_or_lead("b");
        assert!(flights.is_in_flight("b"));
    }

    #[tokio::test]
    async fn dropped_leader_releases_waiters_with_none() {
        let flights = KeyedFlights::<u32>::new();
        let Flight::Leader(leader) = flights.join_or_lead("acme") else {
            panic!("first caller must lead");
        };
        let waiter = leader.waiter();
        drop(leader);

        assert_eq!(waiter.wait().await, None);
        assert!(!flights.is_in_flight("acme"));
    }

    #[tokio::test]
    async fn stale_slot_does_not_remove_newer_flight() {
        let flights = KeyedFlights::<u32>::new();
        let stale = FlightSlot {
            key: "acme".to_string(),
            id: u64::MAX,
            flights: Arc::clone(&flights.flights),
        };
        let _leader = flights.join_or_lead("acme");
        drop(stale);
        assert!(flights.is_in_flight("acme"));
    }

    #[tokio::test]
    async fn key_is_released_before_waiters_are_woken() {
        let flights = KeyedFlights::<u32>::new();
        let Flight::Leader(leader) = flights.join_or_lead("acme") else {
            panic!("first caller must lead");
        };
        let Flight::Follower(follower) = flights.join_or_lead("acme") else {
            panic!("second caller must follow");
        };

        let observer = Arc::new(KeyStateAtWake {
            flights: flights.clone(),
            woken: AtomicBool::new(false),
            in_flight: AtomicBool::new(true),
        });
        let follower_waker = waker(Arc::clone(&observer));
        let mut cx = Context::from_waker(&follower_waker);
        let mut pending = Box::pin(follower.wait());
        assert!(matches!(pending.as_mut().poll(&mut cx), Poll::Pending));

        leader.complete(7);

        assert!(observer.woken.load(Ordering::SeqCst));
        assert!(!observer.in_flight.load(Ordering::SeqCst));
        assert_eq!(pending.await, Some(7));
        assert!(matches!(flights.join_or_lead("acme"), Flight::Leader(_)));
    }
}
