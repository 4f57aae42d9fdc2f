//! Single-flight deduplication of concurrent cache fills.

use std::collections::HashMap;
use std::future::Future;
use std::sync::{Mutex, MutexGuard, PoisonError};

use futures::FutureExt;
use futures::future::{BoxFuture, Shared};
use tracing::debug;

type Flight<V> = Shared<BoxFuture<'static, V>>;

struct InFlight<V> {
    flight: Flight<V>,
    waiters: usize,
}

/// Runs at most one computation per key at a time and fans its result out to
/// every caller that arrived while it was running.
///
/// The coordinator does not remember results: once a flight finishes, its
/// key is forgotten and the next caller starts a fresh computation.
///
/// # Examples
///
/// ```
/// use render_cache::cache::FillCoordinator;
///
/// # #[tokio::main(flavor = "current_thread")]
/// # async fn main() {
/// let flights = FillCoordinator::new();
/// let value = flights.resolve("/about", || async { 42 }).await;
/// assert_eq!(value, 42);
/// assert_eq!(flights.in_flight(), 0);
/// # }
/// ```
pub struct FillCoordinator<V> {
    flights: Mutex<HashMap<String, InFlight<V>>>,
}

impl<V> Default for FillCoordinator<V> {
    fn default() -> Self {
        Self {
            flights: Mutex::new(HashMap::new()),
        }
    }
}

impl<V> FillCoordinator<V>
where
    V: Clone + Send + Sync + 'static,
{
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the result of `compute` for `key`, running it only if no
    /// computation for `key` is already in flight.
    ///
    /// Joining callers wait without polling in a loop and receive a clone of
    /// the leader's result. `compute` is dropped unused when joining.
    pub async fn resolve<F, Fut>(&self, key: &str, compute: F) -> V
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = V> + Send + 'static,
    {
        let flight = {
            let mut flights = self.lock();
            match flights.get_mut(key) {
                Some(in_flight) => {
                    in_flight.waiters += 1;
                    debug!(key, waiters = in_flight.waiters, "joining in-flight fill");
                    in_flight.flight.clone()
                }
                None => {
                    let flight = compute().boxed().shared();
                    flights.insert(
                        key.to_owned(),
                        InFlight {
                            flight: flight.clone(),
                            waiters: 1,
                        },
                    );
                    flight
                }
            }
        };

        let mut guard = WaiterGuard {
            coordinator: self,
            key,
            flight: flight.clone(),
            finished: false,
        };
        let value = flight.await;
        guard.finished = true;
        value
    }

    /// Number of keys with a computation currently running.
    pub fn in_flight(&self) -> usize {
        self.lock().len()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<String, InFlight<V>>> {
        // The map holds no invariant a panicking holder could break halfway.
        self.flights.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

// Releases a waiter's claim on its flight. The key is forgotten as soon as the
// flight has produced a value, or once every waiter has gone away (cancelled
// or panicked), whichever comes first.
struct WaiterGuard<'a, V>
where
    V: Clone + Send + Sync + 'static,
{
    coordinator: &'a FillCoordinator<V>,
    key: &'a str,
    flight: Flight<V>,
    finished: bool,
}

impl<V> Drop for WaiterGuard<'_, V>
where
    V: Clone + Send + Sync + 'static,
{
    fn drop(&mut self) {
        let mut flights = self.coordinator.lock();
        let Some(in_flight) = flights.get_mut(self.key) else {
            return;
        };
        if !in_flight.flight.ptr_eq(&self.flight) {
            return;
        }
        in_flight.waiters -= 1;
        if self.finished || in_flight.waiters == 0 {
            flights.remove(self.key);
        }
    }
}
