//! Singleflight for once-only guarded operations
//!
//! Wraps the `async_singleflight` crate so that concurrent callers of the
//! same keyed operation coalesce onto one execution and share its outcome.
//! The relay actor uses this as its init guard: N concurrent `init` calls
//! run the session parsing exactly once.

use std::fmt::Debug;
use std::hash::Hash;
use std::sync::Arc;

/// Error type for `SingleFlight` operations
#[derive(Debug, Clone, thiserror::Error)]
pub enum SingleFlightError<E> {
    /// The leader task was dropped or panicked before producing a result
    #[error("singleflight leader dropped or panicked")]
    WorkerFailed,
    /// The guarded operation itself failed
    #[error("{0}")]
    Inner(E),
}

/// `SingleFlight` prevents duplicate concurrent function executions.
///
/// When multiple tasks attempt the same keyed operation simultaneously, only
/// one execution proceeds while the others wait for its result.
#[derive(Clone)]
pub struct SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    group: Arc<async_singleflight::Group<K, V, E>>,
}

impl<K, V, E> SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    #[must_use]
    pub fn new() -> Self {
        Self {
            group: Arc::new(async_singleflight::Group::new()),
        }
    }

    /// Execute a function only once for a given key.
    ///
    /// If another call for the same key is in progress, this waits for that
    /// result instead of executing the function again. A failed run is not
    /// cached: the next non-concurrent call executes afresh.
    pub async fn do_work<Fut>(&self, key: K, f: Fut) -> Result<V, SingleFlightError<E>>
    where
        Fut: std::future::Future<Output = Result<V, E>> + Send,
    {
        // Group::work yields Err(Some(e)) for an inner error and Err(None)
        // when the leader itself failed after the library's retries.
        self.group
            .work(&key, f)
            .await
            .map_err(|opt_err| match opt_err {
                Some(inner) => SingleFlightError::Inner(inner),
                None => SingleFlightError::WorkerFailed,
            })
    }

    /// Like [`do_work`](Self::do_work) but collapses worker failures into the
    /// caller's error type.
    pub async fn do_work_with_fallback<Fut, Ef>(
        &self,
        key: K,
        f: Fut,
        error_factory: Ef,
    ) -> Result<V, E>
    where
        Fut: std::future::Future<Output = Result<V, E>> + Send,
        Ef: FnOnce() -> E,
    {
        self.do_work(key, f).await.map_err(|e| match e {
            SingleFlightError::WorkerFailed => error_factory(),
            SingleFlightError::Inner(err) => err,
        })
    }
}

impl<K, V, E> Default for SingleFlight<K, V, E>
where
    K: Hash + Eq + Clone + Debug + Send + Sync + 'static,
    V: Clone + Send + Sync + 'static,
    E: Clone + Send + Sync + 'static,
{
    fn default() -> Self {
        Self::new()
    }
}
