// ABOUTME: Connection age and idle tracking for the native backend.
// ABOUTME: A lock-guarded slot reconnects when the held connection goes stale.

use super::error::Result;
use async_trait::async_trait;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::RwLock;
use tokio::time::Instant;

/// Close and reconnect after this long without a successful operation.
pub const MAX_IDLE: Duration = Duration::from_secs(5 * 60);
/// Close and reconnect once a connection is this old, however busy.
pub const MAX_LIFETIME: Duration = Duration::from_secs(60 * 60);
/// Upper bound on establishing a connection.
pub const DIAL_TIMEOUT: Duration = Duration::from_secs(30);

/// Timestamps of one connection. Stale until the first `reset`.
#[derive(Debug, Clone, Copy)]
pub struct SessionLifecycle {
    connected_at: Option<Instant>,
    last_used_at: Option<Instant>,
    max_idle: Duration,
    max_lifetime: Duration,
}

impl Default for SessionLifecycle {
    fn default() -> Self {
        Self::new(MAX_IDLE, MAX_LIFETIME)
    }
}

impl SessionLifecycle {
    pub fn new(max_idle: Duration, max_lifetime: Duration) -> Self {
        Self {
            connected_at: None,
            last_used_at: None,
            max_idle,
            max_lifetime,
        }
    }

    pub fn is_stale(&self) -> bool {
        self.is_stale_at(Instant::now())
    }

    pub fn is_stale_at(&self, now: Instant) -> bool {
        match (self.connected_at, self.last_used_at) {
            (Some(connected), Some(used)) => {
                now.saturating_duration_since(used) > self.max_idle
                    || now.saturating_duration_since(connected) > self.max_lifetime
            }
            _ => true,
        }
    }

    /// Record a successful operation.
    pub fn touch(&mut self) {
        self.last_used_at = Some(Instant::now());
    }

    /// Record a fresh connection.
    pub fn reset(&mut self) {
        let now = Instant::now();
        self.connected_at = Some(now);
        self.last_used_at = Some(now);
    }
}

/// Something the slot can shut down when replacing or closing it.
#[async_trait]
pub trait Connection: Send + Sync + 'static {
    async fn disconnect(&self);
}

struct SlotState<T> {
    connection: Option<Arc<T>>,
    lifecycle: SessionLifecycle,
    generation: u64,
}

/// Holds at most one live connection plus its lifecycle.
///
/// Staleness checks take the read lock; connecting, reconnecting and closing
/// take the write lock. Operations on a returned connection run unlocked.
pub struct ConnectionSlot<T> {
    state: RwLock<SlotState<T>>,
}

impl<T: Connection> Default for ConnectionSlot<T> {
    fn default() -> Self {
        Self::new(SessionLifecycle::default())
    }
}

impl<T: Connection> ConnectionSlot<T> {
    pub fn new(lifecycle: SessionLifecycle) -> Self {
        Self {
            state: RwLock::new(SlotState {
                connection: None,
                lifecycle,
                generation: 0,
            }),
        }
    }

    /// Replace any current connection with a new one.
    pub async fn connect<F, Fut>(&self, dial: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        let mut state = self.state.write().await;
        replace(&mut state, dial).await
    }

    /// Return the current connection, reconnecting first if it is missing or stale.
    pub async fn ensure_fresh<F, Fut>(&self, dial: F) -> Result<Arc<T>>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<T>>,
    {
        {
            let state = self.state.read().await;
            if let Some(connection) = live(&state) {
                return Ok(connection);
            }
        }

        let mut state = self.state.write().await;
        if let Some(connection) = live(&state) {
            return Ok(connection);
        }
        if state.connection.is_some() {
            tracing::debug!("connection stale, reconnecting");
        }
        replace(&mut state, dial).await
    }

    pub async fn touch(&self) {
        self.state.write().await.lifecycle.touch();
    }

    /// Drop the connection. Idempotent.
    pub async fn close(&self) {
        let mut state = self.state.write().await;
        if let Some(connection) = state.connection.take() {
            connection.disconnect().await;
        }
    }

    /// Incremented on every successful (re)connect.
    pub async fn generation(&self) -> u64 {
        self.state.read().await.generation
    }

    pub async fn is_connected(&self) -> bool {
        self.state.read().await.connection.is_some()
    }
}

async fn replace<T, F, Fut>(state: &mut SlotState<T>, dial: F) -> Result<Arc<T>>
where
    T: Connection,
    F: FnOnce() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    if let Some(old) = state.connection.take() {
        old.disconnect().await;
    }
    let connection = Arc::new(dial().await?);
    state.connection = Some(Arc::clone(&connection));
    state.lifecycle.reset();
    state.generation += 1;
    Ok(connection)
}

fn live<T>(state: &SlotState<T>) -> Option<Arc<T>> {
    match &state.connection {
        Some(connection) if !state.lifecycle.is_stale() => Some(Arc::clone(connection)),
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct FakeConnection {
        disconnects: Arc<AtomicUsize>,
    }

    #[async_trait]
    impl Connection for FakeConnection {
        async fn disconnect(&self) {
            self.disconnects.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn fake(disconnects: &Arc<AtomicUsize>) -> impl Future<Output = Result<FakeConnection>> {
        let disconnects = Arc::clone(disconnects);
        async move { Ok(FakeConnection { disconnects }) }
    }

    #[test]
    fn never_connected_is_stale() {
        assert!(SessionLifecycle::default().is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_and_lifetime_thresholds() {
        let mut lifecycle = SessionLifecycle::default();
        lifecycle.reset();
        assert!(!lifecycle.is_stale());

        tokio::time::advance(MAX_IDLE + Duration::from_secs(1)).await;
        assert!(lifecycle.is_stale());

        lifecycle.touch();
        assert!(!lifecycle.is_stale());

        // Busy connections still age out.
        for _ in 0..15 {
            tokio::time::advance(Duration::from_secs(4 * 60)).await;
            lifecycle.touch();
        }
        assert!(lifecycle.is_stale());
    }

    #[tokio::test(start_paused = true)]
    async fn idle_connection_is_replaced_before_use() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let slot = ConnectionSlot::<FakeConnection>::default();

        slot.ensure_fresh(|| fake(&disconnects)).await.unwrap();
        assert_eq!(slot.generation().await, 1);

        slot.ensure_fresh(|| fake(&disconnects)).await.unwrap();
        assert_eq!(slot.generation().await, 1);

        tokio::time::advance(MAX_IDLE + Duration::from_secs(1)).await;
        slot.ensure_fresh(|| fake(&disconnects)).await.unwrap();
        assert_eq!(slot.generation().await, 2);
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let disconnects = Arc::new(AtomicUsize::new(0));
        let slot = ConnectionSlot::<FakeConnection>::default();
        slot.close().await;

        slot.connect(|| fake(&disconnects)).await.unwrap();
        slot.close().await;
        slot.close().await;
        assert_eq!(disconnects.load(Ordering::SeqCst), 1);
        assert!(!slot.is_connected().await);
    }

    #[tokio::test]
    async fn failed_dial_leaves_slot_empty() {
        let slot = ConnectionSlot::<FakeConnection>::default();
        let result = slot
            .ensure_fresh(|| async {
                Err(crate::ssh::Error::transport(
                    crate::ssh::Stage::Dial,
                    "connection refused",
                ))
            })
            .await;
        assert!(result.is_err());
        assert!(!slot.is_connected().await);
        assert_eq!(slot.generation().await, 0);
    }
}
