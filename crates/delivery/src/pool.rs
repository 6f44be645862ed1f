//! Keep-alive pool of idle collector connections
//!
//! Connections are moved out of the pool while a delivery uses them, so a
//! connection is only ever owned by one task. The map itself is sharded
//! (`DashMap`), so borrow/release for different destinations do not contend
//! on a single lock.

use dashmap::DashMap;
use std::fmt;
use std::time::Duration;
use tokio::time::Instant;

/// Default number of idle connections kept per destination
pub const DEFAULT_MAX_IDLE_PER_KEY: usize = 32;

/// Destination a pooled connection is bound to
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PoolKey {
    pub scheme: String,
    pub host: String,
    pub port: u16,
}

impl PoolKey {
    pub fn new(scheme: impl Into<String>, host: impl Into<String>, port: u16) -> Self {
        Self {
            scheme: scheme.into(),
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for PoolKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

struct IdleEntry<C> {
    conn: C,
    expires_at: Instant,
}

/// Idle connection pool with per-connection expiry
pub struct ConnectionPool<C> {
    idle: DashMap<PoolKey, Vec<IdleEntry<C>>>,
    max_idle_per_key: usize,
}

impl<C> ConnectionPool<C> {
    /// Create a pool keeping at most `max_idle_per_key` idle connections per destination
    pub fn new(max_idle_per_key: usize) -> Self {
        Self {
            idle: DashMap::new(),
            max_idle_per_key,
        }
    }

    /// Take the most recently released, unexpired connection for `key`
    ///
    /// Expired entries found along the way are dropped (and thereby closed).
    pub fn acquire(&self, key: &PoolKey) -> Option<C> {
        let mut entries = self.idle.get_mut(key)?;
        let now = Instant::now();
        entries.retain(|entry| entry.expires_at > now);
        entries.pop().map(|entry| entry.conn)
    }

    /// Return a connection to the pool for `ttl`
    ///
    /// Hands the connection back when the destination already holds the
    /// maximum number of idle connections or when `ttl` is zero.
    pub fn release(&self, key: PoolKey, conn: C, ttl: Duration) -> Result<(), C> {
        if ttl.is_zero() || self.max_idle_per_key == 0 {
            return Err(conn);
        }

        let mut entries = self.idle.entry(key).or_default();
        let now = Instant::now();
        entries.retain(|entry| entry.expires_at > now);
        if entries.len() >= self.max_idle_per_key {
            return Err(conn);
        }

        entries.push(IdleEntry {
            conn,
            expires_at: now + ttl,
        });
        Ok(())
    }

    /// Number of idle (possibly expired) connections for `key`
    pub fn idle_count(&self, key: &PoolKey) -> usize {
        self.idle.get(key).map(|entries| entries.len()).unwrap_or(0)
    }

    /// Number of idle connections across all destinations
    pub fn total_idle(&self) -> usize {
        self.idle.iter().map(|entries| entries.len()).sum()
    }

    /// Drop every expired connection; returns how many were closed
    pub fn purge_expired(&self) -> usize {
        let now = Instant::now();
        let mut purged = 0;
        for mut entries in self.idle.iter_mut() {
            let before = entries.len();
            entries.retain(|entry| entry.expires_at > now);
            purged += before - entries.len();
        }
        self.idle.retain(|_, entries| !entries.is_empty());
        purged
    }

    /// Close all idle connections
    pub fn clear(&self) {
        self.idle.clear();
    }

    pub fn max_idle_per_key(&self) -> usize {
        self.max_idle_per_key
    }
}

impl<C> Default for ConnectionPool<C> {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_IDLE_PER_KEY)
    }
}

impl<C> fmt::Debug for ConnectionPool<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionPool")
            .field("destinations", &self.idle.len())
            .field("max_idle_per_key", &self.max_idle_per_key)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn key(host: &str) -> PoolKey {
        PoolKey::new("http", host, 80)
    }

    #[test]
    fn test_acquire_empty() {
        let pool: ConnectionPool<u32> = ConnectionPool::default();
        assert!(pool.acquire(&key("a")).is_none());
    }

    #[test]
    fn test_release_then_acquire() {
        let pool = ConnectionPool::new(4);
        pool.release(key("a"), 1u32, Duration::from_secs(60)).unwrap();
        assert_eq!(pool.idle_count(&key("a")), 1);
        assert_eq!(pool.acquire(&key("a")), Some(1));
        assert_eq!(pool.idle_count(&key("a")), 0);
        assert!(pool.acquire(&key("a")).is_none());
    }

    #[test]
    fn test_most_recent_first() {
        let pool = ConnectionPool::new(4);
        pool.release(key("a"), 1u32, Duration::from_secs(60)).unwrap();
        pool.release(key("a"), 2u32, Duration::from_secs(60)).unwrap();
        assert_eq!(pool.acquire(&key("a")), Some(2));
        assert_eq!(pool.acquire(&key("a")), Some(1));
    }

    #[test]
    fn test_keys_are_isolated() {
        let pool = ConnectionPool::new(4);
        pool.release(key("a"), 1u32, Duration::from_secs(60)).unwrap();
        assert!(pool.acquire(&key("b")).is_none());
        assert!(pool.acquire(&PoolKey::new("https", "a", 80)).is_none());
        assert!(pool.acquire(&PoolKey::new("http", "a", 8080)).is_none());
        assert_eq!(pool.acquire(&key("a")), Some(1));
    }

    #[test]
    fn test_full_pool_hands_connection_back() {
        let pool = ConnectionPool::new(1);
        pool.release(key("a"), 1u32, Duration::from_secs(60)).unwrap();
        assert_eq!(pool.release(key("a"), 2u32, Duration::from_secs(60)), Err(2));
        assert_eq!(pool.total_idle(), 1);
    }

    #[test]
    fn test_zero_ttl_not_pooled() {
        let pool = ConnectionPool::new(4);
        assert_eq!(pool.release(key("a"), 7u32, Duration::ZERO), Err(7));
        assert_eq!(pool.total_idle(), 0);
    }

    #[tokio::test(start_paused = true)]
    async fn test_expired_connections_dropped() {
        let pool = ConnectionPool::new(4);
        pool.release(key("a"), 1u32, Duration::from_millis(100)).unwrap();
        pool.release(key("b"), 2u32, Duration::from_secs(60)).unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;

        assert!(pool.acquire(&key("a")).is_none());
        assert_eq!(pool.acquire(&key("b")), Some(2));
    }

    #[tokio::test(start_paused = true)]
    async fn test_purge_expired() {
        let pool = ConnectionPool::new(4);
        pool.release(key("a"), 1u32, Duration::from_millis(100)).unwrap();
        pool.release(key("a"), 2u32, Duration::from_secs(60)).unwrap();
        pool.release(key("b"), 3u32, Duration::from_millis(100)).unwrap();

        tokio::time::advance(Duration::from_millis(150)).await;

        assert_eq!(pool.purge_expired(), 2);
        assert_eq!(pool.total_idle(), 1);
        assert_eq!(pool.acquire(&key("a")), Some(2));
    }
}
