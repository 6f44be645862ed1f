//! Deferred delivery scheduling
//!
//! The request path only calls [`DeferredScheduler::schedule`], which spawns a
//! detached tokio task and returns immediately. Resolution, message building
//! and I/O all happen inside that task; failures end there as log lines.

use crate::client::DeliveryClient;
use crate::endpoint::resolve;
use crate::error::{DeliveryError, ScheduleError};
use crate::message::build;
use bytes::Bytes;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Handle;
use tracing::{debug, error, warn};

/// Default per-I/O timeout
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Default idle time of a pooled connection
pub const DEFAULT_KEEPALIVE: Duration = Duration::from_secs(60);

/// One payload to ship
#[derive(Debug, Clone)]
pub struct DeliveryTask {
    pub endpoint: String,
    pub method: String,
    pub payload: Bytes,
    /// Originating plugin/system, used in log lines
    pub label: String,
    pub timeout: Duration,
    pub keepalive: Duration,
}

impl DeliveryTask {
    pub fn new(endpoint: impl Into<String>, payload: impl Into<Bytes>, label: impl Into<String>) -> Self {
        Self {
            endpoint: endpoint.into(),
            method: "POST".to_string(),
            payload: payload.into(),
            label: label.into(),
            timeout: DEFAULT_TIMEOUT,
            keepalive: DEFAULT_KEEPALIVE,
        }
    }

    pub fn with_method(mut self, method: impl Into<String>) -> Self {
        self.method = method.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_keepalive(mut self, keepalive: Duration) -> Self {
        self.keepalive = keepalive;
        self
    }
}

/// Snapshot of scheduler counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub scheduled: u64,
    pub delivered: u64,
    pub failed: u64,
    pub dropped: u64,
    pub in_flight: u64,
}

#[derive(Default)]
struct Counters {
    scheduled: AtomicU64,
    delivered: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
    in_flight: AtomicU64,
}

struct Inner {
    client: Arc<DeliveryClient>,
    handle: Handle,
    closed: AtomicBool,
    counters: Counters,
}

/// Runs deliveries as detached tasks on a tokio runtime
#[derive(Clone)]
pub struct DeferredScheduler {
    inner: Arc<Inner>,
}

impl DeferredScheduler {
    pub fn new(client: Arc<DeliveryClient>, handle: Handle) -> Self {
        Self {
            inner: Arc::new(Inner {
                client,
                handle,
                closed: AtomicBool::new(false),
                counters: Counters::default(),
            }),
        }
    }

    /// Create a scheduler bound to the runtime of the calling thread
    pub fn from_current(client: Arc<DeliveryClient>) -> Result<Self, ScheduleError> {
        let handle = Handle::try_current().map_err(|e| ScheduleError::NoRuntime(e.to_string()))?;
        Ok(Self::new(client, handle))
    }

    /// Hand a task to the runtime; never waits on the delivery
    pub fn schedule(&self, task: DeliveryTask) -> Result<(), ScheduleError> {
        if self.inner.closed.load(Ordering::Acquire) {
            self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(plugin = %task.label, target = %task.endpoint, "Scheduler closed, dropping log delivery");
            return Err(ScheduleError::Closed);
        }

        self.inner.counters.scheduled.fetch_add(1, Ordering::Relaxed);
        let mut guard = InFlight::enter(self.inner.clone(), &task);
        self.inner.handle.spawn(async move {
            guard.started = true;
            let inner = guard.inner.clone();
            run(&inner, task).await;
            drop(guard);
        });
        Ok(())
    }

    pub fn stats(&self) -> DeliveryStats {
        let c = &self.inner.counters;
        DeliveryStats {
            scheduled: c.scheduled.load(Ordering::Relaxed),
            delivered: c.delivered.load(Ordering::Relaxed),
            failed: c.failed.load(Ordering::Relaxed),
            dropped: c.dropped.load(Ordering::Relaxed),
            in_flight: c.in_flight.load(Ordering::Acquire),
        }
    }

    /// Refuse further tasks; in-flight deliveries still run to completion
    pub fn close(&self) {
        self.inner.closed.store(true, Ordering::Release);
    }

    pub fn is_closed(&self) -> bool {
        self.inner.closed.load(Ordering::Acquire)
    }

    pub fn client(&self) -> &Arc<DeliveryClient> {
        &self.inner.client
    }

    /// Wait until no delivery is in flight
    ///
    /// Returns `false` if deliveries were still running when `timeout` expired.
    pub async fn wait_idle(&self, timeout: Duration) -> bool {
        let start = tokio::time::Instant::now();
        let check_interval = Duration::from_millis(10);

        loop {
            let in_flight = self.inner.counters.in_flight.load(Ordering::Acquire);
            if in_flight == 0 {
                return true;
            }

            if start.elapsed() >= timeout {
                warn!(in_flight = in_flight, "Timed out waiting for log deliveries");
                return false;
            }

            tokio::time::sleep(check_interval).await;
        }
    }
}

impl std::fmt::Debug for DeferredScheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeferredScheduler")
            .field("closed", &self.is_closed())
            .field("stats", &self.stats())
            .finish()
    }
}

/// Keeps `in_flight` accurate even if the task panics or is aborted
///
/// A runtime that is shutting down cancels spawned tasks before their first
/// poll; such a task is counted as dropped.
struct InFlight {
    inner: Arc<Inner>,
    started: bool,
    label: String,
    endpoint: String,
}

impl InFlight {
    fn enter(inner: Arc<Inner>, task: &DeliveryTask) -> Self {
        inner.counters.in_flight.fetch_add(1, Ordering::AcqRel);
        Self {
            inner,
            started: false,
            label: task.label.clone(),
            endpoint: task.endpoint.clone(),
        }
    }
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if !self.started {
            self.inner.counters.dropped.fetch_add(1, Ordering::Relaxed);
            warn!(
                plugin = %self.label,
                target = %self.endpoint,
                "Runtime shut down, dropping log delivery"
            );
        }
        self.inner.counters.in_flight.fetch_sub(1, Ordering::AcqRel);
    }
}

async fn run(inner: &Inner, task: DeliveryTask) {
    match attempt(&inner.client, &task).await {
        Ok(()) => {
            inner.counters.delivered.fetch_add(1, Ordering::Relaxed);
            debug!(plugin = %task.label, target = %task.endpoint, bytes = task.payload.len(), "Delivered log");
        }
        Err(e) if e.payload_sent() => {
            inner.counters.delivered.fetch_add(1, Ordering::Relaxed);
            warn!(plugin = %task.label, target = %e.target(), error = %e, "Delivered log, connection not kept alive");
        }
        Err(e) => {
            inner.counters.failed.fetch_add(1, Ordering::Relaxed);
            error!(
                plugin = %task.label,
                target = %e.target(),
                kind = e.kind(),
                error = %e,
                "Failed to deliver log"
            );
        }
    }
}

async fn attempt(client: &DeliveryClient, task: &DeliveryTask) -> Result<(), DeliveryError> {
    let endpoint = resolve(&task.endpoint)?;
    let message = build(&task.method, &endpoint, &task.payload);
    client
        .deliver(&endpoint, &message, task.timeout, task.keepalive)
        .await
}
