//! Tokio runtime wrapper and the run trigger for `portwatch`.
//!
//! The runtime owns one [`CancellationToken`] that every handle shares, so a
//! Ctrl-C watcher and the scheduling loop agree on when to stop.

use anyhow::Result;
use std::future::Future;
use std::time::Duration;
use tokio::runtime::{Builder, Handle, Runtime};
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

#[derive(Clone)]
pub struct PortwatchHandle {
    inner: Handle,
    cancel: CancellationToken,
}

pub struct PortwatchRuntime {
    runtime: Runtime,
    cancel: CancellationToken,
}

impl PortwatchRuntime {
    /// Build a multi-threaded runtime with named worker threads.
    ///
    /// ```
    /// use portwatch_runtime::PortwatchRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = PortwatchRuntime::build("doctest-runtime", Some(1))
    ///     .expect("runtime builds");
    /// let value = runtime.block_on(async { 2 + 2 });
    /// assert_eq!(value, 4);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn build(thread_name: &str, worker_threads: Option<usize>) -> Result<Self> {
        let mut builder = Builder::new_multi_thread();
        builder.enable_all().thread_name(thread_name);
        if let Some(workers) = worker_threads {
            builder.worker_threads(workers.max(1));
        }
        Ok(Self {
            runtime: builder.build()?,
            cancel: CancellationToken::new(),
        })
    }

    pub fn handle(&self) -> PortwatchHandle {
        PortwatchHandle {
            inner: self.runtime.handle().clone(),
            cancel: self.cancel.clone(),
        }
    }

    pub fn block_on<F: Future>(&self, fut: F) -> F::Output {
        self.runtime.block_on(fut)
    }

    /// Cancel outstanding work and give tasks `graceful` to wind down.
    pub fn shutdown(self, graceful: Duration) {
        self.cancel.cancel();
        self.runtime.shutdown_timeout(graceful);
    }
}

impl PortwatchHandle {
    /// Spawn a future onto the shared runtime.
    ///
    /// ```
    /// use portwatch_runtime::PortwatchRuntime;
    /// use std::time::Duration;
    ///
    /// let runtime = PortwatchRuntime::build("handle-doctest", Some(1)).unwrap();
    /// let task = runtime.handle().spawn(async { 21 * 2 });
    /// let result = runtime.block_on(async move { task.await.unwrap() });
    /// assert_eq!(result, 42);
    /// runtime.shutdown(Duration::from_millis(10));
    /// ```
    pub fn spawn<F, T>(&self, fut: F) -> JoinHandle<T>
    where
        F: Future<Output = T> + Send + 'static,
        T: Send + 'static,
    {
        self.inner.spawn(fut)
    }

    pub fn cancellation(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Cancel the shared token on the first Ctrl-C.
    ///
    /// The watcher exits quietly once the token is cancelled for any other
    /// reason.
    pub fn cancel_on_ctrl_c(&self) -> JoinHandle<()> {
        let cancel = self.cancel.clone();
        self.spawn(async move {
            tokio::select! {
                _ = cancel.cancelled() => {}
                signal = tokio::signal::ctrl_c() => {
                    match signal {
                        Ok(()) => tracing::info!("runtime.ctrl_c"),
                        Err(e) => tracing::warn!(error = %e, "runtime.ctrl_c.unavailable"),
                    }
                    cancel.cancel();
                }
            }
        })
    }
}

/// When snapshot runs happen.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Trigger {
    Once,
    /// First run immediately, then one run per period. A run that overruns
    /// its period delays the next one instead of queueing a burst.
    Every(Duration),
}

impl Trigger {
    pub fn from_secs(every: Option<u64>) -> Self {
        match every {
            Some(secs) if secs > 0 => Trigger::Every(Duration::from_secs(secs)),
            _ => Trigger::Once,
        }
    }
}

/// Drive `job` according to `trigger` until it is done or `cancel` fires.
///
/// `job` receives the 1-based run number. Returns the number of runs that
/// completed; the first job error ends the loop and is returned. A run in
/// flight when `cancel` fires is dropped at its next await point.
///
/// ```
/// use portwatch_runtime::{Trigger, run_scheduled};
/// use tokio_util::sync::CancellationToken;
///
/// # tokio::runtime::Runtime::new().unwrap().block_on(async {
/// let cancel = CancellationToken::new();
/// let runs = run_scheduled(Trigger::Once, &cancel, |_| async { Ok(()) })
///     .await
///     .unwrap();
/// assert_eq!(runs, 1);
/// # });
/// ```
pub async fn run_scheduled<F, Fut>(
    trigger: Trigger,
    cancel: &CancellationToken,
    mut job: F,
) -> Result<u64>
where
    F: FnMut(u64) -> Fut,
    Fut: Future<Output = Result<()>>,
{
    let period = match trigger {
        Trigger::Once => {
            if cancel.is_cancelled() {
                return Ok(0);
            }
            job(1).await?;
            return Ok(1);
        }
        Trigger::Every(period) => period,
    };

    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
    let mut runs = 0u64;
    loop {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(runs, "runtime.schedule.cancelled");
                return Ok(runs);
            }
            _ = ticker.tick() => {}
        }

        runs += 1;
        tokio::select! {
            biased;
            _ = cancel.cancelled() => {
                tracing::info!(run = runs, "runtime.schedule.cancelled_mid_run");
                return Ok(runs - 1);
            }
            outcome = job(runs) => outcome?,
        }
        tracing::debug!(run = runs, next_in_secs = period.as_secs(), "runtime.schedule.idle");
    }
}
