//! Polling until a condition becomes true
//!
//! Nearly every check against the cloud is eventually consistent: a
//! server becomes active, a migration finishes, a broker node rejoins
//! the cluster. [`WaitSpec`] describes such a check and polls a probe
//! until it returns a truthy result or the timeout elapses.
//!
//! ```ignore
//! WaitSpec::new("instances to be deleted")
//!     .with_timeout(Duration::from_secs(120))
//!     .tolerate::<std::io::Error>()
//!     .wait(|| compute.all_deleted(&ids))?;
//! ```
//!
//! The probe is invoked immediately and then after every `interval`.
//! The deadline is checked after each probe before going to sleep, so a
//! wait overshoots its timeout by at most one interval. Errors raised
//! by the probe abort the wait unless their kind was declared as
//! tolerated, in which case they count as "not yet".

use std::fmt;
use std::future::Future;
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::config::WaitSettings;
use crate::error::WaitError;
use crate::remote::RemoteResult;

/// Lower bound for the polling interval
///
/// A zero interval would turn the wait into a busy loop.
pub const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Boolean-like probe results
pub trait Truthy {
    fn is_truthy(&self) -> bool;
}

impl Truthy for bool {
    fn is_truthy(&self) -> bool {
        *self
    }
}

impl Truthy for usize {
    fn is_truthy(&self) -> bool {
        *self != 0
    }
}

impl<T> Truthy for Option<T> {
    fn is_truthy(&self) -> bool {
        self.is_some()
    }
}

impl<T> Truthy for Vec<T> {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

impl<T> Truthy for [T] {
    fn is_truthy(&self) -> bool {
        !self.is_empty()
    }
}

/// A command result is truthy if the command succeeded.
impl Truthy for RemoteResult {
    fn is_truthy(&self) -> bool {
        self.is_ok()
    }
}

impl<T: Truthy + ?Sized> Truthy for &T {
    fn is_truthy(&self) -> bool {
        (**self).is_truthy()
    }
}

type Classifier = Arc<dyn Fn(&anyhow::Error) -> bool + Send + Sync>;

/// Set of error kinds which are retried instead of aborting a wait
#[derive(Clone, Default)]
pub struct Tolerated {
    names: Vec<String>,
    classifiers: Vec<Classifier>,
}

impl Tolerated {
    /// Tolerates nothing; every probe error is fatal.
    pub fn none() -> Self {
        Self::default()
    }

    /// Adds the error type `E`.
    ///
    /// An error matches if `E` occurs anywhere in its chain of causes,
    /// so context attached with [`anyhow::Context`] does not hide it.
    pub fn with<E>(mut self) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.names.push(std::any::type_name::<E>().to_owned());
        self.classifiers.push(Arc::new(|error: &anyhow::Error| {
            error.chain().any(|cause| cause.is::<E>())
        }));
        self
    }

    /// Adds all errors accepted by the given classifier.
    pub fn with_fn<F>(mut self, name: &str, classifier: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.names.push(name.to_owned());
        self.classifiers.push(Arc::new(classifier));
        self
    }

    /// Checks if the given error is tolerated.
    pub fn matches(&self, error: &anyhow::Error) -> bool {
        self.classifiers.iter().any(|classifier| classifier(error))
    }

    pub fn is_empty(&self) -> bool {
        self.classifiers.is_empty()
    }
}

impl fmt::Debug for Tolerated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(&self.names).finish()
    }
}

/// Description of one polling operation
#[derive(Clone, Debug)]
pub struct WaitSpec {
    /// What is awaited, e.g. "instances to migrate from node-1"
    pub description: String,
    pub timeout: Duration,
    pub interval: Duration,
    pub tolerated: Tolerated,
}

impl WaitSpec {
    /// Creates a [`WaitSpec`] with the default timing and no tolerated
    /// errors.
    pub fn new(description: impl Into<String>) -> Self {
        Self::with_settings(description, &WaitSettings::default())
    }

    /// Creates a [`WaitSpec`] which takes its timing from the settings.
    pub fn with_settings(description: impl Into<String>, settings: &WaitSettings) -> Self {
        WaitSpec {
            description: description.into(),
            timeout: settings.timeout(),
            interval: settings.interval(),
            tolerated: Tolerated::none(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    /// Treats errors of type `E` raised by the probe as "not yet".
    pub fn tolerate<E>(mut self) -> Self
    where
        E: std::error::Error + Send + Sync + 'static,
    {
        self.tolerated = self.tolerated.with::<E>();
        self
    }

    /// Treats errors accepted by `classifier` as "not yet".
    pub fn tolerate_if<F>(mut self, name: &str, classifier: F) -> Self
    where
        F: Fn(&anyhow::Error) -> bool + Send + Sync + 'static,
    {
        self.tolerated = self.tolerated.with_fn(name, classifier);
        self
    }

    /// Replaces the set of tolerated errors.
    pub fn with_tolerated(mut self, tolerated: Tolerated) -> Self {
        self.tolerated = tolerated;
        self
    }

    /// The interval actually slept between two probes
    pub fn effective_interval(&self) -> Duration {
        self.interval.max(MIN_INTERVAL)
    }

    /// Blocks the calling thread until the probe returns a truthy
    /// result.
    pub fn wait<P, R, E>(&self, mut probe: P) -> Result<(), WaitError>
    where
        P: FnMut() -> Result<R, E>,
        R: Truthy,
        E: Into<anyhow::Error>,
    {
        self.log_start();
        let interval = self.effective_interval();
        let start = Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            if self.evaluate(attempts, probe())? {
                self.log_success(attempts, start.elapsed());
                return Ok(());
            }
            self.check_deadline(start.elapsed(), attempts)?;
            thread::sleep(interval);
        }
    }

    /// Awaits a truthy result of the asynchronous probe.
    ///
    /// Timing is based on [`tokio::time`], so the same semantics as in
    /// [`WaitSpec::wait`] apply and a paused runtime clock is honored.
    pub async fn wait_async<P, F, R, E>(&self, mut probe: P) -> Result<(), WaitError>
    where
        P: FnMut() -> F,
        F: Future<Output = Result<R, E>>,
        R: Truthy,
        E: Into<anyhow::Error>,
    {
        self.log_start();
        let interval = self.effective_interval();
        let start = tokio::time::Instant::now();
        let mut attempts = 0;

        loop {
            attempts += 1;
            if self.evaluate(attempts, probe().await)? {
                self.log_success(attempts, start.elapsed());
                return Ok(());
            }
            self.check_deadline(start.elapsed(), attempts)?;
            tokio::time::sleep(interval).await;
        }
    }

    /// Returns `Ok(true)` if the wait is done and `Ok(false)` if the
    /// probe should be repeated.
    fn evaluate<R, E>(&self, attempt: u32, outcome: Result<R, E>) -> Result<bool, WaitError>
    where
        R: Truthy,
        E: Into<anyhow::Error>,
    {
        match outcome {
            Ok(result) => Ok(result.is_truthy()),
            Err(error) => {
                let error = error.into();
                if self.tolerated.matches(&error) {
                    warn!(
                        description = %self.description,
                        attempt,
                        "Tolerated error while waiting: {:#}",
                        error
                    );
                    Ok(false)
                } else {
                    Err(WaitError::Probe {
                        description: self.description.to_owned(),
                        error,
                    })
                }
            }
        }
    }

    fn check_deadline(&self, elapsed: Duration, attempts: u32) -> Result<(), WaitError> {
        if elapsed >= self.timeout {
            warn!(
                description = %self.description,
                attempts,
                ?elapsed,
                timeout = ?self.timeout,
                "Condition was not satisfied in time"
            );
            Err(WaitError::Timeout {
                description: self.description.to_owned(),
                elapsed,
                timeout: self.timeout,
                attempts,
            })
        } else {
            Ok(())
        }
    }

    fn log_start(&self) {
        debug!(
            description = %self.description,
            timeout = ?self.timeout,
            interval = ?self.interval,
            tolerated = ?self.tolerated,
            "Waiting"
        );
    }

    fn log_success(&self, attempts: u32, elapsed: Duration) {
        debug!(
            description = %self.description,
            attempts,
            ?elapsed,
            "Condition satisfied"
        );
    }
}

/// Blocks until `probe` returns a truthy result.
///
/// Shorthand for building a [`WaitSpec`] and calling
/// [`WaitSpec::wait`] on it.
pub fn wait<P, R, E>(
    probe: P,
    timeout: Duration,
    interval: Duration,
    description: &str,
    tolerated: &Tolerated,
) -> Result<(), WaitError>
where
    P: FnMut() -> Result<R, E>,
    R: Truthy,
    E: Into<anyhow::Error>,
{
    WaitSpec {
        description: description.to_owned(),
        timeout,
        interval,
        tolerated: tolerated.to_owned(),
    }
    .wait(probe)
}
