//! Duplicate-fund warning delivery.
//!
//! # Responsibility
//! - Carry duplicate warnings from the write path to listeners through a
//!   bounded queue drained by a dedicated worker thread.
//!
//! # Invariants
//! - Enqueueing never blocks; a full or closed queue is reported to the
//!   caller, which logs and moves on.
//! - Listener failures stay inside the worker and are retried a bounded
//!   number of times, so a warning may be delivered more than once.
//! - The worker exits after every `DuplicateNotifier` clone is dropped and the
//!   queue is drained.

mod listeners;

pub use listeners::{LogWarningListener, SqliteWarningListener};

use crate::model::fund::{FundId, FundManagerId, FundRecord};
use crate::repo::fund_repo::RepoError;
use chrono::Utc;
use crossbeam_channel::{bounded, Receiver, Sender, TrySendError};
use log::{debug, error, info, warn};
use serde::{Deserialize, Serialize};
use std::error::Error;
use std::fmt::{Display, Formatter};
use std::thread::JoinHandle;
use std::time::Duration;
use uuid::Uuid;

const WORKER_THREAD_NAME: &str = "fund-duplicate-notifier";
const MAX_DELIVERY_ATTEMPTS: u32 = 3;
const RETRY_BACKOFF: Duration = Duration::from_millis(50);

/// Warning raised when a newly created fund may duplicate an existing one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DuplicateFundWarning {
    /// Unique per warning; lets listeners drop redeliveries.
    pub event_id: Uuid,
    pub fund_id: FundId,
    pub fund_name: String,
    pub fund_manager_id: Option<FundManagerId>,
    /// Epoch milliseconds.
    pub detected_at: i64,
}

impl DuplicateFundWarning {
    pub fn for_fund(record: &FundRecord) -> Self {
        Self {
            event_id: Uuid::new_v4(),
            fund_id: record.fund.id,
            fund_name: record.fund.name.clone(),
            fund_manager_id: record.fund.fund_manager_id,
            detected_at: Utc::now().timestamp_millis(),
        }
    }

    /// Human-readable summary for logs and alerts.
    pub fn message(&self) -> String {
        let manager = self
            .fund_manager_id
            .map_or_else(|| "none".to_string(), |id| id.to_string());
        format!(
            "potential duplicate for fund '{}' with manager {} detected",
            self.fund_name, manager
        )
    }
}

/// Enqueue or worker lifecycle failure.
#[derive(Debug)]
pub enum NotifyError {
    QueueFull { fund_id: FundId },
    Disconnected { fund_id: FundId },
    Spawn(std::io::Error),
    WorkerPanicked,
}

impl Display for NotifyError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::QueueFull { fund_id } => {
                write!(f, "warning queue full; dropped warning for fund {fund_id}")
            }
            Self::Disconnected { fund_id } => write!(
                f,
                "warning worker stopped; dropped warning for fund {fund_id}"
            ),
            Self::Spawn(err) => write!(f, "failed to start warning worker: {err}"),
            Self::WorkerPanicked => write!(f, "warning worker panicked"),
        }
    }
}

impl Error for NotifyError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Spawn(err) => Some(err),
            _ => None,
        }
    }
}

/// Failure reported by a listener for one warning.
#[derive(Debug)]
pub enum ListenerError {
    Repo(RepoError),
    Other(String),
}

impl Display for ListenerError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Repo(err) => write!(f, "{err}"),
            Self::Other(message) => write!(f, "{message}"),
        }
    }
}

impl Error for ListenerError {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Repo(err) => Some(err),
            Self::Other(_) => None,
        }
    }
}

impl From<RepoError> for ListenerError {
    fn from(value: RepoError) -> Self {
        Self::Repo(value)
    }
}

/// Consumer of duplicate warnings, run on the worker thread.
pub trait WarningListener: Send + 'static {
    fn on_warning(&mut self, warning: &DuplicateFundWarning) -> Result<(), ListenerError>;
}

/// Producer side of the warning queue.
#[derive(Debug, Clone)]
pub struct DuplicateNotifier {
    sender: Sender<DuplicateFundWarning>,
}

impl DuplicateNotifier {
    /// Enqueues one warning without blocking.
    pub fn notify(&self, warning: DuplicateFundWarning) -> Result<(), NotifyError> {
        let fund_id = warning.fund_id;
        match self.sender.try_send(warning) {
            Ok(()) => {
                debug!("event=duplicate_warning_enqueue module=notify status=ok fund_id={fund_id}");
                Ok(())
            }
            Err(TrySendError::Full(_)) => Err(NotifyError::QueueFull { fund_id }),
            Err(TrySendError::Disconnected(_)) => Err(NotifyError::Disconnected { fund_id }),
        }
    }
}

/// Delivery counters reported when the worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DeliveryStats {
    pub delivered: u64,
    /// Warnings given up on after the last attempt failed.
    pub dropped: u64,
}

/// Join handle for the worker; gives the listener back on shutdown.
pub struct NotifierHandle<L> {
    worker: JoinHandle<(L, DeliveryStats)>,
}

impl<L> NotifierHandle<L> {
    /// Waits until every notifier is dropped and the queue is drained.
    pub fn join(self) -> Result<(L, DeliveryStats), NotifyError> {
        self.worker.join().map_err(|_| NotifyError::WorkerPanicked)
    }
}

/// Starts the warning worker with a queue of `capacity` pending warnings.
pub fn spawn_notifier<L: WarningListener>(
    capacity: usize,
    listener: L,
) -> Result<(DuplicateNotifier, NotifierHandle<L>), NotifyError> {
    let (sender, receiver) = bounded(capacity);
    let worker = std::thread::Builder::new()
        .name(WORKER_THREAD_NAME.to_string())
        .spawn(move || run_worker(receiver, listener))
        .map_err(NotifyError::Spawn)?;

    info!("event=notifier_start module=notify status=ok capacity={capacity}");
    Ok((DuplicateNotifier { sender }, NotifierHandle { worker }))
}

fn run_worker<L: WarningListener>(
    receiver: Receiver<DuplicateFundWarning>,
    mut listener: L,
) -> (L, DeliveryStats) {
    let mut stats = DeliveryStats::default();
    for warning in receiver.iter() {
        if deliver(&mut listener, &warning) {
            stats.delivered += 1;
        } else {
            stats.dropped += 1;
        }
    }

    info!(
        "event=notifier_stop module=notify status=ok delivered={} dropped={}",
        stats.delivered, stats.dropped
    );
    (listener, stats)
}

fn deliver<L: WarningListener>(listener: &mut L, warning: &DuplicateFundWarning) -> bool {
    for attempt in 1..=MAX_DELIVERY_ATTEMPTS {
        match listener.on_warning(warning) {
            Ok(()) => return true,
            Err(err) if attempt < MAX_DELIVERY_ATTEMPTS => {
                warn!(
                    "event=duplicate_warning_deliver module=notify status=retry event_id={} fund_id={} attempt={attempt} error={err}",
                    warning.event_id, warning.fund_id
                );
                std::thread::sleep(RETRY_BACKOFF * attempt);
            }
            Err(err) => {
                error!(
                    "event=duplicate_warning_deliver module=notify status=error event_id={} fund_id={} attempt={attempt} error_code=delivery_failed error={err}",
                    warning.event_id, warning.fund_id
                );
            }
        }
    }
    false
}
