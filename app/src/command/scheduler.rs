use std::collections::HashMap;
use std::future::Future;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::task::{AbortHandle, JoinHandle};
use tracing::Instrument as _;

use crate::core::time::DateTime;

pub type ActionId = u64;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, derive_more::Display)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    PowerOn,
    PowerOff,
    AuxCommand,
    PrinterConnect,
    ThermalCheck,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PendingAction {
    pub id: ActionId,
    pub target_address: Option<String>,
    pub kind: ActionKind,
    pub fire_at: DateTime,
}

struct PendingEntry {
    action: PendingAction,
    abort: AbortHandle,
}

#[derive(Default)]
struct SchedulerState {
    next_id: AtomicU64,
    pending: Mutex<HashMap<ActionId, PendingEntry>>,
}

impl SchedulerState {
    fn pending(&self) -> MutexGuard<'_, HashMap<ActionId, PendingEntry>> {
        self.pending.lock().unwrap_or_else(PoisonError::into_inner)
    }

    //whoever removes the entry owns the action: the timer fires it, cancel drops it
    fn claim(&self, id: ActionId) -> Option<PendingEntry> {
        self.pending().remove(&id)
    }
}

/// Runs delayed one-shot actions on their own tasks.
///
/// Every action is spawned, also with a zero delay, so the caller never executes it inline.
/// Firing and cancellation both go through [`SchedulerState::claim`], exactly one of them wins.
#[derive(Clone, Default)]
pub struct ActionScheduler {
    state: Arc<SchedulerState>,
}

pub struct ActionHandle {
    id: ActionId,
    task: JoinHandle<()>,
}

impl ActionScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn schedule<F>(&self, delay: Duration, kind: ActionKind, target: Option<&str>, action: F) -> ActionHandle
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let id = self.state.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        let pending_action = PendingAction {
            id,
            target_address: target.map(str::to_owned),
            kind,
            fire_at: DateTime::now() + delay,
        };

        tracing::debug!(
            "Scheduling {} #{} for {:?} in {:?} at {}",
            kind,
            id,
            pending_action.target_address,
            delay,
            pending_action.fire_at
        );

        let state = self.state.clone();
        let task = async move {
            tokio::time::sleep(delay).await;

            if state.claim(id).is_none() {
                return;
            }

            tracing::debug!("Firing {} #{}", kind, id);
            action.await;
        };

        //hold the lock while spawning so the task cannot claim before the entry exists
        let mut pending = self.state.pending();
        let task = tokio::spawn(task.in_current_span());
        pending.insert(
            id,
            PendingEntry {
                action: pending_action,
                abort: task.abort_handle(),
            },
        );
        drop(pending);

        ActionHandle { id, task }
    }

    /// Cancels a not yet fired action. Returns false if it already fired or was cancelled.
    pub fn cancel(&self, id: ActionId) -> bool {
        match self.state.claim(id) {
            Some(entry) => {
                entry.abort.abort();
                tracing::debug!("Cancelled {} #{}", entry.action.kind, id);
                true
            }
            None => false,
        }
    }

    /// Cancels every outstanding action targeting `address`.
    pub fn cancel_for(&self, address: &str) -> usize {
        let ids: Vec<ActionId> = self
            .state
            .pending()
            .values()
            .filter(|entry| entry.action.target_address.as_deref() == Some(address))
            .map(|entry| entry.action.id)
            .collect();

        ids.into_iter().filter(|id| self.cancel(*id)).count()
    }

    pub fn pending(&self) -> Vec<PendingAction> {
        let mut actions: Vec<PendingAction> = self
            .state
            .pending()
            .values()
            .map(|entry| entry.action.clone())
            .collect();

        actions.sort_by(|a, b| a.fire_at.cmp(&b.fire_at).then(a.id.cmp(&b.id)));
        actions
    }
}

impl ActionHandle {
    pub fn id(&self) -> ActionId {
        self.id
    }

    /// Waits until the action has run or was cancelled.
    pub async fn finished(self) {
        if let Err(e) = self.task.await {
            if !e.is_cancelled() {
                tracing::error!("Scheduled action #{} panicked: {}", self.id, e);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicBool, AtomicUsize};

    use super::*;

    fn flag_action(flag: &Arc<AtomicBool>) -> impl Future<Output = ()> + Send + 'static {
        let flag = flag.clone();
        async move {
            flag.store(true, Ordering::SeqCst);
        }
    }

    #[tokio::test]
    async fn zero_delay_is_not_run_inline() {
        let scheduler = ActionScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let handle = scheduler.schedule(Duration::ZERO, ActionKind::ThermalCheck, None, flag_action(&fired));

        assert!(!fired.load(Ordering::SeqCst));

        handle.finished().await;
        assert!(fired.load(Ordering::SeqCst));
    }

    #[tokio::test(start_paused = true)]
    async fn fires_once_after_delay() {
        let scheduler = ActionScheduler::new();
        let count = Arc::new(AtomicUsize::new(0));

        let counter = count.clone();
        let handle = scheduler.schedule(Duration::from_secs(5), ActionKind::PowerOn, Some("10.0.0.5"), async move {
            counter.fetch_add(1, Ordering::SeqCst);
        });

        tokio::time::sleep(Duration::from_secs(4)).await;
        assert_eq!(count.load(Ordering::SeqCst), 0);
        assert_eq!(scheduler.pending().len(), 1);

        handle.finished().await;
        assert_eq!(count.load(Ordering::SeqCst), 1);
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancelled_action_never_runs() {
        let scheduler = ActionScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let handle = scheduler.schedule(
            Duration::from_secs(5),
            ActionKind::PowerOff,
            Some("10.0.0.5"),
            flag_action(&fired),
        );

        assert!(scheduler.cancel(handle.id()));
        assert!(!scheduler.cancel(handle.id()));

        tokio::time::sleep(Duration::from_secs(10)).await;
        assert!(!fired.load(Ordering::SeqCst));
        assert!(scheduler.pending().is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_after_firing_reports_false() {
        let scheduler = ActionScheduler::new();
        let fired = Arc::new(AtomicBool::new(false));

        let handle = scheduler.schedule(Duration::from_secs(1), ActionKind::AuxCommand, None, flag_action(&fired));
        let id = handle.id();
        handle.finished().await;

        assert!(fired.load(Ordering::SeqCst));
        assert!(!scheduler.cancel(id));
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_for_only_hits_target_address() {
        let scheduler = ActionScheduler::new();
        let delay = Duration::from_secs(30);

        scheduler.schedule(delay, ActionKind::PowerOn, Some("a"), async {});
        scheduler.schedule(delay, ActionKind::AuxCommand, Some("a"), async {});
        scheduler.schedule(delay, ActionKind::PowerOn, Some("b"), async {});

        assert_eq!(scheduler.cancel_for("a"), 2);

        let pending = scheduler.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].target_address.as_deref(), Some("b"));
    }

    #[tokio::test(start_paused = true)]
    async fn pending_is_ordered_by_fire_time() {
        let scheduler = ActionScheduler::new();

        scheduler.schedule(Duration::from_secs(20), ActionKind::PowerOff, Some("late"), async {});
        scheduler.schedule(Duration::from_secs(10), ActionKind::PowerOn, Some("early"), async {});

        let targets: Vec<_> = scheduler
            .pending()
            .into_iter()
            .map(|action| action.target_address.unwrap())
            .collect();

        assert_eq!(targets, vec!["early", "late"]);
    }
}
