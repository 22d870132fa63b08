//! Live job updates.
//!
//! Every subscriber gets its own single-slot [`watch`] channel, so a slow
//! reader only ever sees the newest job state. Subscribers whose receiver
//! has been dropped are pruned on the next publish.

use std::collections::HashMap;
use std::sync::Mutex;

use tokio::sync::watch;
use uuid::Uuid;

use crate::domain::Job;

type Slot = watch::Sender<Option<Job>>;

#[derive(Default)]
struct Subscribers {
    all: Vec<Slot>,
    by_job: HashMap<Uuid, Vec<Slot>>,
}

/// Fan-out point for job updates
#[derive(Default)]
pub struct UpdateHub {
    subscribers: Mutex<Subscribers>,
}

impl UpdateHub {
    pub fn new() -> Self {
        Self::default()
    }

    /// Receive updates for every job
    pub fn subscribe_all(&self) -> JobUpdates {
        let (tx, rx) = watch::channel(None);
        self.lock().all.push(tx);
        JobUpdates { rx }
    }

    /// Receive updates for one job
    pub fn subscribe(&self, job_id: Uuid) -> JobUpdates {
        let (tx, rx) = watch::channel(None);
        self.lock().by_job.entry(job_id).or_default().push(tx);
        JobUpdates { rx }
    }

    /// Deliver a job snapshot to all interested subscribers
    pub fn publish(&self, job: &Job) {
        let mut subs = self.lock();
        subs.all.retain(|tx| tx.send(Some(job.clone())).is_ok());
        if let Some(slots) = subs.by_job.get_mut(&job.id) {
            slots.retain(|tx| tx.send(Some(job.clone())).is_ok());
            if slots.is_empty() {
                subs.by_job.remove(&job.id);
            }
        }
    }

    /// Number of live subscribers (all-jobs plus per-job)
    pub fn subscriber_count(&self) -> usize {
        let subs = self.lock();
        subs.all.len() + subs.by_job.values().map(Vec::len).sum::<usize>()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        // A panic while holding the lock cannot leave the lists inconsistent
        self.subscribers
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Receiving end of a subscription
pub struct JobUpdates {
    rx: watch::Receiver<Option<Job>>,
}

impl JobUpdates {
    /// Wait for the next update. Returns `None` once the hub is gone.
    ///
    /// Updates published while the caller was busy collapse into the latest.
    pub async fn next(&mut self) -> Option<Job> {
        loop {
            self.rx.changed().await.ok()?;
            if let Some(job) = self.rx.borrow_and_update().clone() {
                return Some(job);
            }
        }
    }

    /// Most recent update without waiting
    pub fn latest(&self) -> Option<Job> {
        self.rx.borrow().clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::{JobConfig, JobStatus};

    #[tokio::test]
    async fn test_subscriber_sees_latest_state() {
        let hub = UpdateHub::new();
        let mut updates = hub.subscribe_all();

        let mut job = Job::new(JobConfig::default());
        hub.publish(&job);
        job.transition(JobStatus::Processing).unwrap();
        hub.publish(&job);

        // Two publishes collapse into one pending update
        let seen = updates.next().await.unwrap();
        assert_eq!(seen.status, JobStatus::Processing);
        assert!(tokio::time::timeout(std::time::Duration::from_millis(20), updates.next())
            .await
            .is_err());
    }

    #[tokio::test]
    async fn test_per_job_subscription_filters() {
        let hub = UpdateHub::new();
        let first = Job::new(JobConfig::default());
        let second = Job::new(JobConfig::default());
        let mut updates = hub.subscribe(first.id);

        hub.publish(&second);
        assert!(updates.latest().is_none());

        hub.publish(&first);
        assert_eq!(updates.next().await.unwrap().id, first.id);
    }

    #[test]
    fn test_dropped_subscribers_are_pruned() {
        let hub = UpdateHub::new();
        let job = Job::new(JobConfig::default());
        let kept = hub.subscribe_all();
        drop(hub.subscribe_all());
        drop(hub.subscribe(job.id));
        assert_eq!(hub.subscriber_count(), 3);

        hub.publish(&job);
        assert_eq!(hub.subscriber_count(), 1);
        assert_eq!(kept.latest().unwrap().id, job.id);
    }
}
