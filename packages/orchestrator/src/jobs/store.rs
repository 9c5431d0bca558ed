//! In-memory job storage.
//!
//! All tables live behind one `RwLock`, so every mutation is atomic and
//! every snapshot read is consistent. Progress writes are monotonic: a
//! lower percentage never overwrites a higher one.

use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::RwLock;

use chrono::{DateTime, Utc};
use serde::Serialize;
use uuid::Uuid;

use super::events::ProgressEvent;
use super::job::{Job, JobStatus};
use super::node::NodeExecution;

/// Counts of jobs by state, for monitoring.
#[derive(Debug, Clone, Default, Serialize)]
pub struct QueueStats {
    pub queued: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub cancelled: usize,
    pub total_jobs: usize,
    pub capacity: usize,
}

#[derive(Default)]
struct Inner {
    jobs: HashMap<Uuid, Job>,
    nodes: HashMap<Uuid, NodeExecution>,
    job_nodes: HashMap<Uuid, Vec<Uuid>>,
    events: HashMap<Uuid, VecDeque<ProgressEvent>>,
    queue: Vec<Uuid>,
    running: HashSet<Uuid>,
}

/// In-memory store for jobs, node executions, and progress logs.
///
/// Data is lost on restart; the queue holds job ids ordered by
/// (priority, scheduled time).
pub struct MemoryStore {
    inner: RwLock<Inner>,
    queue_capacity: usize,
    event_retention: usize,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::with_limits(100, 100)
    }

    pub fn with_limits(queue_capacity: usize, event_retention: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            queue_capacity,
            event_retention,
        }
    }

    // ------------------------------------------------------------------
    // Jobs
    // ------------------------------------------------------------------

    /// Insert a new job. Returns false if the id already exists.
    pub fn insert_job(&self, job: Job) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.jobs.contains_key(&job.id) {
            return false;
        }
        inner.jobs.insert(job.id, job);
        true
    }

    pub fn job(&self, job_id: Uuid) -> Option<Job> {
        self.inner.read().unwrap().jobs.get(&job_id).cloned()
    }

    /// Remove a job record with its node records and event log. The job
    /// must not be queued or running.
    pub fn remove_job(&self, job_id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap();
        if inner.queue.contains(&job_id) || inner.running.contains(&job_id) {
            return false;
        }
        let removed = inner.jobs.remove(&job_id).is_some();
        if removed {
            inner.events.remove(&job_id);
            if let Some(node_ids) = inner.job_nodes.remove(&job_id) {
                for node_id in node_ids {
                    inner.nodes.remove(&node_id);
                }
            }
        }
        removed
    }

    /// Apply a mutation to a job. Returns false if the job is unknown.
    pub fn update_job<F: FnOnce(&mut Job)>(&self, job_id: Uuid, f: F) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.jobs.get_mut(&job_id) {
            Some(job) => {
                f(job);
                true
            }
            None => false,
        }
    }

    /// Raise a job's progress (never lowers it) and optionally set the
    /// phase. Returns the progress now recorded on the job.
    pub fn update_progress(&self, job_id: Uuid, percentage: f64, phase: Option<&str>) -> f64 {
        let mut inner = self.inner.write().unwrap();
        let Some(job) = inner.jobs.get_mut(&job_id) else {
            return 0.0;
        };
        let percentage = percentage.clamp(0.0, 100.0);
        if percentage > job.progress_percentage {
            job.progress_percentage = percentage;
        }
        if let Some(phase) = phase {
            job.current_phase = phase.to_string();
        }
        job.progress_percentage
    }

    // ------------------------------------------------------------------
    // Node executions
    // ------------------------------------------------------------------

    pub fn insert_node(&self, node: NodeExecution) {
        let mut inner = self.inner.write().unwrap();
        inner.job_nodes.entry(node.job_id).or_default().push(node.id);
        inner.nodes.insert(node.id, node);
    }

    pub fn node(&self, node_id: Uuid) -> Option<NodeExecution> {
        self.inner.read().unwrap().nodes.get(&node_id).cloned()
    }

    /// Apply a mutation to a node execution. Terminal records are
    /// immutable; writes against them are dropped.
    pub fn update_node<F: FnOnce(&mut NodeExecution)>(&self, node_id: Uuid, f: F) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.nodes.get_mut(&node_id) {
            Some(node) if !node.is_terminal() => {
                f(node);
                true
            }
            _ => false,
        }
    }

    /// Node executions for a job, in creation order.
    pub fn nodes_for_job(&self, job_id: Uuid) -> Vec<NodeExecution> {
        let inner = self.inner.read().unwrap();
        inner
            .job_nodes
            .get(&job_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.nodes.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Progress events
    // ------------------------------------------------------------------

    pub fn append_event(&self, event: ProgressEvent) {
        let mut inner = self.inner.write().unwrap();
        let log = inner.events.entry(event.job_id).or_default();
        log.push_back(event);
        while log.len() > self.event_retention {
            log.pop_front();
        }
    }

    /// The latest `limit` events for a job, oldest first.
    pub fn events_for_job(&self, job_id: Uuid, limit: usize) -> Vec<ProgressEvent> {
        let inner = self.inner.read().unwrap();
        inner
            .events
            .get(&job_id)
            .map(|log| {
                let skip = log.len().saturating_sub(limit);
                log.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default()
    }

    // ------------------------------------------------------------------
    // Queue
    // ------------------------------------------------------------------

    /// Add a job to the queue. Returns false when the queue is full, the
    /// job is unknown or terminal, or it is already queued or running.
    pub fn enqueue(&self, job_id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap();
        let inner = &mut *inner;

        if inner.queue.len() >= self.queue_capacity {
            return false;
        }
        if inner.queue.contains(&job_id) || inner.running.contains(&job_id) {
            return false;
        }
        let Some(job) = inner.jobs.get(&job_id) else {
            return false;
        };
        if job.is_terminal() {
            return false;
        }

        inner.queue.push(job_id);
        let jobs = &inner.jobs;
        // stable sort keeps FIFO order within a priority band
        inner.queue.sort_by_key(|id| {
            jobs.get(id)
                .map(|j| (j.priority.as_i16(), j.scheduled_at.unwrap_or(j.created_at)))
                .unwrap_or((i16::MAX, DateTime::<Utc>::MAX_UTC))
        });
        true
    }

    /// Claim the next due job for a worker, marking it running.
    pub fn claim_next(&self, worker_id: &str) -> Option<Job> {
        let now = Utc::now();
        let mut inner = self.inner.write().unwrap();
        let inner = &mut *inner;

        let position = inner
            .queue
            .iter()
            .position(|id| inner.jobs.get(id).map(|j| j.is_due(now)).unwrap_or(false))?;
        let job_id = inner.queue.remove(position);
        inner.running.insert(job_id);

        let job = inner.jobs.get_mut(&job_id)?;
        job.status = JobStatus::Running;
        job.worker_id = Some(worker_id.to_string());
        job.started_at = Some(now);
        Some(job.clone())
    }

    /// Remove a pending job from the queue. Returns false if not queued.
    pub fn remove_pending(&self, job_id: Uuid) -> bool {
        let mut inner = self.inner.write().unwrap();
        match inner.queue.iter().position(|id| *id == job_id) {
            Some(position) => {
                inner.queue.remove(position);
                true
            }
            None => false,
        }
    }

    /// Drop a job from the running set once its run is over.
    pub fn finish(&self, job_id: Uuid) {
        self.inner.write().unwrap().running.remove(&job_id);
    }

    pub fn is_running(&self, job_id: Uuid) -> bool {
        self.inner.read().unwrap().running.contains(&job_id)
    }

    pub fn stats(&self) -> QueueStats {
        let inner = self.inner.read().unwrap();
        let mut stats = QueueStats {
            queued: inner.queue.len(),
            running: inner.running.len(),
            total_jobs: inner.jobs.len(),
            capacity: self.queue_capacity,
            ..Default::default()
        };
        for job in inner.jobs.values() {
            match job.status {
                JobStatus::Completed => stats.completed += 1,
                JobStatus::Failed => stats.failed += 1,
                JobStatus::Cancelled => stats.cancelled += 1,
                _ => {}
            }
        }
        stats
    }

    // ------------------------------------------------------------------
    // Snapshots and retention
    // ------------------------------------------------------------------

    /// Consistent snapshot of a job with its nodes and recent events,
    /// taken under a single lock acquisition.
    pub fn job_snapshot(
        &self,
        job_id: Uuid,
        event_limit: usize,
    ) -> Option<(Job, Vec<NodeExecution>, Vec<ProgressEvent>)> {
        let inner = self.inner.read().unwrap();
        let job = inner.jobs.get(&job_id)?.clone();
        let nodes = inner
            .job_nodes
            .get(&job_id)
            .map(|ids| {
                ids.iter()
                    .filter_map(|id| inner.nodes.get(id).cloned())
                    .collect()
            })
            .unwrap_or_default();
        let events = inner
            .events
            .get(&job_id)
            .map(|log| {
                let skip = log.len().saturating_sub(event_limit);
                log.iter().skip(skip).cloned().collect()
            })
            .unwrap_or_default();
        Some((job, nodes, events))
    }

    /// Remove terminal jobs that finished before the cutoff, with their
    /// node records and event logs. Returns the number removed.
    pub fn cleanup_completed(&self, older_than: chrono::Duration) -> usize {
        let cutoff = Utc::now() - older_than;
        let mut inner = self.inner.write().unwrap();
        let inner = &mut *inner;

        let stale: Vec<Uuid> = inner
            .jobs
            .values()
            .filter(|j| j.is_terminal() && j.completed_at.map(|t| t < cutoff).unwrap_or(false))
            .map(|j| j.id)
            .collect();

        for job_id in &stale {
            inner.jobs.remove(job_id);
            inner.events.remove(job_id);
            if let Some(node_ids) = inner.job_nodes.remove(job_id) {
                for node_id in node_ids {
                    inner.nodes.remove(&node_id);
                }
            }
        }
        stale.len()
    }

    pub fn job_count(&self) -> usize {
        self.inner.read().unwrap().jobs.len()
    }

    pub fn clear(&self) {
        let mut inner = self.inner.write().unwrap();
        *inner = Inner::default();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::jobs::job::JobPriority;

    fn job_with_priority(priority: JobPriority) -> Job {
        Job::builder()
            .url("https://example.com/p")
            .priority(priority)
            .build()
    }

    #[test]
    fn claim_follows_priority_order() {
        let store = MemoryStore::new();
        let low = job_with_priority(JobPriority::Low);
        let normal = job_with_priority(JobPriority::Normal);
        let urgent = job_with_priority(JobPriority::Urgent);
        let (low_id, normal_id, urgent_id) = (low.id, normal.id, urgent.id);

        for job in [low, normal, urgent] {
            assert!(store.insert_job(job));
        }
        for id in [low_id, normal_id, urgent_id] {
            assert!(store.enqueue(id));
        }

        assert_eq!(store.claim_next("w").unwrap().id, urgent_id);
        assert_eq!(store.claim_next("w").unwrap().id, normal_id);
        assert_eq!(store.claim_next("w").unwrap().id, low_id);
        assert!(store.claim_next("w").is_none());
    }

    #[test]
    fn enqueue_rejects_duplicates_and_running_jobs() {
        let store = MemoryStore::new();
        let job = Job::for_url("https://example.com/p");
        let job_id = job.id;
        store.insert_job(job);

        assert!(store.enqueue(job_id));
        assert!(!store.enqueue(job_id));

        let claimed = store.claim_next("w").unwrap();
        assert_eq!(claimed.id, job_id);
        assert!(!store.enqueue(job_id));

        store.finish(job_id);
        assert!(store.enqueue(job_id));
    }

    #[test]
    fn enqueue_respects_capacity() {
        let store = MemoryStore::with_limits(1, 100);
        let first = Job::for_url("https://example.com/1");
        let second = Job::for_url("https://example.com/2");
        let (first_id, second_id) = (first.id, second.id);
        store.insert_job(first);
        store.insert_job(second);

        assert!(store.enqueue(first_id));
        assert!(!store.enqueue(second_id));
    }

    #[test]
    fn future_scheduled_jobs_are_held_back() {
        let store = MemoryStore::new();
        let mut job = Job::for_url("https://example.com/p");
        job.scheduled_at = Some(Utc::now() + chrono::Duration::hours(1));
        let job_id = job.id;
        store.insert_job(job);
        store.enqueue(job_id);

        assert!(store.claim_next("w").is_none());
        // still queued
        assert_eq!(store.stats().queued, 1);
    }

    #[test]
    fn progress_never_decreases() {
        let store = MemoryStore::new();
        let job = Job::for_url("https://example.com/p");
        let job_id = job.id;
        store.insert_job(job);

        assert_eq!(store.update_progress(job_id, 40.0, None), 40.0);
        assert_eq!(store.update_progress(job_id, 25.0, None), 40.0);
        assert_eq!(store.update_progress(job_id, 80.0, Some("merging_data")), 80.0);
        assert_eq!(store.job(job_id).unwrap().current_phase, "merging_data");
    }

    #[test]
    fn progress_is_clamped_to_100() {
        let store = MemoryStore::new();
        let job = Job::for_url("https://example.com/p");
        let job_id = job.id;
        store.insert_job(job);

        assert_eq!(store.update_progress(job_id, 250.0, None), 100.0);
    }

    #[test]
    fn event_log_is_capped() {
        let store = MemoryStore::with_limits(100, 3);
        let job = Job::for_url("https://example.com/p");
        let job_id = job.id;
        store.insert_job(job);

        for i in 0..5 {
            store.append_event(ProgressEvent::new(
                job_id,
                crate::jobs::events::ProgressEventType::NodeStarted,
                format!("event {i}"),
                i as f64,
            ));
        }

        let events = store.events_for_job(job_id, 10);
        assert_eq!(events.len(), 3);
        assert_eq!(events[0].message, "event 2");
        assert_eq!(events[2].message, "event 4");
    }

    #[test]
    fn terminal_nodes_are_immutable() {
        let store = MemoryStore::new();
        let job = Job::for_url("https://example.com/p");
        let job_id = job.id;
        store.insert_job(job);

        let mut node = crate::jobs::node::NodeExecution::new(job_id, extraction::NodeType::BasicInfo);
        node.status = crate::jobs::node::NodeStatus::Completed;
        let node_id = node.id;
        store.insert_node(node);

        let applied = store.update_node(node_id, |n| n.retry_count = 99);
        assert!(!applied);
        assert_eq!(store.node(node_id).unwrap().retry_count, 0);
    }

    #[test]
    fn cleanup_removes_old_terminal_jobs() {
        let store = MemoryStore::new();
        let mut done = Job::for_url("https://example.com/done");
        done.status = JobStatus::Completed;
        done.completed_at = Some(Utc::now() - chrono::Duration::hours(2));
        let done_id = done.id;

        let active = Job::for_url("https://example.com/active");
        let active_id = active.id;

        store.insert_job(done);
        store.insert_job(active);

        let removed = store.cleanup_completed(chrono::Duration::hours(1));
        assert_eq!(removed, 1);
        assert!(store.job(done_id).is_none());
        assert!(store.job(active_id).is_some());
    }
}
