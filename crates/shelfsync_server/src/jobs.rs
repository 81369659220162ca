//! Bounded history of triggered sync jobs.

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use shelfsync_engine::{SyncCycleResult, SyncResult};
use shelfsync_protocol::{PullSyncResponse, PushSyncResponse, StoreId, SyncType, Timestamp};
use std::collections::{HashMap, VecDeque};
use uuid::Uuid;

/// Lifecycle of a job.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobState {
    /// Accepted, not started.
    Queued,
    /// Cycle in progress.
    Running,
    /// Cycle finished.
    Completed,
    /// Cycle ended with an error.
    Failed,
}

impl JobState {
    /// Returns true once the job can no longer change.
    pub fn is_finished(&self) -> bool {
        matches!(self, JobState::Completed | JobState::Failed)
    }
}

/// One triggered sync cycle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobRecord {
    /// Job id returned by the trigger.
    pub job_id: Uuid,
    /// Store being synced.
    pub store_id: StoreId,
    /// Cycle kind.
    #[serde(rename = "type")]
    pub sync_type: SyncType,
    /// Current state.
    pub state: JobState,
    /// Pull stats, once the pull phase ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pull: Option<PullSyncResponse>,
    /// Push stats, once the push phase ran.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub push: Option<PushSyncResponse>,
    /// Error that ended a failed job.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Trigger time.
    pub created_at: Timestamp,
    /// Start of the cycle.
    #[serde(default)]
    pub started_at: Option<Timestamp>,
    /// End of the cycle.
    #[serde(default)]
    pub finished_at: Option<Timestamp>,
}

#[derive(Default)]
struct Jobs {
    order: VecDeque<Uuid>,
    records: HashMap<Uuid, JobRecord>,
}

/// Keeps the most recent `capacity` jobs; older ones are forgotten.
pub struct JobRegistry {
    capacity: usize,
    jobs: Mutex<Jobs>,
}

impl JobRegistry {
    /// Creates a registry remembering up to `capacity` jobs.
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            jobs: Mutex::new(Jobs::default()),
        }
    }

    /// Records a new queued job.
    pub fn create(&self, store_id: StoreId, sync_type: SyncType, now: Timestamp) -> JobRecord {
        let record = JobRecord {
            job_id: Uuid::new_v4(),
            store_id,
            sync_type,
            state: JobState::Queued,
            pull: None,
            push: None,
            error: None,
            created_at: now,
            started_at: None,
            finished_at: None,
        };

        let mut jobs = self.jobs.lock();
        while jobs.order.len() >= self.capacity {
            match jobs.order.pop_front() {
                Some(old) => {
                    jobs.records.remove(&old);
                }
                None => break,
            }
        }
        jobs.order.push_back(record.job_id);
        jobs.records.insert(record.job_id, record.clone());
        record
    }

    /// Marks a job running.
    pub fn start(&self, job_id: Uuid, now: Timestamp) {
        if let Some(job) = self.jobs.lock().records.get_mut(&job_id) {
            job.state = JobState::Running;
            job.started_at = Some(now);
        }
    }

    /// Records the outcome of a job's cycle.
    ///
    /// Phase stats are kept even when a phase failed; the job is `Failed`
    /// with the first phase error.
    pub fn finish(&self, job_id: Uuid, result: &SyncResult<SyncCycleResult>, now: Timestamp) {
        let mut jobs = self.jobs.lock();
        let Some(job) = jobs.records.get_mut(&job_id) else {
            return;
        };
        match result {
            Ok(cycle) => {
                job.pull = cycle.pull;
                job.push = cycle.push;
                match cycle.error() {
                    None => job.state = JobState::Completed,
                    Some(e) => {
                        job.state = JobState::Failed;
                        job.error = Some(e.to_string());
                    }
                }
            }
            Err(e) => {
                job.state = JobState::Failed;
                job.error = Some(e.to_string());
            }
        }
        job.finished_at = Some(now);
    }

    /// Looks up a job.
    pub fn get(&self, job_id: Uuid) -> Option<JobRecord> {
        self.jobs.lock().records.get(&job_id).cloned()
    }

    /// Jobs of `store_id` (or all), newest first.
    pub fn recent(&self, store_id: Option<&StoreId>) -> Vec<JobRecord> {
        let jobs = self.jobs.lock();
        jobs.order
            .iter()
            .rev()
            .filter_map(|id| jobs.records.get(id))
            .filter(|job| store_id.map_or(true, |s| &job.store_id == s))
            .cloned()
            .collect()
    }

    /// Number of remembered jobs.
    pub fn len(&self) -> usize {
        self.jobs.lock().order.len()
    }

    /// Returns true if no job is remembered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
