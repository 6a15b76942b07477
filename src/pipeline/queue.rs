use crate::error::AppError;
use crate::model::{CameraId, SnapshotId};
use serde::{Deserialize, Serialize};
use std::collections::{HashMap, VecDeque};
use std::sync::{Condvar, Mutex};
use std::time::Duration;
use thiserror::Error;

pub const ANALYZE_SNAPSHOT: &str = "analyze_snapshot";
pub const SCORE_CONGESTION: &str = "score_congestion";

#[derive(Debug, Error)]
pub enum QueueError {
    #[error("task queue lock poisoned")]
    Lock,
    #[error("task queue closed")]
    Closed,
}

#[derive(Debug, Clone, PartialEq)]
pub struct WorkItem {
    pub name: String,
    pub payload: serde_json::Value,
    pub group_key: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Job {
    AnalyzeSnapshot { snapshot_id: SnapshotId },
    ScoreCongestion { snapshot_id: SnapshotId },
}

#[derive(Debug, Serialize, Deserialize)]
struct SnapshotPayload {
    snapshot_id: SnapshotId,
}

impl Job {
    pub fn name(&self) -> &'static str {
        match self {
            Job::AnalyzeSnapshot { .. } => ANALYZE_SNAPSHOT,
            Job::ScoreCongestion { .. } => SCORE_CONGESTION,
        }
    }

    pub fn group_key(&self, camera_id: CameraId) -> String {
        match self {
            Job::AnalyzeSnapshot { .. } => format!("snapshot-analysis-{camera_id}"),
            Job::ScoreCongestion { .. } => format!("congestion-{camera_id}"),
        }
    }

    pub fn to_work_item(&self, camera_id: CameraId) -> Result<WorkItem, AppError> {
        let snapshot_id = match self {
            Job::AnalyzeSnapshot { snapshot_id } | Job::ScoreCongestion { snapshot_id } => {
                *snapshot_id
            }
        };
        Ok(WorkItem {
            name: self.name().to_string(),
            payload: serde_json::to_value(SnapshotPayload { snapshot_id })?,
            group_key: self.group_key(camera_id),
        })
    }

    pub fn from_work_item(item: &WorkItem) -> Result<Self, AppError> {
        let SnapshotPayload { snapshot_id } = serde_json::from_value(item.payload.clone())?;
        match item.name.as_str() {
            ANALYZE_SNAPSHOT => Ok(Job::AnalyzeSnapshot { snapshot_id }),
            SCORE_CONGESTION => Ok(Job::ScoreCongestion { snapshot_id }),
            other => Err(AppError::UnknownJob(other.to_string())),
        }
    }
}

pub trait TaskQueue: Send + Sync {
    fn enqueue(
        &self,
        name: &str,
        payload: serde_json::Value,
        group_key: &str,
    ) -> Result<(), QueueError>;
}

/// Enqueues `job` for a snapshot of `camera_id`.
pub fn submit(queue: &dyn TaskQueue, job: Job, camera_id: CameraId) -> Result<(), AppError> {
    let item = job.to_work_item(camera_id)?;
    queue.enqueue(&item.name, item.payload, &item.group_key)?;
    Ok(())
}

#[derive(Debug, Default)]
struct Groups {
    pending: HashMap<String, VecDeque<WorkItem>>,
    /// Group keys with pending work, in serving order.
    turn: VecDeque<String>,
    closed: bool,
}

/// FIFO within a group key; groups are served round-robin.
#[derive(Debug, Default)]
pub struct LocalTaskQueue {
    groups: Mutex<Groups>,
    ready: Condvar,
}

impl LocalTaskQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn pop(&self) -> Result<Option<WorkItem>, QueueError> {
        let mut groups = self.groups.lock().map_err(|_| QueueError::Lock)?;
        Ok(take_next(&mut groups))
    }

    /// Waits up to `timeout` for an item. Returns `None` on timeout or close.
    pub fn pop_timeout(&self, timeout: Duration) -> Result<Option<WorkItem>, QueueError> {
        let groups = self.groups.lock().map_err(|_| QueueError::Lock)?;
        let (mut groups, _) = self
            .ready
            .wait_timeout_while(groups, timeout, |groups| {
                groups.turn.is_empty() && !groups.closed
            })
            .map_err(|_| QueueError::Lock)?;
        Ok(take_next(&mut groups))
    }

    pub fn depth(&self) -> Result<usize, QueueError> {
        let groups = self.groups.lock().map_err(|_| QueueError::Lock)?;
        Ok(groups.pending.values().map(VecDeque::len).sum())
    }

    pub fn close(&self) -> Result<(), QueueError> {
        let mut groups = self.groups.lock().map_err(|_| QueueError::Lock)?;
        groups.closed = true;
        self.ready.notify_all();
        Ok(())
    }
}

fn take_next(groups: &mut Groups) -> Option<WorkItem> {
    let key = groups.turn.pop_front()?;
    let queue = groups.pending.get_mut(&key)?;
    let item = queue.pop_front();
    if queue.is_empty() {
        groups.pending.remove(&key);
    } else {
        groups.turn.push_back(key);
    }
    item
}

impl TaskQueue for LocalTaskQueue {
    fn enqueue(
        &self,
        name: &str,
        payload: serde_json::Value,
        group_key: &str,
    ) -> Result<(), QueueError> {
        let mut groups = self.groups.lock().map_err(|_| QueueError::Lock)?;
        if groups.closed {
            return Err(QueueError::Closed);
        }
        let queue = groups.pending.entry(group_key.to_string()).or_default();
        let was_idle = queue.is_empty();
        queue.push_back(WorkItem {
            name: name.to_string(),
            payload,
            group_key: group_key.to_string(),
        });
        if was_idle {
            groups.turn.push_back(group_key.to_string());
        }
        self.ready.notify_one();
        Ok(())
    }
}
