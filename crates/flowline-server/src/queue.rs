//! Background task queue
//!
//! Mutations are persisted first, then a task referencing the persisted
//! record is handed to the engine workers. A task is enqueued at most once
//! per record, so retrying a request after a queue failure never fans the
//! same work out twice.

use async_trait::async_trait;
use dashmap::DashSet;
use serde::{Deserialize, Serialize};
use std::sync::Mutex;
use tracing::info;

use flowline_core::{ExportId, FlowId, StartId};

use crate::error::ServerResult;

/// A unit of background work for the engine workers
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case", tag = "type")]
pub enum Task {
    /// Fan out runs for a persisted flow start
    StartFlow {
        /// The persisted start
        start_id: StartId,
    },

    /// Build the file for a persisted results export
    ExportResults {
        /// The persisted export
        export_id: ExportId,
    },

    /// Interrupt all active sessions of a deleted flow
    InterruptFlow {
        /// The deleted flow
        flow_id: FlowId,
    },
}

impl Task {
    /// Key used to deduplicate enqueues of the same logical work
    fn dedup_key(&self) -> String {
        match self {
            Task::StartFlow { start_id } => format!("start:{}", start_id),
            Task::ExportResults { export_id } => format!("export:{}", export_id),
            Task::InterruptFlow { flow_id } => format!("interrupt:{}", flow_id),
        }
    }
}

/// Queue interface used by the server
#[async_trait]
pub trait TaskQueue: Send + Sync {
    /// Enqueue a task, at most once per logical record
    async fn enqueue(&self, task: Task) -> ServerResult<()>;
}

/// In-memory queue used for the embedded worker and in tests
#[derive(Default)]
pub struct MemoryTaskQueue {
    seen: DashSet<String>,
    tasks: Mutex<Vec<Task>>,
}

impl MemoryTaskQueue {
    /// Create a new empty queue
    pub fn new() -> Self {
        Self::default()
    }

    /// Drain all queued tasks, in enqueue order
    pub fn drain(&self) -> Vec<Task> {
        std::mem::take(&mut self.tasks.lock().expect("queue lock poisoned"))
    }
}

#[async_trait]
impl TaskQueue for MemoryTaskQueue {
    async fn enqueue(&self, task: Task) -> ServerResult<()> {
        let key = task.dedup_key();
        if !self.seen.insert(key.clone()) {
            info!(%key, "task already queued, skipping");
            return Ok(());
        }

        self.tasks.lock().expect("queue lock poisoned").push(task);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_enqueue_once_per_record() {
        let queue = MemoryTaskQueue::new();

        let start_id = StartId::new();
        let task = Task::StartFlow { start_id };

        queue.enqueue(task.clone()).await.unwrap();
        queue.enqueue(task.clone()).await.unwrap();
        queue
            .enqueue(Task::StartFlow {
                start_id: StartId::new(),
            })
            .await
            .unwrap();

        let tasks = queue.drain();
        assert_eq!(tasks.len(), 2);
        assert_eq!(tasks[0], task);
    }

    #[tokio::test]
    async fn test_different_task_kinds_do_not_collide() {
        let queue = MemoryTaskQueue::new();

        queue
            .enqueue(Task::ExportResults {
                export_id: ExportId::new(),
            })
            .await
            .unwrap();
        queue
            .enqueue(Task::InterruptFlow {
                flow_id: FlowId::new(),
            })
            .await
            .unwrap();

        assert_eq!(queue.drain().len(), 2);
    }
}
