mod task_manager;
mod worker;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::info;

pub use task_manager::{EngineConfig, TaskLookup, TaskManager};
pub use worker::{join_transcript, Collaborators, TranscriptionWorker, NO_SPEECH};

/// Background housekeeping for the task manager: periodically reaps
/// finished tasks that were never collected.
pub struct TaskScheduler {
    task_manager: Arc<TaskManager>,
    interval: Duration,
    ttl: Duration,
}

impl TaskScheduler {
    pub fn new(task_manager: Arc<TaskManager>, ttl: Duration) -> Self {
        Self {
            task_manager,
            interval: Duration::from_secs(60),
            ttl,
        }
    }

    pub fn with_interval(mut self, interval: Duration) -> Self {
        self.interval = interval;
        self
    }

    pub async fn run_once(&self) -> usize {
        let reaped = self.task_manager.reap_expired(self.ttl).await;
        if reaped > 0 {
            info!("Reaped {} expired tasks", reaped);
        }
        reaped
    }

    pub async fn run(&self) {
        let mut ticker = tokio::time::interval(self.interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            self.run_once().await;
        }
    }

    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move { self.run().await })
    }
}
