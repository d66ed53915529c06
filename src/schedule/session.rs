use std::collections::HashMap;

use tokio::sync::Mutex;
use tracing::{debug, info};

/// Client session -> task id of its most recently started job.
#[derive(Default)]
pub struct SessionBinding {
    bindings: Mutex<HashMap<String, String>>,
}

impl SessionBinding {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the task id this binding replaced, if any.
    pub async fn bind(&self, client: &str, task_id: &str) -> Option<String> {
        let previous = self
            .bindings
            .lock()
            .await
            .insert(client.to_string(), task_id.to_string());
        if let Some(previous) = previous.as_deref().filter(|p| *p != task_id) {
            info!("Session {} rebound from task {} to {}", client, previous, task_id);
        }
        previous
    }

    pub async fn current(&self, client: &str) -> Option<String> {
        self.bindings.lock().await.get(client).cloned()
    }

    pub async fn unbind(&self, client: &str) -> Option<String> {
        let removed = self.bindings.lock().await.remove(client);
        if removed.is_some() {
            debug!("Session {} unbound", client);
        }
        removed
    }

    /// Unbind `client` only while it still points at `task_id`.
    pub async fn unbind_task(&self, client: &str, task_id: &str) -> bool {
        let mut bindings = self.bindings.lock().await;
        if bindings.get(client).map(String::as_str) == Some(task_id) {
            bindings.remove(client);
            true
        } else {
            false
        }
    }

    /// Drop every binding that points at `task_id`.
    pub async fn forget_task(&self, task_id: &str) -> usize {
        let mut bindings = self.bindings.lock().await;
        let before = bindings.len();
        bindings.retain(|_, bound| bound != task_id);
        before - bindings.len()
    }
}
