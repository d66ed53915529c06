pub mod asr;
pub mod audio;
pub mod config;
pub mod schedule;
pub mod utils;
pub mod web;

#[cfg(test)]
mod testing;

use std::sync::Arc;
use schedule::TaskManager;

pub struct AppContext {
    pub task_manager: Arc<TaskManager>,
}
