pub mod error;
pub mod registry;
pub mod scheduler;
pub mod session;
pub mod status;
pub mod types;
pub mod workspace;

#[cfg(test)]
mod tests;

// 重导出主要类型
pub use error::TaskError;
pub use registry::{TaskHandle, TaskRegistry};
pub use session::SessionBinding;
pub use status::TaskStatus;
pub use types::{ModelSize, StatusUpdate, TaskConfig, TaskSnapshot, TaskState};
pub use workspace::Workspace;

// 重导出调度器接口
pub use scheduler::{Collaborators, EngineConfig, TaskLookup, TaskManager, TaskScheduler};
