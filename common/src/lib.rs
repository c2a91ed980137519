pub mod job;
pub mod status;
pub mod task;

pub use job::{ImportRequest, ImportResponse, BUCKET};
pub use status::{ErrorCode, Status};
pub use task::{ImportResult, ImportTask, TaskId, TaskInfo, TaskState, TaskStateResponse};
