pub mod comm;
pub mod framing;
pub mod id;
pub mod queue;
pub mod task;

/// Type for JSON-compatible task payloads and successor argument values.
pub type UserValue = ::serde_json::Value;

pub use self::id::{ComputerId, Id, ServerId, SpaceId, TaskId};
pub use self::queue::BlockingQueue;
pub use self::task::{CoarseResult, Deposit, Scheduler, Task, TaskResult, TaskSpec, ValueResult};
