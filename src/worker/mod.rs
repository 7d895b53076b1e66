//! Isolated worker context.
//!
//! Core components:
//! - `state` — context state machine (Absent → Creating → Active → Closing)
//! - `protocol` — request/response messages crossing the context boundary
//! - `host` — `SandboxHost` platform trait and the in-process host
//! - `manager` — singleton lifecycle, task dispatch, timeouts and cancellation

pub mod host;
pub mod manager;
pub mod protocol;
pub mod state;

pub use host::{InProcessHost, ResponseReceiver, ResponseSender, SandboxHost};
pub use manager::{PendingTaskInfo, WorkerLifecycleManager};
pub use protocol::{ContextInfo, WorkerOutcome, WorkerRequest, WorkerResponse, decode_output};
pub use state::{ContextState, WorkerContext};
