// Collaborator interfaces consumed by the progress engine.
//
// Each external subsystem the engine drives is reached through one narrow
// trait. Production builds plug in the real transports; tests use the stubs
// in `crate::test_utils`.

pub mod failure;
pub mod hooks;
pub mod transport;
pub mod work_queue;

pub use failure::{FailureDetector, FailureSignal};
pub use hooks::{NoHooks, ProgressHooks};
pub use transport::Transport;
pub use work_queue::WorkQueue;
