//! Progress engine for a multi-context message-passing layer.
//!
//! Outstanding network and shared-memory operations are spread over a fixed
//! set of independent contexts (VCIs), each with its own lock and progress
//! counter. The engine decides which contexts to poll on each call, polls
//! them one lock at a time, and tells waiting callers whether anything they
//! watch has moved.
//!
//! # Examples
//!
//! ```
//! use vci_progress::{ProgressFlags, ProgressState};
//! use vci_progress::test_utils::TestFixture;
//!
//! let fixture = TestFixture::new(8);
//!
//! // Wait on contexts 2 and 5 only.
//! let mut state = ProgressState::new();
//! fixture
//!     .engine
//!     .session_start_with(&mut state, ProgressFlags::ALL, &[2, 5])
//!     .unwrap();
//!
//! fixture.netmod.bump_on_poll(5);
//! fixture.engine.session_wait(&mut state).unwrap();
//! assert!(state.progress_made());
//! ```

pub mod config;
pub mod engine;
pub mod error;
pub mod interfaces;
pub mod poll_counter;
pub mod registry;
pub mod session;
pub mod state;
pub mod stats;
pub mod test_utils;

pub use config::{LockGranularity, ProgressConfig};
pub use engine::{ProgressEngine, ProgressEngineBuilder};
pub use error::{ProgressError, ProgressResult, TransportKind};
pub use poll_counter::PollCounter;
pub use registry::{ProgressCount, VciGuard, VciRegistry};
pub use state::{MAX_VCIS, ProgressFlags, ProgressState};
pub use stats::ProgressStats;
