//! Standalone listener: binds the control port, admits connections, forks one
//! worker per connection and reaps them as they exit.

pub mod admission;
pub mod config;
pub mod isolation;
pub mod logging;
pub mod process;
pub mod reap;
pub mod signals;
pub mod supervisor;
pub mod sys;
pub mod worker;

pub use admission::{AdmissionLimits, Verdict};
pub use config::{Overrides, Tunables};
pub use isolation::IsolationMode;
pub use process::{OsProcesses, ProcessControl, Spawn};
pub use supervisor::{Admission, ListenMode, ListenerState, Supervisor, WorkerLaunch};
