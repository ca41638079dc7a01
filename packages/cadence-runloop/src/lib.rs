//! A cooperative run-loop scheduler for single-threaded UI hosts.
//!
//! Work is grouped into run loops. Each loop owns a set of named queues
//! (`sync`, `actions`, `render`, ... by default) that are drained in a fixed
//! order when the loop ends. Timers (`later`, `next`, `throttle`,
//! `debounce`) fire on host turns driven through [`Scheduler::tick`].

pub mod binder;
pub mod clock;
pub mod config;
pub mod error;
pub mod queue;
pub mod run_loop;
pub mod scheduler;
pub mod task;
pub mod timer;

pub use binder::{Bound, bind};
pub use clock::{Clock, ManualClock, SystemClock};
pub use config::SchedulerConfig;
pub use error::{ConfigError, RunLoopError};
pub use run_loop::LoopState;
pub use scheduler::{Handle, QueueHandle, Scheduler, TimerHandle};
pub use serde_json::Value;
pub use task::{Args, Invocation, InvocationKey, Method, MethodRef, Target, TargetRef, Task};
