//! Execution engine for acquisition and processing tasks.
//!
//! - [`Executor`]: drives a [`Task`] through start / loop / stop, in place or on a
//!   background tokio task.
//! - [`Timed`]: runs a task until a deadline.
//! - [`Iterative`] and [`Single`]: adapt a synchronous [`Processor`] over a [`Range`](crate::data::Range).
pub mod executor;
pub mod iterative;
pub mod state;

pub use executor::{chain, launch_all, wait_all, Executor, KillSwitch, Task, Timed};
pub use iterative::{Advance, Iterative, Processor, Single, DEFAULT_IDLE};
pub use state::EngineState;
