//! Run-time control plane for web agents.
//!
//! Drives an agent through a browser environment one step at a time, bounds
//! the observation the agent sees, and decides when a run must stop. The
//! architecture enforces a strict separation:
//!
//! - **[`core`]**: Pure, deterministic logic (early stop, line scoring and
//!   selection, cart outcome classification). No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting seams (agent, environment, page probes, renderer,
//!   config and result files). Isolated behind traits to enable fakes in tests.
//!
//! Orchestration modules ([`step`], [`task`], [`batch`]) coordinate core logic
//! with I/O to run single steps, whole tasks and task batches.

pub mod batch;
pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod step;
pub mod task;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
