//! Deterministic, pure logic shared by the runner core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod compress;
pub mod early_stop;
pub mod feedback;
pub mod scorer;
pub mod types;
