//! Side-effecting collaborators and file formats.
//!
//! Browser, model and renderer backends sit behind traits so the controller
//! can be driven by scripted fakes in tests.

pub mod agent;
pub mod compression_log;
pub mod config;
pub mod detector;
pub mod env;
pub mod page;
pub mod render;
pub mod results;
pub mod task_config;
pub mod weights;
