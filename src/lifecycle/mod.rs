//! Process lifecycle management.
//!
//! # Design Decisions
//! - Ctrl+C / SIGINT triggers graceful shutdown
//! - In-flight requests are drained before exit

pub mod signals;

pub use signals::shutdown_signal;
