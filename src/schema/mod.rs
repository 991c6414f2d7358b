//! Schema module - Configuration, event and report types.

mod config;
mod event;
mod report;

pub use config::*;
pub use event::*;
pub use report::*;
