//! Command-line interface components
//!
//! This module contains CLI-specific code for the Model Fetcher binary:
//! argument parsing, command handlers and the download progress display.

pub mod args;
pub mod commands;
pub mod progress;

pub use args::{AcquireArgs, Cli, Commands, GlobalArgs};
pub use commands::{
    build_manager, handle_acquire, handle_clear, handle_info, handle_list, handle_remove,
    handle_resolve, load_config,
};
pub use progress::{ProgressConfig, ProgressDisplay};
