//! I/O helpers: project files, task outputs and child processes.

pub mod config;
pub mod init;
pub mod output;
pub mod pipeline;
pub mod process;
pub mod prompt;
pub mod report;
