#![allow(clippy::uninlined_format_args)]

pub mod app;
pub mod comments;
pub mod config;
pub mod data;
pub mod feed;
pub mod lemmy;
pub mod listing;
pub mod logging;
pub mod markdown;
pub mod session;
pub mod theme;
pub mod ui;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub use app::{run, RunOptions};
