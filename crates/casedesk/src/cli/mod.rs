//! CLI command implementations

pub mod accounts;
pub mod config;
pub mod context;
pub mod error;
pub mod export;
pub mod filter;
pub mod list;
pub mod output;
pub mod search;
pub mod show;
pub mod tui;
