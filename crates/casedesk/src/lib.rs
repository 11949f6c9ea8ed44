//! casedesk library: configuration and the browse core shared by the
//! terminal UI and its tests.

pub mod browse;
pub mod config;
