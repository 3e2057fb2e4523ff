//! Collects applications, top charts, and metadata from the Mac App Store
//! cache into a local SQLite database.

pub mod cache;
pub mod charts;
pub mod cli;
pub mod config;
pub mod error;
pub mod metadata;
pub mod model;
pub mod platform;
pub mod report;
pub mod scan;
pub mod store;
