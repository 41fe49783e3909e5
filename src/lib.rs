//! POSTOR — Autonomous Tender-Marketplace Bidding Agent
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod money;
pub mod screening;
pub mod policy;
pub mod driver;
pub mod engine;
pub mod report;
