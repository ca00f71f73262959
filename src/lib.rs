//! SHARPLINE — sports market edge engine
//!
//! Library crate exposing all modules for use by integration tests
//! and the binary entry point.

pub mod config;
pub mod types;
pub mod lines;
pub mod grading;
pub mod signals;
pub mod trends;
pub mod data;
pub mod engine;
pub mod storage;
pub mod dashboard;
