//! Core types and trait definitions for the Tally ingestion pipeline.
//!
//! This crate is deliberately free of HTTP and database dependencies.
//! The store backend, the upstream client and the collectors all depend on
//! it; it depends on nothing proprietary.

// We intentionally use native `async fn` in traits (stabilised in Rust 1.75).
// Suppress the advisory lint about `Send` bounds on the returned futures.
#![allow(async_fn_in_trait)]

pub mod activity;
pub mod chain;
pub mod date;
pub mod directory;
pub mod error;
pub mod homework;
pub mod problem;
pub mod store;

pub use error::{Error, Result};
