//! The three collection phases and their continuation.
//!
//! Every phase is a free async function generic over an
//! [`IngestStore`](tally_core::store::IngestStore) and a
//! [`TutoringApi`](tally_upstream::TutoringApi). Calls to the upstream are
//! strictly sequential and paced by a [`Pacer`](tally_upstream::Pacer).
//!
//! | Phase | Entry point |
//! |-------|-------------|
//! | 1 | [`activity::collect_daily_activity`] |
//! | 2 | [`homework::collect_homework`] |
//! | 3 | [`wrong_detail::collect_wrong_detail`] |

#![allow(async_fn_in_trait)]

pub mod activity;
pub mod chain;
pub mod error;
pub mod homework;
pub mod normalize;
pub mod report;
pub mod resolver;
pub mod settings;
pub mod wrong_detail;

#[cfg(test)]
mod testing;

pub use chain::{ContinuationDispatcher, QueueDispatcher};
pub use error::{Error, Result};
pub use report::{ItemError, Report};
pub use settings::CollectSettings;
