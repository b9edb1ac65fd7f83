//! Client for the upstream tutoring-data platform.
//!
//! [`UpstreamClient`] attaches the session token and platform header to every
//! call and translates non-2xx responses into [`Error::Upstream`]. It does not
//! pace itself: collectors hold a [`Pacer`] and run each call through it.

pub mod api;
pub mod client;
pub mod config;
pub mod delay;
pub mod error;
pub mod session;
pub mod types;

pub use api::TutoringApi;
pub use client::{CallOptions, UpstreamClient};
pub use config::UpstreamConfig;
pub use delay::Pacer;
pub use error::{Error, Result};
pub use session::Session;
