//! Inter-call pacing.
//!
//! The upstream throttles silently under sustained load: responses degrade
//! instead of failing. Every collector therefore leaves a fixed pause between
//! the end of one upstream call and the start of the next.

use std::{future::Future, time::Duration};

use tokio::time::{Instant, sleep_until};

/// Guarantees a minimum quiet gap between consecutive calls.
///
/// Wrap each upstream request in [`Pacer::run`]. The first call starts at
/// once; every later call starts no sooner than `interval` after the
/// previous one finished, however long that one took.
#[derive(Debug)]
pub struct Pacer {
  interval:  Duration,
  last_done: Option<Instant>,
}

impl Pacer {
  pub fn new(interval: Duration) -> Self { Self { interval, last_done: None } }

  pub fn from_millis(ms: u64) -> Self { Self::new(Duration::from_millis(ms)) }

  /// Run one upstream call, pausing first if the previous call finished
  /// less than `interval` ago.
  pub async fn run<F: Future>(&mut self, call: F) -> F::Output {
    if let Some(done) = self.last_done {
      sleep_until(done + self.interval).await;
    }
    let output = call.await;
    self.last_done = Some(Instant::now());
    output
  }
}
