use std::fmt::Display;
use std::time::Instant;

use tracing::debug;

/// Wall-clock timer for reload stages. Does nothing unless the `perf_timing` feature is on.
#[derive(Clone, Copy, Debug)]
pub struct Timing(Option<Instant>);

impl Timing {
    #[inline]
    pub fn start() -> Self {
        Self(cfg!(feature = "perf_timing").then(Instant::now))
    }

    #[inline]
    pub fn elapsed_ms(&self) -> Option<f32> {
        self.0.map(|t| t.elapsed().as_secs_f32() * 1000.0)
    }

    pub fn log(&self, stage: impl Display) {
        if let Some(ms) = self.elapsed_ms() {
            debug!("{} took {:.2}ms", stage, ms);
        }
    }
}
