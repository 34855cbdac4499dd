//! Timing of row execution.

use std::time::Instant;

/// Wall-clock timer for one named unit of work.
#[derive(Debug)]
pub struct SpanTimer {
    start: Instant,
    name: String,
}

impl SpanTimer {
    /// Starts a new timer.
    #[must_use]
    pub fn start(name: impl Into<String>) -> Self {
        Self {
            start: Instant::now(),
            name: name.into(),
        }
    }

    /// Elapsed time in milliseconds.
    #[must_use]
    pub fn elapsed_ms(&self) -> u64 {
        u64::try_from(self.start.elapsed().as_millis()).unwrap_or(u64::MAX)
    }

    /// The timer's name.
    #[must_use]
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Stops the timer, logs the duration at debug level and returns it.
    pub fn finish(self) -> u64 {
        let duration_ms = self.elapsed_ms();
        tracing::debug!(span_name = %self.name, duration_ms, "Span finished");
        duration_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_span_timer() {
        let timer = SpanTimer::start("row 1");
        std::thread::sleep(std::time::Duration::from_millis(10));
        assert_eq!(timer.name(), "row 1");
        assert!(timer.finish() >= 10);
    }
}
