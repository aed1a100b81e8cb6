//! Phase timing.

use std::time::{Duration, Instant};

use tracing::info;

/// Measures one phase and reports how long it took.
///
/// ```rust
/// use devnet_bootstrap::Timer;
///
/// let t = Timer::start("Generate");
/// // ... run the phase ...
/// t.finish();
/// ```
pub struct Timer {
    label: &'static str,
    start: Instant,
}

impl Timer {
    pub fn start(label: &'static str) -> Self {
        Self {
            label,
            start: Instant::now(),
        }
    }

    pub fn finish(self) -> Duration {
        let elapsed = self.start.elapsed();
        info!(phase = self.label, elapsed_ms = elapsed.as_millis() as u64, "phase finished");
        println!("  [DONE] {} ({})", self.label, format_elapsed(elapsed));
        elapsed
    }
}

/// `850ms`, `12.3s` or `2.1m`.
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs_f64();
    if secs >= 60.0 {
        format!("{:.1}m", secs / 60.0)
    } else if secs >= 1.0 {
        format!("{:.1}s", secs)
    } else {
        format!("{}ms", elapsed.as_millis())
    }
}
