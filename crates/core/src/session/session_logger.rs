use std::collections::HashMap;
use std::time::Instant;

/// Observer for per-frame session timings and counters.
///
/// Lets each host decide how much it wants to hear about the loop without
/// the controller knowing about stdout, GUIs or the `log` crate.
pub trait SessionLogger: Send {
    /// Called once per processed frame with the running total.
    fn frame(&mut self, processed: usize);

    /// Record how long a named stage (`capture`, `process`, `display`,
    /// `save`) took for one frame.
    fn timing(&mut self, stage: &str, duration_ms: f64);

    /// Record a point-in-time value, e.g. the number of faces in a frame.
    fn metric(&mut self, name: &str, value: f64);

    /// Emit an end-of-session summary. Default: no-op.
    fn summary(&self) {}
}

/// Discards everything. Used by the desktop app and by tests.
pub struct NullSessionLogger;

impl SessionLogger for NullSessionLogger {
    fn frame(&mut self, _processed: usize) {}
    fn timing(&mut self, _stage: &str, _duration_ms: f64) {}
    fn metric(&mut self, _name: &str, _value: f64) {}
}

/// Running count, sum and maximum of one series. Constant size however
/// long the session runs.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Aggregate {
    pub count: usize,
    pub sum: f64,
    pub max: f64,
}

impl Aggregate {
    fn record(&mut self, value: f64) {
        self.max = if self.count == 0 {
            value
        } else {
            self.max.max(value)
        };
        self.count += 1;
        self.sum += value;
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum / self.count as f64
        }
    }
}

/// Aggregates stage timings and prints a summary when the session ends.
///
/// Frame counts are logged every `throttle_frames` frames.
pub struct StdoutSessionLogger {
    throttle_frames: usize,
    timings: HashMap<String, Aggregate>,
    metrics: HashMap<String, Aggregate>,
    start_time: Instant,
    frames: usize,
}

impl StdoutSessionLogger {
    pub fn new(throttle_frames: usize) -> Self {
        Self {
            throttle_frames: throttle_frames.max(1),
            timings: HashMap::new(),
            metrics: HashMap::new(),
            start_time: Instant::now(),
            frames: 0,
        }
    }

    /// Returns the formatted summary, or `None` if nothing was recorded.
    pub fn summary_string(&self) -> Option<String> {
        if self.timings.is_empty() && self.metrics.is_empty() {
            return None;
        }

        let elapsed_ms = self.start_time.elapsed().as_secs_f64() * 1000.0;
        let frames = self.frames;
        let mut lines = vec![format!(
            "Session summary ({frames} frames, {:.1}s):",
            elapsed_ms / 1000.0
        )];

        let mut stages: Vec<_> = self.timings.keys().collect();
        stages.sort();
        for stage in stages {
            let durations = &self.timings[stage];
            lines.push(format!(
                "  {stage:8}: avg {:6.1}ms  max {:6.1}ms  ({} samples)",
                durations.mean(),
                durations.max,
                durations.count
            ));
        }

        let mut names: Vec<_> = self.metrics.keys().collect();
        names.sort();
        for name in names {
            lines.push(format!("  {name}: avg {:.1}", self.metrics[name].mean()));
        }

        if frames > 0 && elapsed_ms > 0.0 {
            let fps = frames as f64 / (elapsed_ms / 1000.0);
            lines.push(format!("  Display rate: {fps:.1} fps"));
        }

        Some(lines.join("\n"))
    }

    pub fn timings_for(&self, stage: &str) -> Option<Aggregate> {
        self.timings.get(stage).copied()
    }

    pub fn metrics_for(&self, name: &str) -> Option<Aggregate> {
        self.metrics.get(name).copied()
    }
}

impl Default for StdoutSessionLogger {
    fn default() -> Self {
        Self::new(100)
    }
}

impl SessionLogger for StdoutSessionLogger {
    fn frame(&mut self, processed: usize) {
        self.frames = processed;
        if processed % self.throttle_frames == 0 {
            log::info!("Processed {processed} frames");
        }
    }

    fn timing(&mut self, stage: &str, duration_ms: f64) {
        self.timings
            .entry(stage.to_string())
            .or_default()
            .record(duration_ms);
    }

    fn metric(&mut self, name: &str, value: f64) {
        self.metrics.entry(name.to_string()).or_default().record(value);
    }

    fn summary(&self) {
        if let Some(text) = self.summary_string() {
            log::info!("\n\n{text}");
        }
    }
}
