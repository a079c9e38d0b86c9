//! Streaming session metrics
//!
//! Recorded through the `metrics` facade; nothing is exported unless the
//! application installs a recorder.

use metrics::{counter, histogram};
use std::time::{Duration, Instant};

/// Per-session metrics collector
#[derive(Debug, Clone)]
pub struct StreamMetrics {
    pub start_time: Instant,
    pub first_frame_latency: Option<Duration>,
    pub frames: usize,
    pub function_calls: usize,
    pub model: String,
}

impl StreamMetrics {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            start_time: Instant::now(),
            first_frame_latency: None,
            frames: 0,
            function_calls: 0,
            model: model.into(),
        }
    }

    pub fn record_frame(&mut self) {
        self.frames += 1;
        counter!("typellm_stream_frames_total", "model" => self.model.clone()).increment(1);

        if self.first_frame_latency.is_none() {
            let latency = self.start_time.elapsed();
            self.first_frame_latency = Some(latency);

            histogram!(
                "typellm_stream_first_frame_latency_ms",
                "model" => self.model.clone()
            )
            .record(latency.as_millis() as f64);

            log::debug!(
                "First frame received after {:?} for model {}",
                latency,
                self.model
            );
        }
    }

    pub fn record_function_call(&mut self, name: &str) {
        self.function_calls += 1;
        counter!("typellm_function_calls_total", "model" => self.model.clone()).increment(1);
        log::debug!("Function call {name} reassembled for model {}", self.model);
    }

    pub fn record_error(&self) {
        counter!("typellm_stream_errors_total", "model" => self.model.clone()).increment(1);
    }

    pub fn finalize(&self) {
        counter!("typellm_stream_completions_total", "model" => self.model.clone()).increment(1);

        log::debug!(
            "Stream completed: {} frames, {} function calls in {:?} for model {}",
            self.frames,
            self.function_calls,
            self.start_time.elapsed(),
            self.model
        );
    }
}
