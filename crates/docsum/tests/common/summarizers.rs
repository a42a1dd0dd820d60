#![allow(dead_code)]

use std::sync::atomic::{AtomicU32, Ordering};

use crossbeam_channel::{Receiver, Sender};
use docsum::error::SummarizeError;
use docsum::{Summarizer, SummaryOptions};

/// Fails the first `failures` calls, then returns a fixed summary.
pub struct FlakySummarizer {
    failures: u32,
    calls: AtomicU32,
}

impl FlakySummarizer {
    pub fn new(failures: u32) -> Self {
        Self {
            failures,
            calls: AtomicU32::new(0),
        }
    }

    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

impl Summarizer for FlakySummarizer {
    fn summarize(&self, _text: &str, _options: &SummaryOptions) -> Result<String, SummarizeError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst);
        if call < self.failures {
            Err(SummarizeError::Inference(format!("transient failure {}", call + 1)))
        } else {
            Ok("Recovered summary".to_string())
        }
    }
}

/// Signals on `started` and blocks until released, one release per call.
pub struct GateSummarizer {
    started: Sender<()>,
    release: Receiver<()>,
}

impl GateSummarizer {
    /// Returns the summarizer, the "started" receiver and the release sender.
    pub fn new() -> (Self, Receiver<()>, Sender<()>) {
        let (started_tx, started_rx) = crossbeam_channel::unbounded();
        let (release_tx, release_rx) = crossbeam_channel::unbounded();
        (
            Self {
                started: started_tx,
                release: release_rx,
            },
            started_rx,
            release_tx,
        )
    }
}

impl Summarizer for GateSummarizer {
    fn summarize(&self, text: &str, _options: &SummaryOptions) -> Result<String, SummarizeError> {
        let _ = self.started.send(());
        let _ = self.release.recv();
        Ok(format!("summary of {} characters", text.len()))
    }
}
