use parking_lot::Mutex;
use serde::Serialize;
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::mpsc::UnboundedSender;
use tracing::info;

use super::PipelineEvent;

/// A human readable milestone, stamped with seconds since the invocation started.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub message: String,
    pub elapsed_seconds: f64,
}

/// Bounded history of progress events shared by every invocation of a pipeline.
/// The oldest events are dropped once `capacity` is reached.
#[derive(Debug, Clone)]
pub struct ProgressLog {
    events: Arc<Mutex<VecDeque<ProgressEvent>>>,
    capacity: usize,
}

impl ProgressLog {
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            events: Arc::new(Mutex::new(VecDeque::with_capacity(capacity))),
            capacity,
        }
    }

    pub fn push(&self, event: ProgressEvent) {
        let mut events = self.events.lock();
        while events.len() >= self.capacity {
            events.pop_front();
        }
        events.push_back(event);
    }

    /// Oldest first.
    pub fn snapshot(&self) -> Vec<ProgressEvent> {
        self.events.lock().iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.events.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.events.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

/// Emits progress for one invocation: every event goes to the shared log and, when
/// attached, to the caller's event channel.
#[derive(Debug)]
pub struct ProgressReporter {
    started: Instant,
    log: ProgressLog,
    sender: Option<UnboundedSender<PipelineEvent>>,
}

impl ProgressReporter {
    pub fn new(log: ProgressLog, sender: UnboundedSender<PipelineEvent>) -> Self {
        Self {
            started: Instant::now(),
            log,
            sender: Some(sender),
        }
    }

    /// A reporter that only records into `log`.
    pub fn detached(log: ProgressLog) -> Self {
        Self {
            started: Instant::now(),
            log,
            sender: None,
        }
    }

    pub fn emit(&self, message: impl Into<String>) -> ProgressEvent {
        let event = ProgressEvent {
            message: message.into(),
            elapsed_seconds: round_centis(self.started.elapsed().as_secs_f64()),
        };
        info!(elapsed = event.elapsed_seconds, "{}", event.message);
        self.log.push(event.clone());
        if let Some(sender) = &self.sender {
            // The caller may have stopped listening; the log still has the event.
            let _ = sender.send(PipelineEvent::Progress(event.clone()));
        }
        event
    }

    pub fn log(&self) -> &ProgressLog {
        &self.log
    }
}

fn round_centis(seconds: f64) -> f64 {
    (seconds * 100.0).round() / 100.0
}
