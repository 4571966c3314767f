use std::collections::VecDeque;
use std::sync::{Mutex, PoisonError};
use tracing::debug;

use crate::trace::model::Trace;

/// Destination for completed traces.
pub trait TraceClient: Send + Sync {
    fn log_trace(&self, trace: Trace);

    /// The newest `max_results` traces, oldest first.
    fn get_traces(&self, max_results: usize) -> Vec<Trace>;
}

/// Keeps the most recent traces in memory, evicting the oldest beyond `capacity`.
#[derive(Debug)]
pub struct InMemoryTraceClient {
    capacity: usize,
    traces: Mutex<VecDeque<Trace>>,
}

impl InMemoryTraceClient {
    pub fn new(capacity: usize) -> Self {
        Self {
            capacity,
            traces: Mutex::new(VecDeque::new()),
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn len(&self) -> usize {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn clear(&self) {
        self.traces
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }
}

impl TraceClient for InMemoryTraceClient {
    fn log_trace(&self, trace: Trace) {
        let mut traces = self.traces.lock().unwrap_or_else(PoisonError::into_inner);
        traces.push_back(trace);
        while traces.len() > self.capacity {
            if let Some(evicted) = traces.pop_front() {
                debug!(request_id = %evicted.info.request_id, "evicted trace from buffer");
            }
        }
    }

    fn get_traces(&self, max_results: usize) -> Vec<Trace> {
        let traces = self.traces.lock().unwrap_or_else(PoisonError::into_inner);
        let skip = traces.len().saturating_sub(max_results);
        traces.iter().skip(skip).cloned().collect()
    }
}
