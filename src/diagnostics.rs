//! Reservoir trace collection
//!
//! Records the accounting of every `frame_end` so a run can be saved to
//! JSON and compared against a reference encoder later.
//!
//! This module is only available when the "diagnostics" feature is enabled.

use std::collections::HashMap;
use std::fs::File;
use std::io::Write;
use std::sync::Mutex;
use std::thread;

use lazy_static::lazy_static;
use serde::{Deserialize, Serialize};

use crate::error::{ReservoirError, Result};
use crate::reservoir::{ReservoirState, StuffingReport};

lazy_static! {
    /// Per-thread collectors, so parallel sessions in tests do not mix traces
    static ref TRACE_COLLECTORS: Mutex<HashMap<thread::ThreadId, TraceCollector>> =
        Mutex::new(HashMap::new());
}

/// Reservoir accounting for one frame
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FrameTrace {
    /// Frame number (0-based)
    pub frame_number: u64,
    /// Capacity during the frame
    pub capacity: i32,
    /// Occupancy after the frame's last granule was accounted for
    pub occupancy_before: i32,
    /// Occupancy after reconciliation
    pub occupancy: i32,
    pub stuffing: StuffingReport,
}

/// Trace metadata
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraceMetadata {
    /// Trace name
    pub name: String,
    /// Creation timestamp (RFC 3339)
    pub created_at: String,
    pub description: String,
}

/// A complete trace as stored on disk
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReservoirTrace {
    pub metadata: TraceMetadata,
    pub frames: Vec<FrameTrace>,
}

/// Collects frame traces for the current thread
#[derive(Debug)]
pub struct TraceCollector {
    pub trace: ReservoirTrace,
}

impl TraceCollector {
    /// Start collecting on the current thread, replacing any previous trace
    pub fn initialize(name: &str, description: &str) {
        let collector = TraceCollector {
            trace: ReservoirTrace {
                metadata: TraceMetadata {
                    name: name.to_string(),
                    created_at: chrono::Utc::now().to_rfc3339(),
                    description: description.to_string(),
                },
                frames: Vec::new(),
            },
        };

        let mut guard = lock_collectors();
        guard.insert(thread::current().id(), collector);
    }

    /// Check if collection is enabled for current thread
    pub fn is_collecting() -> bool {
        lock_collectors().contains_key(&thread::current().id())
    }

    /// Snapshot of the trace collected so far on this thread
    pub fn current_trace() -> Option<ReservoirTrace> {
        lock_collectors()
            .get(&thread::current().id())
            .map(|collector| collector.trace.clone())
    }

    /// Save the current thread's trace as pretty-printed JSON
    pub fn save_to_file(filename: &str) -> Result<()> {
        let trace = Self::current_trace().ok_or_else(|| {
            ReservoirError::Diagnostics("no trace collector initialized for current thread".into())
        })?;
        let json = serde_json::to_string_pretty(&trace)
            .map_err(|e| ReservoirError::Diagnostics(e.to_string()))?;
        let mut file = File::create(filename).map_err(|e| ReservoirError::Diagnostics(e.to_string()))?;
        file.write_all(json.as_bytes())
            .map_err(|e| ReservoirError::Diagnostics(e.to_string()))?;
        log::info!("Reservoir trace saved to: {}", filename);
        Ok(())
    }

    /// Load a trace from a JSON file
    pub fn load_from_file(filename: &str) -> Result<ReservoirTrace> {
        let content =
            std::fs::read_to_string(filename).map_err(|e| ReservoirError::Diagnostics(e.to_string()))?;
        serde_json::from_str(&content).map_err(|e| ReservoirError::Diagnostics(e.to_string()))
    }

    /// Stop collecting on the current thread
    pub fn reset() {
        lock_collectors().remove(&thread::current().id());
    }
}

/// Append one frame to the current thread's trace, if collecting
pub fn record_frame_end(
    frame_number: u64,
    occupancy_before: i32,
    state: &ReservoirState,
    stuffing: &StuffingReport,
) {
    let mut guard = lock_collectors();
    if let Some(collector) = guard.get_mut(&thread::current().id()) {
        collector.trace.frames.push(FrameTrace {
            frame_number,
            capacity: state.capacity,
            occupancy_before,
            occupancy: state.occupancy,
            stuffing: *stuffing,
        });
    }
}

fn lock_collectors() -> std::sync::MutexGuard<'static, HashMap<thread::ThreadId, TraceCollector>> {
    TRACE_COLLECTORS
        .lock()
        .unwrap_or_else(std::sync::PoisonError::into_inner)
}
