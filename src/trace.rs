//! Ranking run log.
//!
//! Each run is written as one `run` line followed by one `candidate` line per
//! scored idea, in relevance order. The JSONL file is opened for append, so
//! successive engines can share one log and a reader groups lines by
//! `run_id`.

use std::fs::{File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::Path;
use std::sync::mpsc::{self, Receiver, Sender};
use std::sync::Mutex;
use std::thread::JoinHandle;

use chrono::{DateTime, Utc};
use serde::Serialize;

use crate::idea::IdeaId;

/// Header line for one ranking run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RunTrace {
    pub run_id: String,
    pub timestamp_ms: i64,
    pub as_of: DateTime<Utc>,
    pub mmr_lambda: f64,
    pub k: usize,
    pub candidates: usize,
    pub pool: usize,
}

/// One scored candidate within a run.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankingTrace {
    pub run_id: String,
    pub idea_id: IdeaId,
    pub base_score: f64,
    pub adjusted_score: f64,
    pub ethics_multiplier: f64,
    pub feasibility_multiplier: f64,
    pub causal_boost: f64,
    /// Position by adjusted score, 1-based.
    pub relevance_rank: usize,
    /// Position after diversification; `None` when not selected.
    pub final_rank: Option<usize>,
    pub mmr_score: Option<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum TraceEvent {
    Run(RunTrace),
    Candidate(RankingTrace),
}

#[derive(Debug, thiserror::Error)]
pub enum TraceError {
    #[error("trace log io: {0}")]
    Io(#[from] std::io::Error),
    #[error("trace event encoding: {0}")]
    Serde(#[from] serde_json::Error),
    #[error("trace writer has stopped")]
    Closed,
    #[error("trace writer panicked")]
    Panicked,
    #[error("trace sink lock poisoned")]
    Poisoned,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent) -> Result<(), TraceError>;
}

/// Lines written by a [`JsonlTraceSink`] writer over its lifetime.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct TraceSummary {
    pub runs: usize,
    pub candidates: usize,
}

// ---------------------------------------------------------------------
//  JSONL file sink
// ---------------------------------------------------------------------

/// Channel-fed JSONL writer; clones share one background thread.
#[derive(Clone)]
pub struct JsonlTraceSink {
    sender: Sender<TraceEvent>,
}

/// Handle on the writer thread behind a [`JsonlTraceSink`].
pub struct TraceWorker {
    handle: JoinHandle<Result<TraceSummary, TraceError>>,
}

impl TraceWorker {
    /// Wait until every sink clone is dropped and the queue is written out.
    pub fn join(self) -> Result<TraceSummary, TraceError> {
        self.handle.join().map_err(|_| TraceError::Panicked)?
    }
}

impl JsonlTraceSink {
    /// Open `path` for append (creating it) and start the writer thread.
    pub fn open(path: impl AsRef<Path>) -> Result<(Self, TraceWorker), TraceError> {
        let file = OpenOptions::new().create(true).append(true).open(path)?;
        let (sender, receiver) = mpsc::channel();
        let handle = std::thread::spawn(move || drain_events(file, receiver));
        Ok((Self { sender }, TraceWorker { handle }))
    }
}

impl TraceSink for JsonlTraceSink {
    fn record(&self, event: TraceEvent) -> Result<(), TraceError> {
        self.sender.send(event).map_err(|_| TraceError::Closed)
    }
}

/// Write events as they arrive and flush whenever the queue runs dry, so a
/// finished run is on disk before the next one starts arriving.
fn drain_events(file: File, receiver: Receiver<TraceEvent>) -> Result<TraceSummary, TraceError> {
    let mut writer = BufWriter::new(file);
    let mut summary = TraceSummary::default();
    while let Ok(first) = receiver.recv() {
        let mut next = Some(first);
        while let Some(event) = next {
            match &event {
                TraceEvent::Run(_) => summary.runs += 1,
                TraceEvent::Candidate(_) => summary.candidates += 1,
            }
            serde_json::to_writer(&mut writer, &event)?;
            writer.write_all(b"\n")?;
            next = receiver.try_recv().ok();
        }
        writer.flush()?;
    }
    writer.flush()?;
    Ok(summary)
}

// ---------------------------------------------------------------------
//  In-memory sink
// ---------------------------------------------------------------------

/// Collects events in order; for embedding callers that inspect runs directly.
#[derive(Debug, Default)]
pub struct MemoryTraceSink {
    events: Mutex<Vec<TraceEvent>>,
}

impl MemoryTraceSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn events(&self) -> Result<Vec<TraceEvent>, TraceError> {
        let events = self.events.lock().map_err(|_| TraceError::Poisoned)?;
        Ok(events.clone())
    }
}

impl TraceSink for MemoryTraceSink {
    fn record(&self, event: TraceEvent) -> Result<(), TraceError> {
        self.events
            .lock()
            .map_err(|_| TraceError::Poisoned)?
            .push(event);
        Ok(())
    }
}

pub fn now_epoch_ms() -> i64 {
    Utc::now().timestamp_millis()
}
