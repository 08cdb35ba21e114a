//! JSON and CSV export of a session snapshot.
//!
//! An export is built from a copy taken under the session lock, so it is a
//! snapshot and never a live reference.

use chrono::{DateTime, Utc};
use csv::Writer;
use serde::Serialize;

use crate::config::SessionConfig;
use crate::counters::CounterSnapshot;
use crate::error::{ExportError, ExportResult};
use crate::finalizer::Summary;
use crate::synth::Payload;
use crate::types::{DataPoint, Event, SessionState, SimulationKind};

/// Everything an export contains.
#[derive(Debug, Clone, Serialize)]
pub struct SessionExport<P, Q> {
    pub exported_at: DateTime<Utc>,
    pub kind: SimulationKind,
    pub state: SessionState,
    /// Configuration of the last started session.
    pub parameters: Option<SessionConfig<Q>>,
    pub counters: CounterSnapshot,
    pub data_points: Vec<DataPoint>,
    /// Retained log entries, newest first.
    pub logs: Vec<Event<P>>,
    pub summary: Option<Summary>,
}

impl<P, Q> SessionExport<P, Q> {
    pub fn is_empty(&self) -> bool {
        self.logs.is_empty() && self.data_points.is_empty()
    }
}

/// Render the export as pretty JSON.
pub fn to_json<P: Serialize, Q: Serialize>(export: &SessionExport<P, Q>) -> ExportResult<String> {
    if export.is_empty() {
        return Err(ExportError::NoData);
    }
    Ok(serde_json::to_string_pretty(export)?)
}

/// Render the retained log as CSV: a header row, then one row per entry.
pub fn logs_to_csv<P: Payload, Q>(export: &SessionExport<P, Q>) -> ExportResult<Vec<u8>> {
    if export.logs.is_empty() {
        return Err(ExportError::NoData);
    }

    let mut wtr = Writer::from_writer(vec![]);
    let mut header = vec!["id", "timestamp"];
    header.extend_from_slice(P::csv_header());
    wtr.write_record(&header)?;

    for event in &export.logs {
        let mut row = vec![event.id.to_string(), event.timestamp.to_rfc3339()];
        row.extend(event.payload.csv_row());
        wtr.write_record(&row)?;
    }

    wtr.flush()?;
    wtr.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}

/// Render the per-tick data points as CSV.
pub fn data_points_to_csv<P, Q>(export: &SessionExport<P, Q>) -> ExportResult<Vec<u8>> {
    if export.data_points.is_empty() {
        return Err(ExportError::NoData);
    }

    let mut wtr = Writer::from_writer(vec![]);
    wtr.write_record(["tick", "elapsed_ms", "synthesized", "flagged"])?;
    for point in &export.data_points {
        wtr.write_record(&[
            point.tick.to_string(),
            point.elapsed_ms.to_string(),
            point.synthesized.to_string(),
            point.flagged.to_string(),
        ])?;
    }

    wtr.flush()?;
    wtr.into_inner().map_err(|e| ExportError::Io(e.into_error()))
}
