//! Audit trail of moderated turns.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

/// The original and refined text of one moderated turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuditRecord {
    pub timestamp: DateTime<Utc>,
    pub original: String,
    pub refined: String,
    pub was_modified: bool,
    pub was_refusal: bool,

    /// Name of the adventure that produced the turn
    pub prompt_used: String,
}

impl AuditRecord {
    pub fn new(
        original: impl Into<String>,
        refined: impl Into<String>,
        was_modified: bool,
        was_refusal: bool,
        prompt_used: impl Into<String>,
    ) -> Self {
        Self {
            timestamp: Utc::now(),
            original: original.into(),
            refined: refined.into(),
            was_modified,
            was_refusal,
            prompt_used: prompt_used.into(),
        }
    }
}

/// Receives audit records. Recording never fails from the caller's view.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: AuditRecord);
}

/// Emits records as `info` events on the `taleward::audit` target.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: AuditRecord) {
        tracing::info!(
            target: "taleward::audit",
            timestamp = %record.timestamp.to_rfc3339(),
            was_modified = record.was_modified,
            was_refusal = record.was_refusal,
            prompt_used = %record.prompt_used,
            original_chars = record.original.len(),
            refined_chars = record.refined.len(),
            "turn audited"
        );
    }
}

/// Keeps records in memory.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: AuditRecord) {
        self.records.lock().push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_keeps_order() {
        let sink = MemoryAuditSink::new();
        assert!(sink.is_empty());

        sink.record(AuditRecord::new("a", "a", false, false, "Pirates"));
        sink.record(AuditRecord::new("b", "B", true, true, "Pirates"));

        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].original, "a");
        assert!(records[1].was_modified);
        assert!(records[1].was_refusal);
    }

    #[test]
    fn test_record_serializes() {
        let record = AuditRecord::new("old", "new", true, false, "Pirates");
        let json = serde_json::to_value(&record).unwrap();
        assert_eq!(json["prompt_used"], "Pirates");
        assert_eq!(json["was_modified"], true);
        assert!(json["timestamp"].is_string());
    }
}
