//! Audit sinks. Records go to the dedicated `auto_file_sorter::audit`
//! target (severity `MOVE`) so "what got moved" can be filtered out of the
//! general diagnostics.

use crate::domain::model::{AuditRecord, Outcome};
use crate::domain::ports::AuditSink;
use crate::utils::logger::AUDIT_TARGET;
use std::sync::{Mutex, PoisonError};

#[derive(Debug, Clone, Copy, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: &AuditRecord) {
        let source = record.source_path.display();
        let destination = record
            .destination_path
            .as_ref()
            .map(|p| p.display().to_string())
            .unwrap_or_else(|| "-".to_string());
        let reason = record.reason.as_deref().unwrap_or("");
        let timestamp = record.timestamp.to_rfc3339();

        if record.outcome.is_success() {
            tracing::info!(
                target: AUDIT_TARGET,
                severity = "MOVE",
                outcome = %record.outcome,
                %timestamp,
                "📦 Moved {} -> {}",
                source,
                destination
            );
        } else if record.outcome.is_failure() {
            tracing::warn!(
                target: AUDIT_TARGET,
                severity = "MOVE",
                outcome = %record.outcome,
                %timestamp,
                destination = %destination,
                "❌ Could not sort {}: {}",
                source,
                reason
            );
        } else {
            tracing::info!(
                target: AUDIT_TARGET,
                severity = "MOVE",
                outcome = %record.outcome,
                %timestamp,
                "⏭️ Left {} in place: {}",
                source,
                reason
            );
        }
    }
}

/// Keeps every record in memory; used by tests and embedders that want to inspect outcomes.
#[derive(Debug, Default)]
pub struct MemoryAuditSink {
    records: Mutex<Vec<AuditRecord>>,
}

impl MemoryAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub fn count(&self, outcome: Outcome) -> usize {
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|record| record.outcome == outcome)
            .count()
    }

    pub fn len(&self) -> usize {
        self.records.lock().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl AuditSink for MemoryAuditSink {
    fn record(&self, record: &AuditRecord) {
        TracingAuditSink.record(record);
        self.records
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(record.clone());
    }
}
