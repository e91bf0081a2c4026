// 4.0: the audit log. append-only, hash-chained, gapless. the single source
// of truth for what happened and in which order, across all accounts.
// 4.1: each record's hash covers its sequence, timestamp, payload and the
// previous record's hash, so editing any historical byte breaks the chain.

use crate::events::EventPayload;
use crate::types::Timestamp;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Sentinel previous-hash of the first record.
pub const GENESIS_HASH: &str = "genesis";

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum IntegrityError {
    #[error("Sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("Chain broken at sequence {sequence}: previous-hash link does not match")]
    BrokenChain { sequence: u64 },

    #[error("Hash mismatch at sequence {sequence}: record content does not match its hash")]
    HashMismatch { sequence: u64 },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditRecord {
    pub sequence: u64,
    pub timestamp: Timestamp,
    pub payload: EventPayload,
    pub previous_hash: String,
    pub hash: String,
}

impl AuditRecord {
    // The hash field itself is excluded from the preimage; everything else
    // is covered.
    fn compute_hash(
        sequence: u64,
        timestamp: Timestamp,
        payload: &EventPayload,
        previous_hash: &str,
    ) -> String {
        let body =
            serde_json::to_string(payload).expect("event payload serialization cannot fail");
        let mut hasher = Sha256::new();
        hasher.update(sequence.to_le_bytes());
        hasher.update(timestamp.as_millis().to_le_bytes());
        hasher.update(body.as_bytes());
        hasher.update(previous_hash.as_bytes());
        hex::encode(hasher.finalize())
    }
}

#[derive(Debug, Default)]
pub struct AuditLog {
    records: Mutex<Vec<AuditRecord>>,
}

impl AuditLog {
    pub fn new() -> Self {
        Self {
            records: Mutex::new(Vec::new()),
        }
    }

    /// Appends one record under the single writer lock. The sequence equals
    /// the record's index; concurrent appenders get a total order.
    pub fn append(&self, timestamp: Timestamp, payload: EventPayload) -> AuditRecord {
        let mut records = self.records.lock();
        let sequence = records.len() as u64;
        let previous_hash = records
            .last()
            .map(|r| r.hash.clone())
            .unwrap_or_else(|| GENESIS_HASH.to_string());
        let hash = AuditRecord::compute_hash(sequence, timestamp, &payload, &previous_hash);
        let record = AuditRecord {
            sequence,
            timestamp,
            payload,
            previous_hash,
            hash,
        };
        records.push(record.clone());
        record
    }

    pub fn len(&self) -> usize {
        self.records.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.lock().is_empty()
    }

    pub fn records(&self) -> Vec<AuditRecord> {
        self.records.lock().clone()
    }

    /// Walks the whole log, recomputing every hash and back-link. Reports
    /// the first offending sequence; never repairs anything.
    pub fn verify_integrity(&self) -> Result<(), IntegrityError> {
        let records = self.records.lock();
        let mut previous_hash = GENESIS_HASH;

        for (index, record) in records.iter().enumerate() {
            if record.sequence != index as u64 {
                return Err(IntegrityError::SequenceGap {
                    expected: index as u64,
                    found: record.sequence,
                });
            }
            if record.previous_hash != previous_hash {
                return Err(IntegrityError::BrokenChain {
                    sequence: record.sequence,
                });
            }
            let recomputed = AuditRecord::compute_hash(
                record.sequence,
                record.timestamp,
                &record.payload,
                &record.previous_hash,
            );
            if recomputed != record.hash {
                return Err(IntegrityError::HashMismatch {
                    sequence: record.sequence,
                });
            }
            previous_hash = &record.hash;
        }
        Ok(())
    }

    /// Read-only scan of records whose timestamp falls in [from, to].
    pub fn export_range(&self, from: Timestamp, to: Timestamp) -> Vec<AuditRecord> {
        self.records
            .lock()
            .iter()
            .filter(|r| r.timestamp >= from && r.timestamp <= to)
            .cloned()
            .collect()
    }
}
