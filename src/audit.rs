//! Append-only order audit log.
//!
//! One timestamped line per notable event:
//! `[2025-11-03 10:15:32] Mirrored S 251103000012345 -> D 1100021 ...`.
//! Writing is best effort; a failing audit file never stops the copier.

use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::Local;
use rust_decimal::Decimal;
use tracing::{info, warn};

use crate::models::OrderSide;

const AUDIT_TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Events worth a line in the audit trail.
#[derive(Debug, Clone, PartialEq)]
pub enum AuditEvent {
    Started {
        multiplier: u32,
        existing_mappings: usize,
    },
    /// Order present in the first poll; never mirrored.
    HistoricalSkip {
        order_id: String,
        symbol: String,
        status: String,
    },
    ResolveFailed {
        order_id: String,
        symbol: String,
        reason: String,
    },
    Resolved {
        order_id: String,
        symbol: String,
        contract: String,
        instrument_id: i64,
    },
    Placed {
        order_id: String,
        destination_order_id: String,
        symbol: String,
        side: OrderSide,
        source_quantity: u32,
        quantity: u64,
        average_price: Decimal,
    },
    MappingWritten {
        order_id: String,
        destination_order_id: String,
    },
    PlacementFailed {
        order_id: String,
        symbol: String,
        error: String,
    },
    /// Destination accepted the order but the mapping could not be written.
    MappingFailed {
        order_id: String,
        destination_order_id: String,
        error: String,
    },
    DuplicateKey {
        order_id: String,
    },
}

impl std::fmt::Display for AuditEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AuditEvent::Started {
                multiplier,
                existing_mappings,
            } => write!(
                f,
                "Copier started. Multiplier={} existing mappings={}",
                multiplier, existing_mappings
            ),
            AuditEvent::HistoricalSkip {
                order_id,
                symbol,
                status,
            } => write!(
                f,
                "Pre-start order not tracked: S {} symbol={} status={}",
                order_id, symbol, status
            ),
            AuditEvent::ResolveFailed {
                order_id,
                symbol,
                reason,
            } => write!(
                f,
                "Resolve failed for {}; skipping S {}: {}",
                symbol, order_id, reason
            ),
            AuditEvent::Resolved {
                order_id,
                symbol,
                contract,
                instrument_id,
            } => write!(
                f,
                "Resolved {} ({}) -> instrument {} for S {}",
                symbol, contract, instrument_id, order_id
            ),
            AuditEvent::Placed {
                order_id,
                destination_order_id,
                symbol,
                side,
                source_quantity,
                quantity,
                average_price,
            } => write!(
                f,
                "Mirrored S {} -> D {} {} {} qty={} (source qty={} avg={})",
                order_id, destination_order_id, side, symbol, quantity, source_quantity, average_price
            ),
            AuditEvent::MappingWritten {
                order_id,
                destination_order_id,
            } => write!(f, "Mapping written: S {} -> D {}", order_id, destination_order_id),
            AuditEvent::PlacementFailed {
                order_id,
                symbol,
                error,
            } => write!(
                f,
                "Placement failed for S {} ({}), will retry: {}",
                order_id, symbol, error
            ),
            AuditEvent::MappingFailed {
                order_id,
                destination_order_id,
                error,
            } => write!(
                f,
                "UNMAPPED: S {} placed as D {} but mapping not written, not retrying: {}",
                order_id, destination_order_id, error
            ),
            AuditEvent::DuplicateKey { order_id } => {
                write!(f, "DUPLICATE mapping refused for S {}", order_id)
            }
        }
    }
}

/// Sink for audit events.
pub trait AuditLog: Send + Sync {
    fn record(&self, event: &AuditEvent);
}

/// Audit trail appended to a text file.
pub struct FileAuditLog {
    path: PathBuf,
}

impl FileAuditLog {
    pub fn new(path: impl AsRef<Path>) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn append_line(&self, line: &str) -> std::io::Result<()> {
        let mut file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(&self.path)?;
        writeln!(file, "{}", line)
    }
}

/// `[YYYY-mm-dd HH:MM:SS] message` in local time.
pub fn format_line(message: &str) -> String {
    format!(
        "[{}] {}",
        Local::now().format(AUDIT_TIMESTAMP_FORMAT),
        message
    )
}

impl AuditLog for FileAuditLog {
    fn record(&self, event: &AuditEvent) {
        let message = event.to_string();
        info!(target: "audit", "{}", message);

        if let Err(e) = self.append_line(&format_line(&message)) {
            warn!(path = %self.path.display(), error = %e, "Failed to write audit line");
        }
    }
}

/// In-memory audit sink for tests.
#[cfg(test)]
#[derive(Default)]
pub struct MemoryAuditLog {
    events: std::sync::Mutex<Vec<AuditEvent>>,
}

#[cfg(test)]
impl MemoryAuditLog {
    pub fn events(&self) -> Vec<AuditEvent> {
        self.events.lock().unwrap().clone()
    }
}

#[cfg(test)]
impl AuditLog for MemoryAuditLog {
    fn record(&self, event: &AuditEvent) {
        self.events.lock().unwrap().push(event.clone());
    }
}
