//! Error taxonomy for the mirroring core.
//!
//! Every variant except `Auth` and `NotConfigured` is recovered inside the
//! reconciliation loop; see `bot.rs` for the per-variant policy.

use thiserror::Error;

#[derive(Error, Debug)]
pub enum CopierError {
    /// Order list could not be fetched (transport, auth, timeout, bad payload).
    #[error("source unavailable: {0}")]
    SourceUnavailable(String),

    /// Symbol did not parse, or the destination symbol directory had no match.
    #[error("unresolved instrument {symbol}: {reason}")]
    UnresolvedInstrument { symbol: String, reason: String },

    /// The destination brokerage answered and declined the order.
    #[error("placement rejected: {message}")]
    PlacementRejected { code: Option<String>, message: String },

    /// The placement request never got a usable answer.
    #[error("placement transport error: {0}")]
    PlacementTransportError(String),

    #[error("mapping already exists for source order {0}")]
    DuplicateKey(String),

    #[error("session error: {0}")]
    Auth(String),

    /// Required setting absent; retrying cannot help.
    #[error("not configured: {0}")]
    NotConfigured(String),

    #[error("mapping store error: {0}")]
    Store(#[from] sqlx::Error),
}

impl CopierError {
    pub fn unresolved(symbol: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::UnresolvedInstrument {
            symbol: symbol.into(),
            reason: reason.into(),
        }
    }

    /// Placement failures leave the order eligible for the next poll.
    pub fn is_placement_failure(&self) -> bool {
        matches!(
            self,
            Self::PlacementRejected { .. } | Self::PlacementTransportError(_)
        )
    }
}

pub type CopierResult<T> = Result<T, CopierError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_placement_failure_classification() {
        assert!(CopierError::PlacementTransportError("reset".into()).is_placement_failure());
        assert!(CopierError::PlacementRejected {
            code: Some("e-orders-0005".into()),
            message: "insufficient margin".into(),
        }
        .is_placement_failure());
        assert!(!CopierError::DuplicateKey("1".into()).is_placement_failure());
        assert!(!CopierError::SourceUnavailable("down".into()).is_placement_failure());
    }

    #[test]
    fn test_unresolved_display() {
        let err = CopierError::unresolved("NIFTY25NOVFUT", "missing option type");
        assert_eq!(
            err.to_string(),
            "unresolved instrument NIFTY25NOVFUT: missing option type"
        );
    }
}
