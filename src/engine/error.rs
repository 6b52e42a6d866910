use ulid::Ulid;

use crate::admission::RuleViolation;
use crate::model::ReservationStatus;

#[derive(Debug)]
pub enum EngineError {
    ReservationNotFound(Ulid),
    CodeNotFound(String),
    AlreadyExists(Ulid),
    InvalidStateTransition {
        id: Ulid,
        from: ReservationStatus,
        to: ReservationStatus,
    },
    KeyNotReturned(Ulid),
    InvalidDetails(&'static str),
    /// Payment recorded against an exempt or no-longer-payable reservation.
    NotPayable(Ulid),
    /// Confirmation attempted for a request that is not admissible.
    Rejected(Vec<RuleViolation>),
    LimitExceeded(&'static str),
    WalError(String),
}

impl std::fmt::Display for EngineError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            EngineError::ReservationNotFound(id) => write!(f, "reservation not found: {id}"),
            EngineError::CodeNotFound(code) => write!(f, "no reservation with code {code}"),
            EngineError::AlreadyExists(id) => write!(f, "already exists: {id}"),
            EngineError::InvalidStateTransition { id, from, to } => {
                write!(f, "reservation {id}: cannot go from {from} to {to}")
            }
            EngineError::KeyNotReturned(id) => {
                write!(f, "reservation {id}: key must be returned before check-out")
            }
            EngineError::InvalidDetails(msg) => write!(f, "invalid details: {msg}"),
            EngineError::NotPayable(id) => write!(f, "reservation {id} is not awaiting payment"),
            EngineError::Rejected(reasons) => {
                write!(f, "request rejected")?;
                for (i, r) in reasons.iter().enumerate() {
                    let sep = if i == 0 { ": " } else { "; " };
                    write!(f, "{sep}{r}")?;
                }
                Ok(())
            }
            EngineError::LimitExceeded(msg) => write!(f, "limit exceeded: {msg}"),
            EngineError::WalError(e) => write!(f, "WAL error: {e}"),
        }
    }
}

impl std::error::Error for EngineError {}
