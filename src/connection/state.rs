//! Connection state machine

use crate::{Error, Result};

/// Connection state
///
/// Only `Ready` admits query traffic. A transport that is open but not yet
/// verified is never `Ready`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    /// No transport
    Closed,

    /// Transport being constructed and opened
    Opening,

    /// Transport open, version verification in flight
    Verifying,

    /// Verified; requests allowed
    Ready,

    /// Server rejected the handshake key; transport kept until `close`
    Rejected,
}

impl ConnectionState {
    /// Check if transition is valid
    pub fn can_transition_to(&self, next: ConnectionState) -> bool {
        use ConnectionState::*;

        matches!(
            (self, next),
            (Closed, Opening)
                | (Opening, Verifying)
                | (Verifying, Ready)
                | (Verifying, Rejected)
                | (_, Closed)
        )
    }

    /// Transition to new state
    pub fn transition(&mut self, next: ConnectionState) -> Result<()> {
        if !self.can_transition_to(next) {
            return Err(Error::InvalidState {
                expected: format!("valid transition from {:?}", self),
                actual: format!("{:?}", next),
            });
        }
        *self = next;
        Ok(())
    }
}

impl std::fmt::Display for ConnectionState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Closed => write!(f, "closed"),
            Self::Opening => write!(f, "opening"),
            Self::Verifying => write!(f, "verifying"),
            Self::Ready => write!(f, "ready"),
            Self::Rejected => write!(f, "rejected"),
        }
    }
}
