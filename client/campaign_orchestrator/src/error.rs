use std::fmt;
use std::time::Duration;

use crowdfunding_contract::{CampaignId, Error as ContractError};
use serde::Serialize;
use thiserror::Error;

use crate::request::{Rejection, RequestId};
use crate::units::UnitsError;

/// Campaign a request or failure refers to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Target {
    New,
    Campaign(CampaignId),
}

impl fmt::Display for Target {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Target::New => f.write_str("new campaign"),
            Target::Campaign(id) => write!(f, "campaign #{id}"),
        }
    }
}

#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The ledger refused the request (or a read). Final; never retried.
    #[error("{target}: rejected by ledger: {rejection}")]
    Rejected { target: Target, rejection: Rejection },

    /// An advisory check predicted the ledger's refusal; nothing was submitted.
    #[error("{target}: refused before submission: {error:?}")]
    Refused { target: Target, error: ContractError },

    #[error("{target}: submission of request {request} failed: {reason}")]
    SubmissionFailed {
        target: Target,
        request: RequestId,
        reason: String,
    },

    #[error("{target}: request {request} not confirmed within {waited:?}")]
    Timeout {
        target: Target,
        request: RequestId,
        waited: Duration,
    },

    #[error("{target}: ledger unreachable: {reason}")]
    Unreachable { target: Target, reason: String },

    #[error("{0}")]
    Units(#[from] UnitsError),
}

impl OrchestratorError {
    /// Failure kind as named in the ledger's error taxonomy.
    pub fn kind(&self) -> String {
        match self {
            OrchestratorError::Rejected { rejection, .. } => match rejection {
                Rejection::Contract(error) => format!("{error:?}"),
                Rejection::Host(_) => "HostError".to_string(),
            },
            OrchestratorError::Refused { error, .. } => format!("{error:?}"),
            OrchestratorError::SubmissionFailed { .. } => "SubmissionFailed".to_string(),
            OrchestratorError::Timeout { .. } => "Timeout".to_string(),
            OrchestratorError::Unreachable { .. } => "Unreachable".to_string(),
            OrchestratorError::Units(_) => "InvalidInput".to_string(),
        }
    }

    pub fn target(&self) -> Option<Target> {
        match self {
            OrchestratorError::Rejected { target, .. }
            | OrchestratorError::Refused { target, .. }
            | OrchestratorError::SubmissionFailed { target, .. }
            | OrchestratorError::Timeout { target, .. }
            | OrchestratorError::Unreachable { target, .. } => Some(*target),
            OrchestratorError::Units(_) => None,
        }
    }

    /// The contract error behind a rejection, whether it came from the
    /// ledger or from the advisory check.
    pub fn contract_error(&self) -> Option<ContractError> {
        match self {
            OrchestratorError::Rejected { rejection, .. } => rejection.contract_error(),
            OrchestratorError::Refused { error, .. } => Some(*error),
            _ => None,
        }
    }

    /// Whether the effect of the request may have landed anyway.
    pub fn is_ambiguous(&self) -> bool {
        matches!(
            self,
            OrchestratorError::SubmissionFailed { .. } | OrchestratorError::Timeout { .. }
        )
    }
}

pub type OrchestratorResult<T> = Result<T, OrchestratorError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn kind_names_follow_taxonomy() {
        let rejected = OrchestratorError::Rejected {
            target: Target::Campaign(3),
            rejection: Rejection::Contract(ContractError::GoalNotMet),
        };
        assert_eq!(rejected.kind(), "GoalNotMet");
        assert_eq!(rejected.target(), Some(Target::Campaign(3)));
        assert_eq!(
            rejected.to_string(),
            "campaign #3: rejected by ledger: GoalNotMet"
        );
        assert!(!rejected.is_ambiguous());

        let refused = OrchestratorError::Refused {
            target: Target::New,
            error: ContractError::InvalidParameters,
        };
        assert_eq!(refused.kind(), "InvalidParameters");
        assert_eq!(refused.contract_error(), Some(ContractError::InvalidParameters));
    }
}
