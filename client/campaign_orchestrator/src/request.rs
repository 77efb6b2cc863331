//! State-change requests and the ledger's answers about them.

use std::fmt;

use crowdfunding_contract::{CampaignId, Error as ContractError};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use uuid::Uuid;

use crate::config::Network;
use crate::error::Target;

/// Identity of one request: BLAKE3 over network, source, nonce and operation.
/// The ledger includes a given id at most once.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct RequestId([u8; 32]);

impl RequestId {
    pub fn derive(network: Network, source: &str, nonce: &Uuid, operation: &Operation) -> Self {
        let mut hasher = blake3::Hasher::new();
        hasher.update(network.passphrase().as_bytes());
        hasher.update(&[0]);
        hasher.update(source.as_bytes());
        hasher.update(&[0]);
        hasher.update(nonce.as_bytes());
        operation.encode_into(&mut hasher);
        Self(*hasher.finalize().as_bytes())
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Abbreviated form for logs.
    pub fn short(&self) -> String {
        hex::encode(&self.0[..6])
    }
}

impl fmt::Display for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_hex())
    }
}

impl fmt::Debug for RequestId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "RequestId({})", self.short())
    }
}

impl TryFrom<String> for RequestId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        let bytes = hex::decode(&value).map_err(|e| format!("invalid request id {value}: {e}"))?;
        let bytes: [u8; 32] = bytes
            .try_into()
            .map_err(|_| format!("request id {value} is not 32 bytes"))?;
        Ok(Self(bytes))
    }
}

impl From<RequestId> for String {
    fn from(id: RequestId) -> Self {
        id.to_hex()
    }
}

/// One ledger entry point with its arguments. The acting address travels on
/// the enclosing [`Request`].
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    CreateCampaign {
        goal: i128,
        deadline: u64,
        metadata_cid: String,
    },
    Contribute {
        campaign_id: CampaignId,
        amount: i128,
    },
    Withdraw {
        campaign_id: CampaignId,
    },
    CloseCampaign {
        campaign_id: CampaignId,
    },
    ClaimRefund {
        campaign_id: CampaignId,
    },
}

impl Operation {
    pub fn campaign_id(&self) -> Option<CampaignId> {
        match self {
            Operation::CreateCampaign { .. } => None,
            Operation::Contribute { campaign_id, .. }
            | Operation::Withdraw { campaign_id }
            | Operation::CloseCampaign { campaign_id }
            | Operation::ClaimRefund { campaign_id } => Some(*campaign_id),
        }
    }

    pub fn target(&self) -> Target {
        self.campaign_id().map_or(Target::New, Target::Campaign)
    }

    pub fn name(&self) -> &'static str {
        match self {
            Operation::CreateCampaign { .. } => "create_campaign",
            Operation::Contribute { .. } => "contribute",
            Operation::Withdraw { .. } => "withdraw",
            Operation::CloseCampaign { .. } => "close_campaign",
            Operation::ClaimRefund { .. } => "claim_refund",
        }
    }

    fn encode_into(&self, hasher: &mut blake3::Hasher) {
        hasher.update(self.name().as_bytes());
        match self {
            Operation::CreateCampaign {
                goal,
                deadline,
                metadata_cid,
            } => {
                hasher.update(&goal.to_be_bytes());
                hasher.update(&deadline.to_be_bytes());
                hasher.update(&(metadata_cid.len() as u64).to_be_bytes());
                hasher.update(metadata_cid.as_bytes());
            }
            Operation::Contribute {
                campaign_id,
                amount,
            } => {
                hasher.update(&campaign_id.to_be_bytes());
                hasher.update(&amount.to_be_bytes());
            }
            Operation::Withdraw { campaign_id }
            | Operation::CloseCampaign { campaign_id }
            | Operation::ClaimRefund { campaign_id } => {
                hasher.update(&campaign_id.to_be_bytes());
            }
        }
    }
}

/// A request as submitted: operation, acting address and a unique nonce.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Request {
    pub id: RequestId,
    pub source: String,
    pub nonce: Uuid,
    pub operation: Operation,
}

impl Request {
    pub fn new(network: Network, source: &str, operation: Operation) -> Self {
        let nonce = Uuid::now_v7();
        Self {
            id: RequestId::derive(network, source, &nonce, &operation),
            source: source.to_string(),
            nonce,
            operation,
        }
    }

    /// Whether the id was derived from this content on `network`.
    pub fn is_well_formed(&self, network: Network) -> bool {
        RequestId::derive(network, &self.source, &self.nonce, &self.operation) == self.id
    }
}

/// Ledger-side refusal of a request.
#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum Rejection {
    #[error("{0:?}")]
    Contract(ContractError),
    #[error("host error: {0}")]
    Host(String),
}

impl Rejection {
    pub fn contract_error(&self) -> Option<ContractError> {
        match self {
            Rejection::Contract(error) => Some(*error),
            Rejection::Host(_) => None,
        }
    }
}

impl From<ContractError> for Rejection {
    fn from(error: ContractError) -> Self {
        Rejection::Contract(error)
    }
}

/// Value returned by an included request.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TxResult {
    Created(CampaignId),
    Applied,
    Refunded(i128),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Inclusion {
    pub result: TxResult,
    pub ledger: u32,
    pub ledger_time: u64,
}

/// Answer to a submission. Neither variant means the request succeeded.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum SendStatus {
    Pending,
    Duplicate,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TxStatus {
    NotFound,
    Pending,
    Success(Inclusion),
    Failed(Rejection),
}
