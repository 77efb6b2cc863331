//! Off-chain side of the crowdfunding ledger: builds requests, drives them to
//! a confirmed outcome and keeps read-only projections of campaigns.

pub mod cache;
pub mod config;
pub mod error;
pub mod identity;
pub mod journal;
pub mod ledger;
pub mod orchestrator;
pub mod record;
pub mod request;
pub mod sandbox;
pub mod units;

pub use crowdfunding_contract::{resolver, CampaignId, CampaignStatus, Error as ContractError};

pub use cache::{Projection, ProjectionCache};
pub use config::{Config, Network, SubmitSettings};
pub use error::{OrchestratorError, OrchestratorResult, Target};
pub use identity::{Identity, Keyring};
pub use ledger::{LedgerRpc, RpcError};
pub use orchestrator::{Confirmed, Orchestrator};
pub use record::{CampaignRecord, ContributionRecord};
pub use sandbox::{Clock, FaultPlan, SandboxLedger};
