use std::rc::Rc;

use async_trait::async_trait;
use crowdfunding_contract::CampaignId;
use thiserror::Error;

use crate::record::{CampaignRecord, ContributionRecord};
use crate::request::{Rejection, Request, RequestId, SendStatus, TxStatus};

#[derive(Clone, Debug, PartialEq, Eq, Error)]
pub enum RpcError {
    /// The call may or may not have reached the ledger.
    #[error("transport failure: {0}")]
    Transport(String),

    #[error(transparent)]
    Rejected(#[from] Rejection),
}

pub type RpcResult<T> = Result<T, RpcError>;

/// Request/response surface of the authoritative ledger.
///
/// Mutations go through `send_transaction` and are only known to have
/// applied once `get_transaction` reports them. Reads always reflect
/// committed state. Implementations are not required to be `Send`: the
/// in-process Soroban host is single-threaded.
#[async_trait(?Send)]
pub trait LedgerRpc {
    async fn send_transaction(&self, request: &Request) -> RpcResult<SendStatus>;
    async fn get_transaction(&self, id: &RequestId) -> RpcResult<TxStatus>;
    async fn get_campaign(&self, id: CampaignId) -> RpcResult<CampaignRecord>;
    async fn get_campaign_count(&self) -> RpcResult<u64>;
    async fn get_contributions(
        &self,
        id: CampaignId,
        start: u32,
        limit: u32,
    ) -> RpcResult<Vec<ContributionRecord>>;
    async fn get_pledge(&self, id: CampaignId, contributor: &str) -> RpcResult<i128>;
    async fn balance(&self, address: &str) -> RpcResult<i128>;
    /// Timestamp the next included request will observe, at the earliest.
    async fn latest_ledger_time(&self) -> RpcResult<u64>;
}

#[async_trait(?Send)]
impl<T: LedgerRpc + ?Sized> LedgerRpc for Rc<T> {
    async fn send_transaction(&self, request: &Request) -> RpcResult<SendStatus> {
        (**self).send_transaction(request).await
    }

    async fn get_transaction(&self, id: &RequestId) -> RpcResult<TxStatus> {
        (**self).get_transaction(id).await
    }

    async fn get_campaign(&self, id: CampaignId) -> RpcResult<CampaignRecord> {
        (**self).get_campaign(id).await
    }

    async fn get_campaign_count(&self) -> RpcResult<u64> {
        (**self).get_campaign_count().await
    }

    async fn get_contributions(
        &self,
        id: CampaignId,
        start: u32,
        limit: u32,
    ) -> RpcResult<Vec<ContributionRecord>> {
        (**self).get_contributions(id, start, limit).await
    }

    async fn get_pledge(&self, id: CampaignId, contributor: &str) -> RpcResult<i128> {
        (**self).get_pledge(id, contributor).await
    }

    async fn balance(&self, address: &str) -> RpcResult<i128> {
        (**self).balance(address).await
    }

    async fn latest_ledger_time(&self) -> RpcResult<u64> {
        (**self).latest_ledger_time().await
    }
}
