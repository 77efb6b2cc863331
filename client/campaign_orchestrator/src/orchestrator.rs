//! Submit-and-confirm driver for one actor.
//!
//! A request is only reported as done once the ledger says so. Answers that
//! leave the outcome unknown (a transport failure on submission, or no
//! confirmation within the timeout) are reconciled against the ledger before
//! the same request, with the same id, is offered again.

use crowdfunding_contract::resolver;
use crowdfunding_contract::{CampaignId, CampaignStatus, Error as ContractError, MAX_PAGE_SIZE};
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::time::Instant;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::cache::{Projection, ProjectionCache};
use crate::config::{Network, SubmitSettings};
use crate::error::{OrchestratorError, OrchestratorResult, Target};
use crate::identity::Identity;
use crate::ledger::{LedgerRpc, RpcError};
use crate::record::{CampaignRecord, ContributionRecord};
use crate::request::{Inclusion, Operation, Request, RequestId, TxResult, TxStatus};

/// A request the ledger has confirmed, with the campaign as re-read afterwards.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Confirmed {
    pub request: RequestId,
    pub operation: &'static str,
    pub outcome: TxResult,
    pub campaign_id: Option<CampaignId>,
    /// `None` when the campaign could not be read back. The effect stands
    /// regardless; its projection stays invalidated until the next read.
    pub campaign: Option<CampaignRecord>,
    /// Ledger that included the request; `None` when the effect was found by
    /// re-reading the campaign instead.
    pub ledger: Option<u32>,
    pub reconciled: bool,
}

/// Why the last attempt ended without an answer.
enum Unknown {
    Submission(String),
    Unconfirmed,
}

/// What the ledger knows about a request whose outcome was unknown.
enum Reconciled {
    Included(Inclusion),
    /// Not included, but the campaign already shows the intended effect.
    Observed(CampaignRecord),
    InFlight,
    Missing,
}

pub struct Orchestrator<L: LedgerRpc> {
    ledger: L,
    identity: Identity,
    network: Network,
    cache: ProjectionCache,
    settings: SubmitSettings,
    session: Mutex<()>,
}

fn lift(target: Target, error: RpcError) -> OrchestratorError {
    match error {
        RpcError::Transport(reason) => OrchestratorError::Unreachable { target, reason },
        RpcError::Rejected(rejection) => OrchestratorError::Rejected { target, rejection },
    }
}

impl<L: LedgerRpc> Orchestrator<L> {
    pub fn new(
        ledger: L,
        identity: Identity,
        network: Network,
        cache: ProjectionCache,
        settings: SubmitSettings,
    ) -> Self {
        Self {
            ledger,
            identity,
            network,
            cache,
            settings,
            session: Mutex::new(()),
        }
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn cache(&self) -> &ProjectionCache {
        &self.cache
    }

    pub fn ledger(&self) -> &L {
        &self.ledger
    }

    pub async fn create_campaign(
        &self,
        goal: i128,
        deadline: u64,
        metadata_cid: &str,
    ) -> OrchestratorResult<Confirmed> {
        self.execute(Operation::CreateCampaign {
            goal,
            deadline,
            metadata_cid: metadata_cid.to_string(),
        })
        .await
    }

    pub async fn contribute(
        &self,
        campaign_id: CampaignId,
        amount: i128,
    ) -> OrchestratorResult<Confirmed> {
        self.execute(Operation::Contribute {
            campaign_id,
            amount,
        })
        .await
    }

    pub async fn withdraw(&self, campaign_id: CampaignId) -> OrchestratorResult<Confirmed> {
        self.execute(Operation::Withdraw { campaign_id }).await
    }

    pub async fn close_campaign(&self, campaign_id: CampaignId) -> OrchestratorResult<Confirmed> {
        self.execute(Operation::CloseCampaign { campaign_id }).await
    }

    pub async fn claim_refund(&self, campaign_id: CampaignId) -> OrchestratorResult<Confirmed> {
        self.execute(Operation::ClaimRefund { campaign_id }).await
    }

    /// Run one operation to a confirmed outcome. Requests from this actor are
    /// issued one at a time.
    pub async fn execute(&self, operation: Operation) -> OrchestratorResult<Confirmed> {
        let _session = self.session.lock().await;

        if self.settings.precheck {
            self.precheck(&operation).await?;
        }
        if let Some(campaign_id) = operation.campaign_id() {
            self.cache.invalidate(campaign_id);
        }

        let request = Request::new(self.network, &self.identity.address, operation);
        let span = info_span!(
            "request",
            id = %request.id.short(),
            op = request.operation.name(),
            campaign = %request.operation.target(),
            actor = %self.identity.name,
        );
        self.submit_and_confirm(request).instrument(span).await
    }

    /// Fresh read of one campaign; the projection is refreshed on the way.
    pub async fn campaign(&self, campaign_id: CampaignId) -> OrchestratorResult<Projection> {
        let target = Target::Campaign(campaign_id);
        let record = self
            .ledger
            .get_campaign(campaign_id)
            .await
            .map_err(|e| lift(target, e))?;
        let observed_at = self
            .ledger
            .latest_ledger_time()
            .await
            .map_err(|e| lift(target, e))?;
        self.cache.refresh(record.clone(), observed_at);
        Ok(Projection {
            record,
            observed_at,
        })
    }

    pub async fn campaigns(&self) -> OrchestratorResult<Vec<Projection>> {
        let count = self
            .ledger
            .get_campaign_count()
            .await
            .map_err(|e| lift(Target::New, e))?;
        let mut all = Vec::with_capacity(count as usize);
        for campaign_id in 1..=count {
            all.push(self.campaign(campaign_id).await?);
        }
        Ok(all)
    }

    /// The whole contribution log of a campaign, oldest first.
    pub async fn contributions(
        &self,
        campaign_id: CampaignId,
    ) -> OrchestratorResult<Vec<ContributionRecord>> {
        let target = Target::Campaign(campaign_id);
        let mut log = Vec::new();
        loop {
            let start = u32::try_from(log.len()).unwrap_or(u32::MAX);
            let page = self
                .ledger
                .get_contributions(campaign_id, start, MAX_PAGE_SIZE)
                .await
                .map_err(|e| lift(target, e))?;
            let last = page.len() < MAX_PAGE_SIZE as usize;
            log.extend(page);
            if last {
                return Ok(log);
            }
        }
    }

    pub async fn pledge(&self, campaign_id: CampaignId) -> OrchestratorResult<i128> {
        self.ledger
            .get_pledge(campaign_id, &self.identity.address)
            .await
            .map_err(|e| lift(Target::Campaign(campaign_id), e))
    }

    pub async fn balance(&self) -> OrchestratorResult<i128> {
        self.ledger
            .balance(&self.identity.address)
            .await
            .map_err(|e| lift(Target::New, e))
    }

    /// Reject a request the ledger would certainly refuse. Advisory: the
    /// ledger re-checks everything.
    async fn precheck(&self, operation: &Operation) -> OrchestratorResult<()> {
        let target = operation.target();
        let refuse = |error: ContractError| {
            debug!(campaign = %target, ?error, op = operation.name(), "refused before submission");
            OrchestratorError::Refused { target, error }
        };
        let now = self
            .ledger
            .latest_ledger_time()
            .await
            .map_err(|e| lift(target, e))?;

        let campaign_id = match operation {
            Operation::CreateCampaign { goal, deadline, .. } => {
                if *goal <= 0 || *deadline <= now {
                    return Err(refuse(ContractError::InvalidParameters));
                }
                return Ok(());
            }
            Operation::Contribute { campaign_id, .. }
            | Operation::Withdraw { campaign_id }
            | Operation::CloseCampaign { campaign_id }
            | Operation::ClaimRefund { campaign_id } => *campaign_id,
        };
        let record = self
            .ledger
            .get_campaign(campaign_id)
            .await
            .map_err(|e| lift(target, e))?;

        match operation {
            Operation::CreateCampaign { .. } => Ok(()),
            Operation::Contribute { amount, .. } => {
                resolver::check_contribution(record.status, record.deadline, *amount, now)
                    .map_err(refuse)?;
                let balance = self.balance().await?;
                if balance < *amount {
                    return Err(refuse(ContractError::InsufficientBalance));
                }
                Ok(())
            }
            Operation::Withdraw { .. } => {
                if record.creator != self.identity.address {
                    return Err(refuse(ContractError::Unauthorized));
                }
                resolver::check_withdrawal(record.status, record.goal, record.total_funded)
                    .map_err(refuse)
            }
            Operation::CloseCampaign { .. } => {
                if record.creator != self.identity.address {
                    return Err(refuse(ContractError::Unauthorized));
                }
                resolver::check_close(record.status).map_err(refuse)
            }
            Operation::ClaimRefund { .. } => {
                let pledge = self.pledge(campaign_id).await?;
                resolver::check_refund(record.status, pledge).map_err(refuse)
            }
        }
    }

    async fn submit_and_confirm(&self, request: Request) -> OrchestratorResult<Confirmed> {
        let target = request.operation.target();
        let started = Instant::now();
        let mut attempt = 0;

        loop {
            attempt += 1;
            let unknown = match self.ledger.send_transaction(&request).await {
                Ok(status) => {
                    debug!(attempt, ?status, "submitted");
                    match self.await_inclusion(&request).await? {
                        Some(inclusion) => {
                            return Ok(self.confirm(&request, inclusion, false).await)
                        }
                        None => Unknown::Unconfirmed,
                    }
                }
                Err(RpcError::Rejected(rejection)) => {
                    return Err(OrchestratorError::Rejected { target, rejection });
                }
                Err(RpcError::Transport(reason)) => {
                    warn!(attempt, %reason, "submission outcome unknown");
                    Unknown::Submission(reason)
                }
            };

            match self.reconcile(&request).await? {
                Reconciled::Included(inclusion) => {
                    return Ok(self.confirm(&request, inclusion, true).await)
                }
                Reconciled::Observed(record) => {
                    return Ok(self.confirm_observed(&request, record).await)
                }
                Reconciled::InFlight => debug!(attempt, "request still in flight"),
                Reconciled::Missing => debug!(attempt, "request unknown to the ledger"),
            }

            if attempt >= self.settings.max_attempts {
                warn!(attempt, "giving up");
                return Err(match unknown {
                    Unknown::Submission(reason) => OrchestratorError::SubmissionFailed {
                        target,
                        request: request.id,
                        reason,
                    },
                    Unknown::Unconfirmed => OrchestratorError::Timeout {
                        target,
                        request: request.id,
                        waited: started.elapsed(),
                    },
                });
            }
            info!(attempt, "resubmitting");
        }
    }

    /// Poll until the request is included or the confirmation window closes.
    async fn await_inclusion(&self, request: &Request) -> OrchestratorResult<Option<Inclusion>> {
        let target = request.operation.target();
        let polling = async {
            loop {
                match self.ledger.get_transaction(&request.id).await {
                    Ok(TxStatus::Success(inclusion)) => return Ok(inclusion),
                    Ok(TxStatus::Failed(rejection)) | Err(RpcError::Rejected(rejection)) => {
                        return Err(rejection)
                    }
                    Ok(TxStatus::Pending) | Ok(TxStatus::NotFound) => {}
                    Err(RpcError::Transport(reason)) => debug!(%reason, "poll failed"),
                }
                tokio::time::sleep(self.settings.poll_interval).await;
            }
        };

        match tokio::time::timeout(self.settings.confirm_timeout, polling).await {
            Ok(Ok(inclusion)) => Ok(Some(inclusion)),
            Ok(Err(rejection)) => {
                info!(%rejection, "rejected by ledger");
                Err(OrchestratorError::Rejected { target, rejection })
            }
            Err(_) => {
                warn!(timeout = ?self.settings.confirm_timeout, "not confirmed in time");
                Ok(None)
            }
        }
    }

    async fn reconcile(&self, request: &Request) -> OrchestratorResult<Reconciled> {
        let target = request.operation.target();
        match self.ledger.get_transaction(&request.id).await {
            Ok(TxStatus::Success(inclusion)) => return Ok(Reconciled::Included(inclusion)),
            Ok(TxStatus::Failed(rejection)) | Err(RpcError::Rejected(rejection)) => {
                return Err(OrchestratorError::Rejected { target, rejection })
            }
            Ok(TxStatus::Pending) => return Ok(Reconciled::InFlight),
            Ok(TxStatus::NotFound) | Err(RpcError::Transport(_)) => {}
        }

        let (campaign_id, effect) = match &request.operation {
            Operation::Withdraw { campaign_id } => (*campaign_id, CampaignStatus::Successful),
            Operation::CloseCampaign { campaign_id } => (*campaign_id, CampaignStatus::Closed),
            // other effects cannot be told apart from someone else's request
            _ => return Ok(Reconciled::Missing),
        };
        match self.ledger.get_campaign(campaign_id).await {
            Ok(record) if record.status == effect && record.creator == request.source => {
                info!(status = ?record.status, "effect already on ledger");
                Ok(Reconciled::Observed(record))
            }
            Ok(_) | Err(RpcError::Transport(_)) => Ok(Reconciled::Missing),
            Err(RpcError::Rejected(rejection)) => {
                Err(OrchestratorError::Rejected { target, rejection })
            }
        }
    }

    /// Report an included request. The inclusion is the verdict: a failed
    /// follow-up read only leaves the campaign out of the answer.
    async fn confirm(
        &self,
        request: &Request,
        inclusion: Inclusion,
        reconciled: bool,
    ) -> Confirmed {
        let campaign_id = match inclusion.result {
            TxResult::Created(campaign_id) => Some(campaign_id),
            _ => request.operation.campaign_id(),
        };
        let campaign = match campaign_id {
            Some(campaign_id) => self.reread(campaign_id).await,
            None => None,
        };
        info!(
            campaign = ?campaign_id,
            ledger = inclusion.ledger,
            result = ?inclusion.result,
            "confirmed"
        );
        Confirmed {
            request: request.id,
            operation: request.operation.name(),
            outcome: inclusion.result,
            campaign_id,
            campaign,
            ledger: Some(inclusion.ledger),
            reconciled,
        }
    }

    async fn confirm_observed(&self, request: &Request, record: CampaignRecord) -> Confirmed {
        match self.ledger.latest_ledger_time().await {
            Ok(observed_at) => {
                self.cache.refresh(record.clone(), observed_at);
            }
            Err(error) => debug!(%error, "ledger time unavailable, projection not refreshed"),
        }
        Confirmed {
            request: request.id,
            operation: request.operation.name(),
            outcome: TxResult::Applied,
            campaign_id: Some(record.id),
            campaign: Some(record),
            ledger: None,
            reconciled: true,
        }
    }

    /// Read a campaign after its change was confirmed, a few times at most.
    async fn reread(&self, campaign_id: CampaignId) -> Option<CampaignRecord> {
        for attempt in 1..=self.settings.max_attempts.max(1) {
            match self.campaign(campaign_id).await {
                Ok(projection) => return Some(projection.record),
                Err(error) => {
                    debug!(attempt, %error, "read after confirmation failed");
                    tokio::time::sleep(self.settings.poll_interval).await;
                }
            }
        }
        warn!(campaign = campaign_id, "confirmed campaign not re-read");
        self.cache.invalidate(campaign_id);
        None
    }

}
