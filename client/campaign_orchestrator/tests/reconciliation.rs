mod common;

use std::cell::Cell;
use std::rc::Rc;
use std::time::Duration;

use async_trait::async_trait;
use campaign_orchestrator::ledger::RpcResult;
use campaign_orchestrator::record::{CampaignRecord, ContributionRecord};
use campaign_orchestrator::request::{
    Operation, Request, RequestId, SendStatus, TxResult, TxStatus,
};
use campaign_orchestrator::{
    CampaignId, CampaignStatus, ContractError, FaultPlan, LedgerRpc, Network, Orchestrator,
    OrchestratorError, RpcError, SandboxLedger, SubmitSettings,
};
use common::*;

/// Sandbox whose campaign reads time out once anything has been submitted.
struct ReadsFailAfterSubmit {
    inner: Rc<SandboxLedger>,
    submitted: Cell<bool>,
}

#[async_trait(?Send)]
impl LedgerRpc for ReadsFailAfterSubmit {
    async fn send_transaction(&self, request: &Request) -> RpcResult<SendStatus> {
        self.submitted.set(true);
        self.inner.send_transaction(request).await
    }

    async fn get_transaction(&self, id: &RequestId) -> RpcResult<TxStatus> {
        self.inner.get_transaction(id).await
    }

    async fn get_campaign(&self, id: CampaignId) -> RpcResult<CampaignRecord> {
        if self.submitted.get() {
            return Err(RpcError::Transport("read timed out".into()));
        }
        self.inner.get_campaign(id).await
    }

    async fn get_campaign_count(&self) -> RpcResult<u64> {
        self.inner.get_campaign_count().await
    }

    async fn get_contributions(
        &self,
        id: CampaignId,
        start: u32,
        limit: u32,
    ) -> RpcResult<Vec<ContributionRecord>> {
        self.inner.get_contributions(id, start, limit).await
    }

    async fn get_pledge(&self, id: CampaignId, contributor: &str) -> RpcResult<i128> {
        self.inner.get_pledge(id, contributor).await
    }

    async fn balance(&self, address: &str) -> RpcResult<i128> {
        self.inner.balance(address).await
    }

    async fn latest_ledger_time(&self) -> RpcResult<u64> {
        self.inner.latest_ledger_time().await
    }
}

#[tokio::test]
async fn dropped_acknowledgement_resolves_to_success() {
    let world = World::new();
    let creator = world.actor("creator");
    let alice = world.backer("alice", 10);
    let id = open_campaign(&creator, 10, 3_600).await;

    world.ledger.set_faults(FaultPlan {
        drop_acks: 1,
        ..FaultPlan::default()
    });
    let confirmed = alice.contribute(id, 4 * UNIT).await.unwrap();
    assert!(confirmed.reconciled);
    assert!(confirmed.ledger.is_some());
    assert_eq!(confirmed.campaign.as_ref().unwrap().total_funded, 4 * UNIT);
    assert_eq!(creator.contributions(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn lost_submission_is_offered_again_with_the_same_id() {
    let world = World::new();
    let creator = world.actor("creator");
    let alice = world.backer("alice", 10);
    let id = open_campaign(&creator, 10, 3_600).await;

    world.ledger.set_faults(FaultPlan {
        lose_submissions: 2,
        ..FaultPlan::default()
    });
    let confirmed = alice.contribute(id, 5 * UNIT).await.unwrap();
    assert_eq!(confirmed.campaign.as_ref().unwrap().total_funded, 5 * UNIT);
    assert_eq!(creator.contributions(id).await.unwrap().len(), 1);
    assert_eq!(alice.balance().await.unwrap(), 5 * UNIT);
}

#[tokio::test]
async fn persistent_loss_reports_submission_failure() {
    let world = World::new();
    let creator = world.actor("creator");
    let alice = world.backer("alice", 10);
    let id = open_campaign(&creator, 10, 3_600).await;

    world.ledger.set_faults(FaultPlan {
        lose_submissions: 3,
        ..FaultPlan::default()
    });
    let err = alice.contribute(id, 5 * UNIT).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::SubmissionFailed { .. }));
    assert!(err.is_ambiguous());
    assert_eq!(err.kind(), "SubmissionFailed");

    let record = creator.campaign(id).await.unwrap().record;
    assert_eq!(record.total_funded, 0);
}

#[tokio::test]
async fn confirmed_effect_survives_a_failed_read_back() {
    let world = World::new();
    let creator = world.actor("creator");
    let alice = world.backer("alice", 10);
    let id = open_campaign(&creator, 10, 3_600).await;

    let flaky = Orchestrator::new(
        ReadsFailAfterSubmit {
            inner: world.ledger.clone(),
            submitted: Cell::new(false),
        },
        alice.identity().clone(),
        Network::Ephemeral,
        world.cache.clone(),
        forced(),
    );
    let confirmed = flaky.contribute(id, 4 * UNIT).await.unwrap();
    assert_eq!(confirmed.outcome, TxResult::Applied);
    assert_eq!(confirmed.campaign_id, Some(id));
    assert_eq!(confirmed.campaign, None);
    assert!(confirmed.ledger.is_some());
    assert!(world.cache.get(id).is_none());

    let record = creator.campaign(id).await.unwrap().record;
    assert_eq!(record.total_funded, 4 * UNIT);
    assert_eq!(creator.contributions(id).await.unwrap().len(), 1);
}

#[tokio::test]
async fn timeout_is_reported_and_the_effect_may_land_later() {
    let world = World::new();
    let creator_id = world.identity("creator");
    let creator = world.actor_as(&creator_id, quick());
    let alice = world.backer("alice", 10);
    let id = open_campaign(&creator, 10, 3_600).await;
    alice.contribute(id, 10 * UNIT).await.unwrap();

    let impatient = world.actor_as(
        &creator_id,
        SubmitSettings {
            confirm_timeout: Duration::from_millis(20),
            max_attempts: 1,
            ..quick()
        },
    );
    world.ledger.set_faults(FaultPlan {
        inclusion_delay: 1_000_000,
        ..FaultPlan::default()
    });
    let err = impatient.withdraw(id).await.unwrap_err();
    assert!(matches!(err, OrchestratorError::Timeout { .. }));
    assert!(err.is_ambiguous());
    assert_eq!(creator.campaign(id).await.unwrap().record.status, CampaignStatus::Active);

    world.ledger.flush().unwrap();
    world.ledger.set_faults(FaultPlan::default());
    assert_eq!(creator.campaign(id).await.unwrap().record.status, CampaignStatus::Successful);

    let err = creator.withdraw(id).await.unwrap_err();
    assert_eq!(err.contract_error(), Some(ContractError::AlreadyFinalized));
}

#[tokio::test]
async fn effect_seen_on_ledger_counts_as_success() {
    let world = World::new();
    let creator_id = world.identity("creator");
    let creator = world.actor_as(&creator_id, forced());
    let alice = world.backer("alice", 10);
    let id = open_campaign(&creator, 10, 3_600).await;
    alice.contribute(id, 10 * UNIT).await.unwrap();

    // another session of the same creator already has a withdrawal queued
    let other_session = Request::new(
        Network::Ephemeral,
        &creator_id.address,
        Operation::Withdraw { campaign_id: id },
    );
    assert_eq!(
        world.ledger.send_transaction(&other_session).await,
        Ok(SendStatus::Pending)
    );

    world.ledger.set_faults(FaultPlan {
        lose_submissions: 1,
        ..FaultPlan::default()
    });
    let confirmed = creator.withdraw(id).await.unwrap();
    assert!(confirmed.reconciled);
    assert_eq!(confirmed.ledger, None);
    assert_eq!(confirmed.campaign.as_ref().unwrap().status, CampaignStatus::Successful);
    assert_eq!(world.ledger.balance(&creator_id.address).await, Ok(10 * UNIT));
}

#[tokio::test]
async fn racing_withdrawals_settle_once() {
    let world = World::new();
    let creator_id = world.identity("creator");
    let first = world.actor_as(&creator_id, forced());
    let second = world.actor_as(&creator_id, forced());
    let alice = world.backer("alice", 10);
    let id = open_campaign(&first, 10, 3_600).await;
    alice.contribute(id, 10 * UNIT).await.unwrap();

    world.ledger.set_faults(FaultPlan {
        inclusion_delay: 1,
        ..FaultPlan::default()
    });
    let (a, b) = tokio::join!(first.withdraw(id), second.withdraw(id));

    let (won, lost) = match (a, b) {
        (Ok(won), Err(lost)) | (Err(lost), Ok(won)) => (won, lost),
        (a, b) => panic!("expected exactly one winner, got {a:?} and {b:?}"),
    };
    assert_eq!(won.campaign.as_ref().unwrap().status, CampaignStatus::Successful);
    assert!(matches!(lost, OrchestratorError::Rejected { .. }));
    assert_eq!(lost.contract_error(), Some(ContractError::AlreadyFinalized));
    assert_eq!(world.ledger.balance(&creator_id.address).await, Ok(10 * UNIT));
}

#[tokio::test]
async fn withdrawal_racing_contributions_needs_the_goal() {
    let world = World::new();
    let creator_id = world.identity("creator");
    let creator = world.actor_as(&creator_id, forced());
    let alice = world.backer("alice", 10);
    let bob = world.backer("bob", 10);
    let id = open_campaign(&creator, 10, 3_600).await;

    world.ledger.set_faults(FaultPlan {
        inclusion_delay: 1,
        ..FaultPlan::default()
    });
    let (a, b, w) = tokio::join!(
        alice.contribute(id, 6 * UNIT),
        bob.contribute(id, 3 * UNIT),
        creator.withdraw(id)
    );
    a.unwrap();
    b.unwrap();
    assert_eq!(w.unwrap_err().contract_error(), Some(ContractError::GoalNotMet));

    let record = creator.campaign(id).await.unwrap().record;
    assert_eq!(record.total_funded, 9 * UNIT);
    assert_eq!(record.status, CampaignStatus::Active);
}

#[tokio::test]
async fn resubmitting_a_settled_request_is_a_duplicate() {
    let world = World::new();
    let creator = world.actor("creator");
    let request = Request::new(
        Network::Ephemeral,
        &creator.identity().address,
        Operation::CreateCampaign {
            goal: UNIT,
            deadline: START + 60,
            metadata_cid: String::new(),
        },
    );

    assert_eq!(world.ledger.send_transaction(&request).await, Ok(SendStatus::Pending));
    world.ledger.close_ledger().unwrap();
    assert_eq!(world.ledger.send_transaction(&request).await, Ok(SendStatus::Duplicate));
    world.ledger.close_ledger().unwrap();
    assert_eq!(world.ledger.get_campaign_count().await, Ok(1));
}
