//! Side-effect-free campaign rules.
//!
//! The contract runs these checks inside every state transition, and
//! off-chain callers run the same functions against a projected record to
//! reject a doomed request before submitting it. Authorization and record
//! existence are checked by the contract only.

use crate::storage_types::{Campaign, CampaignStatus, Error};

/// Display phase derived from stored fields and the current ledger time.
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
pub enum Phase {
    /// Accepting contributions.
    Funding,
    /// Active, deadline passed and goal not met. Only closing remains.
    Expired,
    /// Active and goal met; the creator may withdraw.
    GoalReached,
    Successful,
    Closed,
}

/// Whether a contribution of `amount` would be accepted at `now`.
pub fn check_contribution(
    status: CampaignStatus,
    deadline: u64,
    amount: i128,
    now: u64,
) -> Result<(), Error> {
    if status != CampaignStatus::Active {
        return Err(Error::CampaignNotActive);
    }
    if now >= deadline {
        return Err(Error::DeadlinePassed);
    }
    if amount <= 0 {
        return Err(Error::InvalidAmount);
    }
    Ok(())
}

/// Whether the creator's withdrawal would be accepted.
pub fn check_withdrawal(
    status: CampaignStatus,
    goal: i128,
    total_funded: i128,
) -> Result<(), Error> {
    if total_funded < goal {
        return Err(Error::GoalNotMet);
    }
    if status != CampaignStatus::Active {
        return Err(Error::AlreadyFinalized);
    }
    Ok(())
}

pub fn check_close(status: CampaignStatus) -> Result<(), Error> {
    if status != CampaignStatus::Active {
        return Err(Error::AlreadyFinalized);
    }
    Ok(())
}

/// Refunds open once a campaign is closed, for contributors with an
/// outstanding pledge.
pub fn check_refund(status: CampaignStatus, pledge: i128) -> Result<(), Error> {
    if status != CampaignStatus::Closed {
        return Err(Error::RefundUnavailable);
    }
    if pledge <= 0 {
        return Err(Error::NothingToRefund);
    }
    Ok(())
}

pub fn effective_phase(campaign: &Campaign, now: u64) -> Phase {
    phase_of(
        campaign.status,
        campaign.goal,
        campaign.deadline,
        campaign.total_funded,
        now,
    )
}

pub fn phase_of(
    status: CampaignStatus,
    goal: i128,
    deadline: u64,
    total_funded: i128,
    now: u64,
) -> Phase {
    match status {
        CampaignStatus::Successful => Phase::Successful,
        CampaignStatus::Closed => Phase::Closed,
        CampaignStatus::Active if total_funded >= goal => Phase::GoalReached,
        CampaignStatus::Active if now >= deadline => Phase::Expired,
        CampaignStatus::Active => Phase::Funding,
    }
}
