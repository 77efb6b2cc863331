#![no_std]


mod events;
pub mod resolver;
mod storage_types;

pub use storage_types::{
    Campaign, CampaignId, CampaignStatus, Contribution, Error, MAX_PAGE_SIZE,
};
use storage_types::{DataKey, PersistentKey, TTL_INSTANCE, TTL_PERSISTENT};

use soroban_sdk::{contract, contractimpl, token, Address, Env, String, Vec};

#[contract]
pub struct CrowdfundingContract;

#[contractimpl]
impl CrowdfundingContract {
    /// Bind the token campaigns are funded in
    pub fn initialize(e: Env, token: Address) -> Result<(), Error> {
        if e.storage().instance().has(&DataKey::Token) {
            return Err(Error::AlreadyInitialized);
        }

        e.storage().instance().set(&DataKey::Token, &token);
        e.storage().instance().set(&DataKey::CampaignCount, &0u64);

        extend_instance(&e);
        Ok(())
    }

    /// Open a campaign owned by `creator`. Ids start at 1 and never repeat.
    pub fn create_campaign(
        e: Env,
        creator: Address,
        goal: i128,
        deadline: u64,
        metadata_cid: String,
    ) -> Result<CampaignId, Error> {
        creator.require_auth();
        check_initialized(&e)?;

        if goal <= 0 || deadline <= e.ledger().timestamp() {
            return Err(Error::InvalidParameters);
        }

        let count: u64 = e.storage().instance().get(&DataKey::CampaignCount).unwrap_or(0);
        let campaign_id = count.checked_add(1).ok_or(Error::ArithmeticOverflow)?;

        let campaign = Campaign {
            id: campaign_id,
            creator: creator.clone(),
            goal,
            deadline,
            total_funded: 0,
            metadata_cid: metadata_cid.clone(),
            status: CampaignStatus::Active,
        };

        put_campaign(&e, &campaign);
        e.storage().instance().set(&DataKey::CampaignCount, &campaign_id);
        extend_instance(&e);

        events::emit_campaign_created(
            &e,
            events::CampaignCreatedEvent {
                campaign_id,
                creator,
                goal,
                deadline,
                metadata_cid,
            },
        );

        Ok(campaign_id)
    }

    /// Move `amount` from the contributor into escrow
    pub fn contribute(
        e: Env,
        contributor: Address,
        campaign_id: CampaignId,
        amount: i128,
    ) -> Result<(), Error> {
        contributor.require_auth();
        let mut campaign = get_campaign(&e, campaign_id)?;

        resolver::check_contribution(
            campaign.status,
            campaign.deadline,
            amount,
            e.ledger().timestamp(),
        )?;

        let token_client = token::Client::new(&e, &get_token(&e)?);
        if token_client.balance(&contributor) < amount {
            return Err(Error::InsufficientBalance);
        }

        campaign.total_funded = campaign
            .total_funded
            .checked_add(amount)
            .ok_or(Error::ArithmeticOverflow)?;
        put_campaign(&e, &campaign);

        let pledge_key = PersistentKey::Pledge(campaign_id, contributor.clone());
        let pledge: i128 = e.storage().persistent().get(&pledge_key).unwrap_or(0);
        let pledge = pledge.checked_add(amount).ok_or(Error::ArithmeticOverflow)?;
        e.storage().persistent().set(&pledge_key, &pledge);
        extend_persistent(&e, &pledge_key);

        append_contribution(
            &e,
            campaign_id,
            Contribution {
                contributor: contributor.clone(),
                amount,
                timestamp: e.ledger().timestamp(),
            },
        )?;

        token_client.transfer(&contributor, &e.current_contract_address(), &amount);

        events::emit_contributed(
            &e,
            events::ContributedEvent {
                campaign_id,
                contributor,
                amount,
                total_funded: campaign.total_funded,
            },
        );

        Ok(())
    }

    /// Release the escrow to the creator once the goal is met.
    /// The status flips before the transfer so a second call can only fail.
    pub fn withdraw(e: Env, caller: Address, campaign_id: CampaignId) -> Result<(), Error> {
        let mut campaign = get_campaign(&e, campaign_id)?;
        caller.require_auth();

        if caller != campaign.creator {
            return Err(Error::Unauthorized);
        }
        resolver::check_withdrawal(campaign.status, campaign.goal, campaign.total_funded)?;

        campaign.status = CampaignStatus::Successful;
        put_campaign(&e, &campaign);

        let token_client = token::Client::new(&e, &get_token(&e)?);
        token_client.transfer(
            &e.current_contract_address(),
            &campaign.creator,
            &campaign.total_funded,
        );

        events::emit_withdrawn(
            &e,
            events::WithdrawnEvent {
                campaign_id,
                creator: campaign.creator,
                amount: campaign.total_funded,
            },
        );

        Ok(())
    }

    /// Close the campaign. Escrowed funds stay claimable through `claim_refund`.
    pub fn close_campaign(e: Env, caller: Address, campaign_id: CampaignId) -> Result<(), Error> {
        let mut campaign = get_campaign(&e, campaign_id)?;
        caller.require_auth();

        if caller != campaign.creator {
            return Err(Error::Unauthorized);
        }
        resolver::check_close(campaign.status)?;

        campaign.status = CampaignStatus::Closed;
        put_campaign(&e, &campaign);

        events::emit_closed(
            &e,
            events::ClosedEvent {
                campaign_id,
                creator: campaign.creator,
                total_funded: campaign.total_funded,
            },
        );

        Ok(())
    }

    /// Return a contributor's outstanding pledge from a closed campaign
    pub fn claim_refund(
        e: Env,
        contributor: Address,
        campaign_id: CampaignId,
    ) -> Result<i128, Error> {
        let campaign = get_campaign(&e, campaign_id)?;
        contributor.require_auth();

        let pledge_key = PersistentKey::Pledge(campaign_id, contributor.clone());
        let pledge: i128 = e.storage().persistent().get(&pledge_key).unwrap_or(0);
        resolver::check_refund(campaign.status, pledge)?;

        e.storage().persistent().set(&pledge_key, &0i128);
        extend_persistent(&e, &pledge_key);

        let token_client = token::Client::new(&e, &get_token(&e)?);
        token_client.transfer(&e.current_contract_address(), &contributor, &pledge);

        events::emit_refunded(
            &e,
            events::RefundedEvent {
                campaign_id,
                contributor,
                amount: pledge,
            },
        );

        Ok(pledge)
    }

    /// View functions
    pub fn get_campaign(e: Env, campaign_id: CampaignId) -> Result<Campaign, Error> {
        get_campaign(&e, campaign_id)
    }

    pub fn get_campaign_count(e: Env) -> u64 {
        e.storage().instance().get(&DataKey::CampaignCount).unwrap_or(0)
    }

    pub fn get_contribution_count(e: Env, campaign_id: CampaignId) -> Result<u32, Error> {
        get_campaign(&e, campaign_id)?;
        Ok(contribution_count(&e, campaign_id))
    }

    /// Page through the contribution log, at most `MAX_PAGE_SIZE` entries per call
    pub fn get_contributions(
        e: Env,
        campaign_id: CampaignId,
        start: u32,
        limit: u32,
    ) -> Result<Vec<Contribution>, Error> {
        get_campaign(&e, campaign_id)?;

        let count = contribution_count(&e, campaign_id);
        let end = start.saturating_add(limit.min(MAX_PAGE_SIZE)).min(count);
        let mut page = Vec::new(&e);
        for index in start..end {
            let key = PersistentKey::Contribution(campaign_id, index);
            if let Some(entry) = e.storage().persistent().get::<_, Contribution>(&key) {
                page.push_back(entry);
            }
        }
        Ok(page)
    }

    pub fn get_pledge(
        e: Env,
        campaign_id: CampaignId,
        contributor: Address,
    ) -> Result<i128, Error> {
        get_campaign(&e, campaign_id)?;
        Ok(e
            .storage()
            .persistent()
            .get(&PersistentKey::Pledge(campaign_id, contributor))
            .unwrap_or(0))
    }

    pub fn get_token(e: Env) -> Result<Address, Error> {
        get_token(&e)
    }
}

// Helper functions
fn extend_instance(e: &Env) {
    e.storage().instance().extend_ttl(TTL_INSTANCE, TTL_INSTANCE);
}

fn extend_persistent(e: &Env, key: &PersistentKey) {
    e.storage().persistent().extend_ttl(key, TTL_PERSISTENT, TTL_PERSISTENT);
}

fn check_initialized(e: &Env) -> Result<(), Error> {
    if !e.storage().instance().has(&DataKey::Token) {
        return Err(Error::NotInitialized);
    }
    Ok(())
}

fn get_token(e: &Env) -> Result<Address, Error> {
    e.storage()
        .instance()
        .get(&DataKey::Token)
        .ok_or(Error::NotInitialized)
}

fn get_campaign(e: &Env, campaign_id: CampaignId) -> Result<Campaign, Error> {
    check_initialized(e)?;
    e.storage()
        .persistent()
        .get(&PersistentKey::Campaign(campaign_id))
        .ok_or(Error::NotFound)
}

fn put_campaign(e: &Env, campaign: &Campaign) {
    let key = PersistentKey::Campaign(campaign.id);
    e.storage().persistent().set(&key, campaign);
    extend_persistent(e, &key);
}

fn contribution_count(e: &Env, campaign_id: CampaignId) -> u32 {
    e.storage()
        .persistent()
        .get(&PersistentKey::ContributionCount(campaign_id))
        .unwrap_or(0)
}

fn append_contribution(
    e: &Env,
    campaign_id: CampaignId,
    contribution: Contribution,
) -> Result<(), Error> {
    let index = contribution_count(e, campaign_id);
    let entry_key = PersistentKey::Contribution(campaign_id, index);
    e.storage().persistent().set(&entry_key, &contribution);
    extend_persistent(e, &entry_key);

    let next = index.checked_add(1).ok_or(Error::ArithmeticOverflow)?;
    let count_key = PersistentKey::ContributionCount(campaign_id);
    e.storage().persistent().set(&count_key, &next);
    extend_persistent(e, &count_key);
    Ok(())
}
