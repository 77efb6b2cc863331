use soroban_sdk::{contracttype, Address, Env, String, Symbol};

use crate::storage_types::CampaignId;

#[contracttype]
#[derive(Clone)]
pub struct CampaignCreatedEvent {
    pub campaign_id: CampaignId,
    pub creator: Address,
    pub goal: i128,
    pub deadline: u64,
    pub metadata_cid: String,
}

#[contracttype]
#[derive(Clone)]
pub struct ContributedEvent {
    pub campaign_id: CampaignId,
    pub contributor: Address,
    pub amount: i128,
    pub total_funded: i128,
}

#[contracttype]
#[derive(Clone)]
pub struct WithdrawnEvent {
    pub campaign_id: CampaignId,
    pub creator: Address,
    pub amount: i128,
}

#[contracttype]
#[derive(Clone)]
pub struct ClosedEvent {
    pub campaign_id: CampaignId,
    pub creator: Address,
    pub total_funded: i128,
}

#[contracttype]
#[derive(Clone)]
pub struct RefundedEvent {
    pub campaign_id: CampaignId,
    pub contributor: Address,
    pub amount: i128,
}

fn topics(env: &Env, action: &str) -> (Symbol, Symbol) {
    (Symbol::new(env, "campaign"), Symbol::new(env, action))
}

pub fn emit_campaign_created(env: &Env, event: CampaignCreatedEvent) {
    env.events().publish(topics(env, "created"), event);
}

pub fn emit_contributed(env: &Env, event: ContributedEvent) {
    env.events().publish(topics(env, "contributed"), event);
}

pub fn emit_withdrawn(env: &Env, event: WithdrawnEvent) {
    env.events().publish(topics(env, "withdrawn"), event);
}

pub fn emit_closed(env: &Env, event: ClosedEvent) {
    env.events().publish(topics(env, "closed"), event);
}

pub fn emit_refunded(env: &Env, event: RefundedEvent) {
    env.events().publish(topics(env, "refunded"), event);
}
