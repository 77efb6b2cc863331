use soroban_sdk::{contracterror, contracttype, Address, String};

// Storage keys for instance data
#[derive(Clone)]
#[contracttype]
pub enum DataKey {
    Token,
    CampaignCount,
}

// Storage keys for persistent data
#[derive(Clone)]
#[contracttype]
pub enum PersistentKey {
    Campaign(CampaignId),
    Contribution(CampaignId, u32),
    ContributionCount(CampaignId),
    Pledge(CampaignId, Address),
}

pub type CampaignId = u64;

// Wire ordinals are fixed: 0 = active, 1 = successful, 2 = closed
#[derive(Clone, Copy, Debug, Eq, PartialEq)]
#[contracttype]
#[repr(u32)]
pub enum CampaignStatus {
    Active = 0,
    Successful = 1,
    Closed = 2,
}

impl CampaignStatus {
    pub fn is_finalized(&self) -> bool {
        !matches!(self, CampaignStatus::Active)
    }
}

#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct Campaign {
    pub id: CampaignId,
    pub creator: Address,
    pub goal: i128,
    pub deadline: u64,
    pub total_funded: i128,
    pub metadata_cid: String,      // Opaque content address, never interpreted
    pub status: CampaignStatus,
}

// One entry of the append-only contribution log
#[derive(Clone, Debug, Eq, PartialEq)]
#[contracttype]
pub struct Contribution {
    pub contributor: Address,
    pub amount: i128,
    pub timestamp: u64,
}

#[contracterror]
#[derive(Copy, Clone, Debug, Eq, PartialEq, PartialOrd, Ord)]
#[repr(u32)]
pub enum Error {
    AlreadyInitialized = 1,
    NotInitialized = 2,
    InvalidParameters = 3,
    NotFound = 4,
    CampaignNotActive = 5,
    DeadlinePassed = 6,
    InvalidAmount = 7,
    Unauthorized = 8,
    GoalNotMet = 9,
    AlreadyFinalized = 10,
    RefundUnavailable = 11,
    NothingToRefund = 12,
    InsufficientBalance = 13,
    ArithmeticOverflow = 14,
}

// Constants
pub const MAX_PAGE_SIZE: u32 = 100;
pub const TTL_INSTANCE: u32 = 17280 * 30; // 30 days
pub const TTL_PERSISTENT: u32 = 17280 * 90; // 90 days
