//! Host-side copies of ledger records.

use crowdfunding_contract::resolver::{self, Phase};
use crowdfunding_contract::{Campaign, CampaignId, CampaignStatus, Contribution};
use serde::{Deserialize, Serialize};
use soroban_sdk::Address;

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CampaignRecord {
    pub id: CampaignId,
    pub creator: String,
    pub goal: i128,
    pub deadline: u64,
    pub total_funded: i128,
    pub metadata_cid: String,
    #[serde(with = "status_ordinal")]
    pub status: CampaignStatus,
}

impl CampaignRecord {
    pub fn from_contract(campaign: &Campaign) -> Self {
        Self {
            id: campaign.id,
            creator: address_string(&campaign.creator),
            goal: campaign.goal,
            deadline: campaign.deadline,
            total_funded: campaign.total_funded,
            metadata_cid: soroban_string(&campaign.metadata_cid),
            status: campaign.status,
        }
    }

    pub fn phase(&self, now: u64) -> Phase {
        resolver::phase_of(self.status, self.goal, self.deadline, self.total_funded, now)
    }

    /// Funding progress in whole percent, capped for display only.
    pub fn progress_percent(&self) -> u32 {
        if self.goal <= 0 {
            return 0;
        }
        let percent = self.total_funded.saturating_mul(100) / self.goal;
        percent.clamp(0, 999) as u32
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContributionRecord {
    pub contributor: String,
    pub amount: i128,
    pub timestamp: u64,
}

impl ContributionRecord {
    pub fn from_contract(contribution: &Contribution) -> Self {
        Self {
            contributor: address_string(&contribution.contributor),
            amount: contribution.amount,
            timestamp: contribution.timestamp,
        }
    }
}

pub fn status_label(status: CampaignStatus) -> &'static str {
    match status {
        CampaignStatus::Active => "ACTIVE",
        CampaignStatus::Successful => "SUCCESSFUL",
        CampaignStatus::Closed => "CLOSED",
    }
}

pub fn phase_label(phase: Phase) -> &'static str {
    match phase {
        Phase::Funding => "funding",
        Phase::Expired => "expired",
        Phase::GoalReached => "goal reached",
        Phase::Successful => "funds withdrawn",
        Phase::Closed => "closed",
    }
}

pub fn soroban_string(value: &soroban_sdk::String) -> String {
    let mut buf = vec![0u8; value.len() as usize];
    value.copy_into_slice(&mut buf);
    String::from_utf8_lossy(&buf).into_owned()
}

pub fn address_string(address: &Address) -> String {
    soroban_string(&address.to_string())
}

/// Status travels as its wire ordinal: 0 active, 1 successful, 2 closed.
pub mod status_ordinal {
    use crowdfunding_contract::CampaignStatus;
    use serde::de::Error as _;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn to_ordinal(status: CampaignStatus) -> u32 {
        status as u32
    }

    pub fn from_ordinal(ordinal: u32) -> Option<CampaignStatus> {
        match ordinal {
            0 => Some(CampaignStatus::Active),
            1 => Some(CampaignStatus::Successful),
            2 => Some(CampaignStatus::Closed),
            _ => None,
        }
    }

    pub fn serialize<S: Serializer>(
        status: &CampaignStatus,
        serializer: S,
    ) -> Result<S::Ok, S::Error> {
        serializer.serialize_u32(to_ordinal(*status))
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(
        deserializer: D,
    ) -> Result<CampaignStatus, D::Error> {
        let ordinal = u32::deserialize(deserializer)?;
        from_ordinal(ordinal)
            .ok_or_else(|| D::Error::custom(format!("unknown campaign status {ordinal}")))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(status: CampaignStatus, total_funded: i128) -> CampaignRecord {
        CampaignRecord {
            id: 1,
            creator: "CA".into(),
            goal: 100,
            deadline: 1_000,
            total_funded,
            metadata_cid: "bafy".into(),
            status,
        }
    }

    #[test]
    fn status_is_ordinal_on_the_wire() {
        let json = serde_json::to_value(record(CampaignStatus::Closed, 0)).unwrap();
        assert_eq!(json["status"], 2);

        let back: CampaignRecord = serde_json::from_value(json).unwrap();
        assert_eq!(back.status, CampaignStatus::Closed);

        let mut bad = serde_json::to_value(record(CampaignStatus::Active, 0)).unwrap();
        bad["status"] = serde_json::json!(7);
        assert!(serde_json::from_value::<CampaignRecord>(bad).is_err());
    }

    #[test]
    fn progress_and_phase() {
        let r = record(CampaignStatus::Active, 60);
        assert_eq!(r.progress_percent(), 60);
        assert_eq!(r.phase(10), Phase::Funding);
        assert_eq!(r.phase(1_000), Phase::Expired);
        assert_eq!(record(CampaignStatus::Active, 250).progress_percent(), 250);
        assert_eq!(record(CampaignStatus::Active, 100).phase(5_000), Phase::GoalReached);
    }
}
