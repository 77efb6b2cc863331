#![allow(dead_code)]

use std::rc::Rc;
use std::time::Duration;

use campaign_orchestrator::{
    Clock, Identity, Network, Orchestrator, ProjectionCache, SandboxLedger, SubmitSettings,
};

pub const START: u64 = 1_700_000_000;
/// One whole token in minor units.
pub const UNIT: i128 = 10_000_000;

pub type Actor = Orchestrator<Rc<SandboxLedger>>;

pub fn quick() -> SubmitSettings {
    SubmitSettings {
        confirm_timeout: Duration::from_secs(5),
        poll_interval: Duration::from_millis(1),
        max_attempts: 3,
        precheck: true,
    }
}

pub fn forced() -> SubmitSettings {
    SubmitSettings {
        precheck: false,
        ..quick()
    }
}

pub struct World {
    pub ledger: Rc<SandboxLedger>,
    pub cache: ProjectionCache,
}

impl World {
    pub fn new() -> Self {
        let ledger = SandboxLedger::ephemeral(Network::Ephemeral, Clock::Fixed(START))
            .expect("sandbox boots");
        Self {
            ledger: Rc::new(ledger),
            cache: ProjectionCache::new(),
        }
    }

    pub fn identity(&self, name: &str) -> Identity {
        Identity {
            name: name.to_string(),
            address: self.ledger.create_account().expect("account"),
        }
    }

    pub fn actor_as(&self, identity: &Identity, settings: SubmitSettings) -> Actor {
        Orchestrator::new(
            self.ledger.clone(),
            identity.clone(),
            Network::Ephemeral,
            self.cache.clone(),
            settings,
        )
    }

    pub fn actor(&self, name: &str) -> Actor {
        self.actor_as(&self.identity(name), quick())
    }

    /// An actor holding `whole` tokens.
    pub fn backer(&self, name: &str, whole: i128) -> Actor {
        let actor = self.actor(name);
        self.ledger
            .mint(&actor.identity().address, whole * UNIT)
            .expect("mint");
        actor
    }
}

pub async fn open_campaign(creator: &Actor, goal_units: i128, lifetime: u64) -> u64 {
    let deadline = creator.ledger().time() + lifetime;
    creator
        .create_campaign(goal_units * UNIT, deadline, "bafy-campaign")
        .await
        .expect("campaign created")
        .campaign_id
        .expect("campaign id")
}
