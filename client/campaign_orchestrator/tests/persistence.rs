mod common;

use std::rc::Rc;

use campaign_orchestrator::request::{Operation, Request, SendStatus, TxStatus};
use campaign_orchestrator::{
    CampaignStatus, Config, Keyring, LedgerRpc, Network, Orchestrator, ProjectionCache,
    SandboxLedger,
};
use common::{quick, UNIT};

fn actor(
    ledger: &Rc<SandboxLedger>,
    keyring: &mut Keyring,
    name: &str,
) -> Orchestrator<Rc<SandboxLedger>> {
    let identity = match keyring.get(name) {
        Ok(identity) => identity,
        Err(_) => {
            let address = ledger.create_account().unwrap();
            keyring.insert(name, address).unwrap()
        }
    };
    Orchestrator::new(
        ledger.clone(),
        identity,
        Network::Sandbox,
        ProjectionCache::new(),
        quick(),
    )
}

#[tokio::test]
async fn sandbox_state_survives_reopening() {
    let dir = tempfile::tempdir().unwrap();
    let config = Config {
        data_dir: dir.path().join("state"),
        ..Config::default()
    };

    let (id, settled) = {
        let ledger = SandboxLedger::open(&config.journal_path(), Network::Sandbox).unwrap();
        let ledger = Rc::new(ledger);
        let mut keyring = Keyring::open(&config.keyring_path()).unwrap();
        let creator = actor(&ledger, &mut keyring, "creator");
        let alice = actor(&ledger, &mut keyring, "alice");
        ledger.mint(&alice.identity().address, 20 * UNIT).unwrap();

        let deadline = ledger.time() + 3_600;
        let id = creator
            .create_campaign(10 * UNIT, deadline, "bafy")
            .await
            .unwrap()
            .campaign_id
            .unwrap();
        alice.contribute(id, 10 * UNIT).await.unwrap();

        let settled = Request::new(
            Network::Sandbox,
            &creator.identity().address,
            Operation::Withdraw { campaign_id: id },
        );
        ledger.send_transaction(&settled).await.unwrap();
        ledger.close_ledger().unwrap();
        (id, settled)
    };

    let ledger = Rc::new(SandboxLedger::open(&config.journal_path(), Network::Sandbox).unwrap());
    let mut keyring = Keyring::open(&config.keyring_path()).unwrap();
    let creator = actor(&ledger, &mut keyring, "creator");
    let alice = actor(&ledger, &mut keyring, "alice");
    assert_eq!(creator.identity().address, settled.source);

    let record = creator.campaign(id).await.unwrap().record;
    assert_eq!(record.status, CampaignStatus::Successful);
    assert_eq!(record.total_funded, 10 * UNIT);
    assert_eq!(alice.balance().await.unwrap(), 10 * UNIT);
    assert_eq!(creator.balance().await.unwrap(), 10 * UNIT);
    assert_eq!(creator.contributions(id).await.unwrap().len(), 1);

    // the deduplication table came back with the state
    assert_eq!(ledger.send_transaction(&settled).await, Ok(SendStatus::Duplicate));
    assert!(matches!(
        ledger.get_transaction(&settled.id).await,
        Ok(TxStatus::Success(_))
    ));
    assert_eq!(creator.balance().await.unwrap(), 10 * UNIT);
}

#[tokio::test]
async fn journal_is_bound_to_its_network() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("ledger.jsonl");
    {
        let ledger = SandboxLedger::open(&path, Network::Sandbox).unwrap();
        let someone = ledger.create_account().unwrap();
        ledger.mint(&someone, UNIT).unwrap();
    }
    assert!(SandboxLedger::open(&path, Network::Ephemeral).is_err());
}
