//! In-process ledger: the crowdfunding contract and a Stellar asset running
//! inside a Soroban host, fronted by a transaction queue that behaves like an
//! RPC server. Requests are included in submission order when a ledger closes.

use std::cell::{Cell, RefCell};
use std::collections::{HashMap, HashSet, VecDeque};
use std::fmt::Debug;
use std::io;
use std::path::Path;
use std::time::{SystemTime, UNIX_EPOCH};

use async_trait::async_trait;
use crowdfunding_contract::{
    CampaignId, CrowdfundingContract, CrowdfundingContractClient, Error as ContractError,
};
use soroban_sdk::testutils::{Address as _, EnvTestConfig, Ledger as _};
use soroban_sdk::{token, Address, Env, String as SorobanString};
use thiserror::Error;
use tracing::{debug, info, warn};

use crate::config::Network;
use crate::journal::{Journal, JournalEntry};
use crate::ledger::{LedgerRpc, RpcError, RpcResult};
use crate::record::{address_string, CampaignRecord, ContributionRecord};
use crate::request::{
    Inclusion, Operation, Rejection, Request, RequestId, SendStatus, TxResult, TxStatus,
};

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("journal: {0}")]
    Journal(#[from] io::Error),
    #[error("ledger setup failed: {0}")]
    Setup(Rejection),
    #[error("faucet refused: {0}")]
    Mint(Rejection),
}

/// Source of ledger timestamps.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Clock {
    System,
    Fixed(u64),
}

/// Misbehaviour to inject into the next submissions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct FaultPlan {
    /// Submissions queued for inclusion but answered with a transport error.
    pub drop_acks: u32,
    /// Submissions lost before they reach the queue.
    pub lose_submissions: u32,
    /// Extra ledgers a request waits before inclusion.
    pub inclusion_delay: u32,
}

struct Pending {
    request: Request,
    due: u32,
}

#[derive(Default)]
struct State {
    sequence: u32,
    last_time: u64,
    pending: VecDeque<Pending>,
    outcomes: HashMap<RequestId, Result<Inclusion, Rejection>>,
    accounts: HashSet<String>,
    faults: FaultPlan,
    journal: Option<Journal>,
}

pub struct SandboxLedger {
    env: Env,
    contract: Address,
    token: Address,
    network: Network,
    clock: Clock,
    skew: Cell<u64>,
    state: RefCell<State>,
}

impl SandboxLedger {
    /// Fresh ledger that lives as long as this value.
    pub fn ephemeral(network: Network, clock: Clock) -> Result<Self, SandboxError> {
        Self::boot(network, clock, None)
    }

    /// Ledger backed by the journal at `path`; existing entries are replayed.
    pub fn open(path: &Path, network: Network) -> Result<Self, SandboxError> {
        let journal = Journal::open(path, network)?;
        Self::boot(network, Clock::System, Some(journal))
    }

    fn boot(
        network: Network,
        clock: Clock,
        journal: Option<Journal>,
    ) -> Result<Self, SandboxError> {
        let env = Env::new_with_config(EnvTestConfig {
            capture_snapshot_at_drop: false,
            ..EnvTestConfig::default()
        });
        env.mock_all_auths();

        let genesis = match clock {
            Clock::System => system_now(),
            Clock::Fixed(at) => at,
        };
        env.ledger().set_timestamp(genesis);

        let issuer = Address::generate(&env);
        let token = env.register_stellar_asset_contract_v2(issuer).address();
        let contract = env.register(CrowdfundingContract, ());
        settle(CrowdfundingContractClient::new(&env, &contract).try_initialize(&token))
            .map_err(SandboxError::Setup)?;

        let sandbox = Self {
            env,
            contract,
            token,
            network,
            clock,
            skew: Cell::new(0),
            state: RefCell::new(State {
                last_time: genesis,
                ..State::default()
            }),
        };

        if let Some(journal) = journal {
            sandbox.replay(journal.entries())?;
            info!(
                entries = journal.entries().len(),
                ledger = sandbox.state.borrow().sequence,
                "sandbox journal replayed"
            );
            sandbox.state.borrow_mut().journal = Some(journal);
        }
        Ok(sandbox)
    }

    fn replay(&self, entries: &[JournalEntry]) -> Result<(), SandboxError> {
        for entry in entries {
            match entry {
                JournalEntry::Account { address } => {
                    self.state.borrow_mut().accounts.insert(address.clone());
                }
                JournalEntry::Mint {
                    to,
                    amount,
                    ledger_time,
                } => {
                    let ledger = self.state.borrow().sequence;
                    self.enter(ledger, *ledger_time);
                    self.mint_unjournaled(to, *amount).map_err(SandboxError::Mint)?;
                }
                JournalEntry::Include {
                    request,
                    ledger,
                    ledger_time,
                } => {
                    self.enter(*ledger, *ledger_time);
                    let outcome = self.apply(request).map(|result| Inclusion {
                        result,
                        ledger: *ledger,
                        ledger_time: *ledger_time,
                    });
                    self.state.borrow_mut().outcomes.insert(request.id, outcome);
                }
            }
        }
        Ok(())
    }

    pub fn network(&self) -> Network {
        self.network
    }

    /// Current ledger time: the clock, but never earlier than the last
    /// closed ledger.
    pub fn time(&self) -> u64 {
        let now = match self.clock {
            Clock::System => system_now(),
            Clock::Fixed(at) => at,
        };
        now.saturating_add(self.skew.get())
            .max(self.state.borrow().last_time)
    }

    /// Move the clock forward.
    pub fn advance_time(&self, secs: u64) {
        self.skew.set(self.skew.get().saturating_add(secs));
    }

    pub fn set_faults(&self, faults: FaultPlan) {
        self.state.borrow_mut().faults = faults;
    }

    pub fn pending_count(&self) -> usize {
        self.state.borrow().pending.len()
    }

    /// A fresh address usable as a creator or contributor. Addresses handed
    /// out before a replay are never handed out again.
    pub fn create_account(&self) -> Result<String, SandboxError> {
        let address = loop {
            let candidate = address_string(&Address::generate(&self.env));
            if !self.state.borrow().accounts.contains(&candidate) {
                break candidate;
            }
        };

        let mut state = self.state.borrow_mut();
        state.accounts.insert(address.clone());
        if let Some(journal) = state.journal.as_mut() {
            journal.append(JournalEntry::Account {
                address: address.clone(),
            })?;
        }
        Ok(address)
    }

    /// Faucet: issue `amount` of the escrow token to `to`.
    pub fn mint(&self, to: &str, amount: i128) -> Result<(), SandboxError> {
        self.mint_target(to, amount).map_err(SandboxError::Mint)?;
        let ledger = self.state.borrow().sequence;
        let ledger_time = self.time();
        if let Some(journal) = self.state.borrow_mut().journal.as_mut() {
            journal.append(JournalEntry::Mint {
                to: to.to_string(),
                amount,
                ledger_time,
            })?;
        }

        self.enter(ledger, ledger_time);
        self.mint_unjournaled(to, amount).map_err(SandboxError::Mint)?;
        debug!(%to, amount, "minted");
        Ok(())
    }

    /// Close one ledger, including every request that is due.
    pub fn close_ledger(&self) -> Result<u32, SandboxError> {
        self.close(false)
    }

    /// Close one ledger that includes everything queued, delays or not.
    pub fn flush(&self) -> Result<u32, SandboxError> {
        self.close(true)
    }

    fn close(&self, everything: bool) -> Result<u32, SandboxError> {
        let (ledger, due) = {
            let mut state = self.state.borrow_mut();
            state.sequence += 1;
            let ledger = state.sequence;
            let (due, waiting): (VecDeque<Pending>, VecDeque<Pending>) = state
                .pending
                .drain(..)
                .partition(|pending| everything || pending.due <= ledger);
            state.pending = waiting;
            (ledger, due)
        };

        let ledger_time = self.time();
        self.enter(ledger, ledger_time);
        let mut due = due.into_iter();
        while let Some(pending) = due.next() {
            if let Err(err) = self.include(&pending.request, ledger, ledger_time) {
                warn!(ledger, %err, "journal write failed, requests stay queued");
                let mut state = self.state.borrow_mut();
                for unprocessed in std::iter::once(pending).chain(due).rev() {
                    state.pending.push_front(unprocessed);
                }
                return Err(err.into());
            }
        }
        Ok(ledger)
    }

    fn enter(&self, ledger: u32, ledger_time: u64) {
        {
            let mut state = self.state.borrow_mut();
            state.sequence = state.sequence.max(ledger);
            state.last_time = state.last_time.max(ledger_time);
        }
        self.env.ledger().set_sequence_number(ledger);
        self.env.ledger().set_timestamp(ledger_time);
    }

    /// Journal `request`, then apply it. Nothing is applied when the journal
    /// write fails.
    fn include(&self, request: &Request, ledger: u32, ledger_time: u64) -> io::Result<()> {
        if let Some(journal) = self.state.borrow_mut().journal.as_mut() {
            journal.append(JournalEntry::Include {
                request: request.clone(),
                ledger,
                ledger_time,
            })?;
        }

        let outcome = self.apply(request).map(|result| Inclusion {
            result,
            ledger,
            ledger_time,
        });
        match &outcome {
            Ok(inclusion) => debug!(
                id = %request.id.short(),
                op = request.operation.name(),
                ledger,
                result = ?inclusion.result,
                "included"
            ),
            Err(rejection) => debug!(
                id = %request.id.short(),
                op = request.operation.name(),
                ledger,
                %rejection,
                "included as failed"
            ),
        }

        self.state.borrow_mut().outcomes.insert(request.id, outcome);
        Ok(())
    }

    fn apply(&self, request: &Request) -> Result<TxResult, Rejection> {
        let client = self.client();
        let source = self.parse_address(&request.source)?;
        match &request.operation {
            Operation::CreateCampaign {
                goal,
                deadline,
                metadata_cid,
            } => {
                let cid = SorobanString::from_str(&self.env, metadata_cid);
                settle(client.try_create_campaign(&source, goal, deadline, &cid))
                    .map(TxResult::Created)
            }
            Operation::Contribute {
                campaign_id,
                amount,
            } => settle(client.try_contribute(&source, campaign_id, amount))
                .map(|()| TxResult::Applied),
            Operation::Withdraw { campaign_id } => {
                settle(client.try_withdraw(&source, campaign_id)).map(|()| TxResult::Applied)
            }
            Operation::CloseCampaign { campaign_id } => {
                settle(client.try_close_campaign(&source, campaign_id)).map(|()| TxResult::Applied)
            }
            Operation::ClaimRefund { campaign_id } => {
                settle(client.try_claim_refund(&source, campaign_id)).map(TxResult::Refunded)
            }
        }
    }

    fn mint_target(&self, to: &str, amount: i128) -> Result<Address, Rejection> {
        if amount <= 0 {
            return Err(Rejection::Host("mint amount must be positive".into()));
        }
        self.parse_address(to)
    }

    fn mint_unjournaled(&self, to: &str, amount: i128) -> Result<(), Rejection> {
        let to = self.mint_target(to, amount)?;
        settle(token::StellarAssetClient::new(&self.env, &self.token).try_mint(&to, &amount))
    }

    fn client(&self) -> CrowdfundingContractClient<'_> {
        CrowdfundingContractClient::new(&self.env, &self.contract)
    }

    fn parse_address(&self, strkey: &str) -> Result<Address, Rejection> {
        let well_formed = strkey.len() == 56
            && (strkey.starts_with('G') || strkey.starts_with('C'))
            && strkey
                .bytes()
                .all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b));
        if !well_formed {
            return Err(Rejection::Host(format!("malformed address {strkey:?}")));
        }
        Ok(Address::from_string(&SorobanString::from_str(&self.env, strkey)))
    }
}

/// Errors a contract call can surface with.
trait IntoRejection {
    fn into_rejection(self) -> Rejection;
}

impl IntoRejection for ContractError {
    fn into_rejection(self) -> Rejection {
        Rejection::Contract(self)
    }
}

impl IntoRejection for soroban_sdk::Error {
    fn into_rejection(self) -> Rejection {
        Rejection::Host(format!("{self:?}"))
    }
}

/// Flatten a `try_` client call into the value or the reason it failed.
fn settle<T, C, E, I>(outcome: Result<Result<T, C>, Result<E, I>>) -> Result<T, Rejection>
where
    C: Debug,
    E: IntoRejection,
    I: Debug,
{
    match outcome {
        Ok(Ok(value)) => Ok(value),
        Ok(Err(conversion)) => Err(Rejection::Host(format!("undecodable result: {conversion:?}"))),
        Err(Ok(error)) => Err(error.into_rejection()),
        Err(Err(invoke)) => Err(Rejection::Host(format!("{invoke:?}"))),
    }
}

fn system_now() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

#[async_trait(?Send)]
impl LedgerRpc for SandboxLedger {
    async fn send_transaction(&self, request: &Request) -> RpcResult<SendStatus> {
        let mut state = self.state.borrow_mut();

        if state.faults.lose_submissions > 0 {
            state.faults.lose_submissions -= 1;
            warn!(id = %request.id.short(), "fault: submission lost");
            return Err(RpcError::Transport("connection reset before delivery".into()));
        }

        if state.outcomes.contains_key(&request.id)
            || state.pending.iter().any(|p| p.request.id == request.id)
        {
            return Ok(SendStatus::Duplicate);
        }

        if !request.is_well_formed(self.network) {
            return Err(RpcError::Rejected(Rejection::Host(
                "request id does not match its contents".into(),
            )));
        }

        let due = state.sequence + 1 + state.faults.inclusion_delay;
        state.pending.push_back(Pending {
            request: request.clone(),
            due,
        });

        if state.faults.drop_acks > 0 {
            state.faults.drop_acks -= 1;
            warn!(id = %request.id.short(), "fault: acknowledgement dropped");
            return Err(RpcError::Transport("connection reset awaiting acknowledgement".into()));
        }
        Ok(SendStatus::Pending)
    }

    async fn get_transaction(&self, id: &RequestId) -> RpcResult<TxStatus> {
        self.close_ledger()
            .map_err(|e| RpcError::Transport(e.to_string()))?;

        let state = self.state.borrow();
        Ok(match state.outcomes.get(id) {
            Some(Ok(inclusion)) => TxStatus::Success(inclusion.clone()),
            Some(Err(rejection)) => TxStatus::Failed(rejection.clone()),
            None if state.pending.iter().any(|p| &p.request.id == id) => TxStatus::Pending,
            None => TxStatus::NotFound,
        })
    }

    async fn get_campaign(&self, id: CampaignId) -> RpcResult<CampaignRecord> {
        let campaign = settle(self.client().try_get_campaign(&id))?;
        Ok(CampaignRecord::from_contract(&campaign))
    }

    async fn get_campaign_count(&self) -> RpcResult<u64> {
        Ok(settle(self.client().try_get_campaign_count())?)
    }

    async fn get_contributions(
        &self,
        id: CampaignId,
        start: u32,
        limit: u32,
    ) -> RpcResult<Vec<ContributionRecord>> {
        let page = settle(self.client().try_get_contributions(&id, &start, &limit))?;
        Ok(page
            .iter()
            .map(|c| ContributionRecord::from_contract(&c))
            .collect())
    }

    async fn get_pledge(&self, id: CampaignId, contributor: &str) -> RpcResult<i128> {
        let contributor = self.parse_address(contributor)?;
        Ok(settle(self.client().try_get_pledge(&id, &contributor))?)
    }

    async fn balance(&self, address: &str) -> RpcResult<i128> {
        let address = self.parse_address(address)?;
        Ok(settle(token::Client::new(&self.env, &self.token).try_balance(&address))?)
    }

    async fn latest_ledger_time(&self) -> RpcResult<u64> {
        Ok(self.time())
    }
}
