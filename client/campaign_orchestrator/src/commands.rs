use std::rc::Rc;

use anyhow::Context as _;
use campaign_orchestrator::record::{phase_label, status_label};
use campaign_orchestrator::request::TxResult;
use campaign_orchestrator::units::{format_amount, format_timestamp, parse_amount, parse_deadline};
use campaign_orchestrator::{
    CampaignRecord, CampaignStatus, Clock, Config, Confirmed, ContributionRecord, Identity,
    Keyring, Network, Orchestrator, OrchestratorError, Projection, ProjectionCache, SandboxLedger,
    SubmitSettings, Target,
};
use colored::Colorize;
use serde::Serialize;
use tracing::info;

use crate::cli::*;

type Ledger = Rc<SandboxLedger>;

struct Session {
    ledger: Ledger,
    keyring: Keyring,
    cache: ProjectionCache,
    network: Network,
    settings: SubmitSettings,
    decimals: u32,
    format: OutputFormat,
}

impl Session {
    fn open(config: &Config, format: OutputFormat) -> anyhow::Result<Self> {
        let (ledger, keyring) = match config.network {
            Network::Sandbox => {
                let journal = config.journal_path();
                let ledger = SandboxLedger::open(&journal, Network::Sandbox)
                    .with_context(|| format!("opening sandbox ledger at {}", journal.display()))?;
                (ledger, Keyring::open(&config.keyring_path())?)
            }
            Network::Ephemeral => (
                SandboxLedger::ephemeral(Network::Ephemeral, Clock::System)?,
                Keyring::in_memory(),
            ),
        };
        Ok(Self {
            ledger: Rc::new(ledger),
            keyring,
            cache: ProjectionCache::new(),
            network: config.network,
            settings: config.submit_settings(),
            decimals: config.decimals,
            format,
        })
    }

    /// Resolve an actor name, creating a sandbox account the first time.
    fn identity(&mut self, name: &str) -> anyhow::Result<Identity> {
        if self.keyring.contains(name) {
            return Ok(self.keyring.get(name)?);
        }
        let address = self.ledger.create_account()?;
        info!(actor = name, %address, "created account");
        Ok(self.keyring.insert(name, address)?)
    }

    fn orchestrator(&mut self, name: &str) -> anyhow::Result<Orchestrator<Ledger>> {
        let identity = self.identity(name)?;
        Ok(Orchestrator::new(
            self.ledger.clone(),
            identity,
            self.network,
            self.cache.clone(),
            self.settings,
        ))
    }

    fn amount(&self, input: &str) -> anyhow::Result<i128> {
        parse_amount(input, self.decimals).map_err(|e| OrchestratorError::from(e).into())
    }

    fn who(&self, address: &str) -> String {
        self.keyring
            .name_of(address)
            .map_or_else(|| address.to_string(), str::to_string)
    }
}

pub async fn run_command(cli: Cli) -> anyhow::Result<()> {
    let mut config = Config::load(cli.config.as_deref())?;
    if let Some(network) = cli.network {
        config.network = network;
    }
    if cli.force {
        config.precheck = false;
    }
    let mut session = Session::open(&config, cli.format)?;
    let actor = cli.actor;

    match cli.command {
        Command::Create(args) => {
            let orchestrator = session.orchestrator(&actor)?;
            let goal = session.amount(&args.goal)?;
            let deadline = parse_deadline(&args.deadline, session.ledger.time())
                .map_err(OrchestratorError::from)?;
            let confirmed = orchestrator.create_campaign(goal, deadline, &args.cid).await?;
            print_confirmed(&session, &confirmed)
        }
        Command::Contribute(args) => {
            let orchestrator = session.orchestrator(&actor)?;
            let amount = session.amount(&args.amount)?;
            let confirmed = orchestrator.contribute(args.campaign, amount).await?;
            print_confirmed(&session, &confirmed)
        }
        Command::Withdraw(args) => {
            let confirmed = session.orchestrator(&actor)?.withdraw(args.campaign).await?;
            print_confirmed(&session, &confirmed)
        }
        Command::Close(args) => {
            let confirmed = session.orchestrator(&actor)?.close_campaign(args.campaign).await?;
            print_confirmed(&session, &confirmed)
        }
        Command::Refund(args) => {
            let confirmed = session.orchestrator(&actor)?.claim_refund(args.campaign).await?;
            print_confirmed(&session, &confirmed)
        }
        Command::Show(args) => {
            let projection = session.orchestrator(&actor)?.campaign(args.campaign).await?;
            match session.format {
                OutputFormat::Json => print_json(&projection),
                OutputFormat::Text => {
                    print_projection(&session, &projection);
                    Ok(())
                }
            }
        }
        Command::List => {
            let all = session.orchestrator(&actor)?.campaigns().await?;
            match session.format {
                OutputFormat::Json => print_json(&all),
                OutputFormat::Text => {
                    if all.is_empty() {
                        println!("No campaigns.");
                    }
                    for projection in &all {
                        print_summary(&session, projection);
                    }
                    Ok(())
                }
            }
        }
        Command::Contributions(args) => {
            let log = session.orchestrator(&actor)?.contributions(args.campaign).await?;
            match session.format {
                OutputFormat::Json => print_json(&log),
                OutputFormat::Text => {
                    print_contributions(&session, args.campaign, &log);
                    Ok(())
                }
            }
        }
        Command::Faucet(args) => {
            let name = args.to.unwrap_or(actor);
            let identity = session.identity(&name)?;
            let amount = session.amount(&args.amount)?;
            session.ledger.mint(&identity.address, amount)?;
            let balance = session.orchestrator(&name)?.balance().await?;
            match session.format {
                OutputFormat::Json => print_json(&FaucetReport {
                    actor: &identity.name,
                    address: &identity.address,
                    minted: amount,
                    balance,
                }),
                OutputFormat::Text => {
                    println!(
                        "{} Minted {} to {} (balance {})",
                        "✓".green().bold(),
                        format_amount(amount, session.decimals).bold(),
                        name.yellow(),
                        format_amount(balance, session.decimals)
                    );
                    Ok(())
                }
            }
        }
        Command::Demo => cmd_demo(session.format).await,
    }
}

#[derive(Serialize)]
struct FaucetReport<'a> {
    actor: &'a str,
    address: &'a str,
    minted: i128,
    balance: i128,
}

/// Failure kinds map onto exit codes: 2 ledger rejection, 3 submission
/// failure, 4 confirmation timeout, 1 anything else.
pub fn exit_code(err: &anyhow::Error) -> u8 {
    match err.downcast_ref::<OrchestratorError>() {
        Some(OrchestratorError::Rejected { .. } | OrchestratorError::Refused { .. }) => 2,
        Some(OrchestratorError::SubmissionFailed { .. }) => 3,
        Some(OrchestratorError::Timeout { .. }) => 4,
        _ => 1,
    }
}

#[derive(Serialize)]
struct ErrorReport {
    error: String,
    campaign: Option<u64>,
    message: String,
}

pub fn report_error(err: &anyhow::Error, format: OutputFormat) {
    let orchestrator = err.downcast_ref::<OrchestratorError>();
    match format {
        OutputFormat::Json => {
            let report = ErrorReport {
                error: orchestrator.map_or_else(|| "Error".to_string(), OrchestratorError::kind),
                campaign: orchestrator.and_then(|e| match e.target() {
                    Some(Target::Campaign(id)) => Some(id),
                    _ => None,
                }),
                message: format!("{err:#}"),
            };
            match serde_json::to_string_pretty(&report) {
                Ok(json) => println!("{json}"),
                Err(_) => eprintln!("{err:#}"),
            }
        }
        OutputFormat::Text => {
            let kind = orchestrator.map(|e| format!(" [{}]", e.kind())).unwrap_or_default();
            eprintln!("{}{} {err:#}", "error".red().bold(), kind.red());
        }
    }
}

fn print_json<T: Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_confirmed(session: &Session, confirmed: &Confirmed) -> anyhow::Result<()> {
    if session.format == OutputFormat::Json {
        return print_json(confirmed);
    }

    let on = match confirmed.campaign_id {
        Some(id) => format!("campaign #{id}"),
        None => "campaign".to_string(),
    };
    let headline = match &confirmed.outcome {
        TxResult::Created(id) => format!("Created campaign #{id}"),
        TxResult::Refunded(amount) => format!(
            "Refunded {} from {on}",
            format_amount(*amount, session.decimals)
        ),
        TxResult::Applied => format!("{} confirmed on {on}", confirmed.operation),
    };
    println!("{} {}", "✓".green().bold(), headline);
    let request = confirmed.request.short();
    match confirmed.ledger {
        Some(ledger) => println!("  Request: {} (ledger {})", request.dimmed(), ledger),
        None => println!(
            "  Request: {} ({})",
            request.dimmed(),
            "effect found on ledger".yellow()
        ),
    }
    match &confirmed.campaign {
        Some(record) => print_record(session, record, session.ledger.time()),
        None => println!("  {}", "campaign could not be read back".yellow()),
    }
    Ok(())
}

fn print_projection(session: &Session, projection: &Projection) {
    println!("{}", format!("Campaign #{}", projection.record.id).bold());
    print_record(session, &projection.record, projection.observed_at);
    println!("  Observed: {}", format_timestamp(projection.observed_at).dimmed());
}

fn print_record(session: &Session, record: &CampaignRecord, now: u64) {
    let status = status_label(record.status);
    let status = match record.status {
        CampaignStatus::Active => status.green(),
        CampaignStatus::Successful => status.cyan(),
        CampaignStatus::Closed => status.red(),
    };
    println!("  Status: {} ({})", status.bold(), phase_label(record.phase(now)));
    println!("  Creator: {}", session.who(&record.creator).yellow());
    println!(
        "  Funded: {} / {} ({}%)",
        format_amount(record.total_funded, session.decimals).bold(),
        format_amount(record.goal, session.decimals),
        record.progress_percent()
    );
    println!("  Deadline: {}", format_timestamp(record.deadline));
    if !record.metadata_cid.is_empty() {
        println!("  Metadata: {}", record.metadata_cid.blue());
    }
}

fn print_summary(session: &Session, projection: &Projection) {
    let record = &projection.record;
    println!(
        "{:>4}  {:<10}  {:>12} / {:<12}  {}",
        format!("#{}", record.id).yellow(),
        status_label(record.status),
        format_amount(record.total_funded, session.decimals),
        format_amount(record.goal, session.decimals),
        phase_label(record.phase(projection.observed_at)).dimmed()
    );
}

fn print_contributions(session: &Session, campaign: u64, log: &[ContributionRecord]) {
    if log.is_empty() {
        println!("No contributions to campaign #{campaign}.");
        return;
    }
    for entry in log {
        println!(
            "  {}  {:>12}  {}",
            format_timestamp(entry.timestamp).dimmed(),
            format_amount(entry.amount, session.decimals).bold(),
            session.who(&entry.contributor).yellow()
        );
    }
}

/// Walk both endings of a campaign on a throwaway ledger.
async fn cmd_demo(format: OutputFormat) -> anyhow::Result<()> {
    let config = Config {
        network: Network::Ephemeral,
        poll_interval_ms: 10,
        ..Config::default()
    };
    let mut session = Session::open(&config, format)?;
    let unit = |whole: i128| whole * 10i128.pow(config.decimals);

    let creator = session.orchestrator("creator")?;
    let alice = session.orchestrator("alice")?;
    let bob = session.orchestrator("bob")?;
    for backer in [&alice, &bob] {
        session.ledger.mint(&backer.identity().address, unit(100))?;
    }

    let deadline = session.ledger.time() + 3_600;
    let funded = creator.create_campaign(unit(100), deadline, "demo-funded").await?;
    let id = funded.campaign_id.context("created campaign has no id")?;
    step(&session, "creator opens a campaign", &funded)?;
    step(&session, "alice contributes 60", &alice.contribute(id, unit(60)).await?)?;
    step(&session, "bob contributes 40", &bob.contribute(id, unit(40)).await?)?;
    step(&session, "creator withdraws", &creator.withdraw(id).await?)?;

    let refunded = creator.create_campaign(unit(500), deadline, "demo-closed").await?;
    let id = refunded.campaign_id.context("created campaign has no id")?;
    step(&session, "creator opens a second campaign", &refunded)?;
    step(&session, "alice contributes 25", &alice.contribute(id, unit(25)).await?)?;
    step(&session, "creator closes it", &creator.close_campaign(id).await?)?;
    step(&session, "alice claims her refund", &alice.claim_refund(id).await?)?;

    match bob.withdraw(id).await {
        Err(err) if format == OutputFormat::Text => {
            println!("{} bob tries to withdraw: {}", "✗".red().bold(), err.kind().red());
        }
        Err(err) => print_json(&ErrorReport {
            error: err.kind(),
            campaign: Some(id),
            message: err.to_string(),
        })?,
        Ok(_) => anyhow::bail!("withdrawal by a non-creator was accepted"),
    }
    Ok(())
}

fn step(session: &Session, title: &str, confirmed: &Confirmed) -> anyhow::Result<()> {
    if session.format == OutputFormat::Text {
        println!("{}", format!("== {title}").bold());
    }
    print_confirmed(session, confirmed)
}
