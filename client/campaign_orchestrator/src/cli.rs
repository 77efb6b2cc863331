use std::path::PathBuf;

use campaign_orchestrator::{CampaignId, Network};
use clap::{Args, Parser, Subcommand};

#[derive(Parser)]
#[command(
    name = "crowdfund",
    about = "Create, fund and settle crowdfunding campaigns on a Soroban ledger",
    version
)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Actor to act as; unknown names get a fresh sandbox account
    #[arg(long = "as", global = true, default_value = "creator")]
    pub actor: String,

    #[arg(long, global = true)]
    pub config: Option<PathBuf>,

    /// Overrides the network from the config file
    #[arg(long, global = true)]
    pub network: Option<Network>,

    #[arg(long, global = true, default_value = "text")]
    pub format: OutputFormat,

    /// Skip the advisory pre-check and let the ledger decide
    #[arg(long, global = true)]
    pub force: bool,

    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    pub verbose: u8,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, clap::ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[derive(Subcommand)]
pub enum Command {
    /// Open a campaign with a goal and a deadline
    Create(CreateArgs),
    /// Send funds to a campaign's escrow
    Contribute(ContributeArgs),
    /// Release a funded campaign's escrow to its creator
    Withdraw(CampaignArgs),
    /// Close a campaign; contributors can then claim refunds
    Close(CampaignArgs),
    /// Claim back a pledge from a closed campaign
    Refund(CampaignArgs),
    /// Show one campaign as the ledger has it now
    Show(CampaignArgs),
    /// List every campaign
    List,
    /// Show a campaign's contribution log
    Contributions(CampaignArgs),
    /// Mint sandbox tokens to an actor
    Faucet(FaucetArgs),
    /// Run a full campaign lifecycle on a throwaway ledger
    Demo,
}

#[derive(Args)]
pub struct CreateArgs {
    /// Funding goal, in whole token units (e.g. 250.5)
    pub goal: String,
    /// Unix seconds, RFC 3339, or relative such as +7d
    pub deadline: String,
    #[arg(long, default_value = "")]
    pub cid: String,
}

#[derive(Args)]
pub struct ContributeArgs {
    pub campaign: CampaignId,
    pub amount: String,
}

#[derive(Args)]
pub struct CampaignArgs {
    pub campaign: CampaignId,
}

#[derive(Args)]
pub struct FaucetArgs {
    pub amount: String,
    /// Recipient; defaults to the acting actor
    #[arg(long)]
    pub to: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_create() {
        let cli =
            Cli::try_parse_from(["crowdfund", "create", "100", "+7d", "--cid", "bafy"]).unwrap();
        if let Command::Create(args) = cli.command {
            assert_eq!(args.goal, "100");
            assert_eq!(args.deadline, "+7d");
            assert_eq!(args.cid, "bafy");
        } else {
            panic!("wrong command");
        }
        assert_eq!(cli.actor, "creator");
    }

    #[test]
    fn parse_contribute_as() {
        let cli = Cli::try_parse_from(["crowdfund", "--as", "alice", "contribute", "3", "12.5"])
            .unwrap();
        assert_eq!(cli.actor, "alice");
        if let Command::Contribute(args) = cli.command {
            assert_eq!(args.campaign, 3);
            assert_eq!(args.amount, "12.5");
        } else {
            panic!("wrong command");
        }
    }

    #[test]
    fn parse_lifecycle_commands() {
        let words = [
            ("withdraw", 0),
            ("close", 1),
            ("refund", 2),
            ("show", 3),
            ("contributions", 4),
        ];
        for (word, expect) in words {
            let cli = Cli::try_parse_from(["crowdfund", word, "9"]).unwrap();
            let matched = match cli.command {
                Command::Withdraw(a) if expect == 0 => a.campaign,
                Command::Close(a) if expect == 1 => a.campaign,
                Command::Refund(a) if expect == 2 => a.campaign,
                Command::Show(a) if expect == 3 => a.campaign,
                Command::Contributions(a) if expect == 4 => a.campaign,
                _ => panic!("wrong command for {word}"),
            };
            assert_eq!(matched, 9);
        }
    }

    #[test]
    fn rejects_non_numeric_campaign() {
        assert!(Cli::try_parse_from(["crowdfund", "withdraw", "first"]).is_err());
    }

    #[test]
    fn parse_globals() {
        let cli = Cli::try_parse_from([
            "crowdfund", "list", "--network", "ephemeral", "--format", "json", "--force", "-vv",
        ])
        .unwrap();
        assert!(matches!(cli.command, Command::List));
        assert_eq!(cli.network, Some(Network::Ephemeral));
        assert_eq!(cli.format, OutputFormat::Json);
        assert!(cli.force);
        assert_eq!(cli.verbose, 2);
    }

    #[test]
    fn parse_faucet() {
        let cli = Cli::try_parse_from(["crowdfund", "faucet", "50", "--to", "bob"]).unwrap();
        if let Command::Faucet(args) = cli.command {
            assert_eq!(args.amount, "50");
            assert_eq!(args.to, Some("bob".into()));
        } else {
            panic!("wrong command");
        }
    }
}
