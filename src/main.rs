//! Gavel - governance proposal watcher and timelock action harness

use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use primitive_types::{H160, U256};
use tracing::{error, info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use gavel::config::{Args, Command};
use gavel::governor::{mint_calldata, GovernorClient, TokenClient};
use gavel::proposals::{short_id, ProposalView, ResolvedProposal};
use gavel::rpc::RpcClient;
use gavel::watch::{RefreshOutcome, Watcher};
use gavel::{GavelError, Result};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("gavel={},info", args.log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if let Err(e) = args.validate() {
        error!("Configuration error: {}", e);
        std::process::exit(1);
    }

    info!("Gavel - governance watcher");
    info!("RPC endpoint: {}", args.rpc_url);
    info!("Governor: {:?}", args.governor);
    if let Some(token) = args.token {
        info!("Token: {:?}", token);
    }
    info!("Scan range: {}..latest", args.from_block);

    let rpc = Arc::new(RpcClient::new(args.rpc_url.clone(), args.request_timeout())?);

    let needs_sender = matches!(
        args.command,
        Command::Propose { .. }
            | Command::Vote { .. }
            | Command::Queue { .. }
            | Command::Execute { .. }
            | Command::Delegate { .. }
    );
    let sender = if let Some(account) = args.from {
        account
    } else if needs_sender {
        first_account(&rpc).await?
    } else {
        H160::zero()
    };
    if needs_sender {
        info!("Sender: {:?}", sender);
    }

    let governor = Arc::new(GovernorClient::new(
        Arc::clone(&rpc),
        args.governor,
        args.from_block,
        sender,
        args.inclusion_timeout(),
    ));
    let watcher = Watcher::new(
        Arc::clone(&governor),
        Arc::clone(&governor),
        args.max_concurrent_resolutions,
    );

    match args.command.clone() {
        Command::Watch => run_watch(&watcher, args.refresh_interval()).await?,

        Command::List { json } => {
            let view = refresh_once(&watcher).await?;
            if json {
                println!("{}", serde_json::to_string_pretty(&*view)?);
            } else {
                print_view(&view);
            }
        }

        Command::Propose {
            description,
            to,
            amount,
        } => {
            let token_address = require_token(&args)?;
            let recipient = to.unwrap_or(sender);
            info!(recipient = ?recipient, %amount, "proposing token mint");

            let id = governor
                .propose(
                    vec![token_address],
                    vec![U256::zero()],
                    vec![mint_calldata(recipient, amount)],
                    &description,
                )
                .await?;
            println!("Proposal created: {id}");

            let view = refresh_once(&watcher).await?;
            print_view(&view);
        }

        Command::Vote { support, id } => {
            let view = refresh_once(&watcher).await?;
            let proposal = select(&view, id)?;
            let tx = governor.cast_vote(proposal, support).await?;
            println!(
                "Vote cast ({support}) on proposal {}: {tx:?}",
                short_id(&proposal.proposal.id)
            );
            let view = refresh_once(&watcher).await?;
            print_view(&view);
        }

        Command::Queue { id } => {
            let view = refresh_once(&watcher).await?;
            let proposal = select(&view, id)?;
            let tx = governor.queue(proposal).await?;
            println!(
                "Queued proposal {}: {tx:?}",
                short_id(&proposal.proposal.id)
            );
            let view = refresh_once(&watcher).await?;
            print_view(&view);
        }

        Command::Execute { id } => {
            let view = refresh_once(&watcher).await?;
            let proposal = select(&view, id)?;
            let tx = governor.execute(proposal).await?;
            println!(
                "Executed proposal {}: {tx:?}",
                short_id(&proposal.proposal.id)
            );
            let view = refresh_once(&watcher).await?;
            print_view(&view);
        }

        Command::Delegate { to } => {
            let token_address = require_token(&args)?;
            let token = TokenClient::new(
                Arc::clone(&rpc),
                token_address,
                sender,
                args.inclusion_timeout(),
            );
            let delegatee = to.unwrap_or(sender);
            let tx = token.delegate(delegatee).await?;
            println!("Delegated voting power to {delegatee:?}: {tx:?}");
        }

        Command::Params => {
            let head = rpc.block_number().await?;
            // quorum is checkpointed, so query it one block behind head
            let params = governor.params(head.saturating_sub(1)).await?;
            println!("Voting delay:       {} blocks", params.voting_delay);
            println!("Voting period:      {} blocks", params.voting_period);
            println!("Proposal threshold: {}", params.proposal_threshold);
            println!("Quorum:             {}", params.quorum);
        }
    }

    Ok(())
}

/// Timer loop for watch mode: single-flight refreshes, previous view kept
/// intact across cycle failures.
async fn run_watch<L, S>(watcher: &Watcher<L, S>, interval: Duration) -> Result<()>
where
    L: gavel::watch::LogSource,
    S: gavel::proposals::StateSource,
{
    info!("watching, refresh every {}s", interval.as_secs());
    let mut ticker = tokio::time::interval(interval);
    loop {
        ticker.tick().await;
        match watcher.try_refresh().await {
            Ok(RefreshOutcome::Applied(view)) => print_view(&view),
            Ok(RefreshOutcome::Superseded) | Ok(RefreshOutcome::AlreadyRunning) => {}
            Err(e) => warn!(error = %e, "refresh cycle failed, previous view kept"),
        }
    }
}

/// One forced refresh; a one-shot command has no competing cycles
async fn refresh_once<L, S>(watcher: &Watcher<L, S>) -> Result<Arc<ProposalView>>
where
    L: gavel::watch::LogSource,
    S: gavel::proposals::StateSource,
{
    match watcher.refresh().await? {
        RefreshOutcome::Applied(view) => Ok(view),
        outcome => Err(GavelError::Response(format!(
            "refresh produced no view: {outcome:?}"
        ))),
    }
}

async fn first_account(rpc: &RpcClient) -> Result<H160> {
    let accounts = rpc.accounts().await?;
    accounts.first().copied().ok_or_else(|| {
        GavelError::Config("node manages no accounts; set FROM_ADDRESS".to_string())
    })
}

fn require_token(args: &Args) -> Result<H160> {
    args.token
        .ok_or_else(|| GavelError::Config("TOKEN_ADDRESS is not configured".to_string()))
}

fn select(view: &ProposalView, id: Option<U256>) -> Result<&ResolvedProposal> {
    let id = id
        .or(view.selected)
        .ok_or_else(|| GavelError::Config("no proposals found".to_string()))?;
    view.get(id)
        .ok_or_else(|| GavelError::Config(format!("proposal {id} not found")))
}

fn print_view(view: &ProposalView) {
    if view.is_empty() {
        println!("No proposals found.");
        return;
    }

    println!("Proposals (cycle {}, newest first):", view.cycle);
    for p in &view.proposals {
        let marker = if Some(p.proposal.id) == view.selected {
            "*"
        } else {
            " "
        };
        let allowed = if p.can_vote() {
            "vote open"
        } else if p.can_queue() {
            "ready to queue"
        } else if p.can_execute() {
            "ready to execute"
        } else {
            "-"
        };
        let description: String = p.proposal.description.chars().take(60).collect();
        println!(
            "{marker} {:10} {} block {:>6} {:16} {}",
            p.state.to_string(),
            short_id(&p.proposal.id),
            p.proposal.origin_block,
            allowed,
            description
        );
    }

    for conflict in &view.conflicts {
        eprintln!("warning: {conflict}");
    }
}
