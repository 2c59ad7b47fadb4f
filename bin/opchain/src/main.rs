//! opchain deploys OP Stack superchains and their chains from a declarative intent.

mod cli;

use alloy_core::primitives::{B256, U256};
use anyhow::{Context, Result};
use clap::Parser;
use comfy_table::Table;

use cli::{BootstrapArgs, BootstrapTarget, Cli, Command, ConnectionArgs, InitArgs, Settings};
use opchain_deploy::{
    HttpArtifactSource, Intent, LiveSession, OutputSink, StandardConfig, Workdir, apply_pipeline,
    bootstrap::{self, DeploymentRecord, DisputeGameTarget},
    intent::{DisputeGameIntent, SuperchainRoles},
    procedures::{
        DEV_RELEASE, DeployDelayedWETH, DeployDisputeGame, DeployImplementations, DeploySuperchain,
    },
    script::Procedure,
    standard,
};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    // Initialize the logger.
    tracing_subscriber::fmt()
        .with_max_level(cli.verbosity)
        .init();

    let workdir = Workdir::new(cli.workdir.clone());
    match cli.command {
        Command::Init(args) => init(workdir, args),
        Command::Apply { connection, output } => {
            let settings = Settings::load(&cli.config)?;
            apply(&workdir, &settings, &connection, output).await
        }
        Command::Inspect => inspect(&workdir),
        Command::Bootstrap(args) => {
            let settings = Settings::load(&cli.config)?;
            run_bootstrap(&settings, args).await
        }
    }
}

fn init(workdir: Workdir, args: InitArgs) -> Result<()> {
    let workdir = Workdir::create(workdir.root())?;
    let _lock = workdir.lock()?;
    if workdir.intent_path().exists() && !args.force {
        anyhow::bail!(
            "{} already exists, pass --force to replace it",
            workdir.intent_path().display()
        );
    }

    let mut intent = Intent::template(args.l1_chain_id, &args.l2_chain_ids, args.owner);
    intent.deployment_strategy = args.strategy;
    let standard = StandardConfig::load()?;
    intent
        .check(&standard)
        .context("generated intent is invalid")?;

    workdir.write_intent(&intent)
}

async fn apply(
    workdir: &Workdir,
    settings: &Settings,
    connection: &ConnectionArgs,
    output: Option<OutputSink>,
) -> Result<()> {
    let _lock = workdir.lock()?;
    let intent = workdir.read_intent()?;
    let mut state = workdir.read_state()?;

    let standard = StandardConfig::load()?;
    let options = connection.options(settings)?;
    let source = HttpArtifactSource::new(&standard, connection.cache_dir(settings))?;
    let store = workdir.state_store();

    let mut interrupted = false;
    tokio::select! {
        result = apply_pipeline(&options, &standard, &source, &intent, &mut state, &store) => {
            let report = result?;
            if report.is_noop() {
                tracing::info!("Deployment already matches the intent");
            } else {
                tracing::info!(
                    stages = report.executed.len(),
                    transactions = report.transactions,
                    "Deployment updated"
                );
            }
        }
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!(
                path = %workdir.state_path().display(),
                "Interrupted, the state holds every stage committed so far"
            );
            interrupted = true;
        }
    }

    if let Some(output) = output {
        output.write_json(&state)?;
    }
    if interrupted {
        anyhow::bail!("apply was interrupted");
    }
    Ok(())
}

fn inspect(workdir: &Workdir) -> Result<()> {
    let state = workdir.read_state()?;
    if state.superchain_deployment.is_none() && state.op_chain_deployments.is_empty() {
        tracing::info!(path = %workdir.state_path().display(), "Nothing deployed yet");
        return Ok(());
    }

    let mut table = Table::new();
    table.set_header(vec!["Chain", "Contract", "Address"]);

    if let Some(superchain) = &state.superchain_deployment {
        for (name, address) in [
            ("ProxyAdmin", superchain.proxy_admin_address),
            (
                "SuperchainConfigProxy",
                superchain.superchain_config_proxy_address,
            ),
            (
                "ProtocolVersionsProxy",
                superchain.protocol_versions_proxy_address,
            ),
        ] {
            table.add_row(vec![
                "superchain".to_string(),
                name.to_string(),
                address.to_string(),
            ]);
        }
    }
    if let Some(implementations) = &state.implementations_deployment {
        table.add_row(vec![
            "superchain".to_string(),
            "OPContractsManager".to_string(),
            implementations.opcm_address.to_string(),
        ]);
    }

    for chain in &state.op_chain_deployments {
        let label = chain_label(chain.id);
        for (name, address) in chain.addresses() {
            if !address.is_zero() {
                table.add_row(vec![label.clone(), name.to_string(), address.to_string()]);
            }
        }
        for game in &chain.additional_dispute_games {
            table.add_row(vec![
                label.clone(),
                format!("{} (type {})", game.game_kind, game.game_type),
                game.game_address.to_string(),
            ]);
        }
    }

    println!("{table}");
    Ok(())
}

fn chain_label(id: B256) -> String {
    U256::from_be_bytes(id.0).to_string()
}

async fn run_bootstrap(settings: &Settings, args: BootstrapArgs) -> Result<()> {
    let standard = StandardConfig::load()?;
    let options = args.connection.options(settings)?;
    let source = HttpArtifactSource::new(&standard, args.connection.cache_dir(settings))?;
    let release = args
        .artifacts_locator
        .tag()
        .unwrap_or(DEV_RELEASE)
        .to_string();

    let mut session =
        LiveSession::connect(&options, &standard, &source, &args.artifacts_locator).await?;
    let result = bootstrap_target(&mut session, &standard, &release, args.target, &args.output).await;
    session.close();
    result
}

async fn bootstrap_target(
    session: &mut LiveSession<'_>,
    standard: &StandardConfig,
    release: &str,
    target: BootstrapTarget,
    output: &OutputSink,
) -> Result<()> {
    let l1_chain_id = session.l1_chain_id();
    match target {
        BootstrapTarget::Superchain {
            proxy_admin_owner,
            protocol_versions_owner,
            guardian,
            paused,
        } => {
            let roles = SuperchainRoles {
                proxy_admin_owner,
                protocol_versions_owner,
                guardian,
            };
            let input = bootstrap::superchain_input(&roles, paused);
            deploy::<DeploySuperchain>(session, &input, output).await
        }
        BootstrapTarget::Implementations { salt, use_interop } => {
            let salt = salt.unwrap_or_else(|| B256::from(rand::random::<[u8; 32]>()));
            let input =
                bootstrap::implementations_input(standard, l1_chain_id, release, salt, use_interop)?;
            deploy::<DeployImplementations>(session, &input, output).await
        }
        BootstrapTarget::DelayedWeth { proxy_admin, owner } => {
            let input =
                bootstrap::delayed_weth_input(standard, l1_chain_id, release, proxy_admin, owner)?;
            deploy::<DeployDelayedWETH>(session, &input, output).await
        }
        BootstrapTarget::DisputeGame {
            delayed_weth_proxy,
            anchor_state_registry_proxy,
            l2_chain_id,
            proposer,
            challenger,
            game_kind,
            game_type,
            absolute_prestate,
        } => {
            let game = DisputeGameIntent {
                game_kind,
                game_type,
                absolute_prestate: absolute_prestate
                    .unwrap_or(standard::DISPUTE_ABSOLUTE_PRESTATE),
                ..Default::default()
            };
            let target = DisputeGameTarget {
                delayed_weth_proxy,
                anchor_state_registry_proxy,
                l2_chain_id,
                proposer,
                challenger,
            };
            let input =
                bootstrap::dispute_game_input(standard, l1_chain_id, release, &game, target)?;
            deploy::<DeployDisputeGame>(session, &input, output).await
        }
    }
}

async fn deploy<P: Procedure>(
    session: &mut LiveSession<'_>,
    input: &P::Input,
    output: &OutputSink,
) -> Result<()> {
    tracing::info!(procedure = P::NAME, "Deploying");
    let deployed = bootstrap::run::<P, _, _, _>(&mut session.pipeline, input).await?;
    let record = DeploymentRecord::new::<P>(session.l1_chain_id(), deployed);
    output.write_json(&record)?;
    tracing::info!(procedure = P::NAME, destination = %output, "Deployment record written");
    Ok(())
}
