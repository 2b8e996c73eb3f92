use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, error};

use capstan::config::Config;
use capstan::deploy::{
    confirm_destroy, confirm_reset, report_to_error, AssumeYesInteraction,
    DefaultUserInteraction, Orchestrator, TeardownCoordinator, UserInteraction,
};
use capstan::error::CapstanError;
use capstan::providers;
use capstan::subprocess::SubprocessManager;

/// Deploy and manage self-hosted platforms
#[derive(Parser)]
#[command(name = "capstan")]
#[command(about = "Provision self-hosted platform deployments across backends", long_about = None)]
struct Cli {
    /// Enable verbose output (-v for debug, -vv for trace, -vvv for all)
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    /// Path to an alternate configuration file
    #[arg(short = 'c', long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Provision the platform onto a backend
    Deploy {
        /// Backend to deploy to
        #[arg(short, long)]
        provider: String,

        /// Output format for the run result
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
    /// Delete the deployed platform resources
    Destroy {
        /// Backend the platform was deployed to
        #[arg(short, long)]
        provider: String,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// Delete the platform AND its parent project data
    Reset {
        /// Backend the platform was deployed to
        #[arg(short, long)]
        provider: String,

        /// Skip confirmation prompts
        #[arg(short = 'y', long)]
        yes: bool,
    },
    /// List available providers
    Providers,
}

#[derive(Clone, Copy, PartialEq, Eq, ValueEnum)]
enum OutputFormat {
    /// Live terminal UI
    Text,
    /// Machine-readable result on stdout, no terminal UI
    Json,
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let log_level = match cli.verbose {
        0 => "warn",
        1 => "debug",
        2 => "trace",
        _ => "trace,tokio=debug",
    };

    tracing_subscriber::fmt()
        .with_env_filter(log_level)
        .with_target(cli.verbose >= 2)
        .with_writer(std::io::stderr)
        .init();

    debug!("capstan started with verbosity level: {}", cli.verbose);

    let result = run(cli).await;

    if let Err(e) = result {
        match e.downcast_ref::<CapstanError>() {
            Some(err) if err.is_interrupted() => {
                eprintln!("\nInterrupted");
                std::process::exit(err.exit_code());
            }
            Some(err) => {
                error!("Fatal error: {:#}", e);
                eprintln!("Error: {}", err.user_message());
                std::process::exit(err.exit_code());
            }
            None => {
                error!("Fatal error: {:#}", e);
                eprintln!("Error: {e:#}");
                std::process::exit(1);
            }
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = match &cli.config {
        Some(path) => Config::load_from(path)?,
        None => Config::load()?,
    };

    match cli.command {
        Commands::Deploy { provider, output } => run_deploy(&provider, config, output).await,
        Commands::Destroy { provider, yes } => run_destroy(&provider, config, yes).await,
        Commands::Reset { provider, yes } => run_reset(&provider, config, yes).await,
        Commands::Providers => {
            println!("Available providers:");
            for name in providers::AVAILABLE {
                println!("  {name}");
            }
            Ok(())
        }
    }
}

async fn run_deploy(
    provider_name: &str,
    config: Config,
    output: OutputFormat,
) -> anyhow::Result<()> {
    let subprocess = SubprocessManager::production();
    let provider = providers::create(provider_name, subprocess)?;

    let mut orchestrator = Orchestrator::new(provider, config);
    if output == OutputFormat::Json {
        orchestrator = orchestrator.with_hidden_ui();
    }

    let result = orchestrator.deploy().await?;
    debug!("deployment finished: {}", result.message);
    if output == OutputFormat::Json {
        println!("{}", serde_json::to_string_pretty(&result)?);
    }
    Ok(())
}

async fn run_destroy(provider_name: &str, config: Config, yes: bool) -> anyhow::Result<()> {
    let subprocess = SubprocessManager::production();
    let interaction = make_interaction(yes);
    let plans = providers::destroy_plans(provider_name, &config, &subprocess)?;

    let kinds: Vec<&str> = plans.iter().map(|p| p.kind.as_str()).collect();
    if !confirm_destroy(interaction.as_ref(), &config.platform.project_name, &kinds).await? {
        return Ok(());
    }

    let report = TeardownCoordinator::default()
        .run(&plans, interaction.as_ref())
        .await;
    if let Some(err) = report_to_error(&report) {
        return Err(err.into());
    }
    interaction.display_success("Deployment destroyed");
    Ok(())
}

async fn run_reset(provider_name: &str, config: Config, yes: bool) -> anyhow::Result<()> {
    let subprocess = SubprocessManager::production();
    let interaction = make_interaction(yes);
    let plans = providers::reset_plans(provider_name, &config, &subprocess)?;

    if !confirm_reset(interaction.as_ref(), &config.platform.project_name).await? {
        return Ok(());
    }

    let report = TeardownCoordinator::default()
        .run(&plans, interaction.as_ref())
        .await;
    if let Some(err) = report_to_error(&report) {
        return Err(err.into());
    }
    interaction.display_success("Project reset, all resources removed");
    Ok(())
}

fn make_interaction(yes: bool) -> Arc<dyn UserInteraction> {
    if yes {
        Arc::new(AssumeYesInteraction::new())
    } else {
        Arc::new(DefaultUserInteraction::new())
    }
}
