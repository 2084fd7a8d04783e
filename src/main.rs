use std::path::PathBuf;

use anyhow::Context;
use carbon_placement::carbon_aware::CarbonIntensityClient;
use carbon_placement::config::{
    EvaluationConfig, ENV_API_KEY, ENV_API_URL_TEMPLATE, ENV_HOST_COUNT, ENV_LENGTH_JITTER,
    ENV_RESULTS_DIR, ENV_RUNS, ENV_VM_COUNT, ENV_WORKLOAD_COUNT, ENV_ZONES,
};
use carbon_placement::engine::AnalyticEngine;
use carbon_placement::evaluation::{EvaluationHarness, ResultsExporter};
use clap::{Parser, Subcommand};
use tracing::{info, Level};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// TOML configuration file layered over the built-in defaults
    #[arg(long, global = true, env = "EVAL_CONFIG")]
    config: Option<PathBuf>,

    /// Emit logs as JSON
    #[arg(long, global = true, env = "LOG_JSON")]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Run every policy for every repetition and write result artifacts
    Run(RunArgs),
    /// Resolve the current carbon intensity of one or more grid zones
    Intensity(IntensityArgs),
    /// Show version information
    Version,
}

/// Raw values; blank, unparsable or non-positive numbers keep the configured value
#[derive(clap::Args, Debug, Default)]
struct OverrideArgs {
    /// Repetitions per policy
    #[arg(long, env = ENV_RUNS)]
    runs: Option<String>,

    /// Hosts per experiment
    #[arg(long, env = ENV_HOST_COUNT)]
    hosts: Option<String>,

    /// Virtual machines per experiment
    #[arg(long, env = ENV_VM_COUNT)]
    vms: Option<String>,

    /// Workload units (cloudlets) per experiment
    #[arg(long, env = ENV_WORKLOAD_COUNT)]
    cloudlets: Option<String>,

    /// Comma-separated grid zones assigned to hosts round-robin
    #[arg(long, env = ENV_ZONES)]
    zones: Option<String>,

    /// ElectricityMap auth token; without it only fallback intensities are used
    #[arg(long, env = ENV_API_KEY, hide_env_values = true)]
    api_key: Option<String>,

    /// Endpoint template with one %s placeholder for the zone
    #[arg(long, env = ENV_API_URL_TEMPLATE)]
    api_url_template: Option<String>,
}

impl OverrideArgs {
    fn lookup(&self, key: &str) -> Option<String> {
        match key {
            ENV_RUNS => self.runs.clone(),
            ENV_HOST_COUNT => self.hosts.clone(),
            ENV_VM_COUNT => self.vms.clone(),
            ENV_WORKLOAD_COUNT => self.cloudlets.clone(),
            ENV_ZONES => self.zones.clone(),
            ENV_API_KEY => self.api_key.clone(),
            ENV_API_URL_TEMPLATE => self.api_url_template.clone(),
            _ => None,
        }
    }
}

#[derive(clap::Args, Debug)]
struct RunArgs {
    #[command(flatten)]
    overrides: OverrideArgs,

    /// Directory receiving the result artifacts
    #[arg(long, env = ENV_RESULTS_DIR)]
    results_dir: Option<PathBuf>,

    /// Relative workload length spread in [0, 1)
    #[arg(long, env = ENV_LENGTH_JITTER)]
    length_jitter: Option<String>,

    /// Comma-separated policies to evaluate (FIRST_FIT, ENERGY_AWARE, CIAVMP)
    #[arg(long, value_delimiter = ',')]
    policies: Option<Vec<String>>,
}

#[derive(clap::Args, Debug)]
struct IntensityArgs {
    #[command(flatten)]
    overrides: OverrideArgs,

    /// Grid zones to resolve
    #[arg(required = true)]
    regions: Vec<String>,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = Args::parse();

    match args.command {
        Commands::Version => {
            println!("carbon-eval v{}", env!("CARGO_PKG_VERSION"));
            Ok(())
        }
        Commands::Intensity(intensity_args) => {
            init_tracing(args.log_json);
            let config = load_config(args.config.as_ref(), &intensity_args.overrides)?;
            run_intensity(config, intensity_args).await
        }
        Commands::Run(run_args) => {
            init_tracing(args.log_json);
            let mut config = load_config(args.config.as_ref(), &run_args.overrides)?;
            if let Some(dir) = run_args.results_dir {
                config.results_dir = dir;
            }
            let jitter = run_args.length_jitter;
            config.apply_overrides(|key| match key {
                ENV_LENGTH_JITTER => jitter.clone(),
                _ => None,
            });
            if let Some(policies) = run_args.policies {
                config.policies = policies;
            }
            run_evaluation(config).await
        }
    }
}

fn init_tracing(json: bool) {
    let env_filter = EnvFilter::builder()
        .with_default_directive(Level::INFO.into())
        .from_env_lossy();

    let registry = tracing_subscriber::registry().with(env_filter);
    if json {
        registry.with(fmt::layer().json()).init();
    } else {
        registry.with(fmt::layer().with_target(true)).init();
    }
}

fn load_config(
    path: Option<&PathBuf>,
    overrides: &OverrideArgs,
) -> anyhow::Result<EvaluationConfig> {
    let mut config = EvaluationConfig::load(path.map(PathBuf::as_path))
        .context("failed to load evaluation configuration")?;
    config.apply_overrides(|key| overrides.lookup(key));
    Ok(config)
}

async fn run_evaluation(config: EvaluationConfig) -> anyhow::Result<()> {
    info!(
        "Starting carbon placement evaluation v{}",
        env!("CARGO_PKG_VERSION")
    );
    if config.carbon.has_api_key() {
        info!("Live carbon intensity enabled");
    } else {
        info!("No carbon API key configured, using fallback intensities");
    }

    let carbon = CarbonIntensityClient::new(config.carbon.clone())
        .context("failed to build carbon intensity client")?;
    let exporter = ResultsExporter::new(config.results_dir.clone());
    let harness = EvaluationHarness::new(config, carbon, AnalyticEngine::new)
        .context("invalid evaluation configuration")?;

    let report = harness.run().await.context("evaluation failed")?;
    let artifacts = exporter
        .export(&report)
        .await
        .context("failed to write evaluation results")?;

    for path in [
        &artifacts.raw_metrics,
        &artifacts.policy_summary,
        &artifacts.research_summary,
    ] {
        let shown = std::fs::canonicalize(path).unwrap_or_else(|_| path.clone());
        info!("Wrote {}", shown.display());
    }
    Ok(())
}

async fn run_intensity(config: EvaluationConfig, args: IntensityArgs) -> anyhow::Result<()> {
    config
        .carbon
        .validate()
        .context("invalid carbon intensity configuration")?;
    let client = CarbonIntensityClient::new(config.carbon)
        .context("failed to build carbon intensity client")?;

    for region in &args.regions {
        client.get_intensity(region).await;
    }
    for sample in client.cached_regions().await {
        println!(
            "{}: {:.1} gCO2/kWh ({})",
            sample.region, sample.carbon_intensity, sample.source
        );
    }
    Ok(())
}
