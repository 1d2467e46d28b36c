//! apkship - fetch, patch, sign, publish and announce an Android package.
//!
//! Exit codes: 0 success, 1 a stage failed (or the run was cancelled),
//! 2 configuration or startup error.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use anyhow::{Context as _, Result};
use clap::{Parser, Subcommand};

use apkship_core::adapters::Adapters;
use apkship_core::artifacts::slugify;
use apkship_core::config::{ConfigManager, Settings};
use apkship_core::logging::{init_tracing, LogConfig, LogLevel, RunLogger};
use apkship_core::orchestrator::{
    create_standard_pipeline, steps, PipelineError, RunContext, RunReport, TargetInfo,
};

const EXIT_STAGE_FAILED: u8 = 1;
const EXIT_CONFIG: u8 = 2;

#[derive(Parser)]
#[command(name = "apkship")]
#[command(version)]
#[command(about = "Release pipeline for modified Android packages")]
struct Cli {
    /// Configuration file
    #[arg(short, long, global = true, default_value = "apkship.toml")]
    config: PathBuf,

    /// More output (repeat for more)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full pipeline
    Run,
    /// Validate the configuration without running anything
    Check,
    /// List the stages in execution order
    Stages,
    /// Write an example configuration file
    Init,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let result = match cli.command {
        Commands::Run => run(&cli.config, cli.verbose),
        Commands::Check => check(&cli.config),
        Commands::Stages => stages(&cli.config),
        Commands::Init => init(&cli.config),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_CONFIG)
        }
    }
}

fn load(config: &Path) -> Result<ConfigManager> {
    let mut manager = ConfigManager::new(config);
    manager
        .load()
        .with_context(|| format!("loading {}", config.display()))?;
    Ok(manager)
}

fn log_level(settings: &Settings, verbose: u8) -> LogLevel {
    (0..verbose).fold(settings.logging.level, |level, _| level.more_verbose())
}

fn run(config: &Path, verbose: u8) -> Result<ExitCode> {
    let manager = load(config)?;
    manager
        .ensure_dirs_exist()
        .context("creating working directories")?;

    let logs = manager.logs_folder();
    let settings = manager.into_settings();
    let level = log_level(&settings, verbose);
    let _guard = init_tracing(level, settings.logging.file.then_some(logs.as_path()));
    tracing::info!(
        config = %config.display(),
        target = %settings.target.name,
        "configuration loaded"
    );

    let log_config = LogConfig {
        level,
        echo_tool_output: level <= LogLevel::Debug,
        error_tail: settings.logging.error_tail,
        ..LogConfig::default()
    };
    let logger = Arc::new(RunLogger::new(
        slugify(&settings.target.name),
        log_config,
        None,
    ));

    let adapters = Adapters::from_settings(&settings, Arc::clone(&logger))?;
    let pipeline = create_standard_pipeline(&settings, &adapters, logger);
    let ctx = RunContext::new(TargetInfo::from_settings(&settings.target));

    match pipeline.run(ctx) {
        Ok(report) => {
            print_report(&report);
            Ok(ExitCode::SUCCESS)
        }
        Err(e) => {
            eprintln!("{}", e);
            match &e {
                PipelineError::StageFailed { completed, .. } if !completed.is_empty() => {
                    eprintln!("Completed before failure: {}", completed.join(", "));
                }
                PipelineError::ValidationFailed(_) => return Ok(ExitCode::from(EXIT_CONFIG)),
                _ => {}
            }
            Ok(ExitCode::from(EXIT_STAGE_FAILED))
        }
    }
}

fn print_report(report: &RunReport) {
    let ctx = &report.context;
    println!(
        "Released {} {}",
        ctx.target.name,
        ctx.version.as_deref().unwrap_or("-")
    );
    if let Some(url) = &ctx.release_url {
        println!("  release:  {}", url);
    }
    if let Some(url) = &ctx.download_url {
        println!("  download: {}", url);
    }
    if let Some(sum) = &ctx.checksum {
        println!("  sha256:   {}", sum);
    }
    if let Some(path) = &ctx.site_path {
        println!("  website:  {}", path.display());
    }
    println!("  stages:   {}", report.stages_completed.join(" -> "));
}

fn check(config: &Path) -> Result<ExitCode> {
    let settings = load(config)?.into_settings();
    let adapters = Adapters::from_settings(&settings, RunLogger::quiet("check"))?;
    let pipeline = create_standard_pipeline(&settings, &adapters, RunLogger::quiet("check"));
    pipeline.validate()?;

    println!("{}: OK", config.display());
    println!("  target:   {} ({})", settings.target.name, settings.target.package);
    println!("  release:  {}", settings.release.repo);
    println!("  stages:");
    for (idx, (name, description)) in pipeline.describe().into_iter().enumerate() {
        println!("    {}. {:<13} {}", idx + 1, name, description);
    }
    Ok(ExitCode::SUCCESS)
}

fn stages(config: &Path) -> Result<ExitCode> {
    // Without a readable config, show the full list.
    let site_configured = load(config)
        .map(|m| m.settings().site.is_some())
        .unwrap_or(true);

    for (idx, name) in steps::STANDARD_STAGES.iter().enumerate() {
        let note = if *name == steps::PUBLISH_SITE && !site_configured {
            "  (skipped: no [site] section)"
        } else if *name == steps::PUBLISH_SITE {
            "  (only with [site])"
        } else {
            ""
        };
        println!("{}. {}{}", idx + 1, name, note);
    }
    Ok(ExitCode::SUCCESS)
}

fn init(config: &Path) -> Result<ExitCode> {
    ConfigManager::new(config).write_example()?;
    println!("Wrote example configuration to {}", config.display());
    Ok(ExitCode::SUCCESS)
}
