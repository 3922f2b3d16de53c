//! Dependency-upgrade demo orchestrator.
//!
//! Manufactures, dispatches and resets the labeled upgrade pull requests a
//! demo repository cycles through. Results go to stdout (`--json` for machine
//! output); errors go to stderr with a stable exit code.

use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;

use bumpdemo::core::types::DemoRun;
use bumpdemo::error::DemoError;
use bumpdemo::exit_codes;
use bumpdemo::io::config::{DEFAULT_CONFIG_FILE, DemoConfig, load_config, load_credential};
use bumpdemo::io::dispatch::GitHubDispatcher;
use bumpdemo::io::git::Git;
use bumpdemo::io::github::GhApi;
use bumpdemo::io::vcs::GitHubVcs;
use bumpdemo::logging;
use bumpdemo::reset::{ItemOutcome, ResetReport, reset};
use bumpdemo::simulate::{SimulateRequest, simulate};
use bumpdemo::status::{StatusReport, inspect};
use bumpdemo::trigger::{trigger, upgrade_inputs};

#[derive(Parser)]
#[command(
    name = "bumpdemo",
    version,
    about = "Drive a dependency-upgrade demo repository through simulate/trigger/reset"
)]
struct Cli {
    /// Config file, relative to the working copy.
    #[arg(long, global = true, default_value = DEFAULT_CONFIG_FILE)]
    config: PathBuf,
    /// Git working copy of the demo repository.
    #[arg(long, global = true, default_value = ".")]
    workdir: PathBuf,
    /// Print results as JSON.
    #[arg(long, global = true)]
    json: bool,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Push an upgrade branch and open a labeled pull request.
    Simulate {
        /// Patch on a throwaway branch, then discard it without pushing.
        #[arg(long)]
        dry_run: bool,
        #[command(flatten)]
        upgrade: UpgradeArgs,
    },
    /// Dispatch the upgrade workflow on the remote CI.
    Trigger {
        /// Ref to run the workflow on. Defaults to the trunk branch.
        #[arg(long = "ref")]
        git_ref: Option<String>,
        #[command(flatten)]
        upgrade: UpgradeArgs,
    },
    /// Close demo pull requests, delete demo branches, restore the baseline pin.
    Reset,
    /// Show open demo pull requests, orphaned branches and manifest drift.
    Status,
}

/// Per-invocation overrides of the configured upgrade.
#[derive(Debug, Default, clap::Args)]
struct UpgradeArgs {
    /// Package to upgrade.
    #[arg(long)]
    package: Option<String>,
    /// Version the manifest must currently pin.
    #[arg(long)]
    from: Option<String>,
    /// Version to upgrade to.
    #[arg(long)]
    to: Option<String>,
}

fn main() {
    logging::init();
    let cli = Cli::parse();
    let code = match run(cli) {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_code_for(&err)
        }
    };
    std::process::exit(code);
}

fn exit_code_for(err: &anyhow::Error) -> i32 {
    err.downcast_ref::<DemoError>()
        .map_or(exit_codes::FAILED, exit_codes::for_error)
}

fn run(cli: Cli) -> Result<i32> {
    let env = |key: &str| std::env::var(key).ok();
    let config_path = cli.workdir.join(&cli.config);
    let cfg = load_config(&config_path, env)
        .map_err(|err| DemoError::Configuration(format!("{err:#}")))?;
    let ctx = Adapters::connect(&cli.workdir, &cfg)?;

    match cli.command {
        Command::Simulate { dry_run, upgrade } => {
            cmd_simulate(&ctx, &cfg, dry_run, upgrade, cli.json)
        }
        Command::Trigger { git_ref, upgrade } => {
            cmd_trigger(&ctx, &cfg, git_ref, &upgrade, cli.json)
        }
        Command::Reset => cmd_reset(&ctx, &cfg, cli.json),
        Command::Status => cmd_status(&ctx, &cfg, cli.json),
    }
}

/// Adapters wired to the configured repository.
struct Adapters {
    vcs: GitHubVcs,
    dispatcher: GitHubDispatcher,
}

impl Adapters {
    /// Fails with a configuration error before any remote call when the token
    /// or repository slug is missing.
    fn connect(workdir: &Path, cfg: &DemoConfig) -> Result<Self> {
        let credential = load_credential(cfg, |key| std::env::var(key).ok())?;
        let slug = cfg
            .slug()
            .map_err(|err| DemoError::Configuration(format!("{err:#}")))?;
        let limits = cfg.limits();
        let git = Git::new(workdir, cfg.remote.clone())
            .with_credential(credential.clone())
            .with_limits(limits);
        let api = GhApi::new(slug, credential, limits);
        Ok(Self {
            vcs: GitHubVcs::new(git, api.clone(), cfg.trunk.clone()),
            dispatcher: GitHubDispatcher::new(api),
        })
    }
}

fn cmd_simulate(
    ctx: &Adapters,
    cfg: &DemoConfig,
    dry_run: bool,
    upgrade: UpgradeArgs,
    json: bool,
) -> Result<i32> {
    let defaults = SimulateRequest::from_config(cfg, dry_run);
    let request = SimulateRequest {
        package: upgrade.package.unwrap_or(defaults.package),
        old_version: upgrade.from.unwrap_or(defaults.old_version),
        new_version: upgrade.to.unwrap_or(defaults.new_version),
        dry_run,
    };
    let run = simulate(&ctx.vcs, cfg, &request)?;
    if json {
        print_json(&run)?;
    } else {
        print_run(&run);
    }
    Ok(exit_codes::OK)
}

fn cmd_trigger(
    ctx: &Adapters,
    cfg: &DemoConfig,
    git_ref: Option<String>,
    upgrade: &UpgradeArgs,
    json: bool,
) -> Result<i32> {
    let git_ref = git_ref.unwrap_or_else(|| cfg.trunk.clone());
    let inputs = upgrade_inputs(
        cfg,
        upgrade.package.as_deref(),
        upgrade.from.as_deref(),
        upgrade.to.as_deref(),
    );
    trigger(&ctx.dispatcher, cfg, &git_ref, &inputs)?;
    if json {
        print_json(&serde_json::json!({
            "workflow": cfg.workflow,
            "ref": git_ref,
            "inputs": inputs,
        }))?;
    } else {
        println!("dispatched {} on {}", cfg.workflow, git_ref);
    }
    Ok(exit_codes::OK)
}

fn cmd_reset(ctx: &Adapters, cfg: &DemoConfig, json: bool) -> Result<i32> {
    let report = reset(&ctx.vcs, cfg);
    if json {
        print_json(&report)?;
    } else {
        print_report(&report);
    }
    if report.has_failures() {
        eprintln!(
            "reset incomplete: {} item(s) failed",
            report.failures().count()
        );
        return Ok(exit_codes::RESET_INCOMPLETE);
    }
    Ok(exit_codes::OK)
}

fn cmd_status(ctx: &Adapters, cfg: &DemoConfig, json: bool) -> Result<i32> {
    let status = inspect(&ctx.vcs, cfg)?;
    if json {
        print_json(&status)?;
    } else {
        print_status(&status);
    }
    Ok(exit_codes::OK)
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let payload = serde_json::to_string_pretty(value).context("serialize json")?;
    println!("{payload}");
    Ok(())
}

fn print_run(run: &DemoRun) {
    println!(
        "{} {} -> {} on {} [{}]",
        run.package, run.old_version, run.new_version, run.branch_name, run.status
    );
    if let Some(url) = &run.pr_url {
        println!("{url}");
    } else if let Some(number) = run.pr_number {
        println!("pull request #{number}");
    }
}

fn print_report(report: &ResetReport) {
    if report.is_empty() {
        println!("nothing to reset");
        return;
    }
    for item in &report.items {
        let outcome = match &item.outcome {
            ItemOutcome::Done => "done".to_string(),
            ItemOutcome::AlreadyGone => "already gone".to_string(),
            ItemOutcome::Failed { error } => format!("FAILED: {error}"),
        };
        println!("{:?} {}: {}", item.action, item.target, outcome);
    }
}

fn print_status(status: &StatusReport) {
    if status.is_clean() {
        println!("clean: {} pinned at {}", status.manifest.package, status.manifest.current);
        return;
    }
    for pr in &status.pull_requests {
        println!("open  #{} {} ({})", pr.number, pr.head, pr.title);
    }
    for branch in &status.orphaned_branches {
        println!("orphan {branch}");
    }
    if status.manifest.drifted() {
        println!(
            "drift {} pins {} at {}, baseline {}",
            status.manifest.path,
            status.manifest.package,
            status.manifest.current,
            status.manifest.baseline
        );
    }
}
