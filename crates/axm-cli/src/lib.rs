//! # AXM CLI
//!
//! Offline tooling over the JSON documents the manager produces and
//! consumes. Nothing here talks to a runner or a repository; every
//! subcommand reads a file (or `-` for stdin) and writes to the given sink.
//!
//! ## Subcommands
//!
//! - `format-context <FILE>`: render a task's prompt (`description` plus
//!   `contextAttachments`)
//! - `actions <FILE>`: permission vector of a run, using the configured
//!   investigation-tag allowlist
//! - `events summary <FILE>`: run summary and warning counts of an event list
//! - `events check <FILE>`: per-event warnings and sequence order
//! - `manifest validate <FILE>`: validate a tool manifest

#![warn(unreachable_pub)]
#![allow(missing_docs)]

use anyhow::{bail, Context, Result};
use axm_context::format_context;
use axm_core::{LogFormat, ManagerConfig};
use axm_events::{summarize, summarize_run, validate};
use axm_policy::{get_run_actions, ActionContext};
use axm_tools::ToolManifest;
use axm_types::{invariants, ContextAttachment, Run, RunEvent};
use clap::{value_parser, Arg, ArgMatches, Command};
use serde::de::DeserializeOwned;
use serde::Deserialize;
use serde_json::json;
use std::io::{Read, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Prompt source accepted by `format-context`; a full task document also fits
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PromptDocument {
    #[serde(default)]
    description: String,
    #[serde(default)]
    context_attachments: Vec<ContextAttachment>,
}

fn file_arg() -> Arg {
    Arg::new("file")
        .required(true)
        .value_parser(value_parser!(PathBuf))
        .help("JSON document, or '-' for stdin")
}

/// The `axm` command tree
#[must_use]
pub fn command() -> Command {
    Command::new("axm")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Agent execution manager tooling")
        .subcommand_required(true)
        .arg_required_else_help(true)
        .arg(
            Arg::new("config")
                .long("config")
                .global(true)
                .value_parser(value_parser!(PathBuf))
                .help("Manager configuration (TOML)"),
        )
        .arg(
            Arg::new("log-format")
                .long("log-format")
                .global(true)
                .default_value("pretty")
                .value_parser(["pretty", "json"])
                .help("Log output format"),
        )
        .subcommand(
            Command::new("format-context")
                .about("Render a task prompt with its context attachments")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("actions")
                .about("Compute the action permissions of a run")
                .arg(file_arg()),
        )
        .subcommand(
            Command::new("events")
                .about("Inspect a run's event list")
                .subcommand_required(true)
                .subcommand(
                    Command::new("summary")
                        .about("Summary statistics and warning counts")
                        .arg(file_arg()),
                )
                .subcommand(
                    Command::new("check")
                        .about("Per-event warnings and sequence order")
                        .arg(file_arg()),
                ),
        )
        .subcommand(
            Command::new("manifest")
                .about("Tool manifest utilities")
                .subcommand_required(true)
                .subcommand(
                    Command::new("validate")
                        .about("Validate a tool manifest")
                        .arg(file_arg()),
                ),
        )
}

/// Log format selected on the command line
#[must_use]
pub fn log_format(matches: &ArgMatches) -> LogFormat {
    match matches.get_one::<String>("log-format").map(String::as_str) {
        Some("json") => LogFormat::Json,
        _ => LogFormat::Pretty,
    }
}

/// Load `--config`, or defaults when absent
pub fn load_config(matches: &ArgMatches) -> Result<ManagerConfig> {
    let Some(path) = matches.get_one::<PathBuf>("config") else {
        return Ok(ManagerConfig::default());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config = ManagerConfig::from_toml_str(&raw)
        .with_context(|| format!("invalid config {}", path.display()))?;
    debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

fn read_input(path: &Path) -> Result<String> {
    if path == Path::new("-") {
        let mut raw = String::new();
        std::io::stdin()
            .read_to_string(&mut raw)
            .context("reading stdin")?;
        return Ok(raw);
    }
    std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))
}

fn read_json<T: DeserializeOwned>(matches: &ArgMatches) -> Result<T> {
    let path = matches
        .get_one::<PathBuf>("file")
        .context("missing input file")?;
    let raw = read_input(path)?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

fn print_json(out: &mut dyn Write, value: &impl serde::Serialize) -> Result<()> {
    serde_json::to_writer_pretty(&mut *out, value)?;
    writeln!(out)?;
    Ok(())
}

/// Execute a parsed command line
pub fn run(matches: &ArgMatches, out: &mut dyn Write) -> Result<()> {
    let config = load_config(matches)?;
    match matches.subcommand() {
        Some(("format-context", args)) => {
            let doc: PromptDocument = read_json(args)?;
            let prompt = format_context(&doc.description, &doc.context_attachments);
            writeln!(out, "{prompt}")?;
        }
        Some(("actions", args)) => {
            let run: Run = read_json(args)?;
            let ctx = ActionContext::new(config.allowlist()?);
            print_json(out, &get_run_actions(&run, &ctx))?;
        }
        Some(("events", sub)) => match sub.subcommand() {
            Some(("summary", args)) => {
                let events: Vec<RunEvent> = read_json(args)?;
                let batch = summarize(events.iter().map(|e| &e.data));
                let summary = summarize_run(&events);
                print_json(out, &json!({ "summary": summary, "batch": batch }))?;
            }
            Some(("check", args)) => {
                let events: Vec<RunEvent> = read_json(args)?;
                check_events(&events, out)?;
            }
            _ => bail!("unknown events subcommand"),
        },
        Some(("manifest", sub)) => match sub.subcommand() {
            Some(("validate", args)) => {
                let manifest: ToolManifest = read_json(args)?;
                manifest.validate()?;
                writeln!(
                    out,
                    "ok: {} {} ({} tools)",
                    manifest.scenario.name,
                    manifest.scenario.version,
                    manifest.tools.len()
                )?;
            }
            _ => bail!("unknown manifest subcommand"),
        },
        _ => bail!("no subcommand given"),
    }
    Ok(())
}

fn check_events(events: &[RunEvent], out: &mut dyn Write) -> Result<()> {
    let mut warnings = 0usize;
    for event in events {
        for warning in validate(event) {
            warnings += 1;
            warn!(run_id = %event.run_id, sequence = event.sequence, "{}", warning.message);
            writeln!(out, "#{} {:?}: {}", event.sequence, warning.kind, warning.message)?;
        }
    }
    invariants::check_event_order(events)?;
    writeln!(out, "{} events, {warnings} warnings, order ok", events.len())?;
    Ok(())
}
