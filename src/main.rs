//! repairkit - sandboxed, lint-gated code editing for repair agents.
//!
//! The binary replays a script of tool calls (one JSON object per line)
//! against a single editing session, the way an agent loop would.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::{DateTime, Utc};
use clap::{Parser, Subcommand};
use colored::Colorize;
use indicatif::{ProgressBar, ProgressStyle};
use serde::Serialize;
use tracing_subscriber::EnvFilter;

use repairkit::sandbox::{DockerSandbox, LocalSandbox, Sandbox, SandboxSpec};
use repairkit::{
    linter_from_config, tool_definitions, try_dispatch, ConfigValidator, Editor, RepairConfig,
    ToolCall,
};

#[derive(Parser)]
#[command(name = "repairkit")]
#[command(version)]
#[command(about = "Sandboxed, lint-gated code editing for automated repair agents", long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Project directory (defaults to current directory)
    #[arg(short, long, global = true, default_value = ".")]
    project: PathBuf,

    /// Verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit logs as JSON
    #[arg(long, global = true)]
    log_json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a JSON-lines script of tool calls in one session
    Run {
        /// Script file, one tool call per line
        script: PathBuf,

        /// Edit the project directory directly instead of a container
        #[arg(long)]
        local: bool,

        /// Print the final patch after the script
        #[arg(long)]
        patch: bool,

        /// Write a JSON transcript of every call and result
        #[arg(long, value_name = "FILE")]
        transcript: Option<PathBuf>,
    },

    /// Print tool definitions
    Tools {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Configuration management
    Config {
        #[command(subcommand)]
        action: ConfigAction,
    },
}

#[derive(Subcommand)]
enum ConfigAction {
    /// Show the effective configuration
    Show {
        /// Output as JSON
        #[arg(long)]
        json: bool,
    },

    /// Validate configuration files
    Validate,

    /// Show configuration file paths
    Paths,
}

// ============================================================================
// Transcript
// ============================================================================

#[derive(Debug, Serialize)]
struct TranscriptEntry {
    index: usize,
    tool: String,
    call: Option<ToolCall>,
    mutating: bool,
    output: String,
    is_error: bool,
    at: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
struct Transcript {
    sandbox: String,
    started_at: DateTime<Utc>,
    finished_at: Option<DateTime<Utc>>,
    entries: Vec<TranscriptEntry>,
    patch: Option<String>,
}

// ============================================================================
// Main
// ============================================================================

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing
    let filter = if cli.verbose {
        "repairkit=debug,info"
    } else {
        "repairkit=info,warn"
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    if cli.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .with_writer(std::io::stderr)
            .init();
    }

    // Resolve project path
    let project_path = cli.project.canonicalize().unwrap_or(cli.project.clone());

    if !project_path.exists() {
        eprintln!(
            "{} Project directory does not exist: {}",
            "Error:".red().bold(),
            project_path.display()
        );
        std::process::exit(1);
    }

    match cli.command {
        Commands::Run {
            script,
            local,
            patch,
            transcript,
        } => {
            let loaded = RepairConfig::load(&project_path)
                .and_then(|config| config.check().map(|()| config));
            let config = match loaded {
                Ok(config) => config,
                Err(e) => {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                    std::process::exit(e.exit_code());
                }
            };

            let text = std::fs::read_to_string(&script)
                .with_context(|| format!("reading script {}", script.display()))?;

            let sandbox = match provision(&project_path, &config, local).await {
                Ok(sandbox) => sandbox,
                Err(e) => {
                    eprintln!("{} {}", "Error:".red().bold(), e);
                    std::process::exit(e.exit_code());
                }
            };

            let linter = linter_from_config(&config.lint);
            let mut editor = Editor::new(Arc::clone(&sandbox), linter, config);
            let mut log = Transcript {
                sandbox: sandbox.name().to_string(),
                started_at: Utc::now(),
                finished_at: None,
                entries: Vec::new(),
                patch: None,
            };

            let outcome = tokio::select! {
                result = run_script(&mut editor, &text, patch, &mut log) => result,
                _ = tokio::signal::ctrl_c() => {
                    eprintln!("\n{} Interrupted", "Warning:".yellow().bold());
                    Err(anyhow::anyhow!("interrupted"))
                }
            };

            if let Err(e) = editor.close().await {
                eprintln!("{} teardown failed: {}", "Warning:".yellow().bold(), e);
            }

            log.finished_at = Some(Utc::now());
            if let Some(path) = transcript {
                std::fs::write(&path, serde_json::to_string_pretty(&log)?)
                    .with_context(|| format!("writing transcript {}", path.display()))?;
                println!("{} Transcript written to {}", "OK".green(), path.display());
            }

            if let Err(e) = outcome {
                eprintln!("{} {}", "Error:".red().bold(), e);
                std::process::exit(1);
            }
        }

        Commands::Tools { json } => {
            let definitions = tool_definitions();
            if json {
                println!("{}", serde_json::to_string_pretty(&definitions)?);
            } else {
                println!("\n{} Available Tools", "Tools:".cyan().bold());
                println!("{}", "─".repeat(40));
                for def in &definitions {
                    println!("   {:<16} {}", def.name.bold(), def.description);
                }
            }
        }

        Commands::Config { action } => match action {
            ConfigAction::Show { json } => {
                let config = RepairConfig::load(&project_path)?;
                if json {
                    println!("{}", serde_json::to_string_pretty(&config)?);
                } else {
                    println!("{}", config.to_toml_string()?);
                }
            }

            ConfigAction::Validate => {
                let report = ConfigValidator::new(&project_path).validate();
                if cli.verbose {
                    println!("{}", report.verbose_report());
                } else {
                    println!("{}", report.summary());
                }
                if !report.is_valid() {
                    std::process::exit(report.exit_code());
                }
            }

            ConfigAction::Paths => {
                println!("\n{} Configuration Paths", "Config:".cyan().bold());
                println!("{}", "─".repeat(40));
                println!(
                    "   Project: {}",
                    RepairConfig::project_path(&project_path).display()
                );
                match RepairConfig::user_path() {
                    Some(path) => println!("   User: {}", path.display()),
                    None => println!("   User: (no config directory on this platform)"),
                }
            }
        },
    }

    Ok(())
}

/// Bind the session's sandbox: the project directory itself, or a fresh
/// container.
async fn provision(
    project_path: &Path,
    config: &RepairConfig,
    local: bool,
) -> repairkit::Result<Arc<dyn Sandbox>> {
    if local {
        let sandbox = LocalSandbox::new(project_path)?
            .with_timeout(Duration::from_secs(config.sandbox.timeout_secs));
        return Ok(Arc::new(sandbox));
    }

    let spec = SandboxSpec::from_config(&config.sandbox);
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(ProgressStyle::default_spinner());
    spinner.set_message(format!("Starting container {} from {}", spec.name, spec.image));
    spinner.enable_steady_tick(Duration::from_millis(120));

    let result = DockerSandbox::create(&spec).await;
    spinner.finish_and_clear();

    let sandbox = result?;
    println!("{} Container {} ready", "OK".green(), spec.name);
    Ok(Arc::new(sandbox))
}

/// Execute every call in `script`, printing each result.
async fn run_script(
    editor: &mut Editor,
    script: &str,
    patch: bool,
    log: &mut Transcript,
) -> anyhow::Result<()> {
    editor.prepare().await?;

    let calls = script
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty() && !l.starts_with('#'));

    let mut mutations = 0_usize;
    for (index, line) in calls.enumerate() {
        let (tool, call, output, is_error) = match ToolCall::parse(line) {
            Ok(call) => {
                let tool = call.name().to_string();
                let result = try_dispatch(editor, &call).await;
                match result {
                    Ok(output) => (tool, Some(call), output, false),
                    Err(e) if e.is_fatal() => return Err(e.into()),
                    Err(e) => (tool, Some(call), format!("Error: {e}"), true),
                }
            }
            Err(e) => ("invalid".to_string(), None, format!("Error: {e}"), true),
        };

        let mutating = call.as_ref().is_some_and(ToolCall::is_mutating);
        if mutating && !is_error {
            mutations += 1;
        }

        let header = format!("[{}] {}", index + 1, tool);
        if is_error {
            println!("{}", header.red().bold());
        } else {
            println!("{}", header.cyan().bold());
        }
        println!("{}", output.trim_end());

        log.entries.push(TranscriptEntry {
            index: index + 1,
            tool,
            call,
            mutating,
            output,
            is_error,
            at: Utc::now(),
        });
    }

    tracing::info!(mutations, "Script finished");

    if patch {
        let diff = editor.final_patch().await?;
        println!("\n{}", "Patch:".cyan().bold());
        println!("{}", diff.trim_end());
        log.patch = Some(diff);
    }

    Ok(())
}
