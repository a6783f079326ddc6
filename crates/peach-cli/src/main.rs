//! `peach-cli` – the Peach memory console.
//!
//! This binary wires the whole stack together.  It:
//!
//! 1. Loads `~/.peach/config.toml`, running a **First-Run Wizard** when the
//!    file is absent.
//! 2. Opens the SQLite stores under the data directory and restores the
//!    emotion state.
//! 3. Probes the local Ollama instance and attaches it as the text
//!    generator when the configured model is installed.
//! 4. Starts the background maintenance scheduler and drops the user into
//!    the interactive console.

mod config;
mod ollama;
mod repl;

use std::process::ExitCode;
use std::sync::Arc;

use colored::Colorize;
use peach_emotion::EmotionState;
use peach_memory::{Embedder, HashingEmbedder, MemoryOrchestrator, SemanticIndex, Storage, TextGenerator};
use peach_runtime::scheduler::DEFAULT_REHEARSAL_EVERY;
use peach_runtime::{MaintenanceScheduler, OllamaEmbedder, OllamaGenerator, init_tracing};
use peach_types::{Clock, PeachError, SystemClock};
use rand::SeedableRng;
use rand::rngs::StdRng;
use tracing::{error, info, warn};

use crate::config::Config;

fn main() -> ExitCode {
    // Logs go to stderr; set PEACH_LOG_FORMAT=json for log aggregators.
    let _guard = init_tracing("peach");

    print_banner();

    let cfg = match config::load() {
        Ok(Some(cfg)) => {
            println!(
                "  Config loaded from {}",
                config::config_path().display().to_string().bold()
            );
            cfg
        }
        Ok(None) => run_first_run_wizard(),
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::from_env()
        }
    };

    match run(&cfg) {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!(error = %e, "peach stopped");
            eprintln!("{}: {}", "Fatal".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &Config) -> Result<(), PeachError> {
    std::fs::create_dir_all(&cfg.data_dir)?;

    let storage = Storage::open(cfg.storage_path()).map_err(|e| PeachError::Storage(e.to_string()))?;
    let storage = Arc::new(storage);

    let embedder: Arc<dyn Embedder> = if cfg.embedding_model.is_empty() {
        Arc::new(HashingEmbedder::default())
    } else {
        let remote = OllamaEmbedder::new(&cfg.ollama_url, &cfg.embedding_model, cfg.request_timeout())
            .map_err(|e| PeachError::Config(e.to_string()))?;
        Arc::new(remote)
    };
    let semantic = SemanticIndex::open(cfg.semantic_path(), embedder)
        .map_err(|e| PeachError::Storage(e.to_string()))?
        .with_failure_log(cfg.failure_log_path());

    let clock: Arc<dyn Clock> = Arc::new(SystemClock);
    let emotion = EmotionState::new(clock.clone(), Box::new(StdRng::from_entropy()))
        .with_journal(storage.clone());

    let mut memory =
        MemoryOrchestrator::new(cfg.memory.clone(), storage, Arc::new(semantic), emotion, clock);
    if let Some(generator) = discover_generator(cfg) {
        memory = memory.with_collaborator(generator);
    }

    let runtime = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()?;
    let scheduler = {
        let _enter = runtime.enter();
        MaintenanceScheduler::spawn(
            memory.maintenance(),
            cfg.maintenance_interval(),
            DEFAULT_REHEARSAL_EVERY,
        )
    };

    println!();
    println!("  Type {} for a list of commands.\n", "/help".bold().cyan());
    let result = repl::run(&mut memory);

    let totals = runtime.block_on(scheduler.shutdown());
    info!(passes = totals.passes, evicted = totals.evicted, "session closed");
    result
}

/// Attach Ollama when it is reachable and the configured model is installed.
fn discover_generator(cfg: &Config) -> Option<Arc<dyn TextGenerator>> {
    use std::io::Write;
    print!("\n  Probing Ollama at {} … ", cfg.ollama_url.dimmed());
    std::io::stdout().flush().ok();
    let models = match ollama::fetch_models(&cfg.ollama_url, cfg.request_timeout()) {
        Ok(models) => models,
        Err(e) => {
            println!("{}", "offline".yellow());
            println!(
                "  {}  Run `{}` for tag enrichment and narrated reflections.",
                "No Ollama instance detected.".dimmed(),
                "ollama serve".bold()
            );
            info!(error = %e, "running without a text generator");
            return None;
        }
    };

    println!("{} ({} model(s) available)", "online".green(), models.len());
    if !ollama::has_model(&models, &cfg.active_model) {
        println!(
            "  Model {} is not installed.  Try: ollama pull {}",
            cfg.active_model.yellow(),
            cfg.active_model
        );
        return None;
    }

    match OllamaGenerator::new(&cfg.ollama_url, &cfg.active_model, cfg.request_timeout()) {
        Ok(generator) => {
            println!("  Using {} for reflections.", cfg.active_model.bold());
            Some(Arc::new(generator))
        }
        Err(e) => {
            warn!(error = %e, "failed to build the generator client");
            None
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// First-Run Wizard
// ─────────────────────────────────────────────────────────────────────────────

fn run_first_run_wizard() -> Config {
    println!();
    println!("{}", "  ╔══════════════════════════════════════╗".bold().magenta());
    println!("{}", "  ║        Peach First-Run Wizard        ║".bold().magenta());
    println!("{}", "  ╚══════════════════════════════════════╝".bold().magenta());
    println!();
    println!("  No configuration found.  Let's set up Peach.\n");

    let mut cfg = config::from_env();

    cfg.ollama_url = prompt_line(&format!("  Ollama URL [{}]: ", cfg.ollama_url), &cfg.ollama_url);
    cfg.active_model = prompt_line(&format!("  Model [{}]: ", cfg.active_model), &cfg.active_model);
    let embedding = prompt_line("  Embedding model (blank for built-in) []: ", "");
    cfg.embedding_model = embedding;

    match config::save(&cfg) {
        Ok(()) => println!(
            "\n  {} Config saved to {}\n",
            "✓".green().bold(),
            config::config_path().display().to_string().bold()
        ),
        Err(e) => println!("{}: {}", "Error saving config".red(), e),
    }
    cfg
}

// ─────────────────────────────────────────────────────────────────────────────
// Banner
// ─────────────────────────────────────────────────────────────────────────────

fn print_banner() {
    println!();
    println!("{}", r#"    ____                  __  "#.bold().magenta());
    println!("{}", r#"   / __ \___  ____ ______/ /_ "#.bold().magenta());
    println!("{}", r#"  / /_/ / _ \/ __ `/ ___/ __ \"#.bold().magenta());
    println!("{}", r#" / ____/  __/ /_/ / /__/ / / /"#.bold().magenta());
    println!("{}", r#"/_/    \___/\__,_/\___/_/ /_/ "#.bold().magenta());
    println!();
    println!(
        "  {} {}",
        "Peach".bold(),
        format!("v{}", env!("CARGO_PKG_VERSION")).dimmed()
    );
    println!("  Memory and emotion companion");
    println!();
}

// ─────────────────────────────────────────────────────────────────────────────
// Helpers
// ─────────────────────────────────────────────────────────────────────────────

fn prompt_line(msg: &str, default: &str) -> String {
    use std::io::{BufRead, Write};
    print!("{}", msg);
    std::io::stdout().flush().ok();
    let mut line = String::new();
    match std::io::stdin().lock().read_line(&mut line) {
        Ok(_) => {
            let t = line.trim().to_string();
            if t.is_empty() { default.to_string() } else { t }
        }
        Err(_) => default.to_string(),
    }
}
