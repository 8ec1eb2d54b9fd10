//! Agent Arena CLI
//!
//! The `arena` command runs matches and tournaments and checks their
//! artifacts after the fact.
//!
//! ## Commands
//!
//! - `match`: run one match into an artifact directory
//! - `tournament`: run a tournament into a signed bundle
//! - `classify`: failure-mode profile of an event log
//! - `replay`: re-derive state from an event log and check it
//! - `verify`: re-hash and re-check every receipt in a bundle
//! - `verify-receipt`: check a single receipt
//! - `keygen`: create a receipt signing key

use std::path::{Path, PathBuf};
use std::process::ExitCode;

use anyhow::{bail, Context, Result};
use arena_attest::{
    verify_bundle, verify_receipt, verify_receipt_with_key, BundleReport, Receipt, ReceiptSigner,
};
use arena_core::metrics::METRICS;
use arena_core::obs::{emit_bundle_verified, MatchSpan};
use arena_core::{
    classify, is_safe_id, read_event_log, replay_spec, run_match_to_dir, run_tournament,
    AgentSpec, ClassifierThresholds, MatchConfig, MatchProjection, ScenarioSpec,
    TournamentConfig,
};
use clap::{Parser, Subcommand};
use serde::Deserialize;
use tracing::{info, warn, Level};

#[derive(Parser)]
#[command(name = "arena")]
#[command(author = "Stevedores Org")]
#[command(version = env!("CARGO_PKG_VERSION"))]
#[command(about = "Deterministic evaluation harness for scripted and model-backed agents")]
#[command(long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Emit JSON-formatted log lines
    #[arg(long, global = true)]
    json: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one match and write its artifact directory
    Match {
        /// Match config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Parent directory for the match directory
        #[arg(short, long, default_value = "runs")]
        out: PathBuf,

        /// Signing key file; the summary is left unsigned without one
        #[arg(long, env = "ARENA_SIGNING_KEY")]
        key: Option<PathBuf>,
    },

    /// Run a tournament and write a signed bundle
    Tournament {
        /// Tournament config file (JSON)
        #[arg(short, long)]
        config: PathBuf,

        /// Bundle directory
        #[arg(short, long)]
        out: PathBuf,

        /// Signing key file; an ephemeral key is generated without one
        #[arg(long, env = "ARENA_SIGNING_KEY")]
        key: Option<PathBuf>,
    },

    /// Print the failure-mode profile of an event log
    Classify {
        /// events.jsonl to classify
        #[arg(short, long)]
        log: PathBuf,

        /// Scenario config file, or a bare kind such as `nim`
        #[arg(short, long)]
        scenario: String,

        /// Turn budget to judge stalls against (default: from the log)
        #[arg(long)]
        max_turns: Option<u32>,

        /// Classifier thresholds file (JSON)
        #[arg(long)]
        thresholds: Option<PathBuf>,
    },

    /// Replay an event log through its scenario and check every snapshot
    Replay {
        /// events.jsonl to replay
        #[arg(short, long)]
        log: PathBuf,

        /// Scenario config file, or a bare kind such as `nim`
        #[arg(short, long)]
        scenario: String,
    },

    /// Verify every hash and receipt in a bundle
    Verify {
        /// Bundle or match directory
        #[arg(short, long)]
        bundle: PathBuf,
    },

    /// Verify a single receipt file
    VerifyReceipt {
        /// Receipt JSON file
        #[arg(short, long)]
        receipt: PathBuf,

        /// Require this signer (hex public key or a file containing it)
        #[arg(long)]
        public_key: Option<String>,
    },

    /// Generate a receipt signing key
    Keygen {
        /// Where to write the secret key
        #[arg(short, long)]
        out: PathBuf,

        /// Overwrite an existing key file
        #[arg(long)]
        force: bool,
    },
}

/// `arena match` config: scenario, roster and match settings in one file.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MatchFile {
    scenario: ScenarioSpec,
    agents: Vec<AgentSpec>,
    #[serde(flatten)]
    config: MatchConfig,
    #[serde(default)]
    classifier: ClassifierThresholds,
}

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    arena_core::telemetry::init_tracing(cli.json, level);

    let ok = match cli.command {
        Commands::Match { config, out, key } => cmd_match(&config, &out, key.as_deref()).await?,
        Commands::Tournament { config, out, key } => {
            cmd_tournament(&config, &out, key.as_deref()).await?
        }
        Commands::Classify {
            log,
            scenario,
            max_turns,
            thresholds,
        } => cmd_classify(&log, &scenario, max_turns, thresholds.as_deref())?,
        Commands::Replay { log, scenario } => cmd_replay(&log, &scenario)?,
        Commands::Verify { bundle } => cmd_verify(&bundle)?,
        Commands::VerifyReceipt {
            receipt,
            public_key,
        } => cmd_verify_receipt(&receipt, public_key.as_deref())?,
        Commands::Keygen { out, force } => cmd_keygen(&out, force)?,
    };

    METRICS.flush();
    Ok(if ok {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    })
}

fn read_json_file<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read {}", path.display()))?;
    serde_json::from_str(&content).with_context(|| format!("Failed to parse {}", path.display()))
}

/// A scenario argument is a config file when one exists at that path,
/// otherwise a bare kind with default settings.
fn load_scenario(arg: &str) -> Result<ScenarioSpec> {
    let path = Path::new(arg);
    let spec = if path.is_file() {
        read_json_file::<ScenarioSpec>(path)?
    } else {
        ScenarioSpec::from_kind(arg)?
    };
    spec.validate()?;
    Ok(spec)
}

fn load_signer(key: Option<&Path>) -> Result<Option<ReceiptSigner>> {
    key.map(|path| {
        ReceiptSigner::load(path)
            .with_context(|| format!("Failed to load signing key {}", path.display()))
    })
    .transpose()
}

/// Accepts the hex key itself or a file holding it (e.g. `signer.pub`).
fn resolve_public_key(arg: &str) -> Result<String> {
    let path = Path::new(arg);
    if path.is_file() {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read {}", path.display()))?;
        Ok(text.trim().to_string())
    } else {
        Ok(arg.trim().to_string())
    }
}

fn print_report(report: &BundleReport) {
    for issue in report.errors.iter().chain(&report.warnings) {
        println!("{issue}");
    }
    println!(
        "{} files, {} receipts checked: {} error(s), {} warning(s)",
        report.files_checked,
        report.receipts_checked,
        report.errors.len(),
        report.warnings.len()
    );
}

async fn cmd_match(config: &Path, out: &Path, key: Option<&Path>) -> Result<bool> {
    let file: MatchFile = read_json_file(config)?;
    if !is_safe_id(&file.config.match_id) {
        bail!(
            "matchId {:?} must be non-empty [A-Za-z0-9_-]",
            file.config.match_id
        );
    }
    let signer = load_signer(key)?;

    let summary = run_match_to_dir(
        &file.scenario,
        &file.agents,
        &file.config,
        out,
        signer.as_ref(),
        &file.classifier,
    )
    .await
    .with_context(|| format!("Match {} failed", file.config.match_id))?;

    println!("{}", serde_json::to_string_pretty(&summary)?);
    info!(
        match_id = %summary.match_id,
        dir = %out.join(&summary.match_id).display(),
        "match written"
    );
    Ok(true)
}

async fn cmd_tournament(config: &Path, out: &Path, key: Option<&Path>) -> Result<bool> {
    let config = TournamentConfig::load(config)?;
    let signer = match load_signer(key)? {
        Some(signer) => signer,
        None => {
            let signer = ReceiptSigner::generate();
            warn!(key_id = %signer.key_id(), "no signing key given, using an ephemeral key");
            signer
        }
    };

    let outcome = run_tournament(&config, out, &signer)
        .await
        .with_context(|| format!("Tournament {} failed", config.name))?;

    println!(
        "{:<4} {:<24} {:>3} {:>3} {:>3} {:>3} {:>4} {:>10}",
        "#", "agent", "P", "W", "D", "L", "Pts", "Diff"
    );
    for (rank, row) in outcome.standings.iter().enumerate() {
        println!(
            "{:<4} {:<24} {:>3} {:>3} {:>3} {:>3} {:>4} {:>10.2}",
            rank + 1,
            row.agent_id,
            row.played,
            row.wins,
            row.draws,
            row.losses,
            row.points,
            row.score_diff
        );
    }
    println!(
        "{} matches, {} setup failure(s), bundle at {}",
        outcome.summaries.len(),
        outcome.setup_failures(),
        out.display()
    );
    Ok(true)
}

fn cmd_classify(
    log: &Path,
    scenario: &str,
    max_turns: Option<u32>,
    thresholds: Option<&Path>,
) -> Result<bool> {
    let spec = load_scenario(scenario)?;
    let events = read_event_log(log).with_context(|| format!("Failed to read {}", log.display()))?;
    let projection = MatchProjection::from_events(&events);
    let _span = MatchSpan::enter(&projection.match_id);

    let thresholds = match thresholds {
        Some(path) => read_json_file(path)?,
        None => ClassifierThresholds::default(),
    };
    let profile = classify(
        &events,
        &spec.hints(),
        &projection.agent_ids,
        max_turns,
        &thresholds,
    );
    println!("{}", serde_json::to_string_pretty(&profile)?);
    Ok(true)
}

fn cmd_replay(log: &Path, scenario: &str) -> Result<bool> {
    let spec = load_scenario(scenario)?;
    let events = read_event_log(log).with_context(|| format!("Failed to read {}", log.display()))?;
    let projection = MatchProjection::from_events(&events);
    let _span = MatchSpan::enter(&projection.match_id);

    match replay_spec(&spec, &events) {
        Ok(report) => {
            println!("{}", serde_json::to_string_pretty(&report)?);
            Ok(true)
        }
        Err(e) => {
            println!("replay failed: {e}");
            Ok(false)
        }
    }
}

fn cmd_verify(bundle: &Path) -> Result<bool> {
    if !bundle.is_dir() {
        bail!("{} is not a directory", bundle.display());
    }
    let report = verify_bundle(bundle)?;
    emit_bundle_verified(
        &bundle.display().to_string(),
        report.errors.len(),
        report.warnings.len(),
    );
    print_report(&report);
    Ok(report.is_ok())
}

fn cmd_verify_receipt(path: &Path, public_key: Option<&str>) -> Result<bool> {
    let receipt =
        Receipt::load(path).with_context(|| format!("Failed to read {}", path.display()))?;
    let outcome = match public_key {
        Some(arg) => verify_receipt_with_key(&receipt, &resolve_public_key(arg)?),
        None => verify_receipt(&receipt),
    };
    match outcome {
        Ok(()) => {
            println!(
                "ok: signed by {} at {}",
                receipt.public_key_id.as_deref().unwrap_or(&receipt.public_key),
                receipt.signed_at.to_rfc3339()
            );
            Ok(true)
        }
        Err(e) => {
            println!("invalid: {e}");
            Ok(false)
        }
    }
}

fn cmd_keygen(out: &Path, force: bool) -> Result<bool> {
    if out.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", out.display());
    }
    let signer = ReceiptSigner::generate();
    signer
        .save(out)
        .with_context(|| format!("Failed to write {}", out.display()))?;
    println!("key id:     {}", signer.key_id());
    println!("public key: {}", signer.public_key_hex());
    Ok(true)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_match_file_flattens_match_config() {
        let file: MatchFile = serde_json::from_value(json!({
            "matchId": "demo",
            "seed": 42,
            "scenario": {"kind": "number-guess", "max": 50},
            "agents": [{"id": "solver", "kind": "binary-search"}],
            "gateway": {"actionTimeoutMs": 250}
        }))
        .expect("parse");
        assert_eq!(file.config.match_id, "demo");
        assert_eq!(file.config.seed, 42);
        assert_eq!(file.config.gateway.action_timeout_ms, 250);
        assert_eq!(file.scenario, ScenarioSpec::NumberGuess { min: 1, max: 50 });
        assert_eq!(file.classifier, ClassifierThresholds::default());
    }

    #[test]
    fn test_scenario_arg_accepts_kind_or_file() {
        assert_eq!(load_scenario("nim").expect("kind").id(), "nim");
        assert!(load_scenario("chess").is_err());

        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("rps.json");
        std::fs::write(&path, r#"{"kind":"rock-paper-scissors","rounds":3}"#).expect("write");
        let spec = load_scenario(path.to_str().expect("utf8")).expect("file");
        assert_eq!(spec, ScenarioSpec::RockPaperScissors { rounds: 3 });
    }

    #[test]
    fn test_invalid_scenario_file_is_rejected() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("bad.json");
        std::fs::write(&path, r#"{"kind":"number-guess","min":9,"max":3}"#).expect("write");
        assert!(load_scenario(path.to_str().expect("utf8")).is_err());
    }

    #[tokio::test]
    async fn test_match_rejects_path_like_match_id() {
        let dir = tempfile::tempdir().expect("tempdir");
        let config = dir.path().join("match.json");
        let body = json!({
            "matchId": "../escaped",
            "seed": 1,
            "scenario": {"kind": "nim"},
            "agents": [{"id": "a", "kind": "constant", "action": {"take": 1}}]
        });
        std::fs::write(&config, body.to_string()).expect("write");

        let out = dir.path().join("runs");
        assert!(cmd_match(&config, &out, None).await.is_err());
        assert!(!dir.path().join("escaped").exists());
        assert!(!out.exists());
    }

    #[test]
    fn test_keygen_refuses_to_overwrite() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("arena.key");
        assert!(cmd_keygen(&path, false).expect("first"));
        assert!(cmd_keygen(&path, false).is_err());
        assert!(cmd_keygen(&path, true).expect("forced"));
        ReceiptSigner::load(&path).expect("valid key");
    }

    #[test]
    fn test_verify_receipt_exit_status() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("summary.receipt.json");
        let signer = ReceiptSigner::from_seed(&[5u8; 32]);
        let mut receipt = signer.sign(&json!({"winner": "a"})).expect("sign");
        arena_attest::write_json_atomic(&path, &receipt).expect("write");
        assert!(cmd_verify_receipt(&path, None).expect("verify"));
        let public_hex = signer.public_key_hex();
        assert!(cmd_verify_receipt(&path, Some(public_hex.as_str())).expect("verify"));

        receipt.payload = json!({"winner": "b"});
        arena_attest::write_json_atomic(&path, &receipt).expect("write");
        assert!(!cmd_verify_receipt(&path, None).expect("verify"));
    }
}
