use clap::{Parser, Subcommand};
use colored::Colorize;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::time::Duration;
use tabled::{Table, settings::Style};
use tracing::info;
use tracing_subscriber::EnvFilter;

use brokerguard::{AuditConfig, BrokerGuardError, CheckOutcome, ConfigLoader, IntegrityAuditResult, IntegrityAuditor, Record};
use brokerguard::{ShipmentEvaluator, ShipmentInput, ShipmentVerdict, RiskLevel, compute_hash};
use brokerguard::integrity::{file_source, read_candidates, CheckTableRow};
use brokerguard::solidary::FindingTableRow;

#[derive(Parser)]
#[command(name = "brokerguard")]
#[command(about = "Customs shipment risk scoring and record integrity auditing")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a configuration file and its rule table
    Validate {
        #[arg(short, long, env = "BROKERGUARD_CONFIG", default_value = "./brokerguard.yaml")]
        config: PathBuf,

        /// Directory of additional rule files (*.yaml)
        #[arg(short, long)]
        rules: Option<PathBuf>,
    },

    /// Print the content digest of every record in a JSON file
    Hash {
        /// JSON array of records
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },

    /// Verify stored digests of the records in a JSON file
    Audit {
        /// JSON array of records with their stored hash
        #[arg(short, long)]
        input: PathBuf,

        /// Re-run the audit on a schedule until interrupted
        #[arg(long)]
        watch: bool,

        #[arg(long, default_value = "60", requires = "watch")]
        interval_secs: u64,

        #[arg(long)]
        json: bool,
    },

    /// Score shipments and run the solidary-responsibility rules
    Evaluate {
        #[arg(short, long, env = "BROKERGUARD_CONFIG", default_value = "./brokerguard.yaml")]
        config: PathBuf,

        #[arg(short, long)]
        rules: Option<PathBuf>,

        /// JSON array of shipment/declaration pairs
        #[arg(short, long)]
        input: PathBuf,

        #[arg(long)]
        json: bool,
    },
}

/// Non-error outcome of a command; `Flagged` maps to exit status 2.
enum Outcome {
    Clean,
    Flagged,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    let filter = if cli.verbose {
        EnvFilter::new("brokerguard=debug,info")
    } else {
        EnvFilter::new("brokerguard=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    match run(cli).await {
        Ok(Outcome::Clean) => ExitCode::SUCCESS,
        Ok(Outcome::Flagged) => ExitCode::from(2),
        Err(e) => {
            eprintln!("{} {}", "✗ Error:".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> Result<Outcome, Box<dyn std::error::Error>> {
    match cli.command {
        Commands::Validate { config, rules } => cmd_validate(&config, rules.as_deref()),
        Commands::Hash { input, json } => cmd_hash(&input, json),
        Commands::Audit { input, watch, interval_secs, json } => {
            if watch {
                cmd_watch(input, Duration::from_secs(interval_secs)).await
            } else {
                cmd_audit(&input, json)
            }
        }
        Commands::Evaluate { config, rules, input, json } => {
            cmd_evaluate(&config, rules.as_deref(), &input, json)
        }
    }
}

fn load_config(path: &Path, rules: Option<&Path>) -> Result<AuditConfig, Box<dyn std::error::Error>> {
    let config = match rules {
        Some(dir) => ConfigLoader::load_with_rules(path, dir)?,
        None => ConfigLoader::load(path)?,
    };
    Ok(config)
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> brokerguard::Result<T> {
    let content = fs::read_to_string(path)
        .map_err(|e| BrokerGuardError::Input(format!("cannot read {}: {}", path.display(), e)))?;
    Ok(serde_json::from_str(&content)?)
}

fn cmd_validate(path: &Path, rules: Option<&Path>) -> Result<Outcome, Box<dyn std::error::Error>> {
    let config = load_config(path, rules)?;

    println!("{} {}", "✓".green(), path.display());
    println!("  weights: associates {:.2}, cargo {:.2}, route {:.2}, merchandise {:.2}",
        config.weights.weight(brokerguard::Pillar::Associates),
        config.weights.weight(brokerguard::Pillar::Cargo),
        config.weights.weight(brokerguard::Pillar::Route),
        config.weights.weight(brokerguard::Pillar::Merchandise),
    );
    let bands: Vec<String> = config
        .thresholds
        .bands()
        .iter()
        .map(|b| format!("{}≥{}", b.level, b.from))
        .collect();
    println!("  thresholds: {}", bands.join(", "));
    println!("  high-risk zones: {}", config.high_risk_zones.len());
    println!("  rules: {}", config.rules.len());
    for rule in &config.rules {
        println!("    {} [{}] {} ({})", rule.id, rule.severity, rule.check.kind(), rule.citation);
    }

    Ok(Outcome::Clean)
}

#[derive(Serialize)]
struct HashLine {
    table: String,
    record_id: String,
    hash: String,
}

#[derive(tabled::Tabled)]
struct HashRow {
    #[tabled(rename = "Record")]
    record: String,
    #[tabled(rename = "SHA-256")]
    hash: String,
}

fn cmd_hash(input: &Path, json: bool) -> Result<Outcome, Box<dyn std::error::Error>> {
    let records: Vec<Record> = read_json(input)?;

    let mut lines = Vec::with_capacity(records.len());
    for record in &records {
        let digest = compute_hash(&record.fields)
            .map_err(|e| format!("{}: {}", record.key(), e))?;
        lines.push(HashLine {
            table: record.table.clone(),
            record_id: record.record_id.clone(),
            hash: digest.to_string(),
        });
    }

    if json {
        println!("{}", serde_json::to_string_pretty(&lines)?);
    } else {
        let rows: Vec<HashRow> = lines
            .into_iter()
            .map(|l| HashRow { record: format!("{}/{}", l.table, l.record_id), hash: l.hash })
            .collect();
        let mut table = Table::new(rows);
        table.with(Style::markdown());
        println!("{}", table);
    }

    Ok(Outcome::Clean)
}

fn cmd_audit(input: &Path, json: bool) -> Result<Outcome, Box<dyn std::error::Error>> {
    let candidates = read_candidates(input)?;
    let auditor = IntegrityAuditor::new();
    let result = auditor.run_audit(candidates);

    if json {
        println!("{}", serde_json::to_string_pretty(result.as_ref())?);
    } else {
        print_audit(&result);
    }

    Ok(if result.is_degraded() { Outcome::Flagged } else { Outcome::Clean })
}

async fn cmd_watch(input: PathBuf, interval: Duration) -> Result<Outcome, Box<dyn std::error::Error>> {
    let auditor = IntegrityAuditor::new();
    let _subscription = auditor.on_audit(print_audit);

    auditor.start_recurring(interval, file_source(input.clone()))?;

    info!("Watching {} every {}s, press Ctrl-C to stop", input.display(), interval.as_secs());
    tokio::signal::ctrl_c().await?;
    auditor.shutdown();

    let degraded = auditor.last_result().is_some_and(|r| r.is_degraded());
    Ok(if degraded { Outcome::Flagged } else { Outcome::Clean })
}

fn print_audit(result: &IntegrityAuditResult) {
    println!("\nIntegrity Audit {}\n", result.run_id);

    if !result.checks.is_empty() {
        let rows: Vec<CheckTableRow> = result.checks.iter().map(CheckTableRow::from).collect();
        let mut table = Table::new(rows);
        table.with(Style::markdown());
        println!("{}", table);
    }

    let index = format!("{}", result.resilience_index);
    let index = if result.is_degraded() { index.red().bold() } else { index.green().bold() };
    let summary = result.summary();
    println!("\nSummary:");
    for outcome in [CheckOutcome::Valid, CheckOutcome::Unverified, CheckOutcome::Tampered, CheckOutcome::Error] {
        let count = summary.get(&outcome).copied().unwrap_or(0);
        println!("  {} {} {}", outcome.symbol(), count, outcome.as_str());
    }
    println!("  resilience index: {}", index);
}

fn cmd_evaluate(
    config_path: &Path,
    rules: Option<&Path>,
    input: &Path,
    json: bool,
) -> Result<Outcome, Box<dyn std::error::Error>> {
    let config = load_config(config_path, rules)?;
    let evaluator = ShipmentEvaluator::new(&config)?;
    let inputs: Vec<ShipmentInput> = read_json(input)?;

    info!("Evaluating {} shipments", inputs.len());
    let verdicts = evaluator.evaluate_batch(&inputs)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&verdicts)?);
    } else {
        for verdict in &verdicts {
            print_verdict(verdict);
        }
    }

    let flagged = verdicts.iter().any(|v| v.is_critical() || v.tampered());
    Ok(if flagged { Outcome::Flagged } else { Outcome::Clean })
}

fn print_verdict(verdict: &ShipmentVerdict) {
    let level = verdict.level.as_str().to_uppercase();
    let level = match verdict.level {
        RiskLevel::Low => level.green(),
        RiskLevel::Medium => level.yellow(),
        RiskLevel::High => level.red(),
        RiskLevel::Critical => level.red().bold(),
    };

    println!("\n{}  {}  score {:.2}", verdict.shipment_id.bold(), level, verdict.risk.composite_score);
    if verdict.overridden {
        println!("  raised from {} by a critical finding", verdict.risk.level);
    }
    for score in &verdict.risk.pillar_scores {
        let factors: Vec<&str> = score
            .contributing_factors
            .iter()
            .filter(|f| f.weight > 0.0)
            .map(|f| f.factor.as_str())
            .collect();
        if factors.is_empty() {
            println!("  {:<12} {:>6.1}", score.pillar.as_str(), score.raw_score);
        } else {
            println!("  {:<12} {:>6.1}  {}", score.pillar.as_str(), score.raw_score, factors.join(", "));
        }
    }

    if !verdict.findings.is_empty() {
        let rows: Vec<FindingTableRow> = verdict.findings.iter().map(FindingTableRow::from).collect();
        let mut table = Table::new(rows);
        table.with(Style::markdown());
        println!("\n{}", table);
    }
}
