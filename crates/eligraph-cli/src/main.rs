//! Eligraph CLI
//!
//! Command-line front end for the eligibility rule graph:
//! - `populate`: load a categorized rule set (JSON) into the store
//! - `query`: list the rules a student's facts satisfy
//! - `ask`: query, then hand the results to the education consultant model
//! - `clear` / `stats`: maintenance

use anyhow::{anyhow, Context, Result};
use clap::{Args, Parser, Subcommand};
use colored::Colorize;
use eligraph_advisor::llm::providers::{LLMConfig, OpenAIClient};
use eligraph_advisor::{
    populate_rules_with, EligibilityEvaluator, LlmConsultant, PopulateOptions,
};
use eligraph_rules::{Facts, RuleSet, Scalar};
use eligraph_storage::{RuleGraphStore, StoreConfig};
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

/// Snapshot used when neither `--store` nor `ELIGRAPH_STORE` is given.
const DEFAULT_STORE_FILE: &str = "eligraph.elpd";

#[derive(Parser)]
#[command(name = "eligraph")]
#[command(author, version, about = "Eligraph: student eligibility rules as a graph")]
struct Cli {
    #[command(flatten)]
    store: StoreArgs,
    #[command(subcommand)]
    command: Commands,
}

#[derive(Args)]
struct StoreArgs {
    /// Snapshot file of the rule graph (overrides ELIGRAPH_STORE)
    #[arg(long, global = true)]
    store: Option<PathBuf>,
    /// Session lock timeout in milliseconds (overrides ELIGRAPH_LOCK_TIMEOUT_MS)
    #[arg(long, global = true)]
    lock_timeout_ms: Option<u64>,
}

#[derive(Args)]
struct FactArgs {
    /// JSON object of student facts, e.g. `{"stream": "science", "aggregate_percentage": 82}`
    #[arg(long)]
    facts: Option<PathBuf>,
    /// A single fact as `name=value` (repeatable; overrides `--facts`)
    #[arg(long = "fact", value_name = "NAME=VALUE")]
    fact: Vec<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Load a rule set (`{"category": [rule, ...]}`) into the store.
    Populate {
        /// Rule set JSON file
        rules: PathBuf,
        /// Delete everything in the store first
        #[arg(long)]
        clear: bool,
        /// Print the population summary as JSON
        #[arg(long)]
        json: bool,
    },

    /// List the rules satisfied by a student's facts.
    Query {
        #[command(flatten)]
        facts: FactArgs,
        /// Print matches as JSON
        #[arg(long)]
        json: bool,
    },

    /// Ask the education consultant, informed by the student's eligibility.
    Ask {
        /// The student's question
        question: String,
        #[command(flatten)]
        facts: FactArgs,
    },

    /// Delete every rule, condition, fact and conclusion.
    Clear,

    /// Node and edge counts of the rule graph.
    Stats {
        /// Print as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let store = RuleGraphStore::open(store_config(&cli.store))
        .context("failed to open the rule graph store")?;

    let result = match cli.command {
        Commands::Populate { rules, clear, json } => cmd_populate(&store, &rules, clear, json),
        Commands::Query { facts, json } => cmd_query(&store, &facts, json),
        Commands::Ask { question, facts } => cmd_ask(&store, &question, &facts).await,
        Commands::Clear => cmd_clear(&store),
        Commands::Stats { json } => cmd_stats(&store, json),
    };

    store.close();
    result
}

fn store_config(args: &StoreArgs) -> StoreConfig {
    let mut config = StoreConfig::from_env();
    if let Some(path) = &args.store {
        config.path = Some(path.clone());
    }
    if config.path.is_none() {
        config.path = Some(PathBuf::from(DEFAULT_STORE_FILE));
    }
    if let Some(ms) = args.lock_timeout_ms {
        config.lock_timeout = Duration::from_millis(ms);
    }
    config
}

/// Parse `name=value`; the value is read as a JSON scalar when possible, else text.
fn parse_fact_assignment(raw: &str) -> Result<(String, Scalar)> {
    let (name, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected NAME=VALUE, got `{raw}`"))?;
    let name = name.trim();
    if name.is_empty() {
        return Err(anyhow!("empty fact name in `{raw}`"));
    }
    Ok((name.to_string(), Scalar::parse_loose(value)))
}

fn load_facts(args: &FactArgs) -> Result<Facts> {
    let mut facts = match &args.facts {
        Some(path) => {
            let text = fs::read_to_string(path)
                .with_context(|| format!("failed to read facts from {}", path.display()))?;
            serde_json::from_str::<Facts>(&text).with_context(|| {
                format!("{} is not a JSON object of scalar facts", path.display())
            })?
        }
        None => Facts::new(),
    };
    for raw in &args.fact {
        let (name, value) = parse_fact_assignment(raw)?;
        facts.insert(name, value);
    }
    Ok(facts)
}

fn cmd_populate(store: &RuleGraphStore, rules: &Path, clear: bool, json: bool) -> Result<()> {
    let set = RuleSet::load(rules)?;
    eprintln!(
        "{} {} rules from {}",
        "Populating".green().bold(),
        set.len(),
        rules.display()
    );

    let summary = populate_rules_with(store, &set, PopulateOptions { clear_first: clear })?;

    if json {
        println!("{}", serde_json::to_string_pretty(&summary)?);
        return Ok(());
    }
    if let Some(cleared) = summary.cleared {
        println!("  Cleared: {cleared} elements");
    }
    println!("  Stored: {}", summary.succeeded.to_string().green());
    if summary.is_partial() {
        println!("  Failed: {}", summary.failed.len().to_string().red());
        for failure in &summary.failed {
            println!("    {} {}", failure.rule_id.yellow(), failure.cause);
        }
    }
    Ok(())
}

fn cmd_query(store: &RuleGraphStore, args: &FactArgs, json: bool) -> Result<()> {
    let facts = load_facts(args)?;
    let matches = EligibilityEvaluator::new(store.clone()).evaluate(&facts)?;

    if json {
        println!("{}", serde_json::to_string_pretty(&matches)?);
        return Ok(());
    }
    if matches.is_empty() {
        println!("{}", "No matching rules.".yellow());
        return Ok(());
    }
    for m in &matches {
        println!(
            "{} {} ({})",
            m.conclusion.green().bold(),
            m.rule_id.cyan(),
            m.description
        );
    }
    Ok(())
}

async fn cmd_ask(store: &RuleGraphStore, question: &str, args: &FactArgs) -> Result<()> {
    let facts = load_facts(args)?;
    let eligibility = EligibilityEvaluator::new(store.clone()).evaluate_or_empty(&facts);
    for m in &eligibility {
        eprintln!("{} {}", "eligible:".green().bold(), m.conclusion);
    }

    let config = LLMConfig::from_env().context("the consultant needs an LLM provider")?;
    let client = OpenAIClient::new(config)?;
    let consultant = LlmConsultant::new(Arc::new(client));

    println!("{}", consultant.advise(question, &eligibility).await);
    Ok(())
}

fn cmd_clear(store: &RuleGraphStore) -> Result<()> {
    let deleted = store.clear_all()?;
    println!("{} {deleted} elements", "Deleted".green().bold());
    Ok(())
}

fn cmd_stats(store: &RuleGraphStore, json: bool) -> Result<()> {
    let stats = store.stats()?;
    if json {
        println!("{}", serde_json::to_string_pretty(&stats)?);
        return Ok(());
    }

    println!("  Nodes: {}", stats.nodes);
    for (label, count) in &stats.nodes_by_label {
        println!("    {}: {count}", label.cyan());
    }
    println!("  Edges: {}", stats.edges);
    for (edge_type, count) in &stats.edges_by_type {
        println!("    {}: {count}", edge_type.cyan());
    }
    println!("  Rules: {}", store.rule_ids()?.join(", "));
    Ok(())
}
