//! Trialgraph CLI: extract clinical-trial dumps and load them into a graph store
//!
//! Settings come from the YAML config, overridden by flags and `TRIALGRAPH_*`
//! environment variables. `--url` selects the HTTP store, otherwise the
//! embedded snapshot is used.

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use comfy_table::{ContentArrangement, Table};
use serde_json::Value;
use std::path::PathBuf;
use tracing::warn;
use trialgraph::backend::{GraphBackend, QueryResult};
use trialgraph::config::{Config, StoreConfig};
use trialgraph::ingest::extract_file;
use trialgraph::load::{initialize_constraints, load_directory, LoadSummary};
use trialgraph::nlq::{describe_schema, run_read_only};
use trialgraph::portfolio::{intervention_portfolio, Portfolio};
use trialgraph::HttpConfig;

#[derive(Parser)]
#[command(name = "trialgraph", version, about = "Clinical-trial knowledge graph builder")]
struct Cli {
    /// YAML configuration file
    #[arg(long, default_value = "trialgraph.yaml", global = true, env = "TRIALGRAPH_CONFIG")]
    config: PathBuf,

    /// Output format
    #[arg(long, default_value = "table", global = true)]
    format: OutputFormat,

    /// Embedded store snapshot file
    #[arg(long, global = true, env = "TRIALGRAPH_SNAPSHOT")]
    snapshot: Option<PathBuf>,

    /// Graph server HTTP URL; selects the HTTP store
    #[arg(long, global = true, env = "TRIALGRAPH_URL")]
    url: Option<String>,

    /// Database name on the graph server
    #[arg(long, global = true, env = "TRIALGRAPH_DATABASE")]
    database: Option<String>,

    /// Graph server user
    #[arg(long, global = true, env = "TRIALGRAPH_USER")]
    user: Option<String>,

    /// Graph server password
    #[arg(long, global = true, env = "TRIALGRAPH_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, clap::ValueEnum)]
enum OutputFormat {
    Table,
    Json,
    Csv,
}

#[derive(Subcommand)]
enum Commands {
    /// Split a registry dump into per-kind JSON Lines files
    Extract {
        /// JSONL or JSON array dump, optionally gzip compressed
        #[arg(long)]
        input: PathBuf,

        /// Output directory (default from config)
        #[arg(long)]
        out_dir: Option<PathBuf>,
    },
    /// Declare the uniqueness constraints
    Constraints,
    /// Load extracted files into the graph store
    Load {
        /// Directory holding the extracted files (default from config)
        #[arg(long)]
        data_dir: Option<PathBuf>,

        #[arg(long)]
        batch_size: Option<usize>,

        /// Batches of one kind in flight at once
        #[arg(long)]
        concurrency: Option<usize>,

        /// Do not declare constraints before loading
        #[arg(long)]
        skip_constraints: bool,
    },
    /// Trials using an intervention
    Portfolio {
        /// Intervention name, e.g. "Drug: Metformin"
        name: String,

        /// Also print aggregate metrics
        #[arg(long)]
        metrics: bool,
    },
    /// Describe the live graph schema
    Schema,
    /// Run a generated read-only Cypher query
    Query {
        /// Query text; fenced blocks are unwrapped
        text: String,
    },
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt::init();
    let cli = Cli::parse();

    if let Err(e) = run(cli).await {
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let config = Config::load(&cli.config)?;
    let format = &cli.format;

    match &cli.command {
        Commands::Extract { input, out_dir } => {
            let out_dir = out_dir.clone().unwrap_or_else(|| config.extract.output_dir.clone());
            run_extract(input.clone(), out_dir, &config, format).await
        }
        Commands::Constraints => {
            let backend = open_backend(&cli, &config).await?;
            let summary = initialize_constraints(backend.as_ref()).await?;
            backend.persist().await?;
            println!("{} constraint(s) created, {} already present", summary.created, summary.existing);
            Ok(())
        }
        Commands::Load {
            data_dir,
            batch_size,
            concurrency,
            skip_constraints,
        } => {
            let mut options = config.load.options();
            if let Some(size) = batch_size {
                options.batch_size = (*size).max(1);
            }
            if let Some(concurrency) = concurrency {
                options.concurrency = (*concurrency).max(1);
            }
            let data_dir = data_dir.clone().unwrap_or_else(|| config.extract.output_dir.clone());

            let backend = open_backend(&cli, &config).await?;
            if *skip_constraints {
                warn!(
                    "Loading without constraints: the {} store has no key index, every merge scans its label",
                    backend.name()
                );
            } else {
                initialize_constraints(backend.as_ref()).await?;
            }
            let summary = load_directory(backend.as_ref(), &data_dir, &options).await?;
            print_load_summary(&summary, format)?;
            if summary.batches_failed() > 0 {
                bail!("{} batch(es) failed; rerunning load is safe", summary.batches_failed());
            }
            Ok(())
        }
        Commands::Portfolio { name, metrics } => {
            let backend = open_backend(&cli, &config).await?;
            let portfolio = intervention_portfolio(backend.as_ref(), name).await?;
            print_portfolio(&portfolio, *metrics, format)
        }
        Commands::Schema => {
            let backend = open_backend(&cli, &config).await?;
            println!("{}", describe_schema(backend.schema().await));
            Ok(())
        }
        Commands::Query { text } => {
            let backend = open_backend(&cli, &config).await?;
            let result = run_read_only(backend.as_ref(), text).await?;
            print_result(&result, format)
        }
    }
}

/// Config store with flag overrides applied
fn store_config(cli: &Cli, config: &Config) -> StoreConfig {
    let mut store = config.store.clone();
    if let Some(url) = &cli.url {
        let http = match &store {
            StoreConfig::Http(http) => http.clone(),
            StoreConfig::Embedded { .. } => HttpConfig::default(),
        };
        store = StoreConfig::Http(HttpConfig { url: url.clone(), ..http });
    }
    match &mut store {
        StoreConfig::Embedded { snapshot } => {
            if let Some(path) = &cli.snapshot {
                *snapshot = path.clone();
            }
        }
        StoreConfig::Http(http) => {
            if let Some(database) = &cli.database {
                http.database = database.clone();
            }
            if let Some(user) = &cli.user {
                http.username = user.clone();
            }
            if cli.password.is_some() {
                http.password = cli.password.clone();
            }
        }
    }
    store
}

async fn open_backend(cli: &Cli, config: &Config) -> anyhow::Result<Box<dyn GraphBackend>> {
    let backend = store_config(cli, config).open().context("opening graph store")?;
    backend.ping().await.context("graph store unreachable")?;
    Ok(backend)
}

async fn run_extract(input: PathBuf, out_dir: PathBuf, config: &Config, format: &OutputFormat) -> anyhow::Result<()> {
    let options = config.extract.options();
    let summary = tokio::task::spawn_blocking(move || extract_file(&input, &out_dir, &options)).await??;

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&summary)?),
        _ => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(vec!["Kind", "Records"]);
            for (kind, count) in &summary.records {
                table.add_row(vec![kind.to_string(), count.to_string()]);
            }
            println!("{}", table);
            println!(
                "{} document(s), {} extracted, {} dead-lettered in {:.1}s",
                summary.documents,
                summary.extracted,
                summary.dead_lettered(),
                summary.elapsed_secs
            );
        }
    }
    Ok(())
}

fn print_load_summary(summary: &LoadSummary, format: &OutputFormat) -> anyhow::Result<()> {
    if let OutputFormat::Json = format {
        println!("{}", serde_json::to_string_pretty(summary)?);
        return Ok(());
    }

    let header = ["kind", "read", "dropped", "loaded", "batches", "skipped", "failed", "seconds"];
    let rows: Vec<Vec<String>> = summary
        .kinds
        .iter()
        .map(|k| {
            vec![
                k.kind.to_string(),
                k.rows_read.to_string(),
                k.rows_dropped.to_string(),
                k.rows_loaded.to_string(),
                k.batches_loaded.to_string(),
                k.batches_skipped.to_string(),
                k.batches_failed.to_string(),
                format!("{:.2}", k.elapsed_secs),
            ]
        })
        .collect();

    match format {
        OutputFormat::Csv => {
            println!("{}", header.join(","));
            for row in rows {
                println!("{}", row.join(","));
            }
        }
        _ => {
            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(header.to_vec());
            for row in rows {
                table.add_row(row);
            }
            println!("{}", table);
            println!(
                "{} row(s) loaded, {} dropped in {:.1}s",
                summary.rows_loaded(),
                summary.rows_dropped(),
                summary.elapsed_secs
            );
        }
    }
    Ok(())
}

fn print_portfolio(portfolio: &Portfolio, with_metrics: bool, format: &OutputFormat) -> anyhow::Result<()> {
    if portfolio.is_empty() {
        println!("No trials found for {}", portfolio.intervention);
        return Ok(());
    }

    if let OutputFormat::Json = format {
        let mut out = serde_json::to_value(portfolio)?;
        if with_metrics {
            out["metrics"] = serde_json::to_value(portfolio.metrics())?;
        }
        println!("{}", serde_json::to_string_pretty(&out)?);
        return Ok(());
    }

    let columns = [
        "nct_id", "phases", "study_type", "allocation", "masking", "status", "enrollment", "condition", "sponsor",
        "country", "arm_label",
    ];
    let result = QueryResult {
        columns: columns.iter().map(|c| c.to_string()).collect(),
        records: portfolio
            .rows
            .iter()
            .map(|r| {
                vec![
                    Value::from(r.nct_id.clone()),
                    Value::from(r.phase_text()),
                    Value::from(r.study_type.clone()),
                    Value::from(r.allocation.clone()),
                    Value::from(r.masking.clone()),
                    Value::from(r.status.clone()),
                    Value::from(r.enrollment),
                    Value::from(r.condition.clone()),
                    Value::from(r.sponsor.clone()),
                    Value::from(r.country.clone()),
                    Value::from(r.arm_label.clone()),
                ]
            })
            .collect(),
    };
    print_result(&result, format)?;

    if with_metrics {
        let m = portfolio.metrics();
        let mut table = Table::new();
        table.set_content_arrangement(ContentArrangement::Dynamic);
        table.set_header(vec!["Metric", "Value"]);
        table.add_row(vec!["total_trials".to_string(), m.total_trials.to_string()]);
        table.add_row(vec!["condition_diversity".to_string(), m.condition_diversity.to_string()]);
        table.add_row(vec!["sponsor_diversity".to_string(), m.sponsor_diversity.to_string()]);
        table.add_row(vec!["geographic_spread".to_string(), m.geographic_spread.to_string()]);
        table.add_row(vec!["completion_ratio".to_string(), format!("{:.3}", m.completion_ratio)]);
        table.add_row(vec!["phase_maturity".to_string(), format!("{:.3}", m.phase_maturity)]);
        table.add_row(vec![
            "avg_enrollment".to_string(),
            m.avg_enrollment.map(|v| format!("{:.1}", v)).unwrap_or_else(|| "n/a".to_string()),
        ]);
        table.add_row(vec!["arm_complexity".to_string(), format!("{:.2}", m.arm_complexity)]);
        table.add_row(vec!["repurposing_strength".to_string(), format!("{:.3}", m.repurposing_strength)]);
        println!("{}", table);
    }
    Ok(())
}

fn print_result(result: &QueryResult, format: &OutputFormat) -> anyhow::Result<()> {
    match format {
        OutputFormat::Json => {
            println!("{}", serde_json::to_string_pretty(result)?);
        }
        OutputFormat::Csv => {
            if !result.columns.is_empty() {
                println!("{}", result.columns.join(","));
                for row in &result.records {
                    let cells: Vec<String> = row.iter().map(format_csv_value).collect();
                    println!("{}", cells.join(","));
                }
            }
        }
        OutputFormat::Table => {
            if result.columns.is_empty() {
                println!("(no results)");
                return Ok(());
            }

            let mut table = Table::new();
            table.set_content_arrangement(ContentArrangement::Dynamic);
            table.set_header(&result.columns);

            for row in &result.records {
                let cells: Vec<String> = row.iter().map(format_table_value).collect();
                table.add_row(cells);
            }

            println!("{}", table);
            println!("{} row(s)", result.records.len());
        }
    }
    Ok(())
}

fn format_table_value(v: &Value) -> String {
    match v {
        Value::Null => "null".to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Object(map) => {
            // Nodes come back as property maps; show the key if there is one
            for key in ["nctId", "key", "name"] {
                if let Some(Value::String(s)) = map.get(key) {
                    return format!("({})", s);
                }
            }
            serde_json::to_string(v).unwrap_or_default()
        }
        Value::Array(_) => serde_json::to_string(v).unwrap_or_default(),
    }
}

fn format_csv_value(v: &Value) -> String {
    match v {
        Value::Null => "".to_string(),
        Value::String(s) => {
            if s.contains(',') || s.contains('"') || s.contains('\n') {
                format!("\"{}\"", s.replace('"', "\"\""))
            } else {
                s.clone()
            }
        }
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        _ => {
            let json = serde_json::to_string(v).unwrap_or_default();
            format!("\"{}\"", json.replace('"', "\"\""))
        }
    }
}
