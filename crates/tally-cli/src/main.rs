//! tally - row-count reconciliation for Postgres migrations.
//!
//! Commands:
//! - `setup` writes a credentials template
//! - `info` runs the catalog discovery query set against either endpoint
//! - `report` reconciles row counts between the endpoints
//! - `migrate` hands off to the migration shell script

use std::path::{Path, PathBuf};
use std::sync::Arc;

use clap::{Parser, Subcommand, ValueEnum};
use owo_colors::OwoColorize;
use tally::{Endpoint, PgEndpoint, ReconDiff, ReconEngine, ReportSink, Side, discover_objects};

mod config;
mod error;
mod migrate;
mod sinks;

use config::Credentials;
use error::CliResult;
use sinks::MultiSink;

/// Directory holding `<database>_info.json` discovery query sets.
const QUERY_DIR: &str = "db_info";

/// Cross-database row count reconciliation for Postgres migrations.
#[derive(Parser)]
#[command(name = "tally", version, about)]
struct Cli {
    /// Credentials file
    #[arg(long, global = true, default_value = "db_config.json")]
    config: PathBuf,

    /// Directory reports are written into
    #[arg(long, global = true, default_value = "output")]
    output: PathBuf,

    /// Upper bound on concurrent queries per endpoint
    #[arg(long, global = true, default_value_t = tally::fanout::DEFAULT_JOBS)]
    jobs: usize,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Write a credentials template to the config path
    Setup {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
    /// Run the discovery query set and write its datasets as reports
    Info {
        /// Which endpoint(s) to inspect
        #[arg(long, value_enum, default_value_t = Client::Both)]
        client: Client,

        /// Logical database name selecting db_info/<name>_info.json
        #[arg(long, default_value = "postgres")]
        database: String,
    },
    /// Reconcile row counts between source and target and write reports
    Report,
    /// Run the migration script against both endpoints
    Migrate {
        /// Skip the confirmation prompt
        #[arg(short = 'y', long)]
        yes: bool,

        /// Restore from an existing dump file instead of streaming
        #[arg(long)]
        dump_file: Option<PathBuf>,
    },
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Client {
    Source,
    Target,
    Both,
}

impl Client {
    fn sides(self) -> &'static [Side] {
        match self {
            Client::Source => &[Side::Source],
            Client::Target => &[Side::Target],
            Client::Both => &[Side::Source, Side::Target],
        }
    }
}

#[tokio::main]
async fn main() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    if let Err(e) = run(cli).await {
        eprintln!("{} {e}", "error:".red().bold());
        std::process::exit(1);
    }
}

async fn run(cli: Cli) -> CliResult<()> {
    match cli.command {
        Commands::Setup { force } => {
            Credentials::write_template(&cli.config, force)?;
            println!(
                "wrote {}; fill in both endpoints before running `tally report`",
                cli.config.display().bold()
            );
            Ok(())
        }
        Commands::Info { client, ref database } => info(&cli, client, database).await,
        Commands::Report => report(&cli).await,
        Commands::Migrate { yes, dump_file } => {
            let credentials = Credentials::load(&cli.config)?;
            let prompt = format!(
                "migrate '{}' on {} into '{}' on {}?",
                credentials.source.database,
                credentials.source.host,
                credentials.target.database,
                credentials.target.host,
            );
            if !yes && !migrate::confirm(&prompt)? {
                println!("aborted");
                return Ok(());
            }
            migrate::run(&credentials, dump_file.as_deref()).await?;
            println!("{}", "migration script finished".green());
            Ok(())
        }
    }
}

fn endpoint(side: &config::DbEndpoint, jobs: usize) -> CliResult<Arc<dyn Endpoint>> {
    Ok(Arc::new(PgEndpoint::new(side.pool(jobs)?)))
}

async fn info(cli: &Cli, client: Client, database: &str) -> CliResult<()> {
    let credentials = Credentials::load(&cli.config)?;
    let queries = config::load_query_set(Path::new(QUERY_DIR), database)?;

    for side in client.sides() {
        let params = match side {
            Side::Source => &credentials.source,
            Side::Target => &credentials.target,
        };
        let results = discover_objects(endpoint(params, cli.jobs)?, &queries, cli.jobs).await;

        let output_name = format!("output_{}_{database}", side.as_str());
        let mut sink = MultiSink::text_and_csv(cli.output.clone());
        sink.begin(&output_name)?;
        for (label, outcome) in &results {
            sink.write_section(label, &outcome.to_dataset(label))?;
        }
        println!(
            "{} {} sections for {} under {}",
            "wrote".green(),
            results.len(),
            side.as_str().bold(),
            cli.output.display()
        );
    }
    Ok(())
}

async fn report(cli: &Cli) -> CliResult<()> {
    let credentials = Credentials::load(&cli.config)?;
    let source = endpoint(&credentials.source, cli.jobs)?;
    let target = endpoint(&credentials.target, cli.jobs)?;

    let records = ReconEngine::new(source, target)
        .with_jobs(cli.jobs)
        .run()
        .await?;
    let audited = records.len();
    let diff = ReconDiff::compute(records);

    let mut sink = MultiSink::text_and_csv(cli.output.clone());
    tally::report::write_reconciliation(&mut sink, "reports", &diff)?;

    let mismatches = diff
        .records
        .values()
        .filter(|r| r.row_count_match == Some(false))
        .count();
    println!(
        "audited {} tables: {} mismatched, {} only in source, {} only in target",
        audited.bold(),
        style_count(mismatches),
        style_count(diff.only_in_source.len()),
        style_count(diff.only_in_target.len()),
    );
    println!("reports written under {}", cli.output.display());
    Ok(())
}

fn style_count(n: usize) -> String {
    if n == 0 {
        n.green().to_string()
    } else {
        n.red().bold().to_string()
    }
}
