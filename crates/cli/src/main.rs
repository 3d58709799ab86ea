//! CLI for the kfarms staking program.
//!
//! `initialize` sends the bootstrap transaction to the configured cluster.
//! `simulate` replays a scenario on a local cluster and reports the farms.

mod scenario;

use clap::{Parser, Subcommand};
use kfarms_client::{Program, Provider, ProviderConfig};
use kfarms_program::sink::JsonStreamSink;
use kfarms_program::Report;
use std::time::Instant;

#[derive(Parser, Debug)]
#[command(name = "kfarms", version, about = "Kamino-style staking farms")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Send `initialize` and print the transaction signature.
    Initialize {
        /// `localnet` or an http(s) JSON-RPC endpoint.
        #[arg(short, long, env = "KFARMS_PROVIDER_URL", default_value = "localnet")]
        url: String,

        /// Wallet key (0x-prefixed hex) or name.
        #[arg(short, long, env = "KFARMS_WALLET", default_value = "dev")]
        wallet: String,

        /// processed, confirmed or finalized.
        #[arg(long, env = "KFARMS_COMMITMENT", default_value = "confirmed")]
        commitment: String,
    },

    /// Replay a scenario file on a local cluster.
    Simulate {
        #[arg(short, long)]
        scenario: std::path::PathBuf,

        #[arg(long, default_value_t = false)]
        json: bool,

        /// Sink output: "ndjson" writes NDJSON to stdout,
        /// "ndjson:/path/to/file" writes to file.
        #[arg(long)]
        sink: Option<String>,
    },
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Initialize {
            url,
            wallet,
            commitment,
        } => {
            let config = ProviderConfig::new(&url, &wallet)?.with_commitment(commitment.parse()?);
            let program = Program::new(Provider::from_config(&config)?);
            let tx = program.methods().initialize().rpc().await?;
            println!("Your transaction signature {tx}");
        }
        Commands::Simulate {
            scenario: path,
            json,
            sink,
        } => {
            let t0 = Instant::now();
            let text = std::fs::read_to_string(&path)?;
            let scenario = scenario::parse(&text)?;
            tracing::info!(path = %path.display(), steps = scenario.steps.len(), "starting simulation");

            let (cluster, outcomes) = scenario::run(&scenario).await?;
            let total_time = t0.elapsed();
            let report = cluster
                .with_ledger_ref(|ledger, clock| Report::build(ledger, clock, outcomes, total_time))
                .await;

            tracing::info!(
                committed = report.committed,
                failed = report.failed,
                farms = report.farms.len(),
                elapsed_ms = total_time.as_millis(),
                "simulation complete"
            );

            if let Some(ref sink_spec) = sink {
                if sink_spec == "ndjson" {
                    let mut s = JsonStreamSink::stdout();
                    s.write_report(&report)?;
                    let n = s.finish()?;
                    tracing::info!(rows = n, "ndjson sink: wrote to stdout");
                } else if let Some(path) = sink_spec.strip_prefix("ndjson:") {
                    let file = std::fs::File::create(path)?;
                    let mut s = JsonStreamSink::new(file);
                    s.write_report(&report)?;
                    let n = s.finish()?;
                    tracing::info!(rows = n, path, "ndjson sink: wrote to file");
                } else {
                    eprintln!("Unknown sink: {sink_spec}. Use 'ndjson' or 'ndjson:/path'");
                }

                // Still print report to stderr so it's visible.
                eprint!("{}", report.render());
            } else if json {
                let doc = serde_json::json!({
                    "summary": report.summary_row(),
                    "farms": report.farm_rows(),
                    "transactions": report.transaction_rows(),
                });
                println!("{}", serde_json::to_string_pretty(&doc)?);
            } else {
                print!("{}", report.render());
            }
        }
    }

    Ok(())
}
