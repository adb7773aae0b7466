use anyhow::Result;
use clap::Parser;
use std::process::ExitCode;

use tokio::runtime::Builder;
use tracing::{debug, info};

use bdiiq::cli::{Cli, Commands};
use bdiiq::client::BdiiClient;
use bdiiq::error::{FailureKind, QueryFailure};
use bdiiq::srm::{discover_surls, SurlError, SurlQuery};

fn main() -> Result<ExitCode> {
    // Probes and searches are sequential per query; a couple of workers is plenty
    let worker_threads = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(2)
        .min(4);

    let runtime = Builder::new_multi_thread()
        .worker_threads(worker_threads)
        .enable_all()
        .build()?;

    runtime.block_on(async_main())
}

async fn async_main() -> Result<ExitCode> {
    // Logs go to stderr so stdout stays valid JSON
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = cli.client_config()?;
    debug!("Using configuration: {:?}", config);
    let client = BdiiClient::new(config)?;

    match &cli.command {
        Commands::Query { filter, attributes } => {
            let request = client.config().request(filter.as_str(), attributes.iter().cloned());
            info!("Querying BDII: filter={}", filter);
            match client.query(&request).await {
                Ok(entries) => {
                    println!("{}", serde_json::to_string_pretty(&entries)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(failure) => report_failure(&failure),
            }
        }
        Commands::Resolve => match client.resolve(&[]).await {
            Ok(endpoint) => {
                println!("{}", serde_json::to_string_pretty(&endpoint)?);
                Ok(ExitCode::SUCCESS)
            }
            Err(e) => report_failure(&QueryFailure::from(e)),
        },
        Commands::Surls {
            hostname,
            vo,
            service_version,
        } => {
            let query = SurlQuery {
                hostname: hostname.clone(),
                vo: vo.clone(),
                service_version: service_version.clone(),
            };
            match discover_surls(&client, &query).await {
                Ok(surls) => {
                    println!("{}", serde_json::to_string_pretty(&surls)?);
                    Ok(ExitCode::SUCCESS)
                }
                Err(SurlError::Query(failure)) => report_failure(&failure),
                Err(e) => {
                    eprintln!("{}", e);
                    Ok(ExitCode::from(2))
                }
            }
        }
    }
}

fn report_failure(failure: &QueryFailure) -> Result<ExitCode> {
    println!("{}", serde_json::to_string_pretty(failure)?);
    Ok(match failure.kind {
        FailureKind::EmptySet => ExitCode::from(1),
        _ => ExitCode::from(2),
    })
}
