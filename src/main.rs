use clap::Parser;
use formation_harvester::{
    input::{load_urls, Sheet},
    net::{build_client, AllowAll, HttpFetcher, RobotsCache},
    parcoursup::{opendata::OPENDATA_URL, OpenDataClient},
    HarvestError, Harvester, OutputTable, Politeness,
};
use std::path::PathBuf;
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_error::ErrorLayer;
use tracing_subscriber::prelude::*;

/// Harvests Parcoursup program listings into a CSV file.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Args {
    /// Spreadsheet (or CSV) holding the listing URLs
    #[arg(long, default_value = "liens dossier formation.xlsx")]
    infile: PathBuf,

    /// Sheet index or name
    #[arg(long, default_value = "0")]
    sheet: Sheet,

    /// Header of the column holding the URLs
    #[arg(
        long = "url-col",
        default_value = "Lien de la formation sur la plateforme Parcoursup"
    )]
    url_col: String,

    /// Output CSV
    #[arg(long, default_value = "parcoursup_fiches_struct.csv")]
    outfile: PathBuf,

    /// Pause in seconds after each processed URL
    #[arg(long, default_value_t = 0.7)]
    delay: f64,

    /// Skip URLs already present in the output file
    #[arg(long)]
    resume: bool,

    /// Ignore robots.txt
    #[arg(long = "no-robots")]
    no_robots: bool,

    /// Open-data records endpoint
    #[arg(long = "opendata-url", default_value = OPENDATA_URL)]
    opendata_url: String,
}

async fn run<P: Politeness>(
    args: &Args,
    urls: &[String],
    table: &mut OutputTable,
    client: reqwest::Client,
    politeness: P,
) -> Result<(), Box<dyn std::error::Error>> {
    let delay = Duration::from_secs_f64(args.delay.max(0.0));
    let mut harvester = Harvester::new(
        HttpFetcher::new(client.clone()),
        OpenDataClient::new(client, args.opendata_url.as_str()),
        politeness,
        delay,
    );

    let stats = harvester.run(urls, table).await?;

    info!(
        "Done: {} URL(s), {} skipped, {} parsed, {} blocked, {} HTTP errors, {} network errors, {} parse errors",
        stats.total,
        stats.skipped,
        stats.parsed,
        stats.blocked,
        stats.http_errors,
        stats.network_errors,
        stats.parse_errors
    );
    info!("Output written to {}", args.outfile.display());
    Ok(())
}

async fn harvest(args: Args) -> Result<(), Box<dyn std::error::Error>> {
    let urls = load_urls(&args.infile, &args.sheet, &args.url_col)?;
    let mut table = OutputTable::open(&args.outfile, args.resume)?;
    if args.resume {
        info!("{} URL(s) already in output", table.processed_count());
    }

    let client = build_client().map_err(HarvestError::from)?;
    if args.no_robots {
        warn!("robots.txt is ignored");
        run(&args, &urls, &mut table, client, AllowAll).await
    } else {
        let robots = RobotsCache::new(client.clone());
        run(&args, &urls, &mut table, client, robots).await
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(
            tracing_subscriber::EnvFilter::try_from_env("LOG_LEVEL").unwrap_or_else(|_| {
                "info,html5ever=error,selectors=error,hyper=warn,reqwest=info".into()
            }),
        )
        .with(ErrorLayer::default())
        .init();

    let args = Args::parse();
    if let Err(e) = harvest(args).await {
        error!("{}", e);
        return Err(e);
    }
    Ok(())
}
