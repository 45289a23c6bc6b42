//! Panel audit tool.
//!
//! `panel-audit` walks every bucket of a video for one style, lists the
//! panels that exist and can delete panels by key.

use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use tracing::warn;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use comic_client::{probe_ready, scan_with_progress, HttpPanelClient, PanelApi, ScanOptions};
use comic_models::{BucketKey, PanelIdentity, PanelStatus};

#[derive(Parser, Debug)]
#[command(name = "panel-audit")]
#[command(about = "List and delete generated comic panels for a video")]
#[command(version)]
struct Args {
    /// Video id
    video: String,

    /// Style name
    style: String,

    /// Panel server base URL
    #[arg(long, env = "COMIC_API_URL", default_value = "http://localhost:8080")]
    api_url: String,

    /// Scan up to this many seconds of video
    #[arg(long, default_value = "3600")]
    max: u32,

    /// Probes in flight
    #[arg(long, default_value = "8")]
    concurrency: usize,

    /// Delete the panel at this bucket (MM-SS or MM:SS). Repeatable.
    #[arg(long = "delete", value_parser = BucketKey::parse)]
    delete: Vec<BucketKey>,
}

async fn run(args: Args) -> anyhow::Result<bool> {
    let client = Arc::new(HttpPanelClient::new(&args.api_url)?);

    let styles = client.styles().await?;
    if !styles.contains(&args.style) {
        let known: Vec<&str> = styles.names().collect();
        anyhow::bail!("Unknown style {:?} (available: {})", args.style, known.join(", "));
    }
    let keys = BucketKey::range_through(f64::from(args.max));
    let total = keys.len();

    println!(
        "video={}  style={}  (scan 00:00..{} step=15s)",
        args.video,
        args.style,
        BucketKey::from_whole_seconds(args.max).display_colon()
    );
    println!("Scanning {} buckets...", total);

    let options = ScanOptions {
        concurrency: args.concurrency.max(1),
        ..ScanOptions::audit()
    };
    let report = scan_with_progress(
        keys,
        &options,
        |key| {
            let client = Arc::clone(&client);
            let identity = PanelIdentity::new(args.video.clone(), args.style.clone(), key);
            async move { probe_ready(client.as_ref(), &identity).await }
        },
        |progress| {
            if progress.probed % 10 == 0 {
                println!(
                    "Scanned {}/{}... found {}",
                    progress.probed, progress.total, progress.found
                );
            }
        },
    )
    .await;

    if report.errors > 0 {
        warn!(errors = report.errors, "Some probes failed");
    }

    let mut found = report.found;
    let mut ok = true;

    for key in &args.delete {
        // Dropped from the listing first, restored if the server refuses.
        let previous = found.remove(key);
        let identity = PanelIdentity::new(args.video.clone(), args.style.clone(), *key);
        let refused = match client.delete(&identity).await {
            Ok(PanelStatus::Deleted { key: object }) => {
                println!("Deleted {} ({})", key.display_colon(), object);
                None
            }
            Ok(PanelStatus::Error { message }) => Some(message),
            Ok(other) => Some(format!("unexpected status {}", other.as_str())),
            Err(e) => Some(e.to_string()),
        };
        if let Some(reason) = refused {
            eprintln!("Delete failed for {}: {}", key.display_colon(), reason);
            if let Some(url) = previous {
                found.insert(*key, url);
            }
            ok = false;
        }
    }

    for (key, url) in &found {
        println!("{}  {}", key.display_colon(), url);
    }
    let n = found.len();
    println!("Showing {} panel{}", n, if n == 1 { "" } else { "s" });

    Ok(ok)
}

fn init_tracing() -> anyhow::Result<()> {
    let env_filter = EnvFilter::from_default_env().add_directive("comic_client=warn".parse()?);
    tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(env_filter)
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    if let Err(e) = init_tracing() {
        eprintln!("Error: {}", e);
        return ExitCode::FAILURE;
    }

    match run(args).await {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::FAILURE,
        Err(e) => {
            eprintln!("Error: {}", e);
            ExitCode::FAILURE
        }
    }
}
