//! lithybrid: terminal client for the LitHybrid job API.
//!
//! Submits literature-review jobs, watches them with a progress bar and a
//! countdown, and exports the APA 7 bibliography.

use std::io::Write;
use std::path::PathBuf;
use std::process::ExitCode;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use uuid::Uuid;

use lithybrid_client::{
    render_report, status_line, watch_job, ApiClient, ClientError, ExportFormat, JobStatus,
    SubmitRequest, WatchOptions,
};
use lithybrid_core::defaults;

#[derive(Parser)]
#[command(name = "lithybrid")]
#[command(author, version, about = "Literature review jobs from the terminal")]
#[command(propagate_version = true)]
struct Cli {
    /// API base URL
    #[arg(long, env = "API_BASE", default_value = defaults::API_BASE, global = true)]
    api_base: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit a paper title and print the job id
    Submit {
        /// Paper title or topic to search for
        title: String,

        /// Maximum number of papers in the result
        #[arg(short, long)]
        limit: Option<u32>,

        /// Your estimate of the run time, used for the countdown
        #[arg(short, long)]
        expected_minutes: Option<u32>,

        /// Keep polling until the job finishes
        #[arg(short, long)]
        watch: bool,

        /// Poll interval in seconds when watching
        #[arg(short, long, default_value_t = defaults::CLIENT_POLL_INTERVAL_SECS)]
        interval: u64,
    },

    /// Show the current status of a job
    Status {
        job_id: Uuid,
    },

    /// Poll a job until it is done or failed
    Watch {
        job_id: Uuid,

        /// Poll interval in seconds
        #[arg(short, long, default_value_t = defaults::CLIENT_POLL_INTERVAL_SECS)]
        interval: u64,
    },

    /// Download the bibliography of a finished job
    Export {
        job_id: Uuid,

        #[arg(short, long, value_enum, default_value_t = ExportFormat::Apa)]
        format: ExportFormat,

        /// Output file (default: bibliography_{id}_APA7.txt); `-` for stdout
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// List one page of citations of a finished job
    Citations {
        job_id: Uuid,

        #[arg(short, long, default_value_t = 1)]
        page: u32,

        #[arg(long, default_value_t = defaults::PAGE_LIMIT)]
        per_page: u32,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::dotenv();
    let _log_guard = lithybrid_core::logging::init_tracing("lithybrid_client=warn", "lithybrid.log");

    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let client = ApiClient::new(cli.api_base)?;

    match cli.command {
        Commands::Submit {
            title,
            limit,
            expected_minutes,
            watch,
            interval,
        } => {
            let request = SubmitRequest::new(title)
                .with_limit(limit)
                .with_expected_minutes(expected_minutes);
            let job_id = client.submit(&request).await?;
            println!("{}", job_id);
            if watch {
                cmd_watch(&client, job_id, interval).await?;
            }
        }
        Commands::Status { job_id } => {
            let status = client.status(job_id).await?;
            print!("{}", render_report(&status, Utc::now()));
        }
        Commands::Watch { job_id, interval } => {
            cmd_watch(&client, job_id, interval).await?;
        }
        Commands::Export {
            job_id,
            format,
            output,
        } => {
            cmd_export(&client, job_id, format, output).await?;
        }
        Commands::Citations {
            job_id,
            page,
            per_page,
        } => {
            let listing = client.citations(job_id, page, per_page).await?;
            for citation in &listing.citations {
                println!("{}. {}", citation.index, citation.apa);
            }
            println!(
                "-- page {} of {} ({} citations)",
                listing.page, listing.total_pages, listing.total
            );
        }
    }
    Ok(())
}

async fn cmd_watch(client: &ApiClient, job_id: Uuid, interval: u64) -> anyhow::Result<()> {
    let options = WatchOptions::default().with_interval(Duration::from_secs(interval.max(1)));
    let result = watch_job(client, job_id, &options, |status: &JobStatus| {
        let mut stdout = std::io::stdout();
        let _ = write!(stdout, "\r\x1b[2K{}", status_line(status, Utc::now()));
        let _ = stdout.flush();
    })
    .await;
    println!();

    match result {
        Ok(status) => {
            print!("{}", render_report(&status, Utc::now()));
            Ok(())
        }
        Err(ClientError::JobFailed { code, message }) => {
            anyhow::bail!("job {} failed ({}): {}", job_id, code, message)
        }
        Err(e) => Err(e.into()),
    }
}

async fn cmd_export(
    client: &ApiClient,
    job_id: Uuid,
    format: ExportFormat,
    output: Option<PathBuf>,
) -> anyhow::Result<()> {
    let body = client.export(job_id, format).await?;

    let path = output.unwrap_or_else(|| PathBuf::from(format.default_file_name(job_id)));
    if path.as_os_str() == "-" {
        print!("{}", body);
        return Ok(());
    }

    tokio::fs::write(&path, body.as_bytes())
        .await
        .with_context(|| format!("Failed to write {}", path.display()))?;
    println!("Saved {}", path.display());
    Ok(())
}
