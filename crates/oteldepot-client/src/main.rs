//! oteldepot client CLI.
//!
//! Fetches stored signals from a depot server and prints each page as
//! OTLP-JSON on stdout. Without an end bound the CLI follows: after
//! draining the range it re-fetches from `end + 1` every few seconds.

use std::time::{Duration, SystemTime, UNIX_EPOCH};

use chrono::{DateTime, FixedOffset};
use clap::{Args, Parser, Subcommand};
use opentelemetry_proto::tonic::logs::v1::LogsData;
use opentelemetry_proto::tonic::metrics::v1::MetricsData;
use opentelemetry_proto::tonic::trace::v1::TracesData;
use oteldepot_client::{
    parse_duration, Client, ClientError, Fetchable, Paginator, Profile,
};
use oteldepot_proto::{
    FetchLogsDataRequest, FetchLogsDataResponse, FetchMetricsDataRequest,
    FetchMetricsDataResponse, FetchTracesDataRequest, FetchTracesDataResponse,
};
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const FOLLOW_POLL_INTERVAL: Duration = Duration::from_secs(5);
const FETCH_POLL_INTERVAL: Duration = Duration::from_millis(200);
const PAGE_LIMIT: i64 = 100;

#[derive(Parser)]
#[command(
    name = "oteldepot-client",
    version,
    about = "CLI for the oteldepot fetch API"
)]
struct Cli {
    /// Log level (trace, debug, info, warn, error).
    #[arg(long, env = "OTELDEPOT_LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// Enable colored log output.
    #[arg(long, env = "OTELDEPOT_LOG_COLOR")]
    log_color: Option<bool>,

    /// Client profile file path (TOML).
    #[arg(long, env = "OTELDEPOT_PROFILE")]
    profile: Option<String>,

    /// Depot server endpoint.
    #[arg(long, env = "OTELDEPOT_ENDPOINT")]
    endpoint: Option<String>,

    /// Depot server access key.
    #[arg(long, env = "OTELDEPOT_ACCESS_KEY")]
    access_key: Option<String>,

    /// Depot server access key header.
    #[arg(long, env = "OTELDEPOT_ACCESS_KEY_HEADER")]
    access_key_header: Option<String>,

    /// Forward fetched signals to an OTel exporter endpoint instead of
    /// stdout.
    #[arg(long, env = "OTEL_EXPORTER_OTLP_ENDPOINT")]
    otlp_exporter_endpoint: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Fetch stored trace data.
    Traces(TimeRangeArgs),
    /// Fetch stored metric data.
    Metrics(TimeRangeArgs),
    /// Fetch stored log data.
    Logs(TimeRangeArgs),
    /// Show version.
    Version,
}

#[derive(Args, Clone)]
struct TimeRangeArgs {
    /// Return signals newer than this time (RFC 3339).
    #[arg(long, env = "OTELDEPOT_START_TIME")]
    start_time: Option<DateTime<FixedOffset>>,

    /// Return signals older than this time (RFC 3339).
    #[arg(long, env = "OTELDEPOT_END_TIME")]
    end_time: Option<DateTime<FixedOffset>>,

    /// Return signals newer than a relative duration, like 52s, 2m, or 3h
    /// (default: 5m).
    #[arg(long, env = "OTELDEPOT_SINCE")]
    since: Option<String>,

    /// Return signals older than a relative duration, like 52s, 2m, or 3h.
    #[arg(long, env = "OTELDEPOT_UNTIL")]
    until: Option<String>,
}

impl TimeRangeArgs {
    /// Resolve to `(start, end)` nanoseconds; zero end means "follow now".
    fn time_range_unix_nano(&self) -> Result<(u64, u64), ClientError> {
        let now = now_unix_nano();

        let start = match (&self.since, &self.start_time) {
            (Some(since), _) => now.saturating_sub(parse_duration(since)?.as_nanos() as u64),
            (None, Some(start)) => start.timestamp_nanos_opt().unwrap_or_default() as u64,
            (None, None) => now.saturating_sub(Duration::from_secs(300).as_nanos() as u64),
        };
        let end = match (&self.until, &self.end_time) {
            (Some(until), _) => now.saturating_sub(parse_duration(until)?.as_nanos() as u64),
            (None, Some(end)) => end.timestamp_nanos_opt().unwrap_or_default() as u64,
            (None, None) => 0,
        };
        Ok((start, end))
    }
}

/// A fetch response that can be printed as an OTLP-JSON page.
trait SignalPage {
    fn is_empty(&self) -> bool;
    fn to_otlp_json(&self) -> Result<String, serde_json::Error>;
}

impl SignalPage for FetchTracesDataResponse {
    fn is_empty(&self) -> bool {
        self.resource_spans
            .iter()
            .flat_map(|rs| rs.scope_spans.iter())
            .all(|ss| ss.spans.is_empty())
    }

    fn to_otlp_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&TracesData {
            resource_spans: self.resource_spans.clone(),
        })
    }
}

impl SignalPage for FetchMetricsDataResponse {
    fn is_empty(&self) -> bool {
        self.resource_metrics
            .iter()
            .flat_map(|rm| rm.scope_metrics.iter())
            .all(|sm| sm.metrics.is_empty())
    }

    fn to_otlp_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&MetricsData {
            resource_metrics: self.resource_metrics.clone(),
        })
    }
}

impl SignalPage for FetchLogsDataResponse {
    fn is_empty(&self) -> bool {
        self.resource_logs
            .iter()
            .flat_map(|rl| rl.scope_logs.iter())
            .all(|sl| sl.log_records.is_empty())
    }

    fn to_otlp_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(&LogsData {
            resource_logs: self.resource_logs.clone(),
        })
    }
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    if let Command::Version = cli.command {
        println!("oteldepot-client {}", env!("CARGO_PKG_VERSION"));
        return Ok(());
    }

    init_logging(&cli.log_level, cli.log_color)?;

    if cli.otlp_exporter_endpoint.is_some() {
        return Err("signal export to an OTel exporter is not implemented yet".into());
    }

    let client = Client::new(cli.build_profile()?)?;
    match &cli.command {
        Command::Traces(args) => {
            let (start, end) = args.time_range_unix_nano()?;
            fetch_loop(&client, start, end, |start, end| FetchTracesDataRequest {
                start_time_unix_nano: start,
                end_time_unix_nano: end,
                cursor: String::new(),
                limit: PAGE_LIMIT,
            })
            .await?;
        }
        Command::Metrics(args) => {
            let (start, end) = args.time_range_unix_nano()?;
            fetch_loop(&client, start, end, |start, end| FetchMetricsDataRequest {
                start_time_unix_nano: start,
                end_time_unix_nano: end,
                cursor: String::new(),
                limit: PAGE_LIMIT,
            })
            .await?;
        }
        Command::Logs(args) => {
            let (start, end) = args.time_range_unix_nano()?;
            fetch_loop(&client, start, end, |start, end| FetchLogsDataRequest {
                start_time_unix_nano: start,
                end_time_unix_nano: end,
                cursor: String::new(),
                limit: PAGE_LIMIT,
            })
            .await?;
        }
        Command::Version => unreachable!("handled above"),
    }
    Ok(())
}

impl Cli {
    fn build_profile(&self) -> Result<Profile, ClientError> {
        let mut profile = match &self.profile {
            Some(path) => Profile::load(path)?,
            None => Profile::default(),
        };
        if let Some(endpoint) = &self.endpoint {
            profile.endpoint = endpoint.clone();
        }
        if let Some(access_key) = &self.access_key {
            profile.access_key = access_key.clone();
            if let Some(header) = &self.access_key_header {
                profile.access_key_header = header.clone();
            }
        }
        Ok(profile)
    }
}

/// Drain the range page by page; with no end bound, keep following from
/// `end + 1`.
async fn fetch_loop<R, F>(
    client: &Client,
    mut start: u64,
    end: u64,
    build_request: F,
) -> Result<(), ClientError>
where
    R: Fetchable,
    R::Response: SignalPage,
    F: Fn(u64, u64) -> R,
{
    let follow = end == 0;
    let mut end = if follow { now_unix_nano() } else { end };

    loop {
        tracing::debug!(start, end, "create paginator");
        let mut paginator = Paginator::new(client, build_request(start, end));
        while paginator.has_more_pages() {
            let page = paginator.next_page().await?;
            if page.is_empty() {
                tracing::debug!("no more signals in page");
                continue;
            }
            let json = page
                .to_otlp_json()
                .map_err(|err| ClientError::Decode(err.to_string()))?;
            println!("{json}");
            tokio::time::sleep(FETCH_POLL_INTERVAL).await;
        }

        if !follow {
            break;
        }
        tokio::time::sleep(FOLLOW_POLL_INTERVAL).await;
        start = end + 1;
        end = now_unix_nano();
    }
    Ok(())
}

fn now_unix_nano() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_nanos() as u64
}

fn init_logging(level: &str, color: Option<bool>) -> Result<(), Box<dyn std::error::Error>> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(level))?;
    tracing_subscriber::registry()
        .with(filter)
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(color.unwrap_or(true)),
        )
        .init();
    Ok(())
}
