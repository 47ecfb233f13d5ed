//! dispatchq CLI: operator interface to a request queue.

use clap::{Parser, Subcommand};
use dispatchq::config::Config;
use dispatchq::model::WorkItem;
use dispatchq::queue::{
    DistributedOptions, DistributedQueue, QueueFactory, QueueSettings, RequestQueue,
};
use dispatchq::telemetry::{TelemetryConfig, init_telemetry};
use std::collections::BTreeMap;
use std::time::Duration;

#[derive(Parser)]
#[command(name = "dispatchq", about = "Priority request queue for crawlers")]
struct Cli {
    /// Backend to use, overriding the settings file
    #[arg(long, global = true)]
    backend: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Enqueue a request
    Put {
        url: String,
        #[arg(long, default_value = "GET")]
        method: String,
        /// Lower = served first
        #[arg(long, default_value_t = 0)]
        priority: i32,
        /// Request header as name=value (repeatable)
        #[arg(long = "header", value_parser = parse_key_val)]
        headers: Vec<(String, String)>,
        /// JSON object carried with the request
        #[arg(long)]
        meta: Option<String>,
    },
    /// Take the next request and print it as JSON
    Get {
        /// Give up after this many milliseconds
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Acknowledge the request right away
        #[arg(long)]
        ack: bool,
    },
    /// Print the number of ready requests
    Size,
    /// Remove every request
    Clear,
    /// Reconcile expired leases (distributed backend only)
    Reap {
        /// Exit with an error if any entry was dropped
        #[arg(long)]
        strict: bool,
    },
}

fn parse_key_val(s: &str) -> Result<(String, String), String> {
    s.split_once('=')
        .map(|(k, v)| (k.trim().to_string(), v.trim().to_string()))
        .ok_or_else(|| format!("expected name=value, got {s:?}"))
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();
    let config = Config::from_env()?;

    let _guard = init_telemetry(TelemetryConfig {
        endpoint: config.otel_endpoint.clone(),
        service_name: "dispatchq".to_string(),
        log_level: config.log_level.clone(),
    })?;

    let mut settings = config.queue_settings()?;
    if let Some(backend) = cli.backend {
        settings = settings.with_backend(backend);
    }

    if let Command::Reap { strict } = cli.command {
        return cmd_reap(&settings, strict).await;
    }

    let queue = QueueFactory::new().create(&settings).await?;
    let result = run(queue.as_ref(), cli.command).await;
    queue.close().await?;
    result
}

async fn run(queue: &dyn RequestQueue, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Put {
            url,
            method,
            priority,
            headers,
            meta,
        } => cmd_put(queue, url, method, priority, headers, meta).await,
        Command::Get { timeout_ms, ack } => cmd_get(queue, timeout_ms, ack).await,
        Command::Size => {
            println!("{}", queue.size().await?);
            Ok(())
        }
        Command::Clear => {
            queue.clear().await?;
            println!("Cleared.");
            Ok(())
        }
        Command::Reap { .. } => anyhow::bail!("reap needs the distributed backend"),
    }
}

async fn cmd_put(
    queue: &dyn RequestQueue,
    url: String,
    method: String,
    priority: i32,
    headers: Vec<(String, String)>,
    meta: Option<String>,
) -> anyhow::Result<()> {
    let mut item = WorkItem::new(url).method(method).priority(priority);
    for (name, value) in headers {
        item = item.header(name, value);
    }
    if let Some(json) = meta {
        let meta: BTreeMap<String, serde_json::Value> = serde_json::from_str(&json)?;
        for (key, value) in meta {
            item = item.meta(key, value);
        }
    }

    let url = item.url.clone();
    queue.put(item, None).await?;
    println!("Queued: {url} (priority {priority})");
    Ok(())
}

async fn cmd_get(queue: &dyn RequestQueue, timeout_ms: Option<u64>, ack: bool) -> anyhow::Result<()> {
    let item = match timeout_ms {
        Some(ms) => queue.get_timeout(Duration::from_millis(ms)).await?,
        None => queue.get().await?,
    };
    println!("{}", serde_json::to_string_pretty(&item)?);
    if let Some(ref lease) = item.lease {
        eprintln!(
            "Leased entry {} (attempt {}, expires {})",
            lease.entry_id,
            lease.attempts,
            lease.expires_at.format("%Y-%m-%d %H:%M:%S")
        );
    }
    if ack {
        queue.ack(&item).await?;
    }
    Ok(())
}

async fn cmd_reap(settings: &QueueSettings, strict: bool) -> anyhow::Result<()> {
    let (class, table) = settings.resolve()?;
    if class != "distributed" {
        anyhow::bail!("reap needs the distributed backend, {:?} is {class}", settings.backend);
    }
    let queue = DistributedQueue::connect(DistributedOptions::from_table(table)?).await?;
    let report = queue.reap_orphans().await;
    queue.close().await?;

    let report = report?;
    println!("Requeued:      {}", report.requeued);
    println!("Expired items: {}", report.expired_items);
    println!("Dropped:       {}", report.exhausted.len());
    for orphan in &report.exhausted {
        println!("  {orphan}");
    }
    if strict {
        report.into_result()?;
    }
    Ok(())
}
