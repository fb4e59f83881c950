use std::net::TcpListener;

use rowflow::core::config::parse_job;
use rowflow::core::destinations::console::ConsoleDestination;
use rowflow::core::destinations::file::FileDestination;
use rowflow::core::processors::iter::IterProcessor;
use rowflow::core::reporters::{HistoryReporter, LogReporter, MetricsReporter};
use rowflow::core::{logging, metrics};
use rowflow::{EventName, EventPayload, JobBuilder};
use serde_json::json;

const JOB: &str = r#"
job: demo_orders
row_limit: 50
fan_out: sequential
destinations:
  console:
    batch_size: 4
  archive:
    batch_size: 10
metrics:
  listen: "127.0.0.1:0"
history:
  path: "./target/rowflow-history.db"
"#;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Use RUST_LOG to control the level, e.g. RUST_LOG=debug to see every event.
    logging::init();

    let config = parse_job(JOB)?;

    let _exporter = match config.metrics.as_ref().and_then(|m| m.listen.as_deref()) {
        Some(listen) => {
            let listener = TcpListener::bind(listen)?;
            println!("metrics at http://{}/metrics", listener.local_addr()?);
            Some(metrics::start_exporter(listener))
        }
        None => None,
    };

    let orders = (1..=12).map(|id| {
        json!({
            "id": id,
            "customer": format!("customer-{}", id % 3),
            "total": id as f64 * 9.5,
        })
    });

    let mut builder = JobBuilder::new(IterProcessor::new(orders).with_name("orders"))
        .config(&config)
        .reporter(LogReporter::new())
        .reporter(MetricsReporter::new());
    if let Some(history) = &config.history {
        builder = builder.reporter(HistoryReporter::open(&history.path)?);
    }

    let job = builder
        .destination(ConsoleDestination::new().with_name("console"))
        .destination(FileDestination::new("./target/orders.jsonl").with_name("archive"))
        .build()?;

    let handle = job.handle();
    job.on(EventName::StartProcessingRow, move |payload| {
        let handle = handle.clone();
        async move {
            if let EventPayload::StartProcessingRow { row } = payload {
                if row["total"].as_f64().unwrap_or_default() > 100.0 {
                    handle.stop();
                }
            }
            Ok(())
        }
    });
    job.on(EventName::LoadingBatchError, |payload| async move {
        eprintln!("batch failed: {}", payload.error().unwrap_or("unknown"));
        Ok(())
    });

    job.run().await?;
    Ok(())
}
