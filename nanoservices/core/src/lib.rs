//! rowflow_core: streaming ETL job orchestration
//!
//! A [`engine::Job`] pulls rows from one processor and fans each row out to an
//! ordered list of destinations. Every destination turns rows into records,
//! groups records into batches, and transforms and loads each batch. Every
//! step is announced on an ordered per-job event bus; reporters and user
//! listeners observe it and may stop the job.
//!
//! Basic usage:
//!
//! ```no_run
//! use rowflow_core::builder::JobBuilder;
//! use rowflow_core::destinations::file::FileDestination;
//! use rowflow_core::destinations::traits::DestinationConfig;
//! use rowflow_core::events::EventName;
//! use rowflow_core::processors::iter::IterProcessor;
//! use rowflow_core::reporters::LogReporter;
//! use serde_json::json;
//!
//! # async fn run() -> Result<(), Box<dyn std::error::Error>> {
//! let job = JobBuilder::new(IterProcessor::new(vec![json!({"id": 1}), json!({"id": 2})]))
//!     .name("example")
//!     .reporter(LogReporter::new())
//!     .destination_with(FileDestination::new("out.jsonl"), DestinationConfig::batched(100))
//!     .build()?;
//!
//! job.on(EventName::LoadingBatchError, |payload| async move {
//!     eprintln!("load failed: {:?}", payload.error());
//!     Ok(())
//! });
//! job.run().await?;
//! # Ok(())
//! # }
//! ```

pub mod builder;
pub mod config;
pub mod destinations;
pub mod engine;
pub mod events;
pub mod job;
pub mod processors;
pub mod reporters;
pub mod store;

pub mod logging;

pub mod metrics;
