use std::collections::HashMap;
use std::sync::Arc;

use crate::config::types::{DestinationSettings, JobConfig};
use crate::destinations::traits::{Destination, DestinationConfig};
use crate::engine::{Job, JobOptions};
use crate::job::runner::FanOut;
use crate::processors::traits::Processor;
use crate::reporters::Reporter;

#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("at least one destination is required")]
    NoDestination,
    #[error("destination name '{0}' is used more than once")]
    DuplicateDestination(String),
}

pub struct JobBuilder {
    processor: Box<dyn Processor>,
    job_name: Option<String>,
    row_limit: Option<u64>,
    fan_out: FanOut,
    reporters: Vec<Box<dyn Reporter>>,
    destinations: Vec<(Arc<dyn Destination>, DestinationConfig)>,
    overrides: HashMap<String, DestinationSettings>,
}

impl JobBuilder {
    pub fn new(processor: impl Processor + 'static) -> Self {
        Self {
            processor: Box::new(processor),
            job_name: None,
            row_limit: None,
            fan_out: FanOut::default(),
            reporters: Vec::new(),
            destinations: Vec::new(),
            overrides: HashMap::new(),
        }
    }

    pub fn name(mut self, name: impl Into<String>) -> Self {
        self.job_name = Some(name.into());
        self
    }

    /// Overrides the processor's own limit; 0 means unlimited.
    pub fn row_limit(mut self, limit: u64) -> Self {
        self.row_limit = Some(limit);
        self
    }

    pub fn fan_out(mut self, fan_out: FanOut) -> Self {
        self.fan_out = fan_out;
        self
    }

    /// Reporters attach in the order they are added.
    pub fn reporter(mut self, reporter: impl Reporter + 'static) -> Self {
        self.reporters.push(Box::new(reporter));
        self
    }

    pub fn destination(self, destination: impl Destination + 'static) -> Self {
        let config = destination.config();
        self.destination_with(destination, config)
    }

    pub fn destination_with(mut self, destination: impl Destination + 'static, config: DestinationConfig) -> Self {
        self.destinations.push((Arc::new(destination), config));
        self
    }

    /// Apply a loaded job config. Destination overrides are matched by name
    /// when the job is built, so this may be called before or after adding
    /// destinations.
    pub fn config(mut self, config: &JobConfig) -> Self {
        if let Some(name) = &config.job {
            self.job_name = Some(name.clone());
        }
        if let Some(limit) = config.row_limit {
            self.row_limit = Some(limit);
        }
        self.fan_out = config.fan_out;
        for (name, settings) in &config.destinations {
            self.overrides.insert(name.clone(), settings.clone());
        }
        self
    }

    pub fn build(self) -> Result<Job, BuildError> {
        if self.destinations.is_empty() {
            return Err(BuildError::NoDestination);
        }

        let mut seen = std::collections::HashSet::new();
        for (destination, _) in &self.destinations {
            if !seen.insert(destination.name()) {
                return Err(BuildError::DuplicateDestination(destination.name().to_string()));
            }
        }

        for name in self.overrides.keys() {
            if !seen.contains(name.as_str()) {
                tracing::warn!(destination = %name, "config override matches no destination");
            }
        }

        let overrides = self.overrides;
        let destinations = self
            .destinations
            .into_iter()
            .map(|(destination, config)| {
                let config = match overrides.get(destination.name()) {
                    Some(settings) => settings.apply(config),
                    None => config,
                };
                (destination, config)
            })
            .collect();

        Ok(Job::from_parts(
            self.processor,
            destinations,
            JobOptions {
                reporters: self.reporters,
                job_name: self.job_name,
                row_limit: self.row_limit,
                fan_out: self.fan_out,
            },
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::loader::parse_job;
    use crate::events::event::{EventName, EventPayload};
    use crate::processors::iter::IterProcessor;
    use async_trait::async_trait;
    use rowflow_utils::BoxError;
    use serde_json::{json, Value};
    use std::sync::Mutex;

    struct Sink {
        name: &'static str,
        loads: Arc<Mutex<Vec<Value>>>,
    }

    impl Sink {
        fn new(name: &'static str) -> (Self, Arc<Mutex<Vec<Value>>>) {
            let loads = Arc::new(Mutex::new(Vec::new()));
            (Self { name, loads: loads.clone() }, loads)
        }
    }

    #[async_trait]
    impl Destination for Sink {
        fn name(&self) -> &str { self.name }
        fn config(&self) -> DestinationConfig { DestinationConfig::batched(10) }
        async fn load_batch(&self, data: Value) -> Result<(), BoxError> {
            self.loads.lock().unwrap().push(data);
            Ok(())
        }
    }

    #[test]
    fn builder_requires_destination() {
        let result = JobBuilder::new(IterProcessor::new(Vec::<Value>::new())).build();
        assert!(matches!(result, Err(BuildError::NoDestination)));
    }

    #[test]
    fn builder_rejects_duplicate_destination_names() {
        let (a, _) = Sink::new("warehouse");
        let (b, _) = Sink::new("warehouse");
        let result = JobBuilder::new(IterProcessor::new(Vec::<Value>::new()))
            .destination(a)
            .destination(b)
            .build();
        assert!(matches!(result, Err(BuildError::DuplicateDestination(ref n)) if n == "warehouse"));
    }

    #[tokio::test]
    async fn config_overrides_apply_by_destination_name() {
        let config = parse_job(
            r#"
job: configured
row_limit: 4
destinations:
  warehouse:
    batch_size: 2
  audit:
    disable_load: true
"#,
        )
        .unwrap();

        let (warehouse, warehouse_loads) = Sink::new("warehouse");
        let (audit, audit_loads) = Sink::new("audit");

        let job = JobBuilder::new(IterProcessor::new((1..=10).map(|n| json!(n))))
            .config(&config)
            .destination(warehouse)
            .destination(audit)
            .build()
            .unwrap();

        let names = Arc::new(Mutex::new(None));
        let sink = names.clone();
        job.on(EventName::StartProcessing, move |payload| {
            let sink = sink.clone();
            async move {
                if let EventPayload::StartProcessing { destinations, .. } = payload {
                    *sink.lock().unwrap() = Some(destinations);
                }
                Ok(())
            }
        });
        assert_eq!(job.handle().job_name(), Some("configured"));

        job.run().await.unwrap();

        assert_eq!(
            *warehouse_loads.lock().unwrap(),
            vec![json!([1, 2]), json!([3, 4])]
        );
        assert!(audit_loads.lock().unwrap().is_empty());
        assert_eq!(
            names.lock().unwrap().clone().unwrap(),
            vec!["warehouse".to_string(), "audit".to_string()]
        );
    }
}
