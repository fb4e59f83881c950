use prometheus::{CounterVec, Encoder, HistogramOpts, HistogramVec, Opts, Registry, TextEncoder};
use once_cell::sync::Lazy;
use std::net::TcpListener;
use tokio::task::JoinHandle;
use std::convert::Infallible;
use hyper::{Body, Request, Response, Method, StatusCode};
use hyper::service::service_fn;

// Global registry and metrics are initialized lazily.
static REGISTRY: Lazy<Registry> = Lazy::new(|| {
    Registry::new_custom(Some("rowflow".to_string()), None).expect("valid registry prefix")
});

fn counter(name: &str, help: &str, labels: &[&str]) -> CounterVec {
    let c = CounterVec::new(Opts::new(name, help), labels).expect("valid counter definition");
    REGISTRY.register(Box::new(c.clone())).ok();
    c
}

static ROWS_PROCESSED: Lazy<CounterVec> =
    Lazy::new(|| counter("rows_processed_total", "Rows fanned out to every destination", &["job"]));

static RECORDS_GENERATED: Lazy<CounterVec> = Lazy::new(|| {
    counter("records_generated_total", "Records generated for a destination", &["job", "destination"])
});

static BATCHES_LOADED: Lazy<CounterVec> = Lazy::new(|| {
    counter("batches_loaded_total", "Batches loaded successfully", &["job", "destination"])
});

static BATCH_FAILURES: Lazy<CounterVec> = Lazy::new(|| {
    counter(
        "destination_failures_total",
        "Destination-scoped failures by stage (generate, transform, load)",
        &["job", "destination", "stage"],
    )
});

static PROCESSING_ERRORS: Lazy<CounterVec> =
    Lazy::new(|| counter("processing_errors_total", "Job-fatal processing errors", &["job"]));

static JOB_DURATION_MS: Lazy<HistogramVec> = Lazy::new(|| {
    let opts = HistogramOpts::new("job_duration_ms", "Job run duration in milliseconds");
    let hist = HistogramVec::new(opts, &["job"]).expect("valid histogram definition");
    REGISTRY.register(Box::new(hist.clone())).ok();
    hist
});

pub fn inc_rows(job: &str) {
    ROWS_PROCESSED.with_label_values(&[job]).inc();
}

pub fn inc_records(job: &str, destination: &str) {
    RECORDS_GENERATED.with_label_values(&[job, destination]).inc();
}

pub fn inc_batches_loaded(job: &str, destination: &str) {
    BATCHES_LOADED.with_label_values(&[job, destination]).inc();
}

/// `stage` is one of `generate`, `transform` or `load`.
pub fn inc_destination_failure(job: &str, destination: &str, stage: &str) {
    BATCH_FAILURES.with_label_values(&[job, destination, stage]).inc();
}

pub fn inc_processing_error(job: &str) {
    PROCESSING_ERRORS.with_label_values(&[job]).inc();
}

pub fn observe_duration(job: &str, duration_ms: f64) {
    JOB_DURATION_MS.with_label_values(&[job]).observe(duration_ms);
}

/// Gather metrics as text in Prometheus exposition format.
///
/// # Example
///
/// ```no_run
/// use rowflow_core::metrics;
/// metrics::inc_rows("example_job");
/// let body = metrics::gather_text();
/// println!("metrics:\n{}", body);
/// ```
pub fn gather_text() -> String {
    let metric_families = REGISTRY.gather();
    let mut buffer = vec![];
    if let Err(e) = TextEncoder::new().encode(&metric_families, &mut buffer) {
        tracing::error!(error = ?e, "failed to encode metrics");
        return String::new();
    }
    String::from_utf8(buffer).unwrap_or_default()
}

/// Start an HTTP exporter task that serves `/metrics` and supports graceful shutdown.
///
/// The server runs on a dedicated Tokio runtime and stops accepting new
/// connections when `shutdown` resolves. The returned handle can be aborted.
///
/// ```no_run
/// use std::net::TcpListener;
/// use rowflow_core::metrics;
///
/// let listener = TcpListener::bind("127.0.0.1:0").unwrap();
/// let shutdown = async { let _ = tokio::signal::ctrl_c().await; };
/// let _handle = metrics::start_exporter_with_shutdown(listener, shutdown);
/// ```
pub fn start_exporter_with_shutdown<F>(listener: TcpListener, shutdown: F) -> JoinHandle<()>
where
    F: std::future::Future<Output = ()> + Send + 'static,
{
    // The runtime is leaked so the exporter outlives the caller's runtime.
    let rt = tokio::runtime::Builder::new_multi_thread()
        .worker_threads(1)
        .enable_all()
        .build()
        .expect("failed to create tokio runtime for exporter");

    let join = rt.handle().spawn(async move {
        if let Err(e) = listener.set_nonblocking(true) {
            tracing::error!(error = ?e, "failed to set listener to non-blocking");
            return;
        }

        let mut shutdown_fut = Box::pin(shutdown);
        let tcp_listener = match tokio::net::TcpListener::from_std(listener) {
            Ok(l) => l,
            Err(e) => {
                tracing::error!(error = ?e, "failed to convert listener to tokio listener");
                return;
            }
        };

        loop {
            tokio::select! {
                _ = &mut shutdown_fut => {
                    tracing::info!("metrics exporter shutdown requested");
                    break;
                }
                accept = tcp_listener.accept() => {
                    match accept {
                        Ok((stream, _peer)) => {
                            let svc = service_fn(|req: Request<Body>| async move {
                                let response = match (req.method(), req.uri().path()) {
                                    (&Method::GET, "/metrics") => {
                                        let mut response = Response::new(Body::from(gather_text()));
                                        response.headers_mut().insert(
                                            hyper::header::CONTENT_TYPE,
                                            hyper::header::HeaderValue::from_static("text/plain; version=0.0.4"),
                                        );
                                        response
                                    }
                                    _ => {
                                        let mut response = Response::new(Body::empty());
                                        *response.status_mut() = StatusCode::NOT_FOUND;
                                        response
                                    }
                                };
                                Ok::<_, Infallible>(response)
                            });

                            tokio::spawn(async move {
                                if let Err(err) = hyper::server::conn::Http::new().serve_connection(stream, svc).await {
                                    tracing::error!(error = ?err, "connection serve error");
                                }
                            });
                        }
                        Err(e) => {
                            tracing::error!(error = ?e, "failed to accept connection on metrics listener");
                            break;
                        }
                    }
                }
            }
        }

        tracing::info!("metrics exporter stopped");
    });

    Box::leak(Box::new(rt));
    join
}

/// Start the exporter and return a oneshot sender that requests shutdown.
pub fn start_exporter(listener: TcpListener) -> (JoinHandle<()>, tokio::sync::oneshot::Sender<()>) {
    let (tx, rx) = tokio::sync::oneshot::channel();
    let handle = start_exporter_with_shutdown(listener, async move { let _ = rx.await; });
    (handle, tx)
}
