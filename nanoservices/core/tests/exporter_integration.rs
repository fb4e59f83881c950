use std::net::TcpListener;
use std::time::Duration;
use reqwest::blocking::Client;
use std::thread;

use rowflow_core::metrics;

#[test]
fn exporter_serves_metrics() {
    // Bind to port 0 so the OS assigns an available port.
    let std_listener = TcpListener::bind("127.0.0.1:0").expect("failed to bind");
    let addr = std_listener.local_addr().unwrap();

    let (handle, shutdown_tx) = metrics::start_exporter(std_listener);

    metrics::inc_rows("exporter_job");
    metrics::inc_destination_failure("exporter_job", "warehouse", "transform");

    // Wait briefly for the server to start
    thread::sleep(Duration::from_millis(100));

    let url = format!("http://{}:{}/metrics", addr.ip(), addr.port());
    let client = Client::builder().timeout(Duration::from_secs(2)).build().unwrap();
    let resp = client.get(&url).send().expect("failed to query metrics");
    assert!(resp.status().is_success());
    let body_text = resp.text().expect("failed to read body");

    assert!(body_text.contains("rowflow_rows_processed_total"), "metrics output missing rows metric: {}", body_text);
    assert!(body_text.contains("exporter_job"), "metrics output missing our label: {}", body_text);
    assert!(body_text.contains("stage=\"transform\""), "metrics output missing stage label: {}", body_text);

    let missing = client
        .get(format!("http://{}:{}/health", addr.ip(), addr.port()))
        .send()
        .expect("failed to query unknown path");
    assert_eq!(missing.status(), reqwest::StatusCode::NOT_FOUND);

    shutdown_tx.send(()).expect("failed to send shutdown");
    thread::sleep(Duration::from_millis(50));
    handle.abort();
}
