//! HTTP delivery, health probe, and shutdown behaviour against a mock consumer.

// std
use std::{
	net::TcpListener,
	sync::{Arc, Mutex},
	time::Duration,
};
// crates.io
use event_propagator::{
	ClientConfig, DeliveryRequest, HttpClient, MetricsSink, MetricsSummary, Payload, Result,
	RetryPolicy, Scheduler, Settings, Transient, WindowMetrics, stop_when,
};
use serde_json::json;
use tokio::time::Instant;
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{body_json, method, path},
};

fn payload() -> Arc<Payload> {
	match json!({ "type": "order.created", "id": 7 }) {
		serde_json::Value::Object(object) => Arc::new(object),
		_ => unreachable!(),
	}
}

fn request(url: Url) -> DeliveryRequest {
	DeliveryRequest { tick: 0, ideal_time: Instant::now(), url, payload: payload() }
}

fn fast_retry_config() -> ClientConfig {
	ClientConfig {
		request_timeout: Duration::from_secs(2),
		retry_policy: RetryPolicy::new(3, [Duration::from_millis(5), Duration::from_millis(10)].to_vec()),
		..Default::default()
	}
}

fn closed_port_url(path: &str) -> Url {
	let listener = TcpListener::bind("127.0.0.1:0").expect("bind");
	let port = listener.local_addr().expect("addr").port();

	drop(listener);

	Url::parse(&format!("http://127.0.0.1:{port}{path}")).expect("url")
}

#[tokio::test]
async fn successful_delivery_is_recorded_as_success() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/events"))
		.and(body_json(json!({ "type": "order.created", "id": 7 })))
		.respond_with(ResponseTemplate::new(201))
		.expect(1)
		.mount(&server)
		.await;

	let metrics = Arc::new(WindowMetrics::with_capacity(10));
	let client = HttpClient::new(ClientConfig::default())?.with_metrics(metrics.clone());
	let url = Url::parse(&format!("{}/events", server.uri()))?;
	let response = client.deliver(&request(url)).await?;
	let summary = metrics.summary();
	let window = summary.window().expect("window");

	assert_eq!(response.status(), 201);
	assert_eq!(window.last_status, Some(201));
	assert_eq!(window.failure_pct, 0.0);
	assert_eq!(window.total_seen, 1);

	client.close();
	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn error_status_is_returned_and_counted_as_failure_without_retry() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/events"))
		.respond_with(ResponseTemplate::new(500).set_body_string("boom"))
		.expect(1)
		.mount(&server)
		.await;

	let metrics = Arc::new(WindowMetrics::with_capacity(10));
	let client = HttpClient::new(fast_retry_config())?.with_metrics(metrics.clone());
	let url = Url::parse(&format!("{}/events", server.uri()))?;
	let response = client.deliver(&request(url)).await?;
	let summary = metrics.summary();
	let window = summary.window().expect("window");

	assert_eq!(response.status(), 500);
	assert_eq!(window.last_status, Some(500));
	assert_eq!(window.failure_pct, 100.0);

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn delivery_without_a_sink_skips_recording() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(202))
		.expect(1)
		.mount(&server)
		.await;

	let client = HttpClient::new(ClientConfig::default())?;
	let url = Url::parse(&format!("{}/events", server.uri()))?;
	let response = client.deliver(&request(url)).await?;

	assert_eq!(response.status(), 202);
	assert!(client.metrics().is_none());

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn unreachable_consumer_exhausts_retries_and_records_failure() -> Result<()> {
	let metrics = Arc::new(WindowMetrics::with_capacity(10));
	let client = HttpClient::new(fast_retry_config())?.with_metrics(metrics.clone());
	let err = client
		.deliver(&request(closed_port_url("/events")))
		.await
		.expect_err("nothing listens on the port");
	let summary = metrics.summary();
	let window = summary.window().expect("window");

	assert!(err.is_transient());
	assert!(err.is_unreachable());
	assert_eq!(window.last_status, None);
	assert_eq!(window.failure_pct, 100.0);
	assert_eq!(window.total_seen, 1);

	Ok(())
}

#[tokio::test]
async fn timed_out_delivery_is_transient_but_not_unreachable() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(2)))
		.expect(2)
		.mount(&server)
		.await;

	let config = ClientConfig {
		request_timeout: Duration::from_millis(100),
		retry_policy: RetryPolicy::new(2, [Duration::from_millis(5)].to_vec()),
		..Default::default()
	};
	let metrics = Arc::new(WindowMetrics::with_capacity(10));
	let client = HttpClient::new(config)?.with_metrics(metrics.clone());
	let url = Url::parse(&format!("{}/events", server.uri()))?;
	let err = client.deliver(&request(url)).await.expect_err("consumer answers too late");
	let summary = metrics.summary();
	let window = summary.window().expect("window");

	assert!(err.is_transient());
	assert!(!err.is_unreachable());
	assert_eq!(window.last_status, None);
	assert_eq!(window.total_seen, 1);

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn shutdown_cancels_slow_deliveries_without_recording_them() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("POST"))
		.and(path("/events"))
		.respond_with(ResponseTemplate::new(201).set_delay(Duration::from_secs(5)))
		.mount(&server)
		.await;

	let metrics = Arc::new(WindowMetrics::with_capacity(10));
	let client = Arc::new(HttpClient::new(ClientConfig::default())?.with_metrics(metrics.clone()));
	let url = Url::parse(&format!("{}/events", server.uri()))?;
	let settings = Settings::new(Duration::from_millis(50), url, vec![(*payload()).clone()]);
	let polls = Mutex::new(0_u32);
	let stop = stop_when(move || {
		let mut polls = polls.lock().expect("polls");

		*polls += 1;

		*polls > 2
	});
	let started = Instant::now();
	let report = Scheduler::new(settings, client).run(&stop).await?;

	assert_eq!(report.ticks, 2);
	assert_eq!(report.cancelled, report.ticks);
	assert_eq!(report.settled(), report.ticks);
	assert_eq!(metrics.summary(), MetricsSummary::Waiting);
	assert!(started.elapsed() < Duration::from_secs(5), "drain waited for the consumer");

	Ok(())
}

#[tokio::test]
async fn health_check_reports_consumer_status() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/health"))
		.respond_with(ResponseTemplate::new(200))
		.mount(&server)
		.await;
	Mock::given(method("GET"))
		.and(path("/degraded"))
		.respond_with(ResponseTemplate::new(503))
		.expect(1)
		.mount(&server)
		.await;

	let client = HttpClient::new(ClientConfig::default())?;
	let timeout = Duration::from_secs(2);
	let healthy = Url::parse(&format!("{}/health", server.uri()))?;
	let degraded = Url::parse(&format!("{}/degraded", server.uri()))?;

	assert!(client.probe(&healthy, timeout, 5).await);
	assert!(!client.probe(&degraded, timeout, 5).await);
	assert!(!client.probe(&closed_port_url("/health"), timeout, 1).await);

	server.verify().await;

	Ok(())
}
