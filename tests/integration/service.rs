//! End-to-end runs against a mock consumer.

// std
use std::time::Duration;
// crates.io
use event_propagator::{Error, Payload, Result, ServiceOptions, Settings, service};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use url::Url;
use wiremock::{
	Mock, MockServer, ResponseTemplate,
	matchers::{method, path},
};

fn payloads() -> Vec<Payload> {
	[json!({ "kind": "created" }), json!({ "kind": "updated" }), json!({ "kind": "deleted" })]
		.into_iter()
		.filter_map(|value| match value {
			Value::Object(object) => Some(object),
			_ => None,
		})
		.collect()
}

fn options() -> ServiceOptions {
	ServiceOptions { window_size: 10, probe_attempts: 1, seed: Some(42), ..Default::default() }
}

fn cancel_after(delay: Duration) -> CancellationToken {
	let token = CancellationToken::new();
	let trigger = token.clone();

	tokio::spawn(async move {
		tokio::time::sleep(delay).await;
		trigger.cancel();
	});

	token
}

#[tokio::test]
async fn propagates_random_payloads_until_stopped() -> Result<()> {
	let _ = tracing_subscriber::fmt::try_init();

	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/health"))
		.respond_with(ResponseTemplate::new(200))
		.expect(1)
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.and(path("/events"))
		.respond_with(ResponseTemplate::new(201))
		.mount(&server)
		.await;

	let settings = Settings::new(
		Duration::from_millis(50),
		Url::parse(&format!("{}/events", server.uri()))?,
		payloads(),
	)
	.with_health_url(Url::parse(&format!("{}/health", server.uri()))?);
	let stop = cancel_after(Duration::from_millis(400));
	let report = service::run(settings, options(), &stop).await?;
	let received = server.received_requests().await.unwrap_or_default();
	let posted: Vec<Value> = received
		.iter()
		.filter(|request| request.method.as_str() == "POST")
		.map(|request| serde_json::from_slice(&request.body))
		.collect::<std::result::Result<_, _>>()?;
	let kinds = ["created", "updated", "deleted"];

	assert!(report.ticks >= 2, "{report:?}");
	assert_eq!(report.settled(), report.ticks);
	assert_eq!(report.failed, 0);
	assert!(!posted.is_empty());
	assert!(posted.len() as u64 <= report.ticks);
	assert!(posted.iter().all(|body| kinds.contains(&body["kind"].as_str().unwrap_or_default())));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn unhealthy_consumer_aborts_before_the_first_tick() -> Result<()> {
	let server = MockServer::start().await;

	Mock::given(method("GET"))
		.and(path("/health"))
		.respond_with(ResponseTemplate::new(503))
		.mount(&server)
		.await;
	Mock::given(method("POST"))
		.respond_with(ResponseTemplate::new(201))
		.expect(0)
		.mount(&server)
		.await;

	let health_url = Url::parse(&format!("{}/health", server.uri()))?;
	let settings = Settings::new(
		Duration::from_millis(10),
		Url::parse(&format!("{}/events", server.uri()))?,
		payloads(),
	)
	.with_health_url(health_url.clone());
	let stop = CancellationToken::new();
	let err = service::run(settings, options(), &stop).await.expect_err("consumer is unhealthy");

	assert!(matches!(err, Error::Unhealthy { url } if url == health_url));

	server.verify().await;

	Ok(())
}

#[tokio::test]
async fn empty_payload_set_is_rejected() {
	let settings =
		Settings::new(Duration::from_secs(1), Url::parse("http://127.0.0.1:9/events").expect("url"), Vec::new());
	let stop = CancellationToken::new();

	assert!(matches!(
		service::run(settings, options(), &stop).await,
		Err(Error::Validation { field: "payloads", .. })
	));
}
