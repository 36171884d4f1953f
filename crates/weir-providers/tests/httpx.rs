//! Behavioral tests for the outbound HTTP client against a local listener.

use std::{
	sync::{
		Arc,
		atomic::{AtomicUsize, Ordering},
	},
	time::Duration,
};

use tokio::{
	io::{AsyncReadExt, AsyncWriteExt},
	net::TcpListener,
};
use weir_providers::{Error, HttpClient, HttpOptions};

/// Serves a fixed status to every connection and counts requests.
async fn spawn_status_server(status: u16) -> (String, Arc<AtomicUsize>) {
	let listener = TcpListener::bind("127.0.0.1:0").await.expect("listener must bind");
	let addr = listener.local_addr().expect("listener must have an address");
	let hits = Arc::new(AtomicUsize::new(0));
	let counter = hits.clone();

	tokio::spawn(async move {
		loop {
			let Ok((mut stream, _)) = listener.accept().await else { break };

			counter.fetch_add(1, Ordering::SeqCst);

			let response = format!(
				"HTTP/1.1 {status} Status\r\ncontent-length: 0\r\nconnection: close\r\n\r\n"
			);

			tokio::spawn(async move {
				let mut buf = [0_u8; 4096];
				let _ = stream.read(&mut buf).await;
				let _ = stream.write_all(response.as_bytes()).await;
				let _ = stream.shutdown().await;
			});
		}
	});

	(format!("http://{addr}/"), hits)
}

fn fast_options() -> HttpOptions {
	HttpOptions {
		retry: 2,
		backoff_min: Duration::from_millis(1),
		backoff_max: Duration::from_millis(2),
		max_consecutive_failures: 3,
		circuit_open: Duration::from_secs(1),
		..Default::default()
	}
}

#[tokio::test]
async fn server_errors_are_retried_per_attempt() {
	let (url, hits) = spawn_status_server(500).await;
	let client = HttpClient::new(fast_options()).expect("client must build");
	let request = client.get(&url).build().expect("request must build");
	let result = client.execute(request).await;

	assert!(matches!(result, Err(Error::UnexpectedStatus { status: 500, .. })));
	assert_eq!(hits.load(Ordering::SeqCst), 3);
}

#[tokio::test]
async fn circuit_opens_after_threshold_and_recovers() {
	let (url, hits) = spawn_status_server(500).await;
	let client = HttpClient::new(fast_options()).expect("client must build");

	// One call, three failing attempts, threshold three: circuit opens.
	let request = client.get(&url).build().expect("request must build");
	let _ = client.execute(request).await;

	assert_eq!(hits.load(Ordering::SeqCst), 3);

	// While open, no I/O happens.
	let request = client.get(&url).build().expect("request must build");
	let result = client.execute(request).await;

	assert!(matches!(result, Err(Error::CircuitOpen)));
	assert_eq!(hits.load(Ordering::SeqCst), 3);

	// After the open window, calls attempt I/O again.
	tokio::time::sleep(Duration::from_millis(1_100)).await;

	let request = client.get(&url).build().expect("request must build");
	let result = client.execute(request).await;

	assert!(!matches!(result, Err(Error::CircuitOpen)));
	assert!(hits.load(Ordering::SeqCst) > 3);
}

#[tokio::test]
async fn client_errors_pass_through_without_retry() {
	let (url, hits) = spawn_status_server(404).await;
	let client = HttpClient::new(fast_options()).expect("client must build");
	let request = client.get(&url).build().expect("request must build");
	let response = client.execute(request).await.expect("4xx responses are returned as-is");

	assert_eq!(response.status().as_u16(), 404);
	assert_eq!(hits.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn success_resets_the_failure_counter() {
	let (bad_url, _) = spawn_status_server(500).await;
	let (good_url, _) = spawn_status_server(200).await;
	let options = HttpOptions { retry: 0, ..fast_options() };
	let client = HttpClient::new(options).expect("client must build");

	// Two failures, then a success, then two more failures: the circuit must
	// stay closed because the success reset the run.
	for _ in 0..2 {
		let request = client.get(&bad_url).build().expect("request must build");
		let _ = client.execute(request).await;
	}

	let request = client.get(&good_url).build().expect("request must build");

	assert!(client.execute(request).await.is_ok());

	for _ in 0..2 {
		let request = client.get(&bad_url).build().expect("request must build");
		let result = client.execute(request).await;

		assert!(!matches!(result, Err(Error::CircuitOpen)));
	}
}

#[tokio::test]
async fn disallowed_host_is_rejected_before_io() {
	let (url, hits) = spawn_status_server(200).await;
	let options = HttpOptions {
		host_allowlist: vec!["*.internal".to_string()],
		..fast_options()
	};
	let client = HttpClient::new(options).expect("client must build");
	let request = client.get(&url).build().expect("request must build");
	let result = client.execute(request).await;

	assert!(matches!(result, Err(Error::HostNotAllowed { .. })));
	assert_eq!(hits.load(Ordering::SeqCst), 0);
}

#[tokio::test]
async fn empty_allowlist_allows_any_host() {
	let (url, _) = spawn_status_server(200).await;
	let client = HttpClient::new(fast_options()).expect("client must build");
	let request = client.get(&url).build().expect("request must build");

	assert!(client.execute(request).await.is_ok());
}
