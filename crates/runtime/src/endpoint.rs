//! DevTools endpoint resolution.
//!
//! Pools are configured with whatever address the operator has at hand: a
//! browser websocket (`ws://127.0.0.1:9222/devtools/browser/<id>`), a gateway
//! websocket (`ws://localhost:3000/?timeout=...`), or a plain debugging port
//! (`http://127.0.0.1:9222`). Websocket URLs pass through untouched; HTTP
//! endpoints are resolved through `/json/version`.

use std::time::Duration;

use tabpool_protocol::VersionInfo;
use tracing::debug;
use url::Url;

use crate::error::{Error, Result};

const DISCOVERY_TIMEOUT: Duration = Duration::from_secs(2);

/// Resolves `endpoint` to a websocket URL suitable for [`WebSocketTransport::connect`](crate::transport::WebSocketTransport::connect).
pub async fn resolve_ws_endpoint(endpoint: &str) -> Result<String> {
	let url = Url::parse(endpoint).map_err(|e| Error::InvalidEndpoint(format!("{endpoint}: {e}")))?;
	match url.scheme() {
		"ws" | "wss" => Ok(endpoint.to_string()),
		"http" | "https" => Ok(fetch_version_info(&url).await?.web_socket_debugger_url),
		other => Err(Error::InvalidEndpoint(format!("unsupported scheme '{other}' in {endpoint}"))),
	}
}

/// Fetches `/json/version` from an HTTP debugging endpoint.
///
/// `localhost` is also tried as `127.0.0.1` and `[::1]`, since browsers often
/// bind only one address family. Other hosts are tried as given.
pub async fn fetch_version_info(base: &Url) -> Result<VersionInfo> {
	let client = reqwest::Client::builder()
		.timeout(DISCOVERY_TIMEOUT)
		.build()
		.map_err(|e| Error::Discovery(format!("failed to create HTTP client: {e}")))?;

	let mut last_error = "no response".to_string();
	for candidate in discovery_urls(base)? {
		let response = match client.get(candidate.clone()).send().await {
			Ok(response) => response,
			Err(e) => {
				debug!(target = "tabpool.endpoint", url = %candidate, error = %e, "discovery attempt failed");
				last_error = e.to_string();
				continue;
			}
		};

		if !response.status().is_success() {
			last_error = format!("unexpected status {}", response.status());
			continue;
		}

		return response
			.json::<VersionInfo>()
			.await
			.map_err(|e| Error::Discovery(format!("failed to parse {candidate}: {e}")));
	}

	Err(Error::Discovery(format!("{base}: {last_error}")))
}

fn discovery_urls(base: &Url) -> Result<Vec<Url>> {
	let version = base
		.join("/json/version")
		.map_err(|e| Error::InvalidEndpoint(format!("{base}: {e}")))?;

	let mut urls = vec![version.clone()];
	if version.host_str() == Some("localhost") {
		for host in ["127.0.0.1", "[::1]"] {
			let mut alt = version.clone();
			if alt.set_host(Some(host)).is_ok() {
				urls.push(alt);
			}
		}
	}
	Ok(urls)
}
