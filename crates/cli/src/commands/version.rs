use std::sync::Arc;

use anyhow::{Context, Result};
use serde::Serialize;
use tabpool_protocol::GetVersion;
use tabpool_runtime::{CdpConnection, DEFAULT_REQUEST_TIMEOUT, WebSocketTransport, resolve_ws_endpoint};
use tracing::debug;

use crate::output::{ResultBuilder, print_result};

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct VersionReport {
	endpoint: String,
	web_socket_url: String,
	product: String,
	protocol_version: String,
	user_agent: String,
}

pub async fn execute(endpoint: &str) -> Result<()> {
	let builder = ResultBuilder::new("version");
	let ws_url = resolve_ws_endpoint(endpoint)
		.await
		.with_context(|| format!("resolving {endpoint}"))?;
	debug!(target = "tabpool", url = %ws_url, "connecting");

	let (transport, message_rx) = WebSocketTransport::connect(&ws_url)
		.await
		.with_context(|| format!("connecting to {ws_url}"))?;
	let connection = Arc::new(CdpConnection::new(transport.into_transport_parts(message_rx), DEFAULT_REQUEST_TIMEOUT));
	let reader = tokio::spawn({
		let connection = connection.clone();
		async move { connection.run().await }
	});

	let version = connection.call(&GetVersion {}, None).await;
	connection.close().await;
	reader.abort();
	let version = version.context("Browser.getVersion")?;

	print_result(
		&builder
			.data(VersionReport {
				endpoint: endpoint.to_string(),
				web_socket_url: ws_url,
				product: version.product,
				protocol_version: version.protocol_version,
				user_agent: version.user_agent,
			})
			.build(),
	)
}
