use std::sync::Arc;
use std::time::Instant;

use anyhow::Result;
use futures_util::future::join_all;
use serde::Serialize;
use serde_json::Value;
use tabpool::{PoolError, PoolStatus};
use tracing::{debug, info};

use crate::config::Settings;
use crate::output::{ResultBuilder, print_result};

/// Resolves with the title once the page has loaded.
const TITLE_AFTER_LOAD: &str = r#"new Promise(resolve => {
	const done = () => resolve(document.title);
	if (document.readyState === 'complete') done();
	else window.addEventListener('load', done, { once: true });
})"#;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct Visit {
	target_id: Option<String>,
	title: Option<Value>,
	error: Option<String>,
	elapsed_ms: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ProbeReport {
	url: String,
	visits: Vec<Visit>,
	status: PoolStatus,
}

pub async fn execute(settings: &Settings, url: &str, count: usize) -> Result<()> {
	let builder = ResultBuilder::new("probe");
	let pool = Arc::new(settings.build_pool()?);
	pool.start().await?;
	info!(target = "tabpool", %url, count, "probing");

	let visits = (0..count).map(|_| {
		let pool = pool.clone();
		let url = url.to_string();
		async move {
			let started = Instant::now();
			let outcome = pool
				.with_session(move |tab| {
					Box::pin(async move {
						tab.navigate(&url).await?;
						let title = tab.evaluate(TITLE_AFTER_LOAD).await?;
						Ok::<_, PoolError>((tab.target_id().to_string(), title))
					})
				})
				.await;
			let elapsed_ms = started.elapsed().as_millis() as u64;
			match outcome {
				Ok((target_id, title)) => Visit {
					target_id: Some(target_id),
					title: Some(title),
					error: None,
					elapsed_ms,
				},
				Err(err) => {
					debug!(target = "tabpool", error = %err, "visit failed");
					Visit {
						target_id: None,
						title: None,
						error: Some(err.to_string()),
						elapsed_ms,
					}
				}
			}
		}
	});
	let visits = join_all(visits).await;

	let report = ProbeReport {
		url: url.to_string(),
		status: pool.status(),
		visits,
	};
	pool.shutdown().await;

	let failed = report.visits.iter().filter(|visit| visit.error.is_some()).count();
	let result = if failed == 0 {
		builder.data(report).build()
	} else {
		builder.error(format!("{failed} of {count} visits failed")).data(report).build()
	};
	print_result(&result)
}
