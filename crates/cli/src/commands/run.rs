use std::time::Duration;

use anyhow::Result;
use tracing::info;

use crate::config::Settings;

pub async fn execute(settings: &Settings, status_every: Duration) -> Result<()> {
	let pool = settings.build_pool()?;
	info!(target = "tabpool", endpoint = %settings.endpoint, "starting pool");

	tokio::select! {
		started = pool.start() => started?,
		_ = tokio::signal::ctrl_c() => {
			info!(target = "tabpool", "interrupted before the pool came up");
			pool.shutdown().await;
			return Ok(());
		}
	}

	let mut ticker = tokio::time::interval(status_every);
	loop {
		tokio::select! {
			_ = ticker.tick() => {
				let status = pool.status();
				info!(
					target = "tabpool",
					phase = %status.phase,
					ready = status.ready,
					total = status.total,
					max = status.max_size,
					connected = status.host_connected,
					"pool status"
				);
			}
			_ = tokio::signal::ctrl_c() => break,
		}
	}

	info!(target = "tabpool", "shutting down");
	pool.shutdown().await;
	Ok(())
}
