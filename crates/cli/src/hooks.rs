//! Tab setup and reset run by the pool around each tab's lifetime.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tabpool::{CdpSession, PoolError, SessionHooks};
use tracing::{debug, warn};

const READY_POLL: Duration = Duration::from_millis(100);

/// Waits for the base page to be ready before a tab joins the pool and runs
/// an optional reset script before it goes back.
#[derive(Debug, Clone)]
pub struct PageHooks {
	/// Expression polled until it evaluates to `true`.
	pub ready_check: String,
	/// Evaluated once after the page is ready.
	pub setup_script: Option<String>,
	pub reset_script: Option<String>,
	pub admit_timeout: Duration,
}

impl Default for PageHooks {
	fn default() -> Self {
		Self {
			ready_check: "document.readyState === 'complete'".to_string(),
			setup_script: None,
			reset_script: None,
			admit_timeout: Duration::from_secs(10),
		}
	}
}

impl PageHooks {
	async fn prepare(&self, tab: &CdpSession) -> tabpool_runtime::Result<()> {
		while tab.evaluate(&self.ready_check).await? != Value::Bool(true) {
			tokio::time::sleep(READY_POLL).await;
		}
		if let Some(script) = &self.setup_script {
			tab.evaluate(script).await?;
		}
		Ok(())
	}
}

#[async_trait]
impl SessionHooks<CdpSession> for PageHooks {
	async fn admit(&self, tab: &CdpSession) -> bool {
		match tokio::time::timeout(self.admit_timeout, self.prepare(tab)).await {
			Ok(Ok(())) => {
				debug!(target = "tabpool.hooks", target_id = tab.target_id(), "tab ready");
				true
			}
			Ok(Err(err)) => {
				warn!(target = "tabpool.hooks", target_id = tab.target_id(), error = %err, "tab setup failed");
				false
			}
			Err(_) => {
				warn!(
					target = "tabpool.hooks",
					target_id = tab.target_id(),
					timeout_ms = self.admit_timeout.as_millis() as u64,
					"tab setup timed out"
				);
				false
			}
		}
	}

	async fn before_return(&self, tab: &CdpSession) -> tabpool::Result<()> {
		if let Some(script) = &self.reset_script {
			tab.evaluate(script).await.map_err(reset_failed)?;
		}
		Ok(())
	}
}

fn reset_failed(err: tabpool_runtime::Error) -> PoolError {
	PoolError::Hook(format!("reset script failed: {err}"))
}
