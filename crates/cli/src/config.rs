//! Settings from a JSON file overlaid by command-line flags.

use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use tabpool::{CdpHost, CdpHostOptions, PoolConfig, SessionPool, Viewport};
use tabpool_runtime::DEFAULT_REQUEST_TIMEOUT;

use crate::cli::PoolArgs;
use crate::hooks::PageHooks;

pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:9222";

#[derive(Debug, Clone, Copy, Default, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct ViewportConfig {
	pub width: u32,
	pub height: u32,
}

/// Contents of a `--config` file. Every key is optional.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", deny_unknown_fields)]
pub struct FileConfig {
	pub endpoint: Option<String>,
	pub base_url: Option<String>,
	pub min_size: Option<usize>,
	pub max_size: Option<usize>,
	pub ttl_secs: Option<u64>,
	pub max_uses: Option<u32>,
	pub reconcile_interval_ms: Option<u64>,
	pub reconnect_attempts: Option<u32>,
	pub request_timeout_ms: Option<u64>,
	pub viewport: Option<ViewportConfig>,
	pub ready_check: Option<String>,
	pub setup_script: Option<String>,
	pub reset_script: Option<String>,
	pub admit_timeout_ms: Option<u64>,
}

impl FileConfig {
	pub fn load(path: &Path) -> Result<Self> {
		let raw = std::fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
		serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
	}
}

/// Everything needed to build a pool against a browser.
#[derive(Debug, Clone)]
pub struct Settings {
	pub endpoint: String,
	pub host: CdpHostOptions,
	pub pool: PoolConfig,
	pub hooks: PageHooks,
}

impl Settings {
	pub fn resolve(args: &PoolArgs) -> Result<Self> {
		let file = match &args.config {
			Some(path) => FileConfig::load(path)?,
			None => FileConfig::default(),
		};
		Self::merge(args, file)
	}

	fn merge(args: &PoolArgs, file: FileConfig) -> Result<Self> {
		let defaults = PoolConfig::default();
		let mut backoff = defaults.backoff;
		if let Some(attempts) = args.reconnect_attempts.or(file.reconnect_attempts) {
			backoff.max_attempts = attempts;
		}

		let pool = PoolConfig {
			min_size: args.min.or(file.min_size).unwrap_or(defaults.min_size),
			max_size: args.max.or(file.max_size).unwrap_or(defaults.max_size),
			ttl: args.ttl.or(file.ttl_secs).map_or(defaults.ttl, Duration::from_secs),
			max_uses: args.max_uses.or(file.max_uses).unwrap_or(defaults.max_uses),
			reconcile_interval: args
				.interval_ms
				.or(file.reconcile_interval_ms)
				.map_or(defaults.reconcile_interval, Duration::from_millis),
			backoff,
		};
		pool.validate().context("invalid pool settings")?;

		let host = CdpHostOptions {
			base_url: args.base_url.clone().or(file.base_url),
			viewport: Some(file.viewport.map_or_else(Viewport::default, |v| Viewport {
				width: v.width,
				height: v.height,
			})),
			request_timeout: file.request_timeout_ms.map_or(DEFAULT_REQUEST_TIMEOUT, Duration::from_millis),
		};

		let mut hooks = PageHooks::default();
		if let Some(check) = file.ready_check {
			hooks.ready_check = check;
		}
		hooks.setup_script = file.setup_script;
		hooks.reset_script = args.reset_script.clone().or(file.reset_script);
		if let Some(ms) = file.admit_timeout_ms {
			hooks.admit_timeout = Duration::from_millis(ms);
		}

		Ok(Self {
			endpoint: args
				.endpoint
				.clone()
				.or(file.endpoint)
				.unwrap_or_else(|| DEFAULT_ENDPOINT.to_string()),
			host,
			pool,
			hooks,
		})
	}

	pub fn build_pool(&self) -> Result<SessionPool<CdpHost>> {
		let host = CdpHost::new(self.endpoint.clone(), self.host.clone());
		SessionPool::with_hooks(host, self.hooks.clone(), self.pool.clone()).context("creating session pool")
	}
}
