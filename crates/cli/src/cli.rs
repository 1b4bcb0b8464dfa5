use std::path::PathBuf;

use clap::{Args, Parser, Subcommand};

use crate::config::DEFAULT_ENDPOINT;

#[derive(Parser, Debug)]
#[command(name = "tabpool")]
#[command(about = "Keep a pool of warm browser tabs on a DevTools endpoint")]
#[command(version)]
pub struct Cli {
	/// Increase verbosity (-v info, -vv debug, -vvv trace)
	#[arg(short, long, global = true, action = clap::ArgAction::Count)]
	pub verbose: u8,

	#[command(subcommand)]
	pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
	/// Keep a pool warm and log its status until interrupted
	Run {
		#[command(flatten)]
		pool: PoolArgs,

		/// Seconds between status lines
		#[arg(long, default_value = "10", value_name = "SECS")]
		status_every: u64,
	},

	/// Visit a URL from several pooled tabs at once and print what they saw
	Probe {
		#[command(flatten)]
		pool: PoolArgs,

		url: String,

		/// Concurrent visits
		#[arg(short = 'n', long, default_value = "4")]
		count: usize,
	},

	/// Print the browser version behind an endpoint
	Version {
		/// DevTools endpoint (ws:// debugger URL or http://host:port)
		#[arg(long, default_value = DEFAULT_ENDPOINT)]
		endpoint: String,
	},
}

/// Pool settings. Flags override values from `--config`.
#[derive(Args, Debug, Clone, Default)]
pub struct PoolArgs {
	/// JSON settings file (camelCase keys, all optional)
	#[arg(long, value_name = "FILE")]
	pub config: Option<PathBuf>,

	/// DevTools endpoint (ws:// debugger URL or http://host:port)
	#[arg(long)]
	pub endpoint: Option<String>,

	/// Page every new tab opens on
	#[arg(long)]
	pub base_url: Option<String>,

	/// Tabs opened at startup
	#[arg(long)]
	pub min: Option<usize>,

	/// Upper bound on open tabs
	#[arg(long)]
	pub max: Option<usize>,

	/// Retire tabs older than this
	#[arg(long, value_name = "SECS")]
	pub ttl: Option<u64>,

	/// Retire tabs after this many uses
	#[arg(long)]
	pub max_uses: Option<u32>,

	/// Pause between maintenance cycles
	#[arg(long, value_name = "MS")]
	pub interval_ms: Option<u64>,

	/// Reconnect attempts before a cycle gives up
	#[arg(long)]
	pub reconnect_attempts: Option<u32>,

	/// Script evaluated in a tab before it goes back to the pool
	#[arg(long, value_name = "JS")]
	pub reset_script: Option<String>,
}
