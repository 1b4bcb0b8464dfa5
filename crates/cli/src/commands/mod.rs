mod probe;
mod run;
mod version;

use std::time::Duration;

use anyhow::Result;

use crate::cli::Commands;
use crate::config::Settings;

pub async fn dispatch(command: Commands) -> Result<()> {
	match command {
		Commands::Run { pool, status_every } => {
			let settings = Settings::resolve(&pool)?;
			run::execute(&settings, Duration::from_secs(status_every.max(1))).await
		}
		Commands::Probe { pool, url, count } => {
			let settings = Settings::resolve(&pool)?;
			probe::execute(&settings, &url, count).await
		}
		Commands::Version { endpoint } => version::execute(&endpoint).await,
	}
}
