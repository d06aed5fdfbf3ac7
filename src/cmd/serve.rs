//! Release board server command for `relboard serve`.

use anyhow::Result;

use relboard::board::server::{open_database, start_server};
use relboard::config::RelboardConfig;

pub async fn cmd_serve(config: RelboardConfig, init: bool, open: bool) -> Result<()> {
    for warning in config.validate() {
        tracing::warn!("{}", warning);
    }

    if init {
        open_database(&config.database.path)?;
        println!(
            "Release board database initialized at {}",
            config.database.path.display()
        );
        return Ok(());
    }

    // Skip in dev mode; the frontend is served elsewhere.
    if open && !config.server.dev_mode {
        let url = format!("http://localhost:{}", config.server.port);
        tokio::spawn(async move {
            // Give the listener a moment to bind.
            tokio::time::sleep(tokio::time::Duration::from_millis(500)).await;
            if let Err(e) = open::that(&url) {
                tracing::warn!(error = %e, %url, "failed to open browser");
            }
        });
    }

    start_server(config).await
}
