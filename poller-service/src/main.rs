use std::sync::Arc;

use anyhow::Result;
use tracing::{info, warn};

use cloud_client::{CloudClient, CloudSession};
use poller_service::config::AppConfig;
use poller_service::poller::Poller;
use poller_service::store::{PgStatisticsStore, StatisticsStore};
use poller_service::{http_api, metrics_server, observability};

#[tokio::main]
async fn main() -> Result<()> {
    observability::init_tracing();

    // Load configuration
    let cfg = AppConfig::load()?;

    // Start metrics server if configured
    if let Some(metrics_cfg) = &cfg.metrics {
        metrics_server::init(&metrics_cfg.bind_addr)?;
    }

    // The durable store is optional: without it the service still polls and
    // publishes snapshots, it just cannot reconcile history.
    let store: Option<Arc<dyn StatisticsStore>> = match &cfg.statistics {
        Some(stats_cfg) => Some(Arc::new(PgStatisticsStore::connect(stats_cfg).await?)),
        None => {
            warn!("no statistics store configured, historical reconciliation disabled");
            None
        }
    };

    let session = CloudSession::new(cfg.cloud.email.clone(), cfg.cloud.password.clone());
    let client = CloudClient::new(
        cfg.cloud.auth_base_url.clone(),
        cfg.cloud.api_base_url.clone(),
        session,
    )?;

    let (poller, snapshots) = Poller::new(client, store, &cfg.cloud, &cfg.poller)?;
    http_api::spawn(&cfg.http.bind_addr, snapshots, poller.refresh_handle())?;

    info!(
        home_id = cfg.cloud.home_id,
        interval_minutes = cfg.poller.interval_minutes,
        "starting watermeter poll loop"
    );
    poller.run().await;

    Ok(())
}
