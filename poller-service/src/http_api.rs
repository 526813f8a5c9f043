//! Read-only HTTP surface for the presentation layer: the current snapshot
//! map rendered through the fixed projections, plus a manual refresh
//! trigger and a health probe.

use std::collections::BTreeMap;
use std::net::SocketAddr;
use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use tokio::sync::{watch, Notify};

use cloud_client::Device;

use crate::poller::SnapshotMap;
use crate::snapshot::{DeviceSnapshot, Projection, ProjectionValue};

#[derive(Clone)]
struct ApiState {
    snapshots: watch::Receiver<SnapshotMap>,
    refresh: Arc<Notify>,
}

#[derive(serde::Serialize)]
struct DeviceView {
    device: Device,
    unit: &'static str,
    values: BTreeMap<&'static str, ProjectionValue>,
}

fn view(snapshot: &DeviceSnapshot) -> DeviceView {
    DeviceView {
        device: snapshot.device.clone(),
        unit: snapshot.unit,
        values: Projection::ALL
            .iter()
            .map(|p| (p.name(), p.value(snapshot)))
            .collect(),
    }
}

pub fn router(snapshots: watch::Receiver<SnapshotMap>, refresh: Arc<Notify>) -> Router {
    Router::new()
        .route("/healthz", get(healthz))
        .route("/snapshots", get(get_snapshots))
        .route("/refresh", post(trigger_refresh))
        .with_state(ApiState { snapshots, refresh })
}

/// Bind and serve in the background. The server lives for the process
/// lifetime; bind or serve failures are logged, not propagated.
pub fn spawn(
    bind_addr: &str,
    snapshots: watch::Receiver<SnapshotMap>,
    refresh: Arc<Notify>,
) -> anyhow::Result<()> {
    let addr: SocketAddr = bind_addr
        .parse()
        .map_err(|e| anyhow::anyhow!("invalid http.bind_addr: {e}"))?;

    let app = router(snapshots, refresh);
    tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                if let Err(e) = axum::serve(listener, app.into_make_service()).await {
                    tracing::error!(error = %e, "snapshot API server error");
                }
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to bind snapshot API listener");
            }
        }
    });

    Ok(())
}

async fn healthz() -> &'static str {
    "ok"
}

async fn get_snapshots(State(state): State<ApiState>) -> Json<BTreeMap<String, DeviceView>> {
    let map = state.snapshots.borrow().clone();
    Json(map.iter().map(|(key, snap)| (key.clone(), view(snap))).collect())
}

async fn trigger_refresh(State(state): State<ApiState>) -> StatusCode {
    state.refresh.notify_one();
    StatusCode::ACCEPTED
}

#[cfg(test)]
mod tests {
    use super::*;
    use time::macros::datetime;

    #[test]
    fn view_renders_all_projections() {
        let device: Device = serde_json::from_str(
            r#"{"identifier": "wtr/1", "type": "watermeter", "onlineState": "online"}"#,
        )
        .expect("valid device");
        let snapshot = DeviceSnapshot {
            device,
            daily_total: Some(12.5),
            unit: "L",
            last_sync_at: Some(datetime!(2024-05-10 10:00 UTC)),
        };

        let view = view(&snapshot);
        assert_eq!(view.values.len(), 4);
        assert_eq!(view.values["daily_total"], ProjectionValue::Number(12.5));
        assert_eq!(
            view.values["online_state"],
            ProjectionValue::Text("online".to_string())
        );
        // Wifi strength was never reported; the original presents 0 there.
        assert_eq!(view.values["wifi_signal"], ProjectionValue::Number(0.0));
    }
}
