//! `track-order` entry point.
//!
//! Opens one order, keeps it synchronized through push and polling, and
//! logs every view notification as JSON until interrupted.

use std::sync::Arc;

use anyhow::Context;
use tracing_subscriber::EnvFilter;

use marketplace_sync::backend::ApiClient;
use marketplace_sync::config::SyncConfig;
use marketplace_sync::domain::{EventBus, SubjectId};
use marketplace_sync::features::HttpOrderBackend;
use marketplace_sync::push::{PushChannel, WsPushChannel};
use marketplace_sync::sync::SyncEngine;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize tracing
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    if std::env::var("LOG_FORMAT").is_ok_and(|format| format.eq_ignore_ascii_case("json")) {
        tracing_subscriber::fmt().json().with_env_filter(filter).init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }

    // Load configuration
    let config = SyncConfig::from_env().context("loading configuration")?;
    let order_id = std::env::args()
        .nth(1)
        .or_else(|| config.track_order_id.clone())
        .context("usage: track-order <order-id> (or set TRACK_ORDER_ID)")?;
    tracing::info!(
        api = %config.api_base_url,
        push = %config.push_url,
        %order_id,
        "starting track-order"
    );

    // Build transport
    let api = ApiClient::new(&config.api_base_url, config.http_timeout())
        .context("building HTTP client")?;
    let backend = Arc::new(HttpOrderBackend::new(api));
    let push = Arc::new(WsPushChannel::spawn(
        config.push_url.clone(),
        config.push_reconnect_delay(),
    ));

    // Build engine
    let order_id = SubjectId::new(order_id);
    let bus = EventBus::new(config.event_bus_capacity);
    let mut events = bus.subscribe_subject(order_id.clone());
    let engine = SyncEngine::new(
        backend,
        Arc::clone(&push) as Arc<dyn PushChannel>,
        bus,
        config.settings(),
    );

    let view = engine
        .open(order_id)
        .await
        .context("loading order")?;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => break,
            received = events.recv() => {
                let Some(event) = received else { break };
                let line = serde_json::to_string(&event)?;
                if event.is_user_notice() {
                    tracing::warn!(event = %line, "user notice");
                } else {
                    tracing::info!(event = %line, "view event");
                }
            }
        }
    }

    view.close();
    push.shutdown();
    tracing::info!("track-order stopped");
    Ok(())
}
