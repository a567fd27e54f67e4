// src/proxy/upgrade.rs
// Bidirectional tunnelling for connections both sides agreed to upgrade.
use crate::metrics::MetricsCollector;
use hyper::upgrade::OnUpgrade;
use std::sync::Arc;
use tracing::{debug, warn, Instrument};

/// Wait for both halves to finish the upgrade handshake, then copy bytes in
/// both directions until either side closes. Runs on its own task and has no
/// timeout: an established tunnel lives as long as its peers keep it open.
pub fn spawn_tunnel(
    client: OnUpgrade,
    upstream: OnUpgrade,
    metrics: Option<Arc<MetricsCollector>>,
) {
    tokio::spawn(
        async move {
            let (mut client, mut upstream) = match tokio::try_join!(client, upstream) {
                Ok(pair) => pair,
                Err(e) => {
                    warn!(error = %e, "upgrade handshake failed");
                    return;
                }
            };

            if let Some(metrics) = &metrics {
                metrics.upgraded_connections_active.inc();
            }
            debug!("upgraded connection established");

            match tokio::io::copy_bidirectional(&mut client, &mut upstream).await {
                Ok((from_client, from_upstream)) => {
                    debug!(from_client, from_upstream, "upgraded connection closed");
                }
                Err(e) => debug!(error = %e, "upgraded connection ended"),
            }

            if let Some(metrics) = &metrics {
                metrics.upgraded_connections_active.dec();
            }
        }
        .in_current_span(),
    );
}
