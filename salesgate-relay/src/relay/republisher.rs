//! Periodic republish of pending objects
//!
//! Each tick lists up to `list_limit` objects from a bucket and publishes one
//! reference per object. Objects written without a bus message, or whose
//! message was lost, are picked up this way; the rest of a large backlog
//! follows on later ticks.

use super::{EnvelopeRef, RelayContext};
use std::sync::Arc;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// List `bucket` once and publish a reference per object on `topic`
pub async fn republish_once(
    ctx: &RelayContext,
    bucket: &str,
    topic: &str,
) -> salesgate_common::Result<usize> {
    let objects = ctx.store.list(bucket, ctx.settings.list_limit).await?;
    for object in &objects {
        ctx.bus
            .publish(topic, EnvelopeRef::new(bucket, object.as_str()).encode())
            .await?;
    }
    Ok(objects.len())
}

/// Republish on a fixed interval until cancelled; the first tick is immediate
pub async fn run(ctx: Arc<RelayContext>, bucket: String, topic: String, cancel: CancellationToken) {
    let period = ctx.republish_interval;
    let mut ticker = tokio::time::interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

    info!(bucket = %bucket, topic = %topic, ?period, "Republisher started");
    loop {
        tokio::select! {
            _ = cancel.cancelled() => break,
            _ = ticker.tick() => {
                match republish_once(&ctx, &bucket, &topic).await {
                    Ok(0) => {}
                    Ok(count) => debug!(bucket = %bucket, topic = %topic, count, "Republished pending objects"),
                    Err(e) => warn!(bucket = %bucket, error = %e, "Republish tick failed"),
                }
            }
        }
    }
    info!(bucket = %bucket, "Republisher stopped");
}
