//! Staging relay
//!
//! Owns the inbound, outbound and error buckets. Two republishers announce
//! pending inbound and outbound objects on their topics; the subscriber turns
//! every inbound reference into one pipeline pass, admitted through a bounded
//! worker pool and tracked so shutdown can drain it.

mod envelope;
pub mod pipeline;
mod republisher;

pub use envelope::{EnvelopeError, EnvelopeRef};
pub use pipeline::{companion_name, process, Outcome, ERROR_SUFFIX};
pub use republisher::republish_once;

use crate::audit::AuditLog;
use crate::resolver::Registry;
use salesgate_common::bus::{MessageBus, Subscription};
use salesgate_common::config::RelaySettings;
use salesgate_common::kv::KeyValueStore;
use salesgate_common::object_store::ObjectStore;
use salesgate_common::time::secs_to_duration;
use std::collections::HashSet;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

/// Collaborators and settings shared by every pipeline pass
#[derive(Debug, Clone)]
pub struct RelayContext {
    pub store: Arc<dyn ObjectStore>,
    pub bus: Arc<dyn MessageBus>,
    pub registry: Registry,
    pub audit: AuditLog,
    pub settings: RelaySettings,
    pub republish_interval: Duration,
}

impl RelayContext {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        bus: Arc<dyn MessageBus>,
        kv: Arc<dyn KeyValueStore>,
        settings: RelaySettings,
    ) -> Self {
        Self {
            store,
            bus,
            registry: Registry::new(kv.clone()),
            audit: AuditLog::new(kv, secs_to_duration(settings.audit_ttl_secs)),
            republish_interval: secs_to_duration(settings.republish_interval_secs),
            settings,
        }
    }

    /// Override the republish interval (sub-second intervals for tests)
    pub fn with_republish_interval(mut self, interval: Duration) -> Self {
        self.republish_interval = interval;
        self
    }
}

/// Removes a reference from the in-flight set when its task ends
struct InFlight {
    set: Arc<Mutex<HashSet<EnvelopeRef>>>,
    envelope: EnvelopeRef,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        if let Ok(mut set) = self.set.lock() {
            set.remove(&self.envelope);
        }
    }
}

/// The running relay
#[derive(Debug, Clone)]
pub struct Relay {
    ctx: Arc<RelayContext>,
    cancel: CancellationToken,
    tracker: TaskTracker,
    permits: Arc<Semaphore>,
    in_flight: Arc<Mutex<HashSet<EnvelopeRef>>>,
}

impl Relay {
    pub fn new(ctx: RelayContext) -> Self {
        let permits = Arc::new(Semaphore::new(ctx.settings.max_concurrent_tasks.max(1)));
        Self {
            ctx: Arc::new(ctx),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            permits,
            in_flight: Arc::new(Mutex::new(HashSet::new())),
        }
    }

    pub fn context(&self) -> &Arc<RelayContext> {
        &self.ctx
    }

    /// Token that stops the relay when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancel.clone()
    }

    /// Number of pipeline passes currently running
    pub fn in_flight(&self) -> usize {
        self.in_flight.lock().map(|set| set.len()).unwrap_or(0)
    }

    /// Create the inbound, outbound and error buckets when missing
    pub async fn ensure_buckets(&self) -> salesgate_common::Result<()> {
        let settings = &self.ctx.settings;
        for bucket in [
            &settings.inbound_bucket,
            &settings.outbound_bucket,
            &settings.error_bucket,
        ] {
            if !self.ctx.store.bucket_exists(bucket).await? {
                self.ctx.store.make_bucket(bucket).await?;
                info!(bucket = %bucket, "Created bucket");
            }
        }
        Ok(())
    }

    /// Subscribe to the inbound topic and start both republishers
    pub async fn start(&self) -> salesgate_common::Result<()> {
        let settings = &self.ctx.settings;
        let subscription = self.ctx.bus.subscribe(&settings.inbound_topic).await?;

        let relay = self.clone();
        self.tracker.spawn(async move { relay.consume(subscription).await });

        for (bucket, topic) in [
            (&settings.inbound_bucket, &settings.inbound_topic),
            (&settings.outbound_bucket, &settings.outbound_topic),
        ] {
            self.tracker.spawn(republisher::run(
                self.ctx.clone(),
                bucket.clone(),
                topic.clone(),
                self.cancel.clone(),
            ));
        }

        info!(
            inbound = %settings.inbound_bucket,
            outbound = %settings.outbound_bucket,
            errors = %settings.error_bucket,
            workers = settings.max_concurrent_tasks,
            "Relay started"
        );
        Ok(())
    }

    /// Stop the timers and the subscriber, then wait for running passes
    pub async fn shutdown(&self) {
        self.cancel.cancel();
        self.tracker.close();
        self.tracker.wait().await;
        info!("Relay stopped");
    }

    /// Ensure buckets, start, and run until the cancellation token fires
    pub async fn run(&self) -> salesgate_common::Result<()> {
        self.ensure_buckets().await?;
        self.start().await?;
        self.cancel.cancelled().await;
        self.shutdown().await;
        Ok(())
    }

    async fn consume(&self, mut subscription: Subscription) {
        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,
                payload = subscription.next() => match payload {
                    Some(payload) => self.dispatch(&payload).await,
                    None => {
                        warn!(topic = %subscription.topic(), "Inbound subscription closed");
                        break;
                    }
                },
            }
        }
        debug!("Subscriber stopped");
    }

    async fn dispatch(&self, payload: &[u8]) {
        let envelope = match EnvelopeRef::decode(payload) {
            Ok(envelope) => envelope,
            Err(e) => {
                warn!(error = %e, "Dropping malformed envelope reference");
                return;
            }
        };
        if envelope.bucket != self.ctx.settings.inbound_bucket {
            warn!(envelope = %envelope, "Ignoring reference outside the inbound bucket");
            return;
        }

        let guard = {
            let Ok(mut set) = self.in_flight.lock() else {
                return;
            };
            if !set.insert(envelope.clone()) {
                debug!(envelope = %envelope, "Already in flight");
                return;
            }
            InFlight {
                set: self.in_flight.clone(),
                envelope: envelope.clone(),
            }
        };

        let permit = tokio::select! {
            _ = self.cancel.cancelled() => return,
            permit = self.permits.clone().acquire_owned() => match permit {
                Ok(permit) => permit,
                Err(_) => return,
            },
        };

        let ctx = self.ctx.clone();
        self.tracker.spawn(async move {
            let _permit = permit;
            let _guard = guard;
            pipeline::process(&ctx, &envelope).await
        });
    }
}
