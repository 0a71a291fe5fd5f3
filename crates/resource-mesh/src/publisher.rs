//! # Event Publisher
//!
//! Broadcasts resource events to peers and loops each one back into the
//! publishing node's own inbound stream, so rules registered on the same node
//! see local mutations exactly once even when the broadcast is lossy.

use crate::message::{event_topic, Event};
use crate::transport::{Inbound, Medium};
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::{debug, warn};

#[derive(Clone)]
pub struct EventPublisher {
    medium: Arc<dyn Medium>,
    loopback: mpsc::Sender<Inbound>,
}

impl EventPublisher {
    pub fn new(medium: Arc<dyn Medium>, loopback: mpsc::Sender<Inbound>) -> Self {
        Self { medium, loopback }
    }

    /// Broadcasts `event` under `topic`, then hands it to the local event path.
    ///
    /// Returns once the local node has accepted the event; peer delivery is
    /// best effort and failures are only logged.
    pub async fn publish(&self, topic: &str, event: Event) {
        if let Err(e) = self.medium.publish(topic, &event).await {
            warn!(topic, error = %e, "Broadcast failed");
        }

        let local = Inbound::Event {
            topic: topic.to_string(),
            event,
        };
        if self.loopback.send(local).await.is_err() {
            debug!(topic, "Local node gone, loopback dropped");
        }
    }

    /// Publishes a mutation of one resource under
    /// `<collection>.<action>.<resource_id>`, stamping the event with the
    /// collection name and resource id.
    pub async fn publish_resource(
        &self,
        collection: &str,
        action: &str,
        resource_id: &str,
        payload: Map<String, Value>,
    ) {
        let topic = event_topic(collection, action, resource_id);
        let event = Event {
            resource_name: collection.to_string(),
            resource_id: resource_id.to_string(),
            action: action.to_string(),
            payload,
        };
        debug!(%topic, "Publish");
        self.publish(&topic, event).await;
    }
}
