//! # Rule Engine & Reconciler
//!
//! Two ways a rule fires:
//!
//! - **Events**: each resource type gets its own lane, a task that evaluates
//!   that type's events one after another, so callbacks observe events of one
//!   collection in publication order while different collections proceed
//!   independently. Thin events are completed with a `get` through the node
//!   before matching.
//! - **Reconciliation**: [`run_cycle`] lists every rule's resource type with
//!   the rule's matcher as the `where` filter and fires the callback for each
//!   returned resource with the `periodic` action. It covers events that were
//!   lost on the way.
//!
//! Both paths decide "does it match" with the same predicate (see
//! [`query`](crate::query)), so for a fixed collection state they select the
//! same resources.

use crate::client::NodeClient;
use crate::error::{MeshError, Result};
use crate::message::{CrudMessage, Event, NOT_FOUND, PERIODIC};
use crate::model::{Document, ResourceRecord};
use crate::node::NodeRequest;
use crate::rules::{Rule, RuleHit};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Outcome of one reconciliation cycle.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CycleReport {
    /// Rules evaluated.
    pub rules: usize,
    /// Callback invocations.
    pub hits: usize,
    /// Rules whose listing or callback failed.
    pub failures: usize,
}

/// An event together with the rules registered for its type when it arrived.
#[derive(Debug)]
pub(crate) struct LaneItem {
    pub event: Event,
    pub rules: Vec<Rule>,
}

/// Spawns the event lane for one resource type and returns its sender.
///
/// The queue is unbounded so the node loop can hand over every event without
/// waiting; events of one type are evaluated strictly in arrival order.
/// The lane holds only a weak handle on the node, so it never keeps a node
/// alive on its own; once the node is gone the lane drains and stops.
pub(crate) fn spawn_lane(
    resource_type: &str,
    node: mpsc::WeakSender<NodeRequest>,
) -> mpsc::UnboundedSender<LaneItem> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<LaneItem>();
    let resource_type = resource_type.to_string();

    tokio::spawn(async move {
        debug!(%resource_type, "Event lane started");
        while let Some(LaneItem { event, rules }) = receiver.recv().await {
            let Some(client) = node.upgrade().map(NodeClient::new) else {
                break;
            };
            evaluate_event(&client, event, &rules).await;
        }
        debug!(%resource_type, "Event lane stopped");
    });

    sender
}

/// Matches one event against `rules` in order, firing every matching callback.
pub(crate) async fn evaluate_event(client: &NodeClient, event: Event, rules: &[Rule]) {
    let document = match event.resource_data() {
        Some(document) => Some(document.clone()),
        None if event.is_delete() => None,
        None => match fetch_document(client, &event.resource_name, &event.resource_id).await {
            Ok(document) => document,
            Err(e) => {
                warn!(
                    collection = %event.resource_name,
                    resource_id = %event.resource_id,
                    error = %e,
                    "Could not resolve event document, skipping"
                );
                return;
            }
        },
    };

    for rule in rules {
        if rule.matches(document.as_ref()) {
            debug!(collection = %event.resource_name, resource_id = %event.resource_id, action = %event.action, "Rule matched");
            let hit = RuleHit {
                resource_type: event.resource_name.clone(),
                resource_data: document.clone(),
                resource_id: event.resource_id.clone(),
                action: event.action.clone(),
            };
            if let Err(e) = rule.invoke(hit).await {
                warn!(collection = %event.resource_name, resource_id = %event.resource_id, error = %e, "Rule callback failed");
            }
        }
    }
}

/// Current document of a resource, `None` if the owner answers not-found.
async fn fetch_document(
    client: &NodeClient,
    resource_type: &str,
    resource_id: &str,
) -> Result<Option<Document>> {
    let reply = client
        .send(CrudMessage::new(resource_type, "get").with_id(resource_id))
        .await?;
    if reply.as_str() == Some(NOT_FOUND) {
        return Ok(None);
    }
    let record: ResourceRecord =
        serde_json::from_value(reply).map_err(|e| MeshError::Decode(e.to_string()))?;
    Ok(Some(record.resource_data))
}

/// Runs one reconciliation sweep over `pairs`.
///
/// A rule whose listing fails, or whose callback fails on any resource, is
/// logged and counted once; the sweep goes on with the next rule.
pub async fn run_cycle(client: &NodeClient, pairs: Vec<(String, Rule)>) -> CycleReport {
    let mut report = CycleReport::default();

    for (resource_type, rule) in pairs {
        report.rules += 1;
        match list_matching(client, &resource_type, &rule).await {
            Ok(records) => {
                let mut failed = false;
                for record in records {
                    report.hits += 1;
                    let resource_id = record.resource_id.clone();
                    let hit = RuleHit {
                        resource_type: resource_type.clone(),
                        resource_data: Some(record.resource_data),
                        resource_id: record.resource_id,
                        action: PERIODIC.to_string(),
                    };
                    if let Err(e) = rule.invoke(hit).await {
                        warn!(collection = %resource_type, %resource_id, error = %e, "Rule callback failed during reconciliation");
                        failed = true;
                    }
                }
                if failed {
                    report.failures += 1;
                }
            }
            Err(e) => {
                report.failures += 1;
                warn!(collection = %resource_type, error = %e, "Reconciliation of rule failed");
            }
        }
    }

    info!(rules = report.rules, hits = report.hits, failures = report.failures, "Reconciliation cycle done");
    report
}

async fn list_matching(
    client: &NodeClient,
    resource_type: &str,
    rule: &Rule,
) -> Result<Vec<ResourceRecord>> {
    let message = CrudMessage::new(resource_type, "list")
        .with_param("where", Value::Object(rule.matcher().clone()));
    let reply = client.send(message).await?;
    serde_json::from_value(reply).map_err(|e| MeshError::Decode(e.to_string()))
}
