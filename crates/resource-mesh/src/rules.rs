//! # Rules
//!
//! A [`Rule`] binds a field-equality matcher to a callback for one resource
//! type. Rules are append-only: a node keeps every rule it was given, in
//! registration order, for as long as it runs.

use crate::error::{MeshError, Result};
use crate::model::{Document, Matcher};
use crate::query;
use async_trait::async_trait;
use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

/// What a rule callback is told about a matching resource.
#[derive(Debug, Clone, PartialEq)]
pub struct RuleHit {
    pub resource_type: String,
    /// `None` for events that carry no document, such as deletes.
    pub resource_data: Option<Document>,
    pub resource_id: String,
    /// The event action, or [`PERIODIC`](crate::message::PERIODIC) for reconciliation hits.
    pub action: String,
}

/// Reaction to a matching resource.
///
/// Callbacks may fire more than once for the same resource state (an event
/// and a later reconciliation sweep both match it), so they should be
/// idempotent.
#[async_trait]
pub trait RuleCallback: Send + Sync + 'static {
    async fn call(&self, hit: RuleHit);
}

#[async_trait]
impl<F> RuleCallback for F
where
    F: Fn(RuleHit) + Send + Sync + 'static,
{
    async fn call(&self, hit: RuleHit) {
        (self)(hit)
    }
}

#[derive(Clone)]
pub struct Rule {
    matcher: Matcher,
    callback: Arc<dyn RuleCallback>,
}

impl Rule {
    pub fn new(matcher: Matcher, callback: impl RuleCallback) -> Self {
        Self {
            matcher,
            callback: Arc::new(callback),
        }
    }

    pub fn matcher(&self) -> &Matcher {
        &self.matcher
    }

    pub fn matches(&self, document: Option<&Document>) -> bool {
        query::matches_optional(&self.matcher, document)
    }

    /// Runs the callback on its own task, so a panic inside it is reported
    /// here instead of unwinding the caller.
    pub async fn invoke(&self, hit: RuleHit) -> Result<()> {
        let callback = self.callback.clone();
        let resource_type = hit.resource_type.clone();
        tokio::spawn(async move { callback.call(hit).await })
            .await
            .map_err(|e| MeshError::CallbackFailed {
                resource_type,
                reason: panic_reason(e),
            })
    }
}

fn panic_reason(error: tokio::task::JoinError) -> String {
    if !error.is_panic() {
        return error.to_string();
    }
    let payload = error.into_panic();
    if let Some(message) = payload.downcast_ref::<&str>() {
        message.to_string()
    } else if let Some(message) = payload.downcast_ref::<String>() {
        message.clone()
    } else {
        "panic".to_string()
    }
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule").field("matcher", &self.matcher).finish()
    }
}

/// Per-resource-type rule lists.
#[derive(Debug, Default)]
pub struct RuleBook {
    rules: HashMap<String, Vec<Rule>>,
}

impl RuleBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Appends a rule. Returns true if it is the first rule for the type.
    pub fn push(&mut self, resource_type: &str, rule: Rule) -> bool {
        let list = self.rules.entry(resource_type.to_string()).or_default();
        list.push(rule);
        list.len() == 1
    }

    /// Rules for a type in registration order; empty if none.
    pub fn for_type(&self, resource_type: &str) -> &[Rule] {
        self.rules
            .get(resource_type)
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }

    /// Every `(type, rule)` pair, types sorted, rules in registration order.
    pub fn pairs(&self) -> Vec<(String, Rule)> {
        let mut types: Vec<&String> = self.rules.keys().collect();
        types.sort();
        types
            .into_iter()
            .flat_map(|t| self.rules[t].iter().map(move |r| (t.clone(), r.clone())))
            .collect()
    }

    pub fn resource_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.rules.keys().cloned().collect();
        types.sort();
        types
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }
}
