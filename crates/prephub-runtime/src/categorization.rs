//! AI-assisted grouping of curriculum categories.

use prephub_core::{CacheKeyBuilder, CategoryRef, GroupAssignment, PayloadShape};
use serde_json::Value;
use std::collections::BTreeMap;

use crate::content::{json_or, typed_gate, Content, ContentOrigin, ContentService};
use crate::orchestrator::CachePolicy;
use crate::prompts;

impl ContentService {
    /// Propose a group for one category.
    ///
    /// Assignments below the configured confidence are treated like a
    /// failed backend. `None` when no backend produced an acceptable one.
    pub async fn assign_group_with_ai(
        &self,
        category: &str,
        topic_slug: &str,
    ) -> Content<Option<GroupAssignment>> {
        let prompt = prompts::group_assignment(category, topic_slug);
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("category_group")
                .part(topic_slug)
                .part(category)
                .build(),
            self.ttl.categorization,
        );

        let min_confidence = self.min_confidence;
        let shaped = typed_gate::<GroupAssignment>(PayloadShape::GroupAssignment);
        let gate = move |value: &Value| {
            if !shaped(value) {
                return false;
            }
            let confidence = value
                .get("confidence")
                .and_then(Value::as_f64)
                .unwrap_or(0.0);
            if confidence < min_confidence {
                tracing::warn!(confidence, min_confidence, "Low-confidence group assignment");
                return false;
            }
            true
        };

        let result = self
            .orchestrator
            .generate_json_gated(&prompt, Some(&policy), gate)
            .await;
        let content: Content<Option<GroupAssignment>> =
            json_or("group_assignment", result, || None);
        if let Some(assignment) = &content.value {
            tracing::debug!(category, group = %assignment.group, "Category grouped");
        }
        content
    }

    /// Propose groups for a batch of categories, keyed by category name.
    ///
    /// Categories are presented to the model in study order. An empty batch
    /// returns an empty map without calling any backend; a failed batch
    /// returns an empty map marked offline.
    pub async fn assign_group_batch(
        &self,
        categories: &[CategoryRef],
        topic_slug: &str,
    ) -> Content<BTreeMap<String, String>> {
        if categories.is_empty() {
            return Content {
                value: BTreeMap::new(),
                origin: ContentOrigin::Skipped,
            };
        }

        let mut ordered = categories.to_vec();
        ordered.sort_by_key(|c| c.order);

        let names: Vec<&str> = ordered.iter().map(|c| c.name.as_str()).collect();
        let policy = CachePolicy::new(
            CacheKeyBuilder::new("batch_category_group")
                .part(topic_slug)
                .digest(batch_fingerprint(&names))
                .build(),
            self.ttl.categorization,
        );
        let prompt = prompts::group_batch(&ordered, topic_slug);

        let result = self
            .orchestrator
            .generate_json_gated(
                &prompt,
                Some(&policy),
                typed_gate::<BTreeMap<String, String>>(PayloadShape::GroupBatch),
            )
            .await;
        let content: Content<BTreeMap<String, String>> =
            json_or("group_batch", result, BTreeMap::new);

        let unassigned = names
            .iter()
            .filter(|name| !content.value.contains_key(**name))
            .count();
        if unassigned > 0 && !content.is_offline() {
            tracing::warn!(unassigned, total = names.len(), "Batch left categories without a group");
        }
        content
    }
}

// Length-prefixed so a name containing a delimiter can't pass for two names.
fn batch_fingerprint(names: &[&str]) -> String {
    names
        .iter()
        .map(|name| format!("{}:{};", name.len(), name))
        .collect()
}
