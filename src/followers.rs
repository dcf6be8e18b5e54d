//! Expands a tracked person into the set of watcher ids that should be
//! notified about them.

use std::collections::BTreeSet;
use std::sync::Arc;

use tracing::warn;

use crate::traits::RelationshipGraph;

/// Union of the two relationship sources, deduplicated, self excluded.
pub struct FollowerResolver {
    graph: Arc<dyn RelationshipGraph>,
}

impl FollowerResolver {
    pub fn new(graph: Arc<dyn RelationshipGraph>) -> Self {
        Self { graph }
    }

    /// Watcher ids for one person. A failing source degrades to the other
    /// instead of aborting the whole resolution; the next rebuild heals it.
    pub async fn resolve(&self, person_id: i64, handle_lower: Option<&str>) -> Vec<i64> {
        let mut ids: BTreeSet<i64> = BTreeSet::new();

        match self.graph.direct_watchers(person_id, handle_lower).await {
            Ok(owners) => ids.extend(owners),
            Err(e) => warn!(person_id, "friend watcher lookup failed: {}", e),
        }

        match self.graph.co_member_watchers(person_id).await {
            Ok(members) => ids.extend(members),
            Err(e) => warn!(person_id, "group watcher lookup failed: {}", e),
        }

        ids.remove(&person_id);
        ids.into_iter().collect()
    }
}
