//! In-memory grow registry.

use async_trait::async_trait;
use canopy_core::error::GrowStateError;
use canopy_core::grow::{Grow, GrowStateProvider, GrowStatus, Snapshot};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Grows and their snapshots held in memory.
#[derive(Clone, Default)]
pub struct InMemoryGrowRegistry {
    grows: Arc<RwLock<Vec<Grow>>>,
    snapshots: Arc<RwLock<Vec<Snapshot>>>,
}

impl InMemoryGrowRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert or replace a grow by id.
    pub async fn upsert_grow(&self, grow: Grow) {
        let mut grows = self.grows.write().await;
        grows.retain(|g| g.id != grow.id);
        grows.push(grow);
    }

    pub async fn record_snapshot(&self, snapshot: Snapshot) {
        self.snapshots.write().await.push(snapshot);
    }
}

#[async_trait]
impl GrowStateProvider for InMemoryGrowRegistry {
    async fn get_grow(
        &self,
        owner_id: &str,
        grow_id: Option<&str>,
    ) -> Result<Option<Grow>, GrowStateError> {
        let grows = self.grows.read().await;
        let owned = grows.iter().filter(|g| g.owner_id == owner_id);

        let found = match grow_id {
            Some(id) => owned.into_iter().find(|g| g.id == id),
            None => owned
                .filter(|g| g.status == GrowStatus::Active)
                .max_by_key(|g| g.created_at),
        };
        Ok(found.cloned())
    }

    async fn recent_snapshots(
        &self,
        grow_id: &str,
        limit: usize,
    ) -> Result<Vec<Snapshot>, GrowStateError> {
        let snapshots = self.snapshots.read().await;
        let mut matching: Vec<Snapshot> = snapshots
            .iter()
            .filter(|s| s.grow_id == grow_id)
            .cloned()
            .collect();
        matching.sort_by(|a, b| b.recorded_at.cmp(&a.recorded_at));
        matching.truncate(limit);
        Ok(matching)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, Utc};

    fn grow(id: &str, owner: &str, status: GrowStatus, age_days: i64) -> Grow {
        Grow {
            id: id.into(),
            owner_id: owner.into(),
            name: format!("Grow {id}"),
            strain_name: None,
            medium: None,
            current_phase: None,
            start_date: None,
            light_type: None,
            light_wattage: None,
            space_cm: None,
            status,
            plan: None,
            created_at: Utc::now() - Duration::days(age_days),
        }
    }

    fn snapshot(grow_id: &str, minutes_ago: i64, temperature: f64) -> Snapshot {
        Snapshot {
            grow_id: grow_id.into(),
            recorded_at: Utc::now() - Duration::minutes(minutes_ago),
            temperature: Some(temperature),
            humidity: None,
            ph: None,
            ec: None,
            vpd: None,
        }
    }

    #[tokio::test]
    async fn default_lookup_picks_newest_active() {
        let registry = InMemoryGrowRegistry::new();
        registry.upsert_grow(grow("old", "o", GrowStatus::Active, 30)).await;
        registry.upsert_grow(grow("new", "o", GrowStatus::Active, 1)).await;
        registry.upsert_grow(grow("done", "o", GrowStatus::Completed, 0)).await;

        let found = registry.get_grow("o", None).await.unwrap().unwrap();
        assert_eq!(found.id, "new");
    }

    #[tokio::test]
    async fn explicit_lookup_respects_owner() {
        let registry = InMemoryGrowRegistry::new();
        registry.upsert_grow(grow("g1", "alice", GrowStatus::Active, 1)).await;

        assert!(registry.get_grow("alice", Some("g1")).await.unwrap().is_some());
        assert!(registry.get_grow("bob", Some("g1")).await.unwrap().is_none());
        assert!(registry.get_grow("alice", Some("nope")).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn snapshots_newest_first_and_limited() {
        let registry = InMemoryGrowRegistry::new();
        registry.record_snapshot(snapshot("g1", 30, 21.0)).await;
        registry.record_snapshot(snapshot("g1", 10, 23.0)).await;
        registry.record_snapshot(snapshot("g1", 20, 22.0)).await;
        registry.record_snapshot(snapshot("g2", 5, 30.0)).await;

        let recent = registry.recent_snapshots("g1", 2).await.unwrap();
        let temps: Vec<_> = recent.iter().map(|s| s.temperature.unwrap()).collect();
        assert_eq!(temps, vec![23.0, 22.0]);
    }
}
