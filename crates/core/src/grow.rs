//! Grow state — the structured cultivation context injected into prompts.
//!
//! A [`Grow`] is one cultivation project. It carries a generated plan with
//! per-phase environment and nutrient targets, and has a series of sensor
//! [`Snapshot`]s recorded against it.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use crate::error::GrowStateError;

/// Lifecycle status of a grow.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrowStatus {
    #[default]
    Active,
    Completed,
    Abandoned,
}

impl GrowStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Active => "active",
            Self::Completed => "completed",
            Self::Abandoned => "abandoned",
        }
    }
}

/// A cultivation project.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Grow {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    #[serde(default)]
    pub strain_name: Option<String>,
    #[serde(default)]
    pub medium: Option<String>,
    /// Current phase name (e.g. "vegetative", "flowering")
    #[serde(default)]
    pub current_phase: Option<String>,
    #[serde(default)]
    pub start_date: Option<String>,
    #[serde(default)]
    pub light_type: Option<String>,
    #[serde(default)]
    pub light_wattage: Option<u32>,
    /// Width × length × height in centimetres
    #[serde(default)]
    pub space_cm: Option<[f32; 3]>,
    #[serde(default)]
    pub status: GrowStatus,
    #[serde(default)]
    pub plan: Option<GrowPlan>,
    pub created_at: DateTime<Utc>,
}

/// A generated grow plan, one entry per phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GrowPlan {
    #[serde(default)]
    pub phases: Vec<PhasePlan>,
}

impl GrowPlan {
    /// Targets for the named phase, if the plan covers it.
    pub fn phase(&self, name: &str) -> Option<&PhasePlan> {
        self.phases.iter().find(|p| p.phase == name)
    }
}

/// Targets for a single phase.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PhasePlan {
    pub phase: String,
    #[serde(default)]
    pub environment: EnvironmentTargets,
    #[serde(default)]
    pub nutrients: NutrientTargets,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct EnvironmentTargets {
    #[serde(default)]
    pub temperature_day_c: Option<f64>,
    #[serde(default)]
    pub temperature_night_c: Option<f64>,
    #[serde(default)]
    pub humidity_percent: Option<f64>,
    #[serde(default)]
    pub vpd_min: Option<f64>,
    #[serde(default)]
    pub vpd_max: Option<f64>,
    #[serde(default)]
    pub light_hours: Option<f64>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct NutrientTargets {
    #[serde(default)]
    pub ph_min: Option<f64>,
    #[serde(default)]
    pub ph_max: Option<f64>,
    #[serde(default)]
    pub ec_min: Option<f64>,
    #[serde(default)]
    pub ec_max: Option<f64>,
}

/// One telemetry reading for a grow.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    pub grow_id: String,
    pub recorded_at: DateTime<Utc>,
    #[serde(default)]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub humidity: Option<f64>,
    #[serde(default)]
    pub ph: Option<f64>,
    #[serde(default)]
    pub ec: Option<f64>,
    #[serde(default)]
    pub vpd: Option<f64>,
}

/// Read access to grow state.
#[async_trait]
pub trait GrowStateProvider: Send + Sync {
    /// Fetch a grow for an owner.
    ///
    /// With `grow_id`, returns that grow if the owner has it. Without, returns
    /// the owner's most recently created active grow.
    async fn get_grow(
        &self,
        owner_id: &str,
        grow_id: Option<&str>,
    ) -> Result<Option<Grow>, GrowStateError>;

    /// The most recent snapshots for a grow, newest first.
    async fn recent_snapshots(
        &self,
        grow_id: &str,
        limit: usize,
    ) -> Result<Vec<Snapshot>, GrowStateError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn plan_lookup_by_phase() {
        let plan: GrowPlan = serde_json::from_value(serde_json::json!({
            "phases": [
                {"phase": "vegetative", "environment": {"humidity_percent": 60.0}},
                {"phase": "flowering", "environment": {"humidity_percent": 45.0}}
            ]
        }))
        .unwrap();
        let flower = plan.phase("flowering").unwrap();
        assert_eq!(flower.environment.humidity_percent, Some(45.0));
        assert!(plan.phase("curing").is_none());
    }

    #[test]
    fn grow_deserializes_with_sparse_fields() {
        let grow: Grow = serde_json::from_value(serde_json::json!({
            "id": "g1",
            "owner_id": "o1",
            "name": "Closet tent",
            "created_at": "2026-01-01T00:00:00Z"
        }))
        .unwrap();
        assert_eq!(grow.status, GrowStatus::Active);
        assert!(grow.plan.is_none());
        assert!(grow.strain_name.is_none());
    }
}
