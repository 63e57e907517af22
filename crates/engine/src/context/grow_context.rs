//! Domain context formatter.
//!
//! Renders a grow's identity, the plan targets for its *current* phase, and
//! its most recent sensor readings into a fixed-section text block.

use canopy_core::error::GrowStateError;
use canopy_core::grow::{Grow, GrowStateProvider, PhasePlan, Snapshot};
use std::fmt::Display;
use std::sync::Arc;
use tracing::warn;

/// Number of telemetry points included in the block.
pub const RECENT_SNAPSHOTS: usize = 3;

/// Phase assumed when a grow has none recorded.
const DEFAULT_PHASE: &str = "vegetative";

/// A rendered grow block.
#[derive(Debug, Clone)]
pub struct GrowContext {
    pub grow_id: String,
    pub text: String,
}

pub struct GrowContextFormatter {
    state: Arc<dyn GrowStateProvider>,
}

impl GrowContextFormatter {
    pub fn new(state: Arc<dyn GrowStateProvider>) -> Self {
        Self { state }
    }

    /// Build the block for an owner's grow.
    ///
    /// Without `grow_id` the owner's most recent active grow is used.
    /// `Ok(None)` means there is no grow to describe. A failing snapshot
    /// lookup only drops the readings section.
    pub async fn build(
        &self,
        owner_id: &str,
        grow_id: Option<&str>,
    ) -> Result<Option<GrowContext>, GrowStateError> {
        let Some(grow) = self.state.get_grow(owner_id, grow_id).await? else {
            return Ok(None);
        };

        let snapshots = match self.state.recent_snapshots(&grow.id, RECENT_SNAPSHOTS).await {
            Ok(s) => s,
            Err(e) => {
                warn!(grow_id = %grow.id, error = %e, "Failed to load snapshots");
                Vec::new()
            }
        };

        Ok(Some(GrowContext {
            grow_id: grow.id.clone(),
            text: format_grow(&grow, &snapshots),
        }))
    }
}

fn or_unknown<T: Display>(value: &Option<T>) -> String {
    value
        .as_ref()
        .map(ToString::to_string)
        .unwrap_or_else(|| "Unknown".into())
}

fn or_q<T: Display>(value: Option<T>) -> String {
    value
        .map(|v| v.to_string())
        .unwrap_or_else(|| "?".into())
}

/// Render a grow and its snapshots (given newest first).
pub fn format_grow(grow: &Grow, snapshots: &[Snapshot]) -> String {
    let (width, length, height) = match grow.space_cm {
        Some([w, l, h]) => (w.to_string(), l.to_string(), h.to_string()),
        None => ("?".into(), "?".into(), "?".into()),
    };

    let mut parts = vec![
        format!("## Active Grow: {}", grow.name),
        format!("- **Strain**: {}", or_unknown(&grow.strain_name)),
        format!("- **Medium**: {}", or_unknown(&grow.medium)),
        format!("- **Phase**: {}", or_unknown(&grow.current_phase)),
        format!("- **Start Date**: {}", or_unknown(&grow.start_date)),
        format!(
            "- **Light**: {} @ {}W",
            or_unknown(&grow.light_type),
            or_q(grow.light_wattage)
        ),
        format!("- **Space**: {width}cm × {length}cm × {height}cm"),
    ];

    let phase = grow.current_phase.as_deref().unwrap_or(DEFAULT_PHASE);
    if let Some(targets) = grow.plan.as_ref().and_then(|p| p.phase(phase)) {
        parts.extend(format_targets(targets));
    }

    if !snapshots.is_empty() {
        parts.push("\n### Recent Sensor Readings".into());
        // Oldest first reads naturally as a trend
        for snap in snapshots.iter().rev() {
            parts.push(format!(
                "- [{}] Temp: {}°C | Humidity: {}% | pH: {} | EC: {} | VPD: {} kPa",
                snap.recorded_at.to_rfc3339(),
                or_q(snap.temperature),
                or_q(snap.humidity),
                or_q(snap.ph),
                or_q(snap.ec),
                or_q(snap.vpd),
            ));
        }
    }

    parts.join("\n")
}

fn format_targets(targets: &PhasePlan) -> Vec<String> {
    let env = &targets.environment;
    let nutrients = &targets.nutrients;
    vec![
        "\n### Optimal Ranges (Plan)".into(),
        format!(
            "- Temp Day: {}°C | Night: {}°C",
            or_q(env.temperature_day_c),
            or_q(env.temperature_night_c)
        ),
        format!("- Humidity: {}%", or_q(env.humidity_percent)),
        format!("- VPD: {} - {} kPa", or_q(env.vpd_min), or_q(env.vpd_max)),
        format!("- pH: {} - {}", or_q(nutrients.ph_min), or_q(nutrients.ph_max)),
        format!("- EC: {} - {}", or_q(nutrients.ec_min), or_q(nutrients.ec_max)),
        format!("- Light Hours: {}h", or_q(env.light_hours)),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use canopy_core::grow::{EnvironmentTargets, GrowPlan, GrowStatus, NutrientTargets};
    use chrono::{Duration, Utc};

    fn sample_grow() -> Grow {
        Grow {
            id: "g1".into(),
            owner_id: "o1".into(),
            name: "Closet Tent".into(),
            strain_name: Some("Blue Dream".into()),
            medium: Some("coco".into()),
            current_phase: Some("flowering".into()),
            start_date: Some("2026-03-01".into()),
            light_type: Some("LED".into()),
            light_wattage: Some(320),
            space_cm: Some([80.0, 80.0, 180.0]),
            status: GrowStatus::Active,
            plan: Some(GrowPlan {
                phases: vec![
                    PhasePlan {
                        phase: "vegetative".into(),
                        environment: EnvironmentTargets {
                            humidity_percent: Some(65.0),
                            ..Default::default()
                        },
                        nutrients: NutrientTargets::default(),
                    },
                    PhasePlan {
                        phase: "flowering".into(),
                        environment: EnvironmentTargets {
                            temperature_day_c: Some(26.0),
                            temperature_night_c: Some(20.0),
                            humidity_percent: Some(45.0),
                            vpd_min: Some(1.2),
                            vpd_max: Some(1.5),
                            light_hours: Some(12.0),
                        },
                        nutrients: NutrientTargets {
                            ph_min: Some(5.8),
                            ph_max: Some(6.2),
                            ec_min: Some(1.4),
                            ec_max: Some(2.0),
                        },
                    },
                ],
            }),
            created_at: Utc::now(),
        }
    }

    fn snapshot(minutes_ago: i64, temperature: f64) -> Snapshot {
        Snapshot {
            grow_id: "g1".into(),
            recorded_at: Utc::now() - Duration::minutes(minutes_ago),
            temperature: Some(temperature),
            humidity: Some(50.0),
            ph: None,
            ec: Some(1.6),
            vpd: Some(1.3),
        }
    }

    #[test]
    fn renders_identity_and_current_phase_only() {
        let text = format_grow(&sample_grow(), &[]);
        assert!(text.starts_with("## Active Grow: Closet Tent"));
        assert!(text.contains("- **Strain**: Blue Dream"));
        assert!(text.contains("- **Light**: LED @ 320W"));
        assert!(text.contains("- **Space**: 80cm × 80cm × 180cm"));
        assert!(text.contains("- Humidity: 45%"));
        assert!(!text.contains("65%"));
        assert!(text.contains("- pH: 5.8 - 6.2"));
        assert!(!text.contains("Recent Sensor Readings"));
    }

    #[test]
    fn readings_are_listed_oldest_first() {
        let newest_first = vec![snapshot(5, 25.0), snapshot(10, 24.0), snapshot(15, 23.0)];
        let text = format_grow(&sample_grow(), &newest_first);
        let first = text.find("Temp: 23°C").unwrap();
        let last = text.find("Temp: 25°C").unwrap();
        assert!(first < last);
        assert!(text.contains("pH: ? | EC: 1.6"));
    }

    #[test]
    fn sparse_grow_uses_placeholders() {
        let mut grow = sample_grow();
        grow.strain_name = None;
        grow.light_wattage = None;
        grow.space_cm = None;
        grow.plan = None;
        let text = format_grow(&grow, &[]);
        assert!(text.contains("- **Strain**: Unknown"));
        assert!(text.contains("@ ?W"));
        assert!(text.contains("?cm × ?cm × ?cm"));
        assert!(!text.contains("Optimal Ranges"));
    }

    struct FlakySnapshots;

    #[async_trait]
    impl GrowStateProvider for FlakySnapshots {
        async fn get_grow(
            &self,
            _owner_id: &str,
            _grow_id: Option<&str>,
        ) -> Result<Option<Grow>, GrowStateError> {
            Ok(Some(sample_grow()))
        }

        async fn recent_snapshots(
            &self,
            _grow_id: &str,
            _limit: usize,
        ) -> Result<Vec<Snapshot>, GrowStateError> {
            Err(GrowStateError::LookupFailed("sensor table offline".into()))
        }
    }

    #[tokio::test]
    async fn snapshot_failure_keeps_rest_of_block() {
        let formatter = GrowContextFormatter::new(Arc::new(FlakySnapshots));
        let ctx = formatter.build("o1", None).await.unwrap().unwrap();
        assert_eq!(ctx.grow_id, "g1");
        assert!(ctx.text.contains("Optimal Ranges"));
        assert!(!ctx.text.contains("Recent Sensor Readings"));
    }
}
