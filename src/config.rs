//! Engine configuration: every numeric knob spec.md leaves as a default or
//! an open question (§4.4, §9) is exposed here rather than hard-coded, the
//! way the teacher's `Config` exposes geohash precision, sync policy, etc.

use serde::de::Error as _;
use serde::{Deserialize, Serialize};

/// Tunable thresholds and defaults for the query engine.
///
/// # Examples
///
/// ```rust
/// use geocqr::config::EngineConfig;
///
/// let config = EngineConfig::default();
/// assert_eq!(config.cell_count_threshold, 10);
/// assert_eq!(config.item_count_threshold, 20);
/// ```
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Query-subject classification: max `fm + pm` cells for an "item"
    /// classification (spec.md §4.4.1).
    #[serde(default = "EngineConfig::default_cell_count_threshold")]
    pub cell_count_threshold: u32,

    /// Query-subject classification: max flattened item count for an
    /// "item" classification (spec.md §4.4.1).
    #[serde(default = "EngineConfig::default_item_count_threshold")]
    pub item_count_threshold: u32,

    /// Fallback region-dilation-by-item-coverage percentage used by `:in`
    /// when the operator carries no explicit numeric value (spec.md
    /// §4.4.2 says "alias of region-dilation by item coverage at 90%").
    #[serde(default = "EngineConfig::default_in_coverage_pct")]
    pub in_operator_coverage_pct: f64,

    /// Length of the 90°-opening triangle used for compass queries whose
    /// subject is a point item, in meters (spec.md §4.4.2 / §9).
    #[serde(default = "EngineConfig::default_compass_point_leg_meters")]
    pub compass_point_leg_meters: f64,

    /// Opening angle of compass cones/sectors, in degrees (spec.md §9:
    /// "hard-coded 45°").
    #[serde(default = "EngineConfig::default_compass_opening_degrees")]
    pub compass_opening_degrees: f64,

    /// `in_direction_scale` at subject diagonals < 100m (spec.md §4.4.2).
    #[serde(default = "EngineConfig::default_compass_scale_near")]
    pub compass_in_direction_scale_near: f64,

    /// `in_direction_scale` at subject diagonals > 1km (spec.md §4.4.2).
    #[serde(default = "EngineConfig::default_compass_scale_far")]
    pub compass_in_direction_scale_far: f64,

    /// Perpendicular flare scale for the region compass trapezoid (spec.md
    /// §4.4.2).
    #[serde(default = "EngineConfig::default_compass_ortho_scale")]
    pub compass_ortho_scale: f64,

    /// Radius, in meters, `:near` dilates its subject by. Spec.md §9 flags
    /// the C++ original's `allToFull()` as "likely a placeholder" and asks
    /// implementers to pick a principled default; this is it.
    #[serde(default = "EngineConfig::default_near_dilation_meters")]
    pub near_default_dilation_meters: f64,

    /// Items pulled per KV-stats/KoMa worker block (spec.md §4.6).
    #[serde(default = "EngineConfig::default_kv_stats_block_size")]
    pub kv_stats_block_size: usize,

    /// Thread-local table size that triggers a flush to the shared reducer
    /// (spec.md §4.6).
    #[serde(default = "EngineConfig::default_kv_stats_flush_threshold")]
    pub kv_stats_flush_threshold: usize,

    /// Denominator of the KoMa near-disjointness bound
    /// `|A ∩ B| <= (|A| + |B|) / denominator` (spec.md §4.7, default 200).
    #[serde(default = "EngineConfig::default_koma_near_disjoint_denominator")]
    pub koma_near_disjoint_denominator: f64,

    /// Worker thread count for parallel phases when the caller doesn't
    /// specify one explicitly.
    #[serde(default = "EngineConfig::default_thread_count")]
    pub default_thread_count: usize,
}

impl EngineConfig {
    const fn default_cell_count_threshold() -> u32 {
        10
    }

    const fn default_item_count_threshold() -> u32 {
        20
    }

    const fn default_in_coverage_pct() -> f64 {
        0.90
    }

    const fn default_compass_point_leg_meters() -> f64 {
        200.0
    }

    const fn default_compass_opening_degrees() -> f64 {
        45.0
    }

    const fn default_compass_scale_near() -> f64 {
        10.0
    }

    const fn default_compass_scale_far() -> f64 {
        2.0
    }

    const fn default_compass_ortho_scale() -> f64 {
        0.5
    }

    const fn default_near_dilation_meters() -> f64 {
        500.0
    }

    const fn default_kv_stats_block_size() -> usize {
        1000
    }

    const fn default_kv_stats_flush_threshold() -> usize {
        1_000_000
    }

    const fn default_koma_near_disjoint_denominator() -> f64 {
        200.0
    }

    fn default_thread_count() -> usize {
        std::thread::available_parallelism()
            .map(|n| n.get())
            .unwrap_or(1)
    }

    /// The `in_direction_scale` for a subject whose bounding-box diagonal
    /// is `diagonal_m` meters, linearly interpolated between the near and
    /// far scales over [100m, 1km] (spec.md §4.4.2).
    pub fn compass_in_direction_scale(&self, diagonal_m: f64) -> f64 {
        const NEAR_M: f64 = 100.0;
        const FAR_M: f64 = 1_000.0;
        if diagonal_m <= NEAR_M {
            self.compass_in_direction_scale_near
        } else if diagonal_m >= FAR_M {
            self.compass_in_direction_scale_far
        } else {
            let t = (diagonal_m - NEAR_M) / (FAR_M - NEAR_M);
            self.compass_in_direction_scale_near
                + t * (self.compass_in_direction_scale_far - self.compass_in_direction_scale_near)
        }
    }

    /// Validate configuration values.
    pub fn validate(&self) -> std::result::Result<(), String> {
        if self.cell_count_threshold == 0 {
            return Err("cell_count_threshold must be greater than zero".to_string());
        }
        if self.item_count_threshold == 0 {
            return Err("item_count_threshold must be greater than zero".to_string());
        }
        if !(0.0..=1.0).contains(&self.in_operator_coverage_pct) {
            return Err("in_operator_coverage_pct must be in (0, 1]".to_string());
        }
        if self.kv_stats_block_size == 0 {
            return Err("kv_stats_block_size must be greater than zero".to_string());
        }
        if self.koma_near_disjoint_denominator <= 0.0 {
            return Err("koma_near_disjoint_denominator must be positive".to_string());
        }
        if self.default_thread_count == 0 {
            return Err("default_thread_count must be greater than zero".to_string());
        }
        Ok(())
    }

    /// Load configuration from a JSON string.
    pub fn from_json(json: &str) -> std::result::Result<Self, serde_json::Error> {
        let config: EngineConfig = serde_json::from_str(json)?;
        if let Err(e) = config.validate() {
            return Err(serde_json::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as a JSON string.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    /// Load configuration from a TOML string (requires the `toml` feature).
    #[cfg(feature = "toml")]
    pub fn from_toml(toml_str: &str) -> std::result::Result<Self, toml::de::Error> {
        let config: EngineConfig = toml::from_str(toml_str)?;
        if let Err(e) = config.validate() {
            return Err(toml::de::Error::custom(e));
        }
        Ok(config)
    }

    /// Save configuration as a TOML string (requires the `toml` feature).
    #[cfg(feature = "toml")]
    pub fn to_toml(&self) -> std::result::Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cell_count_threshold: Self::default_cell_count_threshold(),
            item_count_threshold: Self::default_item_count_threshold(),
            in_operator_coverage_pct: Self::default_in_coverage_pct(),
            compass_point_leg_meters: Self::default_compass_point_leg_meters(),
            compass_opening_degrees: Self::default_compass_opening_degrees(),
            compass_in_direction_scale_near: Self::default_compass_scale_near(),
            compass_in_direction_scale_far: Self::default_compass_scale_far(),
            compass_ortho_scale: Self::default_compass_ortho_scale(),
            near_default_dilation_meters: Self::default_near_dilation_meters(),
            kv_stats_block_size: Self::default_kv_stats_block_size(),
            kv_stats_flush_threshold: Self::default_kv_stats_flush_threshold(),
            koma_near_disjoint_denominator: Self::default_koma_near_disjoint_denominator(),
            default_thread_count: Self::default_thread_count(),
        }
    }
}
