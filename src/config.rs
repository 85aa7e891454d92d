//! Export configuration.
//!
//! All lengths are millimetres, all angles radians. Every struct is
//! `#[serde(default)]`, so a JSON config only has to name what it changes.

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

// ============================================================================
// Hardware presets
// ============================================================================

/// Named hardware constants.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Presets {
    /// `create_node` returns an existing node closer than this.
    pub merge_tolerance: f64,
    /// No edge end ever reserves less clearance than this.
    pub minimum_elongation: f64,
    /// Radius of the cuff a strut end plugs into on a main hub.
    pub connector_cuff_radius: f64,
    /// Main clearance between hub centre and hinge (l1).
    pub main_clearance: f64,
    /// Hinge gap length (l2).
    pub gap_length: f64,
    /// Minimum spacer length behind a hinge (l3).
    pub minimum_spacer: f64,
    /// How far inset nodes sit from a rotary hinge axis node.
    pub rotary_inset_distance: f64,
    /// With shortening enabled, an end may overshoot its target by this much.
    pub shortening_band: f64,
    /// Step added to a too-short edge per relaxation pass.
    pub grow_step: f64,
    /// Step removed from a too-long edge per relaxation pass.
    pub shrink_step: f64,
}

impl Default for Presets {
    fn default() -> Self {
        Self {
            merge_tolerance: 50.0,
            minimum_elongation: 20.0,
            connector_cuff_radius: 27.0,
            main_clearance: 35.0,
            gap_length: 40.0,
            minimum_spacer: 10.0,
            rotary_inset_distance: 30.0,
            shortening_band: 10.0,
            grow_step: 10.0,
            shrink_step: 1.0,
        }
    }
}

impl Presets {
    /// Target clearance for edges ending in a sub-hub or hinge: l1 + l2 + l3.
    pub fn hinge_clearance(&self) -> f64 {
        self.main_clearance + self.gap_length + self.minimum_spacer
    }

    pub fn validate(&self) -> Result<()> {
        let named = [
            ("merge_tolerance", self.merge_tolerance),
            ("minimum_elongation", self.minimum_elongation),
            ("connector_cuff_radius", self.connector_cuff_radius),
            ("main_clearance", self.main_clearance),
            ("gap_length", self.gap_length),
            ("minimum_spacer", self.minimum_spacer),
            ("rotary_inset_distance", self.rotary_inset_distance),
            ("shortening_band", self.shortening_band),
            ("grow_step", self.grow_step),
            ("shrink_step", self.shrink_step),
        ];
        for (name, value) in named {
            if !value.is_finite() || value < 0.0 {
                return Err(Error::InvalidConfig(format!("{name} must be a non-negative length, got {value}")));
            }
        }
        if self.grow_step == 0.0 {
            return Err(Error::InvalidConfig("grow_step must be positive".into()));
        }
        Ok(())
    }
}

// ============================================================================
// Rigidity analysis
// ============================================================================

/// How each actuator is driven while probing for rigid sub-structures.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RigidityConfig {
    /// Dihedral changes above this mark a triangle pair as rotating.
    pub angle_tolerance: f64,
    /// Power given to every dynamic edge that is not being probed.
    pub idle_power: f64,
    /// Fraction of its length a probed actuator extends by.
    pub drive_fraction: f64,
    /// Simulated time per probe.
    pub duration: f64,
}

impl Default for RigidityConfig {
    fn default() -> Self {
        Self {
            angle_tolerance: 1e-4,
            idle_power: 1e-6,
            drive_fraction: 0.1,
            duration: 1.0,
        }
    }
}

// ============================================================================
// Pipeline
// ============================================================================

/// Everything the export pipeline needs besides its collaborators.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExportConfig {
    pub presets: Presets,
    pub rigidity: RigidityConfig,
    /// Also pull over-long elongations back toward their target.
    pub shorten_elongations: bool,
    /// Elongation passes before the solver gives up.
    pub max_elongation_passes: usize,
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            presets: Presets::default(),
            rigidity: RigidityConfig::default(),
            shorten_elongations: false,
            max_elongation_passes: 500,
        }
    }
}

impl ExportConfig {
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: ExportConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.presets.validate()?;
        let r = &self.rigidity;
        if !(r.angle_tolerance > 0.0) {
            return Err(Error::InvalidConfig("rigidity.angle_tolerance must be positive".into()));
        }
        if !(r.drive_fraction > 0.0) {
            return Err(Error::InvalidConfig("rigidity.drive_fraction must be positive".into()));
        }
        if !(0.0..1.0).contains(&r.idle_power) {
            return Err(Error::InvalidConfig("rigidity.idle_power must be in [0, 1)".into()));
        }
        if self.max_elongation_passes == 0 {
            return Err(Error::InvalidConfig("max_elongation_passes must be at least 1".into()));
        }
        Ok(())
    }
}
