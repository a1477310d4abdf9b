//! Physics rule-sets ("engine versions")
//!
//! A rule-set is plain data: constants plus the order of solver and collision
//! sub-passes. It is picked once when a run is created and never changes.

use std::fmt;
use std::str::FromStr;

use glam::DVec2;
use serde::{Deserialize, Serialize};

use crate::error::{Result, SimError};

/// Upper bound on `iterations` accepted by validation
pub const MAX_ITERATIONS: u32 = 64;
/// Upper bound on the number of sub-passes per iteration
pub const MAX_PASSES: usize = 16;
/// Upper bound on `contact_thickness`
pub const MAX_CONTACT_THICKNESS: f64 = 64.0;
/// Upper bound on `max_extension`
pub const MAX_EXTENSION: f64 = 64.0;

/// Selectable engine versions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum EngineVersion {
    /// Early physics: no line extensions, slightly weaker mount
    Classic,
    #[default]
    Modern,
    /// More iterations, solver runs on both sides of each collision pass
    Precise,
}

impl EngineVersion {
    pub const ALL: [EngineVersion; 3] = [
        EngineVersion::Classic,
        EngineVersion::Modern,
        EngineVersion::Precise,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EngineVersion::Classic => "classic",
            EngineVersion::Modern => "modern",
            EngineVersion::Precise => "precise",
        }
    }
}

impl fmt::Display for EngineVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for EngineVersion {
    type Err = SimError;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "classic" | "6.1" => Ok(EngineVersion::Classic),
            "modern" | "6.2" => Ok(EngineVersion::Modern),
            "precise" | "6.7" => Ok(EngineVersion::Precise),
            _ => Err(SimError::UnknownRuleSet(s.to_string())),
        }
    }
}

/// One sub-pass of a frame, interpreted by the stepper
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pass {
    /// One sweep of the constraint solver over every binding
    Solve,
    /// One collision pass over every point
    Collide,
}

/// Physics constants and pass ordering for a run
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RuleSet {
    /// Version this rule-set was derived from
    pub version: EngineVersion,
    /// Added to every point's velocity once per frame
    pub gravity: DVec2,
    /// Multiplier on carried-over velocity (1.0 = none)
    pub damping: f64,
    /// How many times `passes` runs per frame
    pub iterations: u32,
    /// Sub-pass order for one iteration
    pub passes: Vec<Pass>,
    /// How far below a line surface a point may be and still be pushed out
    pub contact_thickness: f64,
    /// Extension length as a fraction of line length
    pub extension_ratio: f64,
    /// Cap on extension length
    pub max_extension: f64,
    /// Break factor of the bindings holding the rider on the sled
    pub mount_break_factor: f64,
    /// Forward impulse per acceleration-line multiplier step
    pub acceleration: f64,
    /// Scale applied to every point's friction coefficient
    pub friction_scale: f64,
    /// Velocity magnitude clamp applied in the momentum tick
    pub max_velocity: f64,
    /// Launch velocity used by `RiderState::spawn` callers
    pub start_velocity: DVec2,
}

impl Default for RuleSet {
    fn default() -> Self {
        Self::from_version(EngineVersion::Modern)
    }
}

impl RuleSet {
    /// Built-in constants for a version
    pub fn from_version(version: EngineVersion) -> Self {
        let modern = Self {
            version,
            gravity: DVec2::new(0.0, 0.175),
            damping: 1.0,
            iterations: 6,
            passes: vec![Pass::Solve, Pass::Collide],
            contact_thickness: 10.0,
            extension_ratio: 0.25,
            max_extension: 10.0,
            mount_break_factor: 1.5,
            acceleration: 0.1,
            friction_scale: 1.0,
            max_velocity: 1.0e4,
            start_velocity: DVec2::new(0.4, 0.0),
        };

        match version {
            EngineVersion::Modern => modern,
            EngineVersion::Classic => Self {
                extension_ratio: 0.0,
                max_extension: 0.0,
                mount_break_factor: 1.4,
                ..modern
            },
            EngineVersion::Precise => Self {
                iterations: 8,
                passes: vec![Pass::Solve, Pass::Collide, Pass::Solve],
                ..modern
            },
        }
    }

    /// Look up a version by name and return its rule-set
    pub fn from_name(name: &str) -> Result<Self> {
        let version: EngineVersion = name.parse()?;
        Ok(Self::from_version(version))
    }

    /// Load a rule-set from JSON and validate it
    pub fn from_json(json: &str) -> Result<Self> {
        let rules: RuleSet = serde_json::from_str(json)?;
        rules.validate()?;
        log::debug!("Loaded {} rule-set from JSON", rules.version);
        Ok(rules)
    }

    /// Serialize to JSON
    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn with_gravity(mut self, gravity: DVec2) -> Self {
        self.gravity = gravity;
        self
    }

    pub fn with_iterations(mut self, iterations: u32) -> Self {
        self.iterations = iterations;
        self
    }

    pub fn with_passes(mut self, passes: Vec<Pass>) -> Self {
        self.passes = passes;
        self
    }

    pub fn with_damping(mut self, damping: f64) -> Self {
        self.damping = damping;
        self
    }

    /// Query radius that catches every line a point could touch, extensions included
    #[inline]
    pub fn contact_reach(&self) -> f64 {
        self.contact_thickness + self.max_extension
    }

    /// Check every constant is in range
    pub fn validate(&self) -> Result<()> {
        let finite = [
            ("gravity.x", self.gravity.x),
            ("gravity.y", self.gravity.y),
            ("damping", self.damping),
            ("contact_thickness", self.contact_thickness),
            ("extension_ratio", self.extension_ratio),
            ("max_extension", self.max_extension),
            ("mount_break_factor", self.mount_break_factor),
            ("acceleration", self.acceleration),
            ("friction_scale", self.friction_scale),
            ("max_velocity", self.max_velocity),
            ("start_velocity.x", self.start_velocity.x),
            ("start_velocity.y", self.start_velocity.y),
        ];
        if let Some((name, _)) = finite.iter().find(|(_, v)| !v.is_finite()) {
            return Err(SimError::invalid_rules(format!("{name} is not finite")));
        }

        if self.iterations == 0 || self.iterations > MAX_ITERATIONS {
            return Err(SimError::invalid_rules(format!(
                "iterations must be in 1..={MAX_ITERATIONS}, got {}",
                self.iterations
            )));
        }
        if self.passes.is_empty() || self.passes.len() > MAX_PASSES {
            return Err(SimError::invalid_rules(format!(
                "passes must hold 1..={MAX_PASSES} entries, got {}",
                self.passes.len()
            )));
        }
        if !(0.0..=1.0).contains(&self.damping) {
            return Err(SimError::invalid_rules("damping must be in [0, 1]"));
        }
        if self.contact_thickness <= 0.0 || self.contact_thickness > MAX_CONTACT_THICKNESS {
            return Err(SimError::invalid_rules(format!(
                "contact_thickness must be in (0, {MAX_CONTACT_THICKNESS}], got {}",
                self.contact_thickness
            )));
        }
        if self.extension_ratio < 0.0 || self.max_extension < 0.0 {
            return Err(SimError::invalid_rules("line extensions must not be negative"));
        }
        if self.max_extension > MAX_EXTENSION {
            return Err(SimError::invalid_rules(format!(
                "max_extension must not exceed {MAX_EXTENSION}, got {}",
                self.max_extension
            )));
        }
        if self.mount_break_factor <= 1.0 {
            return Err(SimError::invalid_rules("mount_break_factor must exceed 1"));
        }
        if self.acceleration < 0.0 || self.friction_scale < 0.0 {
            return Err(SimError::invalid_rules(
                "acceleration and friction_scale must not be negative",
            ));
        }
        if self.max_velocity <= 0.0 {
            return Err(SimError::invalid_rules("max_velocity must be positive"));
        }
        Ok(())
    }
}
