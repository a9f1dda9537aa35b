//! Balance controller configuration.
//!
//! Everything here is fixed at controller construction. Values can be built
//! in code (starting from [`BalanceConfig::default`]) or loaded from TOML.

use std::collections::HashSet;

use nalgebra::{Matrix3, Matrix6, SMatrix, SVector, Vector3, Vector6};
use serde::{Deserialize, Serialize};

use crate::error::ConfigError;
use crate::types::{N_LEGS, N_VARIABLES};

// ---------------------------------------------------------------------------
// Serde default functions
// ---------------------------------------------------------------------------

const fn default_friction_coeff() -> f64 {
    0.8
}
const fn default_mass() -> f64 {
    9.0
}
const fn default_fz_min() -> f64 {
    10.0
}
const fn default_fz_max() -> f64 {
    160.0
}
const fn default_inertia() -> [[f64; 3]; 3] {
    [[0.011253, 0.0, 0.0], [0.0, 0.036203, 0.0], [0.0, 0.0, 0.042673]]
}
const fn default_dynamics_weights() -> [f64; 6] {
    [1.0; 6]
}
const fn default_force_weights() -> [f64; N_VARIABLES] {
    [1e-4; N_VARIABLES]
}
const fn default_kp_position() -> [f64; 3] {
    [200.0; 3]
}
const fn default_kd_position() -> [f64; 3] {
    [50.0; 3]
}
const fn default_kp_orientation() -> [f64; 3] {
    [2000.0; 3]
}
const fn default_kd_orientation() -> [f64; 3] {
    [200.0; 3]
}
fn default_legs() -> Vec<String> {
    ["FL", "FR", "RL", "RR"].map(String::from).to_vec()
}
const fn default_gravity() -> f64 {
    9.81
}
const fn default_bound_sentinel() -> f64 {
    1.0e6
}
const fn default_max_iter() -> u32 {
    200
}
const fn default_time_limit() -> f64 {
    0.01
}

// ---------------------------------------------------------------------------
// FailurePolicy
// ---------------------------------------------------------------------------

/// What the controller commands for a cycle whose QP solve failed.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailurePolicy {
    /// Command zero force on every leg.
    #[default]
    Zero,
    /// Repeat the last converged command, zeroing legs that are now in swing.
    /// Falls back to zero when nothing has converged yet.
    HoldPrevious,
}

// ---------------------------------------------------------------------------
// SolverConfig
// ---------------------------------------------------------------------------

/// Per-solve budget handed to the QP backend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SolverConfig {
    /// Maximum solver iterations per cycle (default: 200).
    #[serde(default = "default_max_iter")]
    pub max_iter: u32,

    /// Wall-clock limit per solve in seconds (default: 0.01).
    #[serde(default = "default_time_limit")]
    pub time_limit: f64,

    /// Print solver progress.
    #[serde(default)]
    pub verbose: bool,
}

impl Default for SolverConfig {
    fn default() -> Self {
        Self {
            max_iter: default_max_iter(),
            time_limit: default_time_limit(),
            verbose: false,
        }
    }
}

// ---------------------------------------------------------------------------
// BalanceConfig
// ---------------------------------------------------------------------------

/// Physical properties, gains and QP weights of the balance controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BalanceConfig {
    /// Coulomb friction coefficient μ.
    #[serde(default = "default_friction_coeff")]
    pub friction_coeff: f64,

    /// Total robot mass in kg.
    #[serde(default = "default_mass")]
    pub mass: f64,

    /// Minimum normal force per stance foot in N.
    #[serde(default = "default_fz_min")]
    pub fz_min: f64,

    /// Maximum normal force per stance foot in N.
    #[serde(default = "default_fz_max")]
    pub fz_max: f64,

    /// Body-frame inertia tensor about the CoM, row-major.
    #[serde(default = "default_inertia")]
    pub inertia: [[f64; 3]; 3],

    /// Diagonal of S, the weight on the wrench residual `(Ax - b)`.
    /// Order: [fx, fy, fz, mx, my, mz].
    #[serde(default = "default_dynamics_weights")]
    pub dynamics_weights: [f64; 6],

    /// Diagonal of W, the regularization weight on foot force magnitude.
    #[serde(default = "default_force_weights")]
    pub force_weights: [f64; N_VARIABLES],

    /// Feedforward gains: [vx, vy, weight, wx, wy, wz].
    #[serde(default)]
    pub kff: [f64; 6],

    /// Proportional gain on CoM position.
    #[serde(default = "default_kp_position")]
    pub kp_position: [f64; 3],

    /// Derivative gain on CoM linear velocity.
    #[serde(default = "default_kd_position")]
    pub kd_position: [f64; 3],

    /// Proportional gain on body orientation.
    #[serde(default = "default_kp_orientation")]
    pub kp_orientation: [f64; 3],

    /// Derivative gain on body angular velocity.
    #[serde(default = "default_kd_orientation")]
    pub kd_orientation: [f64; 3],

    /// Leg identifiers. Leg `i` owns decision variables `[3i, 3i + 2]`.
    #[serde(default = "default_legs")]
    pub legs: Vec<String>,

    /// Gravitational acceleration magnitude (positive).
    #[serde(default = "default_gravity")]
    pub gravity: f64,

    /// Magnitude standing in for an unbounded constraint side.
    /// Must exceed any realizable foot force.
    #[serde(default = "default_bound_sentinel")]
    pub bound_sentinel: f64,

    #[serde(default)]
    pub failure_policy: FailurePolicy,

    #[serde(default)]
    pub solver: SolverConfig,
}

impl Default for BalanceConfig {
    fn default() -> Self {
        Self {
            friction_coeff: default_friction_coeff(),
            mass: default_mass(),
            fz_min: default_fz_min(),
            fz_max: default_fz_max(),
            inertia: default_inertia(),
            dynamics_weights: default_dynamics_weights(),
            force_weights: default_force_weights(),
            kff: [0.0; 6],
            kp_position: default_kp_position(),
            kd_position: default_kd_position(),
            kp_orientation: default_kp_orientation(),
            kd_orientation: default_kd_orientation(),
            legs: default_legs(),
            gravity: default_gravity(),
            bound_sentinel: default_bound_sentinel(),
            failure_policy: FailurePolicy::default(),
            solver: SolverConfig::default(),
        }
    }
}

impl BalanceConfig {
    /// Validate configuration. Returns Err on invalid values.
    pub fn validate(&self) -> Result<(), ConfigError> {
        positive("mass", self.mass)?;
        positive("gravity", self.gravity)?;
        positive("bound_sentinel", self.bound_sentinel)?;
        non_negative("friction_coeff", self.friction_coeff)?;
        non_negative("fz_min", self.fz_min)?;
        if !self.fz_max.is_finite() || self.fz_max < self.fz_min {
            return Err(ConfigError::invalid("fz_max", "must be >= fz_min"));
        }
        if self.fz_max >= self.bound_sentinel {
            return Err(ConfigError::invalid(
                "fz_max",
                "must be below bound_sentinel",
            ));
        }
        if self.inertia.iter().flatten().any(|v| !v.is_finite()) {
            return Err(ConfigError::invalid("inertia", "entries must be finite"));
        }
        for &w in &self.dynamics_weights {
            non_negative("dynamics_weights", w)?;
        }
        for &w in &self.force_weights {
            non_negative("force_weights", w)?;
        }
        if self
            .kff
            .iter()
            .chain(&self.kp_position)
            .chain(&self.kd_position)
            .chain(&self.kp_orientation)
            .chain(&self.kd_orientation)
            .any(|g| !g.is_finite())
        {
            return Err(ConfigError::invalid("gains", "must be finite"));
        }

        if self.legs.len() != N_LEGS {
            return Err(ConfigError::LegCount {
                expected: N_LEGS,
                got: self.legs.len(),
            });
        }
        let mut seen = HashSet::with_capacity(N_LEGS);
        for leg in &self.legs {
            if !seen.insert(leg.as_str()) {
                return Err(ConfigError::DuplicateLeg(leg.clone()));
            }
        }

        if self.solver.max_iter == 0 {
            return Err(ConfigError::invalid("solver.max_iter", "must be > 0"));
        }
        if self.solver.time_limit.is_nan() || self.solver.time_limit <= 0.0 {
            return Err(ConfigError::invalid("solver.time_limit", "must be > 0"));
        }
        Ok(())
    }

    /// Body-frame inertia tensor.
    pub fn inertia_matrix(&self) -> Matrix3<f64> {
        let i = &self.inertia;
        Matrix3::new(
            i[0][0], i[0][1], i[0][2], i[1][0], i[1][1], i[1][2], i[2][0], i[2][1], i[2][2],
        )
    }

    /// S as a 6×6 diagonal matrix.
    pub fn dynamics_weight_matrix(&self) -> Matrix6<f64> {
        Matrix6::from_diagonal(&Vector6::from(self.dynamics_weights))
    }

    /// W as a 12×12 diagonal matrix.
    pub fn force_weight_matrix(&self) -> SMatrix<f64, N_VARIABLES, N_VARIABLES> {
        SMatrix::from_diagonal(&SVector::from(self.force_weights))
    }

    pub fn kp_position(&self) -> Vector3<f64> {
        Vector3::from(self.kp_position)
    }

    pub fn kd_position(&self) -> Vector3<f64> {
        Vector3::from(self.kd_position)
    }

    pub fn kp_orientation(&self) -> Vector3<f64> {
        Vector3::from(self.kp_orientation)
    }

    pub fn kd_orientation(&self) -> Vector3<f64> {
        Vector3::from(self.kd_orientation)
    }

    /// Parse and validate a TOML document.
    pub fn from_toml_str(content: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(content)?;
        config.validate()?;
        Ok(config)
    }

    /// Load from TOML file.
    pub fn from_file(path: impl AsRef<std::path::Path>) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }
}

fn positive(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} (must be > 0)")))
    }
}

fn non_negative(field: &str, value: f64) -> Result<(), ConfigError> {
    if value.is_finite() && value >= 0.0 {
        Ok(())
    } else {
        Err(ConfigError::invalid(field, format!("{value} (must be >= 0)")))
    }
}
