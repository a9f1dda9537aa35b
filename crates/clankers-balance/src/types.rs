//! Core types for the balance controller.

use std::collections::{BTreeMap, HashMap};
use std::hash::BuildHasher;

use nalgebra::{Rotation3, SVector, Vector3};

/// Number of legs (feet) the controller distributes force over.
pub const N_LEGS: usize = 4;
/// QP decision variables: [fx, fy, fz] per foot.
pub const N_VARIABLES: usize = 3 * N_LEGS;
/// Linearized friction-cone rows per foot.
pub const CONE_ROWS_PER_FOOT: usize = 5;
/// QP constraint rows.
pub const N_CONSTRAINTS: usize = CONE_ROWS_PER_FOOT * N_LEGS;
/// Newton-Euler equations: 3 force + 3 moment.
pub const N_EQUATIONS: usize = 6;

/// Stacked per-foot force vector in configured leg order.
pub type ForceVector = SVector<f64, N_VARIABLES>;

/// Foot positions relative to the body origin, expressed in the body frame.
pub type FootPositions = [Vector3<f64>; N_LEGS];

/// Contact state of a leg for the current cycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum LegState {
    /// Airborne; must exert no force.
    Swing,
    /// On the ground; may push within the friction cone.
    Stance,
}

/// Per-cycle source of leg contact states.
///
/// Returns `None` when the schedule has no entry for `leg`; the controller
/// treats that as an error rather than guessing a state.
pub trait ContactSchedule {
    fn contact_state(&self, leg: &str) -> Option<LegState>;
}

impl<S: BuildHasher> ContactSchedule for HashMap<String, LegState, S> {
    fn contact_state(&self, leg: &str) -> Option<LegState> {
        self.get(leg).copied()
    }
}

impl ContactSchedule for BTreeMap<String, LegState> {
    fn contact_state(&self, leg: &str) -> Option<LegState> {
        self.get(leg).copied()
    }
}

/// Contact state and gait phase of one leg.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct LegPhase {
    pub state: LegState,
    /// Position in the gait cycle [0, 1). Opaque to the balance controller.
    pub phase: f64,
}

/// Gait schedule snapshot: leg name → contact state and phase.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct GaitMap {
    legs: BTreeMap<String, LegPhase>,
}

impl GaitMap {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every named leg in stance at phase 0.
    pub fn stance<S: AsRef<str>>(legs: &[S]) -> Self {
        Self::from_states(legs.iter().map(|leg| (leg.as_ref(), LegState::Stance)))
    }

    /// Build from `(leg, state)` pairs, all at phase 0.
    pub fn from_states<'a>(states: impl IntoIterator<Item = (&'a str, LegState)>) -> Self {
        let mut map = Self::new();
        for (leg, state) in states {
            map.insert(leg, state, 0.0);
        }
        map
    }

    pub fn insert(&mut self, leg: impl Into<String>, state: LegState, phase: f64) {
        self.legs.insert(leg.into(), LegPhase { state, phase });
    }

    pub fn get(&self, leg: &str) -> Option<&LegPhase> {
        self.legs.get(leg)
    }

    pub fn len(&self) -> usize {
        self.legs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.legs.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&str, &LegPhase)> {
        self.legs.iter().map(|(name, phase)| (name.as_str(), phase))
    }
}

impl ContactSchedule for GaitMap {
    fn contact_state(&self, leg: &str) -> Option<LegState> {
        self.legs.get(leg).map(|p| p.state)
    }
}

/// Rigid body state of the robot torso.
#[derive(Clone, Debug, PartialEq)]
pub struct BodyState {
    /// CoM position in world frame (meters).
    pub position: Vector3<f64>,
    /// CoM linear velocity in world frame (m/s).
    pub linear_velocity: Vector3<f64>,
    /// Angular velocity in world frame (rad/s).
    pub angular_velocity: Vector3<f64>,
    /// Rotation from body frame to world frame.
    pub orientation: Rotation3<f64>,
}

impl BodyState {
    /// Body at rest at `position` with identity orientation.
    pub fn at_rest(position: Vector3<f64>) -> Self {
        Self {
            position,
            linear_velocity: Vector3::zeros(),
            angular_velocity: Vector3::zeros(),
            orientation: Rotation3::identity(),
        }
    }
}

impl Default for BodyState {
    fn default() -> Self {
        Self::at_rest(Vector3::zeros())
    }
}

/// Output of one balance control cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct BalanceCommand {
    /// Body-frame force each foot should exert on the environment.
    pub forces: ForceVector,
    /// World-frame ground reaction forces returned by the QP.
    /// Zero when the solve failed.
    pub world_forces: ForceVector,
    /// Whether this cycle's QP converged.
    pub converged: bool,
    /// Solve time in microseconds.
    pub solve_time_us: u64,
}

impl BalanceCommand {
    /// All-zero command flagged as not converged.
    pub fn zero() -> Self {
        Self {
            forces: ForceVector::zeros(),
            world_forces: ForceVector::zeros(),
            converged: false,
            solve_time_us: 0,
        }
    }

    /// Body-frame force for foot `i` (configured leg order).
    ///
    /// # Panics
    /// If `i >= N_LEGS`.
    pub fn foot(&self, i: usize) -> Vector3<f64> {
        foot_block(&self.forces, i)
    }

    /// World-frame reaction force for foot `i`.
    ///
    /// # Panics
    /// If `i >= N_LEGS`.
    pub fn world_foot(&self, i: usize) -> Vector3<f64> {
        foot_block(&self.world_forces, i)
    }

    /// Body-frame forces keyed by leg name.
    pub fn force_map<S: AsRef<str>>(&self, legs: &[S]) -> BTreeMap<String, Vector3<f64>> {
        legs.iter()
            .enumerate()
            .map(|(i, leg)| (leg.as_ref().to_owned(), self.foot(i)))
            .collect()
    }
}

pub(crate) fn foot_block(v: &ForceVector, i: usize) -> Vector3<f64> {
    v.fixed_rows::<3>(3 * i).into_owned()
}
