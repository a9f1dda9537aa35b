//! Friction-cone QP force distribution for quadruped balance control.
//!
//! Each control cycle, the controller chooses ground reaction forces for the
//! four feet so that the torso tracks a desired pose and twist:
//!
//! 1. **Feedback law**: PD + feedforward on position and orientation error
//!    gives a desired CoM and angular acceleration
//! 2. **Rigid body model**: Newton-Euler equations map stacked foot forces
//!    to the body wrench, `A f ≈ b`
//! 3. **Friction cone**: a 5-row linearized pyramid per foot; swing feet are
//!    pinned to zero through the bounds alone
//! 4. **QP**: weighted least squares on the wrench residual plus force
//!    regularization, solved warm across cycles
//!
//! # Architecture
//!
//! Only the foot forces are decision variables (12 for 4 feet). The cone
//! matrix is built once; per cycle the Hessian, gradient and bounds change.
//! The numerical solver sits behind [`QpBackend`], with Clarabel as the
//! default. Solver failures are logged via `tracing` and resolved by the
//! configured [`FailurePolicy`] so the control loop always gets a command.

pub mod config;
pub mod controller;
pub mod dynamics;
pub mod error;
pub mod feedback;
pub mod friction;
pub mod qp;
pub mod rotation;
pub mod solver;
pub mod types;

pub use config::{BalanceConfig, FailurePolicy, SolverConfig};
pub use controller::BalanceController;
pub use dynamics::{RigidBodyModel, WrenchMap};
pub use error::{BackendError, BalanceError, ConfigError, SolverError};
pub use feedback::{DesiredAcceleration, FeedbackGains};
pub use friction::{ConeBounds, ConeMatrix, FrictionCone};
pub use qp::{QpProblem, QpWeights};
pub use rotation::{rotation_error, skew_symmetric};
pub use solver::{ClarabelBackend, QpBackend, QpSolver};
pub use types::{
    BalanceCommand, BodyState, ContactSchedule, FootPositions, ForceVector, GaitMap, LegPhase,
    LegState,
};
