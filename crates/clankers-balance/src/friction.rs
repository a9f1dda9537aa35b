//! Linearized friction cone constraints.
//!
//! Each foot force `f = [fx, fy, fz]` is constrained by five rows of a
//! pyramid approximating the Coulomb cone `‖f_t‖ ≤ μ fz`:
//!
//! ```text
//! row   C_f · f        stance lower   stance upper
//!  0    fx - μ fz        -∞             0
//!  1    fy - μ fz        -∞             0
//!  2    fy + μ fz         0            +∞
//!  3    fx + μ fz         0            +∞
//!  4    fz               fz_min        fz_max
//! ```
//!
//! The matrix is fixed for the controller's lifetime. Only the bounds change
//! with the contact schedule: a swing foot has all five rows pinned to zero,
//! which forces `fz = 0` and then `fx = fy = 0`.

use nalgebra::{SMatrix, SVector};

use crate::error::BalanceError;
use crate::types::{
    CONE_ROWS_PER_FOOT, ContactSchedule, LegState, N_CONSTRAINTS, N_LEGS, N_VARIABLES,
};

/// Friction cone constraint matrix (20×12).
pub type ConeMatrix = SMatrix<f64, N_CONSTRAINTS, N_VARIABLES>;
/// One bound per cone row.
pub type BoundVector = SVector<f64, N_CONSTRAINTS>;

/// Lower and upper bounds on `C · f` for one cycle.
#[derive(Clone, Debug, PartialEq)]
pub struct ConeBounds {
    pub lower: BoundVector,
    pub upper: BoundVector,
    /// Contact state per leg, in configured order.
    pub states: [LegState; N_LEGS],
}

impl ConeBounds {
    pub fn is_stance(&self, leg: usize) -> bool {
        self.states[leg] == LegState::Stance
    }
}

/// Pyramidal friction cone model shared by all feet.
#[derive(Clone, Debug)]
pub struct FrictionCone {
    mu: f64,
    fz_min: f64,
    fz_max: f64,
    sentinel: f64,
}

impl FrictionCone {
    /// `sentinel` is the finite magnitude used in place of ±∞.
    pub const fn new(mu: f64, fz_min: f64, fz_max: f64, sentinel: f64) -> Self {
        Self {
            mu,
            fz_min,
            fz_max,
            sentinel,
        }
    }

    pub const fn mu(&self) -> f64 {
        self.mu
    }

    /// Build the block-diagonal 20×12 cone matrix.
    pub fn constraint_matrix(&self) -> ConeMatrix {
        let mu = self.mu;
        #[rustfmt::skip]
        let block = SMatrix::<f64, CONE_ROWS_PER_FOOT, 3>::new(
            1.0, 0.0, -mu,
            0.0, 1.0, -mu,
            0.0, 1.0,  mu,
            1.0, 0.0,  mu,
            0.0, 0.0, 1.0,
        );

        let mut c = ConeMatrix::zeros();
        for leg in 0..N_LEGS {
            c.fixed_view_mut::<CONE_ROWS_PER_FOOT, 3>(CONE_ROWS_PER_FOOT * leg, 3 * leg)
                .copy_from(&block);
        }
        c
    }

    /// Per-cycle bounds from the contact schedule.
    ///
    /// `legs` fixes the row order. Every leg must be present in `schedule`.
    pub fn bounds<S: AsRef<str>>(
        &self,
        legs: &[S],
        schedule: &(impl ContactSchedule + ?Sized),
    ) -> Result<ConeBounds, BalanceError> {
        let inf = self.sentinel;
        let stance_lower = [-inf, -inf, 0.0, 0.0, self.fz_min];
        let stance_upper = [0.0, 0.0, inf, inf, self.fz_max];

        let mut lower = BoundVector::zeros();
        let mut upper = BoundVector::zeros();
        let mut states = [LegState::Swing; N_LEGS];

        for (i, leg) in legs.iter().take(N_LEGS).enumerate() {
            let leg = leg.as_ref();
            let state = schedule
                .contact_state(leg)
                .ok_or_else(|| BalanceError::MissingContactState(leg.to_owned()))?;
            states[i] = state;

            // Swing rows stay at zero.
            if state == LegState::Stance {
                let row = CONE_ROWS_PER_FOOT * i;
                for k in 0..CONE_ROWS_PER_FOOT {
                    lower[row + k] = stance_lower[k];
                    upper[row + k] = stance_upper[k];
                }
            }
        }

        Ok(ConeBounds {
            lower,
            upper,
            states,
        })
    }
}
