//! QP formulation of the force distribution problem.
//!
//! ```text
//! minimize    ½ fᵀ Q f + cᵀ f
//! subject to  lb ≤ C f ≤ ub
//!
//! Q = 2 (Aᵀ S A + W)
//! c = -2 Aᵀ S b
//! ```
//!
//! This is `‖A f - b‖²_S + ‖f‖²_W` expanded, with the constant term dropped.
//! There are no separate variable bounds: the cone rows already cover the
//! swing (zero force) case.

use nalgebra::{Matrix6, SMatrix};

use crate::dynamics::WrenchMap;
use crate::friction::{BoundVector, ConeBounds, ConeMatrix};
use crate::types::{ForceVector, N_VARIABLES};

/// 12×12 QP Hessian.
pub type HessianMatrix = SMatrix<f64, N_VARIABLES, N_VARIABLES>;

/// One cycle's QP. The constraint matrix is borrowed from the controller,
/// which owns the only copy.
#[derive(Clone, Debug)]
pub struct QpProblem<'a> {
    pub hessian: HessianMatrix,
    pub gradient: ForceVector,
    pub constraints: &'a ConeMatrix,
    pub lower: BoundVector,
    pub upper: BoundVector,
}

impl QpProblem<'_> {
    /// Objective value `½ fᵀ Q f + cᵀ f`.
    pub fn objective(&self, f: &ForceVector) -> f64 {
        0.5 * f.dot(&(self.hessian * f)) + self.gradient.dot(f)
    }

    /// Largest bound violation of `C f`, zero when feasible.
    pub fn max_violation(&self, f: &ForceVector) -> f64 {
        let cf = self.constraints * f;
        cf.iter()
            .zip(self.lower.iter().zip(self.upper.iter()))
            .map(|(&v, (&lo, &hi))| (lo - v).max(v - hi).max(0.0))
            .fold(0.0, f64::max)
    }
}

/// Cost weights of the QP.
#[derive(Clone, Debug)]
pub struct QpWeights {
    /// S: weight on the wrench residual.
    pub dynamics: Matrix6<f64>,
    /// W: regularization on force magnitude.
    pub forces: HessianMatrix,
}

impl QpWeights {
    /// Assemble the QP from the wrench map, cone matrix and this cycle's bounds.
    pub fn formulate<'a>(
        &self,
        wrench: &WrenchMap,
        constraints: &'a ConeMatrix,
        bounds: &ConeBounds,
    ) -> QpProblem<'a> {
        let at_s = wrench.a.transpose() * self.dynamics;
        let mut hessian = 2.0 * (at_s * wrench.a + self.forces);
        // Remove round-off asymmetry; the solver reads only the upper triangle.
        hessian = 0.5 * (hessian + hessian.transpose());
        let gradient = -2.0 * at_s * wrench.b;

        QpProblem {
            hessian,
            gradient,
            constraints,
            lower: bounds.lower,
            upper: bounds.upper,
        }
    }
}
