//! QP solver adapter.
//!
//! [`QpBackend`] is the seam to the numerical solver: a cold `init` followed
//! by cheaper `hotstart` calls that reuse the solver's internal state.
//! [`QpSolver`] owns one backend and hides the cold/warm distinction behind
//! [`QpSolver::solve`].
//!
//! The default backend is Clarabel (pure Rust interior-point). Two-sided
//! bounds are stacked into a single nonnegative cone:
//!
//! ```text
//! [ C ] f + s = [ ub ]      s ≥ 0
//! [-C ]         [-lb ]
//! ```
//!
//! The stacked matrix never changes, so a hotstart only rewrites P, q and b
//! in place. P keeps a fixed dense upper-triangular pattern so that the
//! in-place update always matches the sparsity set up by `init`.

use clarabel::algebra::CscMatrix;
use clarabel::solver::{
    DefaultSettings, DefaultSettingsBuilder, DefaultSolver, IPSolver, SolverStatus,
    SupportedConeT::NonnegativeConeT,
};

use crate::config::SolverConfig;
use crate::error::{BackendError, SolverError};
use crate::friction::ConeMatrix;
use crate::qp::{HessianMatrix, QpProblem};
use crate::types::{ForceVector, N_CONSTRAINTS, N_VARIABLES};

/// Numerical QP solver with warm-start capability.
///
/// Calls on one backend are strictly sequential; `hotstart` is only issued
/// after a successful `init`.
pub trait QpBackend {
    /// Set up the solver from scratch and solve `problem`.
    fn init(&mut self, problem: &QpProblem<'_>, budget: &SolverConfig) -> Result<(), BackendError>;

    /// Solve `problem`, reusing state from the previous call.
    fn hotstart(
        &mut self,
        problem: &QpProblem<'_>,
        budget: &SolverConfig,
    ) -> Result<(), BackendError>;

    /// Whether the last call produced an optimal solution.
    fn is_solved(&self) -> bool;

    /// Primal solution of the last successful call.
    fn primal_solution(&self) -> Option<ForceVector>;
}

/// Owns a backend and tracks whether it has been initialized.
pub struct QpSolver<B = ClarabelBackend> {
    backend: B,
    budget: SolverConfig,
    initialized: bool,
}

impl<B: QpBackend> QpSolver<B> {
    pub const fn new(backend: B, budget: SolverConfig) -> Self {
        Self {
            backend,
            budget,
            initialized: false,
        }
    }

    /// Solve `problem`: cold init on the first call (or after a failed
    /// init), hotstart afterwards.
    pub fn solve(&mut self, problem: &QpProblem<'_>) -> Result<ForceVector, SolverError> {
        if self.initialized {
            self.backend
                .hotstart(problem, &self.budget)
                .map_err(SolverError::Hotstart)?;
        } else {
            self.backend
                .init(problem, &self.budget)
                .map_err(SolverError::Init)?;
            self.initialized = true;
        }

        if !self.backend.is_solved() {
            return Err(SolverError::NotSolved(BackendError(
                "solver reported no optimal solution".into(),
            )));
        }
        self.backend.primal_solution().ok_or_else(|| {
            SolverError::NotSolved(BackendError("primal solution unavailable".into()))
        })
    }

    pub const fn is_initialized(&self) -> bool {
        self.initialized
    }

    /// Forget warm-start state; the next solve is a cold init.
    pub fn reset(&mut self) {
        self.initialized = false;
    }

    pub const fn backend(&self) -> &B {
        &self.backend
    }

    pub const fn budget(&self) -> &SolverConfig {
        &self.budget
    }
}

// ---------------------------------------------------------------------------
// Clarabel backend
// ---------------------------------------------------------------------------

/// [`QpBackend`] backed by Clarabel.
#[derive(Default)]
pub struct ClarabelBackend {
    solver: Option<DefaultSolver<f64>>,
    /// Budget the current solver was built with.
    budget: Option<SolverConfig>,
    solved: bool,
}

impl ClarabelBackend {
    pub fn new() -> Self {
        Self::default()
    }

    fn run(&mut self) -> Result<(), BackendError> {
        let solver = self
            .solver
            .as_mut()
            .ok_or_else(|| BackendError("solver not initialized".into()))?;
        solver.solve();

        self.solved = matches!(
            solver.solution.status,
            SolverStatus::Solved | SolverStatus::AlmostSolved
        );
        if self.solved {
            Ok(())
        } else {
            Err(BackendError(format!(
                "solver status {:?}",
                solver.solution.status
            )))
        }
    }
}

impl QpBackend for ClarabelBackend {
    fn init(&mut self, problem: &QpProblem<'_>, budget: &SolverConfig) -> Result<(), BackendError> {
        self.solver = None;
        self.solved = false;

        let p = hessian_to_csc_upper_tri(&problem.hessian);
        let q: Vec<f64> = problem.gradient.iter().copied().collect();
        let a = stacked_constraints_to_csc(problem.constraints);
        let b = stacked_bounds(problem);
        let cones = [NonnegativeConeT(2 * N_CONSTRAINTS)];

        let solver = DefaultSolver::new(&p, &q, &a, &b, &cones, settings(budget)?)
            .map_err(|e| BackendError(format!("setup failed: {e}")))?;
        self.solver = Some(solver);
        self.budget = Some(budget.clone());
        self.run()
    }

    fn hotstart(
        &mut self,
        problem: &QpProblem<'_>,
        budget: &SolverConfig,
    ) -> Result<(), BackendError> {
        // Settings are baked in at setup; a new budget needs a fresh solver.
        if self.budget.as_ref() != Some(budget) {
            return self.init(problem, budget);
        }
        self.solved = false;

        let solver = self
            .solver
            .as_mut()
            .ok_or_else(|| BackendError("hotstart before init".into()))?;

        let p = hessian_to_csc_upper_tri(&problem.hessian);
        let q: Vec<f64> = problem.gradient.iter().copied().collect();
        let b = stacked_bounds(problem);

        solver
            .update_P(&p)
            .map_err(|e| BackendError(format!("P update failed: {e}")))?;
        solver
            .update_q(&q)
            .map_err(|e| BackendError(format!("q update failed: {e}")))?;
        solver
            .update_b(&b)
            .map_err(|e| BackendError(format!("b update failed: {e}")))?;

        self.run()
    }

    fn is_solved(&self) -> bool {
        self.solved
    }

    fn primal_solution(&self) -> Option<ForceVector> {
        if !self.solved {
            return None;
        }
        let x = &self.solver.as_ref()?.solution.x;
        (x.len() == N_VARIABLES).then(|| ForceVector::from_column_slice(x))
    }
}

fn settings(budget: &SolverConfig) -> Result<DefaultSettings<f64>, BackendError> {
    DefaultSettingsBuilder::default()
        .max_iter(budget.max_iter)
        .time_limit(budget.time_limit)
        .verbose(budget.verbose)
        .presolve_enable(false)
        .build()
        .map_err(|e| BackendError(format!("invalid solver settings: {e}")))
}

/// Upper triangle of the Hessian as CSC, keeping explicit zeros so the
/// pattern is identical every cycle.
fn hessian_to_csc_upper_tri(m: &HessianMatrix) -> CscMatrix<f64> {
    let n = N_VARIABLES;
    let mut colptr = vec![0usize; n + 1];
    let mut rowval = Vec::with_capacity(n * (n + 1) / 2);
    let mut nzval = Vec::with_capacity(n * (n + 1) / 2);

    for j in 0..n {
        for i in 0..=j {
            rowval.push(i);
            nzval.push(m[(i, j)]);
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(n, n, colptr, rowval, nzval)
}

/// `[C; -C]` as CSC. Only built at init, so structural zeros are dropped.
fn stacked_constraints_to_csc(c: &ConeMatrix) -> CscMatrix<f64> {
    let (nrows, ncols) = (2 * N_CONSTRAINTS, N_VARIABLES);
    let mut colptr = vec![0usize; ncols + 1];
    let mut rowval = Vec::new();
    let mut nzval = Vec::new();

    for j in 0..ncols {
        for i in 0..N_CONSTRAINTS {
            let v = c[(i, j)];
            if v != 0.0 {
                rowval.push(i);
                nzval.push(v);
            }
        }
        for i in 0..N_CONSTRAINTS {
            let v = c[(i, j)];
            if v != 0.0 {
                rowval.push(N_CONSTRAINTS + i);
                nzval.push(-v);
            }
        }
        colptr[j + 1] = rowval.len();
    }

    CscMatrix::new(nrows, ncols, colptr, rowval, nzval)
}

/// `[ub; -lb]`
fn stacked_bounds(problem: &QpProblem<'_>) -> Vec<f64> {
    problem
        .upper
        .iter()
        .copied()
        .chain(problem.lower.iter().map(|lb| -lb))
        .collect()
}
