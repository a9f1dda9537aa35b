//! Balance controller: one QP solve per control cycle.
//!
//! Per cycle:
//! 1. Friction cone bounds from the contact schedule.
//! 2. Desired body accelerations from the PD + feedforward law.
//! 3. Wrench map `A f ≈ b` from foot positions and orientation.
//! 4. QP assembly and solve (cold on the first cycle, warm afterwards).
//! 5. Swing legs are forced to exactly zero.
//! 6. World-frame reaction forces are mapped to body-frame foot commands,
//!    `f_body = -Rᵀ f_world`.
//!
//! A failed solve never aborts the control loop: it is logged and the
//! configured [`FailurePolicy`] decides the command for that cycle.

use std::time::Instant;

use nalgebra::Rotation3;
use tracing::{debug, error, trace};

use crate::config::{BalanceConfig, FailurePolicy};
use crate::dynamics::RigidBodyModel;
use crate::error::BalanceError;
use crate::feedback::FeedbackGains;
use crate::friction::{ConeBounds, ConeMatrix, FrictionCone};
use crate::qp::QpWeights;
use crate::solver::{ClarabelBackend, QpBackend, QpSolver};
use crate::types::{
    BalanceCommand, BodyState, ContactSchedule, FootPositions, ForceVector, N_LEGS, foot_block,
};

/// Distributes the desired body wrench over the stance feet.
pub struct BalanceController<B = ClarabelBackend> {
    config: BalanceConfig,
    model: RigidBodyModel,
    cone: FrictionCone,
    /// Built once; only the bounds change between cycles.
    constraints: ConeMatrix,
    weights: QpWeights,
    gains: FeedbackGains,
    solver: QpSolver<B>,
    last_converged: Option<BalanceCommand>,
}

impl BalanceController {
    /// Controller backed by Clarabel.
    pub fn new(config: BalanceConfig) -> Result<Self, BalanceError> {
        Self::with_backend(config, ClarabelBackend::new())
    }
}

impl<B: QpBackend> BalanceController<B> {
    /// Controller with a caller-supplied QP backend.
    pub fn with_backend(config: BalanceConfig, backend: B) -> Result<Self, BalanceError> {
        config.validate()?;

        let model = RigidBodyModel::new(config.mass, config.inertia_matrix(), config.gravity);
        let cone = FrictionCone::new(
            config.friction_coeff,
            config.fz_min,
            config.fz_max,
            config.bound_sentinel,
        );
        let constraints = cone.constraint_matrix();
        let weights = QpWeights {
            dynamics: config.dynamics_weight_matrix(),
            forces: config.force_weight_matrix(),
        };
        let gains = FeedbackGains::from_config(&config);
        let solver = QpSolver::new(backend, config.solver.clone());

        debug!(
            mass = config.mass,
            mu = config.friction_coeff,
            legs = ?config.legs,
            policy = ?config.failure_policy,
            "balance controller configured"
        );

        Ok(Self {
            config,
            model,
            cone,
            constraints,
            weights,
            gains,
            solver,
            last_converged: None,
        })
    }

    /// Run one control cycle.
    ///
    /// `feet` are foot positions relative to the body origin in the body
    /// frame, in configured leg order. `schedule` must have an entry for every
    /// configured leg.
    ///
    /// # Errors
    /// Only [`BalanceError::MissingContactState`]. Solver failures are
    /// absorbed by the failure policy and reported via
    /// [`BalanceCommand::converged`].
    pub fn control<C: ContactSchedule + ?Sized>(
        &mut self,
        feet: &FootPositions,
        current: &BodyState,
        desired: &BodyState,
        schedule: &C,
    ) -> Result<BalanceCommand, BalanceError> {
        let bounds = self.cone.bounds(&self.config.legs, schedule)?;

        let accel = self.gains.desired_acceleration(
            current,
            desired,
            self.model.mass(),
            self.model.gravity(),
        );
        let wrench =
            self.model
                .wrench_map(feet, &current.orientation, &accel.linear, &accel.angular);
        let problem = self.weights.formulate(&wrench, &self.constraints, &bounds);

        if !self.solver.is_initialized() {
            debug!("initializing balance QP");
        }
        let start = Instant::now();
        let result = self.solver.solve(&problem);
        let solve_time_us = u64::try_from(start.elapsed().as_micros()).unwrap_or(u64::MAX);

        let command = match result {
            Ok(mut world_forces) => {
                trace!(
                    solve_time_us,
                    objective = problem.objective(&world_forces),
                    "balance QP solved"
                );
                zero_swing_legs(&mut world_forces, &bounds);
                let command = BalanceCommand {
                    forces: body_frame_commands(&world_forces, &current.orientation),
                    world_forces,
                    converged: true,
                    solve_time_us,
                };
                self.last_converged = Some(command.clone());
                command
            }
            Err(err) => {
                error!(phase = err.phase(), error = %err, "balance QP failed");
                self.fallback(&bounds, &current.orientation, solve_time_us)
            }
        };
        Ok(command)
    }

    fn fallback(
        &self,
        bounds: &ConeBounds,
        orientation: &Rotation3<f64>,
        solve_time_us: u64,
    ) -> BalanceCommand {
        let held = match (self.config.failure_policy, &self.last_converged) {
            (FailurePolicy::HoldPrevious, Some(previous)) => {
                debug!("holding last converged balance command");
                let mut world_forces = previous.world_forces;
                zero_swing_legs(&mut world_forces, bounds);
                Some(world_forces)
            }
            _ => None,
        };

        match held {
            Some(world_forces) => BalanceCommand {
                forces: body_frame_commands(&world_forces, orientation),
                world_forces,
                converged: false,
                solve_time_us,
            },
            None => BalanceCommand {
                solve_time_us,
                ..BalanceCommand::zero()
            },
        }
    }

    pub const fn config(&self) -> &BalanceConfig {
        &self.config
    }

    /// Leg names in decision-variable order.
    pub fn leg_names(&self) -> &[String] {
        &self.config.legs
    }

    pub const fn constraint_matrix(&self) -> &ConeMatrix {
        &self.constraints
    }

    /// True once the QP has been initialized and later cycles hotstart.
    pub const fn is_solver_initialized(&self) -> bool {
        self.solver.is_initialized()
    }

    /// Last command whose QP converged.
    pub const fn last_converged(&self) -> Option<&BalanceCommand> {
        self.last_converged.as_ref()
    }

    pub const fn backend(&self) -> &B {
        self.solver.backend()
    }

    /// Drop warm-start state and the held command.
    pub fn reset(&mut self) {
        self.solver.reset();
        self.last_converged = None;
    }
}

fn zero_swing_legs(forces: &mut ForceVector, bounds: &ConeBounds) {
    for leg in 0..N_LEGS {
        if !bounds.is_stance(leg) {
            forces.fixed_rows_mut::<3>(3 * leg).fill(0.0);
        }
    }
}

/// Ground reaction (world) to foot command (body): `f_body = -Rᵀ f_world`.
fn body_frame_commands(world_forces: &ForceVector, orientation: &Rotation3<f64>) -> ForceVector {
    let to_body = orientation.inverse();
    let mut forces = ForceVector::zeros();
    for leg in 0..N_LEGS {
        let f = -(to_body * foot_block(world_forces, leg));
        forces.fixed_rows_mut::<3>(3 * leg).copy_from(&f);
    }
    forces
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SolverConfig;
    use crate::error::BackendError;
    use crate::qp::QpProblem;
    use crate::types::{GaitMap, LegState};
    use approx::assert_relative_eq;
    use nalgebra::Vector3;
    use std::collections::VecDeque;

    /// Replays a queue of outcomes; `None` is a failed solve.
    struct ReplayBackend {
        outcomes: VecDeque<Option<ForceVector>>,
        last: Option<ForceVector>,
        calls: Vec<&'static str>,
    }

    impl ReplayBackend {
        fn new(outcomes: impl IntoIterator<Item = Option<ForceVector>>) -> Self {
            Self {
                outcomes: outcomes.into_iter().collect(),
                last: None,
                calls: Vec::new(),
            }
        }

        fn step(&mut self, call: &'static str) -> Result<(), BackendError> {
            self.calls.push(call);
            self.last = self.outcomes.pop_front().flatten();
            if self.last.is_some() {
                Ok(())
            } else {
                Err(BackendError("replayed failure".into()))
            }
        }
    }

    impl QpBackend for ReplayBackend {
        fn init(&mut self, _: &QpProblem<'_>, _: &SolverConfig) -> Result<(), BackendError> {
            self.step("init")
        }

        fn hotstart(&mut self, _: &QpProblem<'_>, _: &SolverConfig) -> Result<(), BackendError> {
            self.step("hotstart")
        }

        fn is_solved(&self) -> bool {
            self.last.is_some()
        }

        fn primal_solution(&self) -> Option<ForceVector> {
            self.last
        }
    }

    fn feet() -> FootPositions {
        [
            Vector3::new(0.2, 0.13, -0.3),
            Vector3::new(0.2, -0.13, -0.3),
            Vector3::new(-0.2, 0.13, -0.3),
            Vector3::new(-0.2, -0.13, -0.3),
        ]
    }

    /// Every foot pushing 25 N up with a small lateral component.
    fn support() -> ForceVector {
        let mut f = ForceVector::zeros();
        for leg in 0..N_LEGS {
            f.fixed_rows_mut::<3>(3 * leg)
                .copy_from(&Vector3::new(1.0, -0.5, 25.0));
        }
        f
    }

    fn controller(
        policy: FailurePolicy,
        outcomes: impl IntoIterator<Item = Option<ForceVector>>,
    ) -> BalanceController<ReplayBackend> {
        let config = BalanceConfig {
            failure_policy: policy,
            ..BalanceConfig::default()
        };
        BalanceController::with_backend(config, ReplayBackend::new(outcomes)).unwrap()
    }

    fn standing() -> BodyState {
        BodyState::at_rest(Vector3::new(0.0, 0.0, 0.3))
    }

    #[test]
    fn invalid_config_is_rejected() {
        let config = BalanceConfig {
            friction_coeff: -0.1,
            ..BalanceConfig::default()
        };
        let result = BalanceController::with_backend(config, ReplayBackend::new([]));
        assert!(matches!(result, Err(BalanceError::Config(_))));
    }

    #[test]
    fn accessors_reflect_config() {
        let ctrl = controller(FailurePolicy::Zero, []);
        assert_eq!(ctrl.leg_names(), ["FL", "FR", "RL", "RR"]);
        assert_relative_eq!(ctrl.constraint_matrix()[(0, 2)], -0.8);
        assert!(!ctrl.is_solver_initialized());
        assert!(ctrl.last_converged().is_none());
        assert_eq!(ctrl.config().failure_policy, FailurePolicy::Zero);
    }

    #[test]
    fn first_cycle_inits_then_hotstarts() {
        let mut ctrl = controller(FailurePolicy::Zero, [Some(support()); 3]);
        let gait = GaitMap::stance(&["FL", "FR", "RL", "RR"]);
        for _ in 0..3 {
            ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();
        }
        assert!(ctrl.is_solver_initialized());
        assert_eq!(ctrl.backend().calls, ["init", "hotstart", "hotstart"]);
    }

    #[test]
    fn body_forces_are_negated_world_forces() {
        let mut ctrl = controller(FailurePolicy::Zero, [Some(support())]);
        let gait = GaitMap::stance(&["FL", "FR", "RL", "RR"]);
        let cmd = ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();

        assert!(cmd.converged);
        assert_relative_eq!(cmd.foot(1), Vector3::new(-1.0, 0.5, -25.0), epsilon = 1e-12);
        assert_relative_eq!(cmd.world_foot(1), Vector3::new(1.0, -0.5, 25.0), epsilon = 1e-12);
    }

    #[test]
    fn rotated_body_maps_through_transpose() {
        let mut ctrl = controller(FailurePolicy::Zero, [Some(support())]);
        let gait = GaitMap::stance(&["FL", "FR", "RL", "RR"]);
        let current = BodyState {
            orientation: Rotation3::from_euler_angles(0.1, -0.2, 0.7),
            ..standing()
        };
        let cmd = ctrl.control(&feet(), &current, &standing(), &gait).unwrap();

        for leg in 0..N_LEGS {
            let expected = -(current.orientation.transpose() * cmd.world_foot(leg));
            assert_relative_eq!(cmd.foot(leg), expected, epsilon = 1e-12);
            assert_relative_eq!(cmd.foot(leg).norm(), cmd.world_foot(leg).norm(), epsilon = 1e-12);
        }
    }

    #[test]
    fn swing_legs_are_exactly_zero() {
        // Backend hands back small nonzero swing forces.
        let mut ctrl = controller(FailurePolicy::Zero, [Some(support())]);
        let mut gait = GaitMap::stance(&["FL", "FR", "RL", "RR"]);
        gait.insert("RR", LegState::Swing, 0.25);
        let cmd = ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();

        assert_eq!(cmd.foot(3), Vector3::zeros());
        assert_eq!(cmd.world_foot(3), Vector3::zeros());
        assert_ne!(cmd.foot(0), Vector3::zeros());
    }

    #[test]
    fn failure_commands_zero_by_default() {
        let mut ctrl = controller(FailurePolicy::Zero, [Some(support()), None]);
        let gait = GaitMap::stance(&["FL", "FR", "RL", "RR"]);
        ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();
        let cmd = ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();

        assert!(!cmd.converged);
        assert_eq!(cmd.forces, ForceVector::zeros());
        assert_eq!(cmd.world_forces, ForceVector::zeros());
    }

    #[test]
    fn hold_previous_masks_new_swing_legs() {
        let mut ctrl = controller(FailurePolicy::HoldPrevious, [Some(support()), None]);
        let mut gait = GaitMap::stance(&["FL", "FR", "RL", "RR"]);
        let first = ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();

        gait.insert("FL", LegState::Swing, 0.0);
        let held = ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();

        assert!(!held.converged);
        assert_eq!(held.foot(0), Vector3::zeros());
        assert_relative_eq!(held.foot(2), first.foot(2), epsilon = 1e-12);
    }

    #[test]
    fn hold_previous_without_history_is_zero() {
        let mut ctrl = controller(FailurePolicy::HoldPrevious, [None]);
        let gait = GaitMap::stance(&["FL", "FR", "RL", "RR"]);
        let cmd = ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();
        assert_eq!(cmd.forces, ForceVector::zeros());
        assert!(!ctrl.is_solver_initialized());
    }

    #[test]
    fn missing_leg_is_an_error_before_solving() {
        let mut ctrl = controller(FailurePolicy::Zero, [Some(support())]);
        let gait = GaitMap::stance(&["FL", "FR", "RL"]);
        let err = ctrl
            .control(&feet(), &standing(), &standing(), &gait)
            .unwrap_err();
        assert!(matches!(err, BalanceError::MissingContactState(ref leg) if leg == "RR"));
        assert!(ctrl.backend().calls.is_empty());
    }

    #[test]
    fn reset_returns_to_cold_start() {
        let mut ctrl = controller(FailurePolicy::HoldPrevious, [Some(support()); 2]);
        let gait = GaitMap::stance(&["FL", "FR", "RL", "RR"]);
        ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();
        ctrl.reset();
        assert!(ctrl.last_converged().is_none());
        ctrl.control(&feet(), &standing(), &standing(), &gait).unwrap();
        assert_eq!(ctrl.backend().calls, ["init", "init"]);
    }
}
