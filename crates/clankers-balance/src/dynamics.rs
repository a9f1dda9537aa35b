//! Single rigid body (Newton-Euler) model mapping foot forces to body wrench.
//!
//! With world-frame foot forces `f_i` applied at world-frame offsets `p_i`
//! from the CoM:
//!
//! ```text
//! Σ f_i         = m (a_d + g ẑ)
//! Σ p_i × f_i   = I_world α_d,     I_world = R I_body Rᵀ
//! ```
//!
//! Stacked as `A f = b` with `A` 6×12 and `b` 6×1. The controller does not
//! enforce this as a hard equality; it becomes a weighted least-squares term
//! of the QP cost so the problem stays feasible with too few stance legs.

use nalgebra::{Matrix3, Rotation3, SMatrix, Vector3, Vector6};

use crate::rotation::skew_symmetric;
use crate::types::{FootPositions, N_EQUATIONS, N_LEGS, N_VARIABLES};

/// Linear map from stacked foot forces to body wrench: `A f ≈ b`.
#[derive(Clone, Debug, PartialEq)]
pub struct WrenchMap {
    pub a: SMatrix<f64, N_EQUATIONS, N_VARIABLES>,
    pub b: Vector6<f64>,
}

/// Rigid body parameters of the torso.
#[derive(Clone, Debug)]
pub struct RigidBodyModel {
    mass: f64,
    inertia: Matrix3<f64>,
    gravity: f64,
}

impl RigidBodyModel {
    /// `inertia` is the body-frame tensor about the CoM; `gravity` is the
    /// positive magnitude of gravitational acceleration.
    pub const fn new(mass: f64, inertia: Matrix3<f64>, gravity: f64) -> Self {
        Self {
            mass,
            inertia,
            gravity,
        }
    }

    pub const fn mass(&self) -> f64 {
        self.mass
    }

    pub const fn gravity(&self) -> f64 {
        self.gravity
    }

    /// Build `A` and `b` for the current pose and desired accelerations.
    ///
    /// # Arguments
    /// * `feet` - foot positions relative to the body origin, body frame
    /// * `orientation` - body-to-world rotation
    /// * `linear_accel` - desired CoM acceleration, world frame
    /// * `angular_accel` - desired angular acceleration, world frame
    pub fn wrench_map(
        &self,
        feet: &FootPositions,
        orientation: &Rotation3<f64>,
        linear_accel: &Vector3<f64>,
        angular_accel: &Vector3<f64>,
    ) -> WrenchMap {
        let mut a = SMatrix::<f64, N_EQUATIONS, N_VARIABLES>::zeros();

        for (i, foot) in feet.iter().enumerate().take(N_LEGS) {
            let p_world = orientation * foot;
            a.fixed_view_mut::<3, 3>(0, 3 * i)
                .copy_from(&Matrix3::identity());
            a.fixed_view_mut::<3, 3>(3, 3 * i)
                .copy_from(&skew_symmetric(&p_world));
        }

        let r = orientation.matrix();
        let inertia_world = r * self.inertia * r.transpose();

        let force = self.mass * (linear_accel + Vector3::new(0.0, 0.0, self.gravity));
        let moment = inertia_world * angular_accel;

        let mut b = Vector6::zeros();
        b.fixed_rows_mut::<3>(0).copy_from(&force);
        b.fixed_rows_mut::<3>(3).copy_from(&moment);

        WrenchMap { a, b }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::ForceVector;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    fn model() -> RigidBodyModel {
        RigidBodyModel::new(
            10.0,
            Matrix3::new(0.07, 0.0, 0.0, 0.0, 0.26, 0.0, 0.0, 0.0, 0.28),
            9.81,
        )
    }

    fn feet() -> FootPositions {
        [
            Vector3::new(0.2, 0.13, -0.3),
            Vector3::new(0.2, -0.13, -0.3),
            Vector3::new(-0.2, 0.13, -0.3),
            Vector3::new(-0.2, -0.13, -0.3),
        ]
    }

    #[test]
    fn force_rows_sum_feet() {
        let map = model().wrench_map(
            &feet(),
            &Rotation3::identity(),
            &Vector3::zeros(),
            &Vector3::zeros(),
        );
        for i in 0..N_LEGS {
            assert_relative_eq!(
                map.a.fixed_view::<3, 3>(0, 3 * i).into_owned(),
                Matrix3::identity(),
                epsilon = 1e-12
            );
        }
    }

    #[test]
    fn b_compensates_gravity_at_rest() {
        let map = model().wrench_map(
            &feet(),
            &Rotation3::identity(),
            &Vector3::zeros(),
            &Vector3::zeros(),
        );
        assert_relative_eq!(map.b[2], 98.1, epsilon = 1e-9);
        assert_relative_eq!(map.b[0], 0.0);
        assert_relative_eq!(map.b.fixed_rows::<3>(3).norm(), 0.0);
    }

    #[test]
    fn moment_rows_are_cross_products() {
        let orientation = Rotation3::from_euler_angles(0.1, -0.05, 0.4);
        let map = model().wrench_map(&feet(), &orientation, &Vector3::zeros(), &Vector3::zeros());

        let f = ForceVector::from_fn(|i, _| (i as f64) - 5.0);
        let wrench = map.a * f;

        let mut expected_force = Vector3::zeros();
        let mut expected_moment = Vector3::zeros();
        for (i, foot) in feet().iter().enumerate() {
            let fi = f.fixed_rows::<3>(3 * i).into_owned();
            expected_force += fi;
            expected_moment += (orientation * foot).cross(&fi);
        }
        assert_relative_eq!(wrench.fixed_rows::<3>(0).into_owned(), expected_force, epsilon = 1e-12);
        assert_relative_eq!(wrench.fixed_rows::<3>(3).into_owned(), expected_moment, epsilon = 1e-12);
    }

    #[test]
    fn symmetric_stance_balances_with_equal_split() {
        let map = model().wrench_map(
            &feet(),
            &Rotation3::identity(),
            &Vector3::zeros(),
            &Vector3::zeros(),
        );
        let mut f = ForceVector::zeros();
        for i in 0..N_LEGS {
            f[3 * i + 2] = 98.1 / 4.0;
        }
        assert_relative_eq!(map.a * f, map.b, epsilon = 1e-9);
    }

    #[test]
    fn inertia_rotated_to_world() {
        // Yawing 90° swaps the roles of Ixx and Iyy.
        let orientation = Rotation3::from_axis_angle(&Vector3::z_axis(), FRAC_PI_2);
        let alpha = Vector3::new(1.0, 0.0, 0.0);
        let map = model().wrench_map(&feet(), &orientation, &Vector3::zeros(), &alpha);
        assert_relative_eq!(map.b[3], 0.26, epsilon = 1e-12);
        assert_relative_eq!(map.b[4], 0.0, epsilon = 1e-12);
    }

    #[test]
    fn linear_accel_scales_with_mass() {
        let accel = Vector3::new(1.0, -2.0, 0.5);
        let map = model().wrench_map(&feet(), &Rotation3::identity(), &accel, &Vector3::zeros());
        assert_relative_eq!(map.b[0], 10.0, epsilon = 1e-12);
        assert_relative_eq!(map.b[1], -20.0, epsilon = 1e-12);
        assert_relative_eq!(map.b[2], 10.0 * (0.5 + 9.81), epsilon = 1e-12);
    }
}
