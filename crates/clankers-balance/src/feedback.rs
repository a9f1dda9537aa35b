//! PD feedback law producing desired body accelerations.

use nalgebra::{Vector3, Vector6};

use crate::config::BalanceConfig;
use crate::rotation::rotation_error;
use crate::types::BodyState;

/// Desired CoM linear and body angular acceleration, world frame.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DesiredAcceleration {
    pub linear: Vector3<f64>,
    pub angular: Vector3<f64>,
}

/// Feedforward and PD gains on position and orientation.
#[derive(Clone, Debug)]
pub struct FeedbackGains {
    /// [vx, vy, weight, wx, wy, wz]
    pub kff: Vector6<f64>,
    pub kp_position: Vector3<f64>,
    pub kd_position: Vector3<f64>,
    pub kp_orientation: Vector3<f64>,
    pub kd_orientation: Vector3<f64>,
}

impl FeedbackGains {
    pub fn from_config(config: &BalanceConfig) -> Self {
        Self {
            kff: Vector6::from(config.kff),
            kp_position: config.kp_position(),
            kd_position: config.kd_position(),
            kp_orientation: config.kp_orientation(),
            kd_orientation: config.kd_orientation(),
        }
    }

    /// Desired accelerations from the tracking error.
    ///
    /// ```text
    /// a_d = kp_p ⊙ (x_d - x) + kd_p ⊙ (ẋ_d - ẋ) + [kff₀ ẋ_d.x, kff₁ ẋ_d.y, kff₂ m g]
    /// α_d = kp_w ⊙ e_R + kd_w ⊙ (ω_d - ω) + kff₃..₅ ⊙ ω_d
    /// ```
    ///
    /// `e_R` is the rotation vector of `R_d Rᵀ`.
    pub fn desired_acceleration(
        &self,
        current: &BodyState,
        desired: &BodyState,
        mass: f64,
        gravity: f64,
    ) -> DesiredAcceleration {
        let mut linear = self
            .kp_position
            .component_mul(&(desired.position - current.position))
            + self
                .kd_position
                .component_mul(&(desired.linear_velocity - current.linear_velocity));
        linear.x += self.kff[0] * desired.linear_velocity.x;
        linear.y += self.kff[1] * desired.linear_velocity.y;
        linear.z += self.kff[2] * mass * gravity;

        let orientation_error = rotation_error(&desired.orientation, &current.orientation);
        let kff_angular = self.kff.fixed_rows::<3>(3);
        let angular = self.kp_orientation.component_mul(&orientation_error)
            + self
                .kd_orientation
                .component_mul(&(desired.angular_velocity - current.angular_velocity))
            + kff_angular.component_mul(&desired.angular_velocity);

        DesiredAcceleration { linear, angular }
    }
}
