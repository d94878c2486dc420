//! Tank-drive kinematics for the stand-in rover
//!
//! No collision handling: the terrain is open ground.

use std::f32::consts::{PI, TAU};

/// Planar pose integrated from track speeds
#[derive(Debug, Clone)]
pub struct DriveState {
    /// X position in world frame (meters)
    x: f32,
    /// Y position in world frame (meters)
    y: f32,
    /// Heading (radians, CCW from +X)
    theta: f32,
}

impl DriveState {
    pub fn new(x: f32, y: f32, theta: f32) -> Self {
        Self {
            x,
            y,
            theta: normalize_angle(theta),
        }
    }

    #[inline]
    pub fn x(&self) -> f32 {
        self.x
    }

    #[inline]
    pub fn y(&self) -> f32 {
        self.y
    }

    #[inline]
    pub fn theta(&self) -> f32 {
        self.theta
    }

    /// Advance by `dt` seconds with the given track speeds (m/s)
    pub fn update(&mut self, dt: f32, left: f32, right: f32, track_width: f32) {
        let (linear, angular) = body_velocity(left, right, track_width);

        if angular.abs() < 1e-6 {
            self.x += linear * self.theta.cos() * dt;
            self.y += linear * self.theta.sin() * dt;
        } else {
            // Arc about the instantaneous centre of rotation
            let r = linear / angular;
            let new_theta = self.theta + angular * dt;
            self.x += r * (new_theta.sin() - self.theta.sin());
            self.y += r * (self.theta.cos() - new_theta.cos());
            self.theta = new_theta;
        }
        self.theta = normalize_angle(self.theta);
    }
}

/// Track speeds to body (v, ω)
///
/// v = (v_r + v_l) / 2, ω = (v_r - v_l) / track_width
pub fn body_velocity(left: f32, right: f32, track_width: f32) -> (f32, f32) {
    let linear = (left + right) / 2.0;
    let angular = if track_width > 0.0 {
        (right - left) / track_width
    } else {
        0.0
    };
    (linear, angular)
}

/// Normalize angle to [-π, π)
pub fn normalize_angle(angle: f32) -> f32 {
    let mut a = angle % TAU;
    if a >= PI {
        a -= TAU;
    } else if a < -PI {
        a += TAU;
    }
    a
}
