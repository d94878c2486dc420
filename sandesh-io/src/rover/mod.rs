//! Simulated rover: the collaborator the pipeline reads telemetry from and
//! routes control commands into.
//!
//! [`RoverControl`] is the whole surface the pipeline and its handlers see.
//! [`Rover`] is a minimal stand-in implementation (tank drive, storage,
//! laser, 3-joint arm) so the daemon runs end-to-end.

pub mod commands;
pub mod physics;
pub mod telemetry;

use crate::config::RoverConfig;
use physics::DriveState;
use serde::Serialize;
use std::f32::consts::TAU;
use std::path::{Path, PathBuf};

/// Rover pose as published (`r` is the heading in radians)
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Pose {
    pub x: f32,
    pub y: f32,
    pub r: f32,
}

/// Collectable item, on the ground or in storage
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Item {
    pub id: u32,
    pub kind: String,
    pub mass: f32,
    pub x: f32,
    pub y: f32,
}

/// Arm joint and gripper state
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct ArmState {
    /// Motor speed per joint (rad/s)
    pub motor_speeds: [f32; 3],
    /// Joint angle per joint (radians)
    pub joint_angles: [f32; 3],
    pub gripper_open: bool,
    pub fold_locked: bool,
}

/// Read and mutation surface of the simulation
///
/// All calls happen on the tick thread.
pub trait RoverControl {
    /// Ticks stepped so far
    fn step_count(&self) -> u64;
    fn pose(&self) -> Pose;
    fn storage(&self) -> &[Item];
    /// Total mass in storage
    fn storage_mass(&self) -> f32 {
        self.storage().iter().map(|item| item.mass).sum()
    }

    /// (left, right) track acceleration in [-1, 1]
    fn motor_accel(&self) -> (f32, f32);
    fn set_motor_accel(&mut self, left: f32, right: f32);

    /// Move the nearest reachable item into storage; false if none in reach
    fn pickup(&mut self) -> bool;
    /// Put a stored item back on the ground; false if `index` is out of range
    fn drop_item(&mut self, index: usize) -> bool;

    fn laser_angle(&self) -> f32;
    fn set_laser_angle(&mut self, degrees: f32);
    fn shoot_laser(&mut self);

    fn arm(&self) -> &ArmState;
    fn set_arm_speeds(&mut self, speed1: f32, speed2: f32, speed3: f32);
    fn set_gripper_open(&mut self, open: bool);
    fn set_arm_fold_lock(&mut self, locked: bool);
    fn is_base_locked(&self) -> bool;
    fn set_base_lock(&mut self, locked: bool);

    /// A new terrain image was stored at `path`
    fn terrain_image_received(&mut self, path: &Path);
}

/// Stand-in rover
pub struct Rover {
    config: RoverConfig,
    drive: DriveState,
    step_count: u64,
    left_accel: f32,
    right_accel: f32,
    base_locked: bool,
    ground: Vec<Item>,
    storage: Vec<Item>,
    laser_angle: f32,
    laser_shots: u32,
    arm: ArmState,
    terrain_revision: u32,
    terrain_image: Option<PathBuf>,
}

impl Rover {
    pub fn new(config: RoverConfig) -> Self {
        let drive = DriveState::new(config.start_x, config.start_y, config.start_r);
        let ground = scatter_items(&config);
        Self {
            config,
            drive,
            step_count: 0,
            left_accel: 0.0,
            right_accel: 0.0,
            base_locked: false,
            ground,
            storage: Vec::new(),
            laser_angle: 90.0,
            laser_shots: 0,
            arm: ArmState::default(),
            terrain_revision: 0,
            terrain_image: None,
        }
    }

    /// Advance the simulation by one tick of `dt` seconds
    pub fn step(&mut self, dt: f32) {
        self.step_count += 1;

        if !self.base_locked {
            let left = self.left_accel * self.config.max_track_speed;
            let right = self.right_accel * self.config.max_track_speed;
            self.drive.update(dt, left, right, self.config.track_width);
        }

        if !self.arm.fold_locked {
            for (angle, speed) in self
                .arm
                .joint_angles
                .iter_mut()
                .zip(self.arm.motor_speeds.iter())
            {
                *angle = (*angle + speed * dt).clamp(-TAU / 2.0, TAU / 2.0);
            }
        }
    }

    /// Items still on the ground
    pub fn ground_items(&self) -> &[Item] {
        &self.ground
    }

    pub fn laser_shots(&self) -> u32 {
        self.laser_shots
    }

    /// Incremented each time a terrain image arrives
    pub fn terrain_revision(&self) -> u32 {
        self.terrain_revision
    }

    pub fn terrain_image(&self) -> Option<&Path> {
        self.terrain_image.as_deref()
    }
}

/// Items on a ring around the start pose
fn scatter_items(config: &RoverConfig) -> Vec<Item> {
    const KINDS: [&str; 3] = ["stone", "ice", "metal"];
    (0..config.item_count)
        .map(|i| {
            let angle = TAU * i as f32 / config.item_count as f32;
            let radius = 3.0 + i as f32;
            Item {
                id: i as u32,
                kind: KINDS[i % KINDS.len()].to_string(),
                mass: 0.5 + 0.25 * (i % 4) as f32,
                x: config.start_x + radius * angle.cos(),
                y: config.start_y + radius * angle.sin(),
            }
        })
        .collect()
}

impl RoverControl for Rover {
    fn step_count(&self) -> u64 {
        self.step_count
    }

    fn pose(&self) -> Pose {
        Pose {
            x: self.drive.x(),
            y: self.drive.y(),
            r: self.drive.theta(),
        }
    }

    fn storage(&self) -> &[Item] {
        &self.storage
    }

    fn motor_accel(&self) -> (f32, f32) {
        (self.left_accel, self.right_accel)
    }

    fn set_motor_accel(&mut self, left: f32, right: f32) {
        self.left_accel = left.clamp(-1.0, 1.0);
        self.right_accel = right.clamp(-1.0, 1.0);
    }

    fn pickup(&mut self) -> bool {
        let (x, y) = (self.drive.x(), self.drive.y());
        let nearest = self
            .ground
            .iter()
            .enumerate()
            .map(|(i, item)| (i, (item.x - x).hypot(item.y - y)))
            .filter(|(_, dist)| *dist <= self.config.pickup_radius)
            .min_by(|a, b| a.1.total_cmp(&b.1));

        match nearest {
            Some((index, _)) => {
                let item = self.ground.remove(index);
                log::debug!("Picked up item {} ({})", item.id, item.kind);
                self.storage.push(item);
                true
            }
            None => false,
        }
    }

    fn drop_item(&mut self, index: usize) -> bool {
        if index >= self.storage.len() {
            return false;
        }
        let mut item = self.storage.remove(index);
        item.x = self.drive.x();
        item.y = self.drive.y();
        log::debug!("Dropped item {} ({})", item.id, item.kind);
        self.ground.push(item);
        true
    }

    fn laser_angle(&self) -> f32 {
        self.laser_angle
    }

    fn set_laser_angle(&mut self, degrees: f32) {
        self.laser_angle = degrees;
    }

    fn shoot_laser(&mut self) {
        self.laser_shots += 1;
    }

    fn arm(&self) -> &ArmState {
        &self.arm
    }

    fn set_arm_speeds(&mut self, speed1: f32, speed2: f32, speed3: f32) {
        self.arm.motor_speeds = [speed1, speed2, speed3];
    }

    fn set_gripper_open(&mut self, open: bool) {
        self.arm.gripper_open = open;
    }

    fn set_arm_fold_lock(&mut self, locked: bool) {
        self.arm.fold_locked = locked;
    }

    fn is_base_locked(&self) -> bool {
        self.base_locked
    }

    fn set_base_lock(&mut self, locked: bool) {
        self.base_locked = locked;
    }

    fn terrain_image_received(&mut self, path: &Path) {
        self.terrain_revision += 1;
        self.terrain_image = Some(path.to_path_buf());
        log::info!(
            "Terrain image revision {} from {}",
            self.terrain_revision,
            path.display()
        );
    }
}
