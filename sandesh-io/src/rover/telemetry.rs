//! Outbound telemetry producers
//!
//! | Topic         | Type      | Cadence              |
//! |---------------|-----------|----------------------|
//! | `out/general` | `Robot`   | every tick           |
//! | `out/arm`     | `arm`     | every 3 ticks        |
//! | `out/general` | `info`    | every 300 ticks      |
//! | `out/restart` | `restart` | once, at start-up    |
//!
//! `out/restart` is retained and held until connected, with a single pending
//! announcement.

use crate::rover::RoverControl;
use crate::streaming::outbox::TopicPolicy;
use crate::streaming::pipeline::TelemetryPipeline;
use serde_json::{Value, json};

pub const GENERAL_TOPIC: &str = "out/general";
pub const ARM_TOPIC: &str = "out/arm";
pub const RESTART_TOPIC: &str = "out/restart";

const ARM_EVERY_TICKS: u64 = 3;
const INFO_EVERY_TICKS: u64 = 300;

/// Robot state published every tick
pub fn robot_state(rover: &dyn RoverControl) -> Value {
    let pose = rover.pose();
    let (left, right) = rover.motor_accel();
    json!({
        "pos": pose,
        "storage": rover.storage(),
        "storageMass": rover.storage_mass(),
        "leftAccelerate": left,
        "rightAccelerate": right,
        "laserAngle": rover.laser_angle(),
        "baseLocked": rover.is_base_locked(),
    })
}

/// Arm joints and gripper
pub fn arm_state(rover: &dyn RoverControl) -> Value {
    let arm = rover.arm();
    let mut data = serde_json::Map::new();
    for (i, (speed, angle)) in arm
        .motor_speeds
        .iter()
        .zip(arm.joint_angles.iter())
        .enumerate()
    {
        data.insert(format!("arm{}_motorSpeed", i + 1), json!(speed));
        data.insert(format!("arm{}_jointAngle", i + 1), json!(angle));
    }
    data.insert("arm_opened".to_string(), json!(arm.gripper_open));
    data.insert("arm_fold_locked".to_string(), json!(arm.fold_locked));
    Value::Object(data)
}

/// Slow-changing simulation info (also the restart announcement body)
pub fn general_info(rover: &dyn RoverControl) -> Value {
    json!({
        "step": rover.step_count(),
        "storedItems": rover.storage().len(),
    })
}

/// Register the restart topic policy and queue the announcement
pub fn announce_restart(pipeline: &mut TelemetryPipeline, rover: &dyn RoverControl) {
    pipeline.override_topic_settings(RESTART_TOPIC, TopicPolicy::retained_announcement());
    pipeline.send(RESTART_TOPIC, "restart", general_info(rover));
}

/// Queue this tick's telemetry
pub fn produce(pipeline: &mut TelemetryPipeline, rover: &dyn RoverControl, step: u64) {
    pipeline.send(GENERAL_TOPIC, "Robot", robot_state(rover));

    if step % ARM_EVERY_TICKS == 0 {
        pipeline.send(ARM_TOPIC, "arm", arm_state(rover));
    }
    if step != 0 && step % INFO_EVERY_TICKS == 0 {
        pipeline.send(GENERAL_TOPIC, "info", general_info(rover));
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{Config, RoverConfig};
    use crate::rover::Rover;
    use crate::streaming::router::InboundRouter;
    use crate::transport::MockBroker;
    use approx::assert_relative_eq;

    #[test]
    fn test_robot_state_shape() {
        let mut rover = Rover::new(RoverConfig {
            start_x: 1.0,
            start_y: 2.0,
            ..Default::default()
        });
        rover.set_motor_accel(0.5, -0.5);
        let state = robot_state(&rover);
        assert_relative_eq!(state["pos"]["x"].as_f64().unwrap(), 1.0);
        assert_relative_eq!(state["pos"]["y"].as_f64().unwrap(), 2.0);
        assert_relative_eq!(state["pos"]["r"].as_f64().unwrap(), 0.0);
        assert_eq!(state["storage"], json!([]));
        assert_relative_eq!(state["leftAccelerate"].as_f64().unwrap(), 0.5);
    }

    #[test]
    fn test_arm_state_keys() {
        let rover = Rover::new(RoverConfig::default());
        let arm = arm_state(&rover);
        for key in [
            "arm1_motorSpeed",
            "arm2_jointAngle",
            "arm3_motorSpeed",
            "arm_opened",
            "arm_fold_locked",
        ] {
            assert!(arm.get(key).is_some(), "{}", key);
        }
    }

    #[test]
    fn test_cadence() {
        let broker = MockBroker::new();
        let mut pipeline = TelemetryPipeline::new(
            &Config::default(),
            Box::new(broker.clone()),
            InboundRouter::new(std::env::temp_dir().join("sandesh-telemetry-test.png")),
        );
        pipeline.connect("localhost", 1883).unwrap();
        let rover = Rover::new(RoverConfig::default());

        produce(&mut pipeline, &rover, 1);
        assert_eq!(pipeline.outbox().pending(GENERAL_TOPIC).len(), 1);
        assert!(pipeline.outbox().pending(ARM_TOPIC).is_empty());

        produce(&mut pipeline, &rover, 300);
        let kinds: Vec<&str> = pipeline
            .outbox()
            .pending(GENERAL_TOPIC)
            .iter()
            .map(|e| e.kind())
            .collect();
        assert_eq!(kinds, vec!["Robot", "Robot", "info"]);
        assert_eq!(pipeline.outbox().pending(ARM_TOPIC).len(), 1);
    }

    #[test]
    fn test_restart_held_while_disconnected() {
        let broker = MockBroker::new();
        let mut pipeline = TelemetryPipeline::new(
            &Config::default(),
            Box::new(broker.clone()),
            InboundRouter::new(std::env::temp_dir().join("sandesh-telemetry-test.png")),
        );
        let rover = Rover::new(RoverConfig::default());

        announce_restart(&mut pipeline, &rover);
        announce_restart(&mut pipeline, &rover);
        assert_eq!(pipeline.outbox().pending(RESTART_TOPIC).len(), 1);
        assert!(pipeline.outbox().policy(RESTART_TOPIC).retained);
    }
}
