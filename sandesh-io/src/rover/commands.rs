//! Control handlers for `in/control` envelopes
//!
//! | Type                              | Data                        |
//! |-----------------------------------|-----------------------------|
//! | `motors`                          | `{left, right}` in [-1, 1]  |
//! | `pickup`                          | -                           |
//! | `drop`                            | `{index}`                   |
//! | `laser_angle`                     | `{angle}` (degrees)         |
//! | `shoot_laser`                     | -                           |
//! | `request_satellite_image`         | -                           |
//! | `request_satellite_image_blurred` | -                           |
//! | `arm_speeds`                      | `{speed1, speed2, speed3}`  |
//! | `arm_open` / `arm_close`          | -                           |
//! | `arm_fold_lock` / `arm_fold_unlock` | -                         |
//! | `robot_lock_base` / `robot_unlock_base` | -                     |

use crate::config::ImageConfig;
use crate::error::{Error, Result};
use crate::streaming::router::{InboundRouter, RawPublish};
use crate::transport::Qos;
use serde::Deserialize;
use serde_json::Value;
use std::fs;
use std::path::Path;

/// Satellite image topic
pub const IMAGE_OUT_TOPIC: &str = "out/image";
/// Blurred satellite image topic
pub const IMAGE_BLURRED_OUT_TOPIC: &str = "out/image_blurred";

#[derive(Debug, Deserialize)]
struct MotorsArgs {
    left: f32,
    right: f32,
}

#[derive(Debug, Deserialize)]
struct DropArgs {
    index: usize,
}

#[derive(Debug, Deserialize)]
struct LaserAngleArgs {
    angle: f32,
}

#[derive(Debug, Deserialize)]
struct ArmSpeedsArgs {
    speed1: f32,
    speed2: f32,
    speed3: f32,
}

fn args<T: for<'de> Deserialize<'de>>(kind: &str, data: &Value) -> Result<T> {
    T::deserialize(data).map_err(|e| Error::InvalidParameter(format!("{}: {}", kind, e)))
}

/// Register every rover control handler
pub fn register_rover_commands(router: &mut InboundRouter, images: &ImageConfig) {
    router.register("motors", |data, ctx| {
        let MotorsArgs { left, right } = args("motors", data)?;
        ctx.rover
            .set_motor_accel(left.clamp(-1.0, 1.0), right.clamp(-1.0, 1.0));
        Ok(())
    });

    router.register("pickup", |_, ctx| {
        if !ctx.rover.pickup() {
            log::info!("Pickup: nothing in reach");
        }
        Ok(())
    });

    router.register("drop", |data, ctx| {
        let DropArgs { index } = args("drop", data)?;
        if ctx.rover.drop_item(index) {
            Ok(())
        } else {
            Err(Error::InvalidParameter(format!(
                "no item at storage index {} ({} stored)",
                index,
                ctx.rover.storage().len()
            )))
        }
    });

    router.register("laser_angle", |data, ctx| {
        let LaserAngleArgs { angle } = args("laser_angle", data)?;
        ctx.rover.set_laser_angle(angle);
        Ok(())
    });

    router.register("shoot_laser", |_, ctx| {
        log::info!("Firing laser");
        ctx.rover.shoot_laser();
        Ok(())
    });

    let satellite = images.satellite_image.clone();
    router.register("request_satellite_image", move |_, ctx| {
        ctx.raw.push(image_publish(IMAGE_OUT_TOPIC, &satellite)?);
        Ok(())
    });

    let blurred = images.blurred_image.clone();
    router.register("request_satellite_image_blurred", move |_, ctx| {
        ctx.raw.push(image_publish(IMAGE_BLURRED_OUT_TOPIC, &blurred)?);
        Ok(())
    });

    router.register("arm_speeds", |data, ctx| {
        let ArmSpeedsArgs {
            speed1,
            speed2,
            speed3,
        } = args("arm_speeds", data)?;
        ctx.rover.set_arm_speeds(speed1, speed2, speed3);
        Ok(())
    });

    router.register("arm_open", |_, ctx| {
        ctx.rover.set_gripper_open(true);
        Ok(())
    });
    router.register("arm_close", |_, ctx| {
        ctx.rover.set_gripper_open(false);
        Ok(())
    });
    router.register("arm_fold_lock", |_, ctx| {
        ctx.rover.set_arm_fold_lock(true);
        Ok(())
    });
    router.register("arm_fold_unlock", |_, ctx| {
        ctx.rover.set_arm_fold_lock(false);
        Ok(())
    });
    router.register("robot_lock_base", |_, ctx| {
        ctx.rover.set_base_lock(true);
        Ok(())
    });
    router.register("robot_unlock_base", |_, ctx| {
        ctx.rover.set_base_lock(false);
        Ok(())
    });
}

/// Read an image file into a retained raw publish
fn image_publish(topic: &str, path: &Path) -> Result<RawPublish> {
    let payload = fs::read(path).map_err(|e| {
        Error::Other(format!(
            "cannot read {}, {} not published: {}",
            path.display(),
            topic,
            e
        ))
    })?;
    Ok(RawPublish {
        topic: topic.to_string(),
        payload,
        qos: Qos::AtLeastOnce,
        retained: true,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RoverConfig;
    use crate::rover::{Rover, RoverControl};
    use crate::streaming::compression::Compression;
    use crate::streaming::router::{CommandContext, RouteOutcome, CONTROL_TOPIC};
    use crate::streaming::wire::{PayloadCodec, WireFormat};
    use serde_json::json;

    fn setup(images: ImageConfig) -> (InboundRouter, Rover) {
        let mut router = InboundRouter::new(images.received_image.clone());
        register_rover_commands(&mut router, &images);
        (router, Rover::new(RoverConfig::default()))
    }

    fn send(
        router: &InboundRouter,
        rover: &mut Rover,
        doc: Value,
    ) -> (RouteOutcome, Vec<RawPublish>) {
        let codec = PayloadCodec::new(WireFormat::Json, Compression::None, 9);
        let payload = serde_json::to_vec(&doc).unwrap();
        let mut raw = Vec::new();
        let mut ctx = CommandContext {
            rover,
            raw: &mut raw,
        };
        let outcome = router.route(CONTROL_TOPIC, &payload, codec, &mut ctx);
        (outcome, raw)
    }

    #[test]
    fn test_all_control_types_registered() {
        let (router, _) = setup(ImageConfig::default());
        for kind in [
            "motors",
            "pickup",
            "drop",
            "laser_angle",
            "shoot_laser",
            "request_satellite_image",
            "request_satellite_image_blurred",
            "arm_speeds",
            "arm_open",
            "arm_close",
            "arm_fold_lock",
            "arm_fold_unlock",
            "robot_lock_base",
            "robot_unlock_base",
        ] {
            assert!(router.has_handler(kind), "{}", kind);
        }
    }

    #[test]
    fn test_motors_clamped() {
        let (router, mut rover) = setup(ImageConfig::default());
        let (outcome, _) = send(
            &router,
            &mut rover,
            json!({"type": "motors", "data": {"left": 2.5, "right": -0.25}}),
        );
        assert_eq!(outcome, RouteOutcome::Dispatched("motors".to_string()));
        assert_eq!(rover.motor_accel(), (1.0, -0.25));
    }

    #[test]
    fn test_motors_missing_field_fails() {
        let (router, mut rover) = setup(ImageConfig::default());
        let (outcome, _) = send(
            &router,
            &mut rover,
            json!({"type": "motors", "data": {"left": 0.5}}),
        );
        assert_eq!(outcome, RouteOutcome::HandlerFailed("motors".to_string()));
        assert_eq!(rover.motor_accel(), (0.0, 0.0));
    }

    #[test]
    fn test_drop_out_of_range() {
        let (router, mut rover) = setup(ImageConfig::default());
        let (outcome, _) = send(
            &router,
            &mut rover,
            json!({"type": "drop", "data": {"index": 4}}),
        );
        assert_eq!(outcome, RouteOutcome::HandlerFailed("drop".to_string()));
    }

    #[test]
    fn test_arm_and_locks() {
        let (router, mut rover) = setup(ImageConfig::default());
        send(
            &router,
            &mut rover,
            json!({"type": "arm_speeds", "data": {"speed1": 0.1, "speed2": 0.2, "speed3": 0.3}}),
        );
        send(&router, &mut rover, json!({"type": "arm_open", "data": null}));
        send(&router, &mut rover, json!({"type": "arm_fold_lock", "data": null}));
        send(&router, &mut rover, json!({"type": "robot_lock_base", "data": null}));
        send(&router, &mut rover, json!({"type": "laser_angle", "data": {"angle": 45.0}}));

        assert_eq!(rover.arm().motor_speeds, [0.1, 0.2, 0.3]);
        assert!(rover.arm().gripper_open);
        assert!(rover.arm().fold_locked);
        assert!(rover.is_base_locked());
        assert_eq!(rover.laser_angle(), 45.0);

        send(&router, &mut rover, json!({"type": "robot_unlock_base", "data": null}));
        assert!(!rover.is_base_locked());
    }

    #[test]
    fn test_image_request_reads_file() {
        let dir = tempfile::tempdir().unwrap();
        let images = ImageConfig {
            satellite_image: dir.path().join("lunar.png"),
            blurred_image: dir.path().join("missing.png"),
            received_image: dir.path().join("received.png"),
            ..ImageConfig::default()
        };
        fs::write(&images.satellite_image, [0x89, b'P', b'N', b'G']).unwrap();
        let (router, mut rover) = setup(images);

        let (outcome, raw) = send(
            &router,
            &mut rover,
            json!({"type": "request_satellite_image", "data": null}),
        );
        assert!(matches!(outcome, RouteOutcome::Dispatched(_)));
        assert_eq!(raw.len(), 1);
        assert_eq!(raw[0].topic, "out/image");
        assert_eq!(raw[0].payload, vec![0x89, b'P', b'N', b'G']);
        assert!(raw[0].retained);
        assert_eq!(raw[0].qos, Qos::AtLeastOnce);

        let (outcome, raw) = send(
            &router,
            &mut rover,
            json!({"type": "request_satellite_image_blurred", "data": null}),
        );
        assert!(matches!(outcome, RouteOutcome::HandlerFailed(_)));
        assert!(raw.is_empty());
    }
}
