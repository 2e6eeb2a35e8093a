//! Tests for GrabController (raycast, toggle/hold modes, authority).

#[cfg(test)]
mod tests {
    use bevy::prelude::*;

    use crate::components::PlayerCamera;
    use crate::grab::config::{ConfigError, GrabConfig, GrabMode};
    use crate::grab::controller::*;
    use crate::grab::events::ButtonPhase;
    use crate::grab::hand::{DriveReport, GrabRejection, Hand, ReleaseReason};
    use crate::physics::{BodyDesc, BodyId, ColliderDesc, ColliderId, GrabPhysics, Grabbable, HeadlessPhysics};

    const DT: f32 = 1.0 / 60.0;
    const EYE: Vec3 = Vec3::new(0.0, 1.6, 0.0);

    struct Scene {
        physics: HeadlessPhysics,
        camera: PlayerCamera,
        player_colliders: Vec<ColliderId>,
    }

    /// Игрок в origin смотрит в -Z, капсула вокруг камеры
    fn scene() -> Scene {
        let mut physics = HeadlessPhysics::zero_gravity();
        let player = physics.add_body(BodyDesc::kinematic(Vec3::new(0.0, 0.9, 0.0)));
        let capsule = physics
            .attach_collider(player, ColliderDesc::sphere(0.4).with_offset(Vec3::new(0.0, 0.7, 0.0)))
            .unwrap();

        Scene {
            physics,
            camera: PlayerCamera::new(EYE, Quat::IDENTITY),
            player_colliders: vec![capsule],
        }
    }

    fn add_crate(physics: &mut HeadlessPhysics, z: f32, mass: f32) -> BodyId {
        let body = physics.add_body(BodyDesc::dynamic(Vec3::new(0.0, 1.6, z), mass).grabbable(Grabbable::default()));
        physics.attach_collider(body, ColliderDesc::cuboid(Vec3::splat(0.3))).unwrap();
        body
    }

    fn press(controller: &mut GrabController, s: &mut Scene, hand: Hand) -> ButtonOutcome {
        controller.on_button(hand, ButtonPhase::Pressed, &mut s.physics, Some(&s.camera), &s.player_colliders)
    }

    #[test]
    fn test_toggle_grabs_then_releases() {
        let mut s = scene();
        let body = add_crate(&mut s.physics, -2.0, 10.0);
        let mut controller = GrabController::default();

        let outcome = press(&mut controller, &mut s, Hand::Left);
        let ButtonOutcome::Started(start) = outcome else {
            panic!("expected Started, got {:?}", outcome);
        };
        assert_eq!(start.target, body);
        assert!((start.grab_point - Vec3::new(0.0, 1.6, -1.7)).length() < 1e-4);
        assert!(controller.is_grabbing(Hand::Left));
        assert!(!controller.is_grabbing(Hand::Right));

        let outcome = press(&mut controller, &mut s, Hand::Left);
        assert!(matches!(
            outcome,
            ButtonOutcome::Released(release) if release.target == body && release.reason == ReleaseReason::Requested
        ));
        assert_eq!(s.physics.handle_count(), 0);
        assert_eq!(s.physics.ignored_pair_count(), 0);
    }

    #[test]
    fn test_toggle_ignores_button_release() {
        let mut s = scene();
        add_crate(&mut s.physics, -2.0, 10.0);
        let mut controller = GrabController::default();
        press(&mut controller, &mut s, Hand::Right);

        let outcome = controller.on_button(
            Hand::Right,
            ButtonPhase::Released,
            &mut s.physics,
            Some(&s.camera),
            &s.player_colliders,
        );

        assert_eq!(outcome, ButtonOutcome::Ignored);
        assert!(controller.is_grabbing(Hand::Right));
    }

    #[test]
    fn test_hold_mode_press_and_release() {
        let mut s = scene();
        add_crate(&mut s.physics, -2.0, 10.0);
        let mut controller = GrabController::new(GrabConfig {
            grab_mode: GrabMode::Hold,
            ..GrabConfig::default()
        })
        .unwrap();

        assert!(matches!(press(&mut controller, &mut s, Hand::Left), ButtonOutcome::Started(_)));
        assert_eq!(press(&mut controller, &mut s, Hand::Left), ButtonOutcome::Ignored);

        let outcome = controller.on_button(
            Hand::Left,
            ButtonPhase::Released,
            &mut s.physics,
            Some(&s.camera),
            &s.player_colliders,
        );
        assert!(matches!(outcome, ButtonOutcome::Released(_)));
        assert!(!controller.is_grabbing(Hand::Left));
    }

    #[test]
    fn test_ray_skips_own_colliders_and_respects_range() {
        let mut s = scene();
        let mut controller = GrabController::default();

        // Ничего в пределах 3m
        add_crate(&mut s.physics, -5.0, 10.0);
        assert_eq!(
            press(&mut controller, &mut s, Hand::Left),
            ButtonOutcome::Rejected(GrabRejection::NothingHit)
        );

        // Капсула вокруг камеры не перехватывает луч
        let near = add_crate(&mut s.physics, -2.0, 10.0);
        let outcome = press(&mut controller, &mut s, Hand::Left);
        assert!(matches!(outcome, ButtonOutcome::Started(start) if start.target == near));
    }

    #[test]
    fn test_static_geometry_rejected() {
        let mut s = scene();
        s.physics
            .add_static_collider(ColliderDesc::cuboid(Vec3::new(2.0, 2.0, 0.1)).with_offset(Vec3::new(0.0, 1.6, -1.5)));
        let mut controller = GrabController::default();

        assert_eq!(
            press(&mut controller, &mut s, Hand::Left),
            ButtonOutcome::Rejected(GrabRejection::NoRigidBody)
        );
        assert_eq!(s.physics.handle_count(), 0);
    }

    #[test]
    fn test_second_hand_cannot_grab_held_body() {
        let mut s = scene();
        add_crate(&mut s.physics, -2.0, 10.0);
        let mut controller = GrabController::default();
        press(&mut controller, &mut s, Hand::Left);

        assert_eq!(
            press(&mut controller, &mut s, Hand::Right),
            ButtonOutcome::Rejected(GrabRejection::AlreadyHeld(Hand::Left))
        );
        assert_eq!(s.physics.handle_count(), 1);
    }

    #[test]
    fn test_missing_camera_is_noop() {
        let mut s = scene();
        add_crate(&mut s.physics, -2.0, 10.0);
        let mut controller = GrabController::default();

        let result = controller.try_grab(Hand::Left, &mut s.physics, None, &s.player_colliders);
        assert_eq!(result, Err(GrabRejection::NoCamera));

        press(&mut controller, &mut s, Hand::Left);
        assert_eq!(controller.fixed_update(&mut s.physics, None, DT), None);
        assert_eq!(controller.take_strain(), None);
        assert!(controller.is_grabbing(Hand::Left));
    }

    #[test]
    fn test_local_hold_clamped_to_min_forward() {
        let mut s = scene();
        // Передняя грань ящика на 0.5m от камеры
        add_crate(&mut s.physics, -0.8, 5.0);
        let mut controller = GrabController::default();
        press(&mut controller, &mut s, Hand::Left);

        let local = controller.hand(Hand::Left).local_hold().unwrap();
        assert!((local - Vec3::new(0.0, 0.0, -0.7)).length() < 1e-4, "{:?}", local);
        assert!((controller.desired_hold(Hand::Left, &s.camera) - Vec3::new(0.0, 1.6, -0.7)).length() < 1e-4);
    }

    #[test]
    fn test_fallback_hold_in_front_of_camera() {
        let mut s = scene();
        add_crate(&mut s.physics, -2.0, 5.0);
        let mut controller = GrabController::new(GrabConfig {
            hold_at_grab_point: false,
            ..GrabConfig::default()
        })
        .unwrap();
        press(&mut controller, &mut s, Hand::Left);

        assert_eq!(controller.hand(Hand::Left).local_hold(), None);
        let turned = PlayerCamera::looking_at(EYE, EYE + Vec3::X);
        let desired = controller.desired_hold(Hand::Left, &turned);
        assert!((desired - (EYE + Vec3::X * 1.6)).length() < 1e-4, "{:?}", desired);
    }

    #[test]
    fn test_movement_authority_curve() {
        let config = GrabConfig::default();
        let report = |stretch01: f32, load01: f32| DriveReport {
            stretch01,
            load01,
            ..DriveReport::default()
        };

        // Ниже slow start → полный контроль
        assert_eq!(movement_authority(&config, &report(0.5, 1.0), &report(0.0, 0.0)), 1.0);
        // stretch 0.95 → slow01 0.5 → authority lerp(1, 0.2, 0.5)
        let half = movement_authority(&config, &report(0.95, 0.0), &report(0.0, 0.0));
        assert!((half - 0.6).abs() < 1e-4, "{}", half);
        // Максимум по рукам
        let full = movement_authority(&config, &report(0.0, 0.0), &report(1.0, 1.0));
        assert!((full - 0.2).abs() < 1e-5);
    }

    #[test]
    fn test_walking_away_from_heavy_crate_drops_authority() {
        let mut s = scene();
        add_crate(&mut s.physics, -2.0, 100.0);
        let mut controller = GrabController::default();
        press(&mut controller, &mut s, Hand::Left);

        // Игрок отшагнул на 1.5m назад
        s.camera.pose.translation = EYE + Vec3::new(0.0, 0.0, 1.5);

        let mut last = None;
        for _ in 0..20 {
            last = controller.fixed_update(&mut s.physics, Some(&s.camera), DT);
            s.physics.step(DT);
        }

        let report = last.unwrap();
        assert!(report.left.released.is_none());
        assert_eq!(report.left.stretch01, 1.0);
        assert!((report.authority - 0.2).abs() < 1e-4, "authority {}", report.authority);
        assert_eq!(controller.take_strain(), Some(report));
        assert_eq!(controller.take_strain(), None);
    }

    #[test]
    fn test_release_all_frees_both_hands() {
        let mut s = scene();
        let left = add_crate(&mut s.physics, -2.0, 5.0);
        let right = s.physics.add_body(BodyDesc::dynamic(Vec3::new(1.0, 1.6, -1.0), 5.0).grabbable(Grabbable::default()));
        s.physics.attach_collider(right, ColliderDesc::sphere(0.2)).unwrap();
        let mut controller = GrabController::default();

        press(&mut controller, &mut s, Hand::Left);
        s.camera = PlayerCamera::looking_at(EYE, Vec3::new(1.0, 1.6, -1.0));
        press(&mut controller, &mut s, Hand::Right);
        assert_eq!(controller.held_by(left), Some(Hand::Left));
        assert_eq!(controller.held_by(right), Some(Hand::Right));

        let released = controller.release_all(&mut s.physics);

        assert_eq!(released.len(), 2);
        assert_eq!(s.physics.handle_count(), 0);
        assert_eq!(s.physics.joint_count(), 0);
        assert_eq!(s.physics.body_info(left).map(|info| info.mass), Some(5.0));
    }

    #[test]
    fn test_new_rejects_inverted_arm_config() {
        let inverted = GrabConfig {
            arm_slack_radius: 1.5,
            arm_max_distance: 1.25,
            ..GrabConfig::default()
        };

        let result = GrabController::new(inverted);

        assert!(matches!(result, Err(ConfigError::Invalid { field: "arm_max_distance", .. })));
        assert_eq!(GrabController::new(GrabConfig::default()).unwrap().config(), &GrabConfig::default());
    }
}
