//! Grab integration test
//!
//! Полный headless App: HeadlessSimulationPlugin + игрок + ящики.
//! Schedules гоняем вручную (Update = input, FixedUpdate = physics step),
//! события забираем через Events::drain.
//!
//! Проверяем:
//! - Press → захват, ящик тянется за игроком
//! - Forced release (hard distance, target destroyed) → GrabReleased + cleanup
//! - Authority доходит до PlayerMotor
//! - Нет камеры → no-op

use bevy::prelude::*;
use grabber_simulation::*;

const CRATE_POS: Vec3 = Vec3::new(0.0, 0.3, -2.0);
const CRATE_HALF: Vec3 = Vec3::splat(0.3);

struct TestScene {
    app: App,
    player: Entity,
    crate_body: BodyId,
}

/// Helper: App с игроком в origin, камера смотрит на ящик
fn create_grab_app(config: GrabConfig, crate_mass: f32) -> TestScene {
    let mut app = create_headless_app(42);
    app.add_plugins(HeadlessSimulationPlugin);
    app.finish();
    app.cleanup();

    let player = spawn_headless_player(app.world_mut(), Vec3::ZERO, config).unwrap();
    let (crate_body, _) = spawn_crate(
        &mut app.world_mut().resource_mut::<HeadlessPhysics>(),
        CRATE_POS,
        CRATE_HALF,
        crate_mass,
    )
    .unwrap();

    let mut scene = TestScene { app, player, crate_body };
    look_at(&mut scene, CRATE_POS);
    scene
}

fn look_at(scene: &mut TestScene, target: Vec3) {
    let mut camera = scene.app.world_mut().get_mut::<PlayerCamera>(scene.player).unwrap();
    camera.look_at(target);
}

fn button(scene: &mut TestScene, hand: Hand, phase: ButtonPhase) {
    scene.app.world_mut().send_event(GrabButtonEvent {
        player: scene.player,
        hand,
        phase,
    });
    scene.app.world_mut().run_schedule(Update);
}

fn press(scene: &mut TestScene, hand: Hand) {
    button(scene, hand, ButtonPhase::Pressed);
}

fn fixed_steps(scene: &mut TestScene, count: usize) {
    for _ in 0..count {
        scene.app.world_mut().run_schedule(FixedUpdate);
    }
}

fn drain<E: Event>(scene: &mut TestScene) -> Vec<E> {
    scene.app.world_mut().resource_mut::<Events<E>>().drain().collect()
}

fn controller(scene: &TestScene) -> &GrabController {
    scene.app.world().get::<GrabController>(scene.player).unwrap()
}

fn physics(scene: &TestScene) -> &HeadlessPhysics {
    scene.app.world().resource::<HeadlessPhysics>()
}

#[test]
fn test_press_grabs_crate_and_emits_started() {
    let mut scene = create_grab_app(GrabConfig::default(), 10.0);

    press(&mut scene, Hand::Left);

    let started = drain::<GrabStarted>(&mut scene);
    assert_eq!(started.len(), 1);
    assert_eq!(started[0].body, scene.crate_body);
    assert_eq!(started[0].hand, Hand::Left);
    assert!(controller(&scene).is_grabbing(Hand::Left));
    assert_eq!(physics(&scene).handle_count(), 1);
    // Обе сферы капсулы игрока не толкают захваченный ящик
    assert_eq!(physics(&scene).ignored_pair_count(), 2);
}

#[test]
fn test_crate_follows_player_walking_back() {
    let mut scene = create_grab_app(GrabConfig::default(), 10.0);
    press(&mut scene, Hand::Left);

    let start_z = physics(&scene).body_position(scene.crate_body).unwrap().z;

    scene.app.world_mut().get_mut::<MovementInput>(scene.player).unwrap().direction = Vec3::Z;
    fixed_steps(&mut scene, 30);
    scene.app.world_mut().get_mut::<MovementInput>(scene.player).unwrap().direction = Vec3::ZERO;
    fixed_steps(&mut scene, 90);

    assert!(controller(&scene).is_grabbing(Hand::Left), "ящик не должен сорваться");
    assert!(drain::<GrabReleased>(&mut scene).is_empty());

    let moved = physics(&scene).body_position(scene.crate_body).unwrap().z - start_z;
    assert!(moved > 2.0, "ящик проехал за игроком {}m", moved);

    let strain = drain::<HandStrain>(&mut scene);
    assert_eq!(strain.len(), 120);
    for event in strain {
        assert!((0.0..=1.0).contains(&event.left_stretch01));
        assert!((0.0..=1.0).contains(&event.left_load01));
        assert!(event.authority >= 0.2 - 1e-5 && event.authority <= 1.0);
    }
}

#[test]
fn test_second_press_releases_and_restores_contacts() {
    let mut scene = create_grab_app(GrabConfig::default(), 10.0);
    press(&mut scene, Hand::Left);
    fixed_steps(&mut scene, 10);

    press(&mut scene, Hand::Left);

    let released = drain::<GrabReleased>(&mut scene);
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].reason, ReleaseReason::Requested);
    assert_eq!(released[0].body, scene.crate_body);
    assert!(!controller(&scene).is_grabbing(Hand::Left));
    assert_eq!(physics(&scene).handle_count(), 0);
    assert_eq!(physics(&scene).joint_count(), 0);
    assert_eq!(physics(&scene).ignored_pair_count(), 0);
}

#[test]
fn test_hold_mode_releases_on_button_up() {
    let config = GrabConfig {
        grab_mode: GrabMode::Hold,
        ..GrabConfig::default()
    };
    let mut scene = create_grab_app(config, 10.0);

    press(&mut scene, Hand::Right);
    assert!(controller(&scene).is_grabbing(Hand::Right));

    button(&mut scene, Hand::Right, ButtonPhase::Released);

    assert!(!controller(&scene).is_grabbing(Hand::Right));
    assert_eq!(drain::<GrabReleased>(&mut scene).len(), 1);
}

#[test]
fn test_second_hand_on_same_crate_rejected() {
    let mut scene = create_grab_app(GrabConfig::default(), 10.0);
    press(&mut scene, Hand::Left);
    press(&mut scene, Hand::Right);

    let rejected = drain::<GrabRejected>(&mut scene);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].rejection, GrabRejection::AlreadyHeld(Hand::Left));
    assert!(!controller(&scene).is_grabbing(Hand::Right));
    assert_eq!(physics(&scene).handle_count(), 1);
}

#[test]
fn test_teleported_crate_hard_releases() {
    let mut scene = create_grab_app(GrabConfig::default(), 10.0);
    press(&mut scene, Hand::Left);
    fixed_steps(&mut scene, 5);

    // Солвер "выстрелил" ящиком
    scene
        .app
        .world_mut()
        .resource_mut::<HeadlessPhysics>()
        .set_body_position(scene.crate_body, Vec3::new(0.0, 0.3, -8.0));
    fixed_steps(&mut scene, 1);

    let released = drain::<GrabReleased>(&mut scene);
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].reason, ReleaseReason::HardReleaseDistance);
    assert!(!controller(&scene).is_grabbing(Hand::Left));
    assert_eq!(physics(&scene).handle_count(), 0);
    assert_eq!(physics(&scene).ignored_pair_count(), 0);
}

#[test]
fn test_destroyed_crate_releases_with_target_lost() {
    let mut scene = create_grab_app(GrabConfig::default(), 10.0);
    press(&mut scene, Hand::Left);
    fixed_steps(&mut scene, 5);

    let body = scene.crate_body;
    scene.app.world_mut().resource_mut::<HeadlessPhysics>().remove_body(body);
    fixed_steps(&mut scene, 1);

    let released = drain::<GrabReleased>(&mut scene);
    assert_eq!(released.len(), 1);
    assert_eq!(released[0].reason, ReleaseReason::TargetLost);
    assert_eq!(physics(&scene).handle_count(), 0);
    assert_eq!(physics(&scene).joint_count(), 0);
}

#[test]
fn test_stretched_arm_throttles_motor_authority() {
    let mut scene = create_grab_app(GrabConfig::default(), 100.0);
    press(&mut scene, Hand::Left);

    // Игрока отбросило на 1.5m назад от тяжёлого ящика
    let body = scene.app.world().get::<PlayerBody>(scene.player).unwrap().0;
    let center = Vec3::new(0.0, PLAYER_CENTER_HEIGHT, 1.5);
    scene.app.world_mut().resource_mut::<HeadlessPhysics>().set_body_position(body, center);
    fixed_steps(&mut scene, 25);

    let motor = scene.app.world().get::<PlayerMotor>(scene.player).unwrap();
    assert!(motor.authority() < 0.25, "authority {}", motor.authority());
    assert!(controller(&scene).is_grabbing(Hand::Left));

    // Отпустили → authority возвращается к 1
    press(&mut scene, Hand::Left);
    fixed_steps(&mut scene, 1);
    let motor = scene.app.world().get::<PlayerMotor>(scene.player).unwrap();
    assert_eq!(motor.authority(), 1.0);
}

#[test]
fn test_missing_camera_skips_grab_and_drive() {
    let mut scene = create_grab_app(GrabConfig::default(), 10.0);
    press(&mut scene, Hand::Left);
    drain::<HandStrain>(&mut scene);

    scene.app.world_mut().entity_mut(scene.player).remove::<PlayerCamera>();
    fixed_steps(&mut scene, 3);

    assert!(drain::<HandStrain>(&mut scene).is_empty());
    assert!(controller(&scene).is_grabbing(Hand::Left), "захват переживает тик без камеры");

    press(&mut scene, Hand::Right);
    let rejected = drain::<GrabRejected>(&mut scene);
    assert_eq!(rejected.len(), 1);
    assert_eq!(rejected[0].rejection, GrabRejection::NoCamera);
}

#[test]
fn test_button_for_unknown_entity_is_ignored() {
    let mut scene = create_grab_app(GrabConfig::default(), 10.0);
    let stranger = scene.app.world_mut().spawn_empty().id();

    scene.app.world_mut().send_event(GrabButtonEvent::pressed(stranger, Hand::Left));
    scene.app.world_mut().run_schedule(Update);

    assert!(drain::<GrabStarted>(&mut scene).is_empty());
    assert!(drain::<GrabRejected>(&mut scene).is_empty());
    assert!(!controller(&scene).is_grabbing(Hand::Left));
}

#[test]
fn test_invalid_config_spawns_no_player() {
    let mut app = create_headless_app(42);
    app.add_plugins(HeadlessSimulationPlugin);
    let inverted = GrabConfig {
        hard_release_distance: 1.0,
        ..GrabConfig::default()
    };

    let result = spawn_headless_player(app.world_mut(), Vec3::ZERO, inverted);

    assert!(matches!(result, Err(ConfigError::Invalid { .. })));
    let world = app.world_mut();
    assert_eq!(world.query::<&Player>().iter(world).count(), 0);
}
