//! Headless симуляция захвата (Rapier мир без рендера)
//!
//! Сцена: пол, ящики разной массы (seeded RNG), игрок в origin.
//! Скрипт: взять ящик левой рукой → отойти назад → попытаться взять
//! тяжёлый правой → отпустить. Strain печатается через logger.

use std::time::Duration;

use bevy::prelude::*;
use bevy::time::TimeUpdateStrategy;
use rand::Rng;

use grabber_simulation::*;

const TICKS: u32 = 360;
const CRATE_HALF: Vec3 = Vec3::splat(0.3);

struct Scene {
    player: Entity,
    hero: Entity,
    heaviest: Entity,
}

fn build_scene(app: &mut App) -> Result<Scene, ConfigError> {
    let world = app.world_mut();
    spawn_rapier_floor(world, 20.0);
    let player = spawn_rapier_player(world, Vec3::ZERO, GrabConfig::default())?;

    let scattered: Vec<(Vec3, f32)> = {
        let mut rng = world.resource_mut::<DeterministicRng>();
        (0..8)
            .map(|_| {
                let position = Vec3::new(rng.rng.gen_range(-4.0..4.0), CRATE_HALF.y, rng.rng.gen_range(-8.0..-3.5));
                (position, rng.rng.gen_range(5.0..150.0))
            })
            .collect()
    };

    let hero = spawn_rapier_crate(world, Vec3::new(0.0, CRATE_HALF.y, -2.0), CRATE_HALF, 25.0);

    let mut heaviest: Option<(Entity, f32)> = None;
    for (position, mass) in scattered {
        let body = spawn_rapier_crate(world, position, CRATE_HALF, mass);
        if heaviest.map_or(true, |(_, m)| mass > m) {
            heaviest = Some((body, mass));
        }
    }

    let heaviest = heaviest.map(|(body, _)| body).unwrap_or(hero);

    Ok(Scene { player, hero, heaviest })
}

fn look_at_body(app: &mut App, player: Entity, body: Entity) {
    let Some(target) = app.world().get::<Transform>(body).map(|transform| transform.translation) else {
        return;
    };
    if let Some(mut camera) = app.world_mut().get_mut::<PlayerCamera>(player) {
        camera.look_at(target);
    }
}

fn set_walk(app: &mut App, player: Entity, direction: Vec3) {
    if let Some(mut input) = app.world_mut().get_mut::<MovementInput>(player) {
        input.direction = direction;
    }
}

/// Печать strain каждые 15 physics steps
fn log_strain(mut strain: EventReader<HandStrain>, motors: Query<&PlayerMotor>, mut step: Local<u32>) {
    for event in strain.read() {
        *step += 1;
        if *step % 15 != 0 {
            continue;
        }
        let authority = motors.get(event.player).map(|m| m.authority()).unwrap_or(1.0);
        log_info(&format!(
            "step {:>3}: L stretch={:.2} load={:.2} | R stretch={:.2} load={:.2} | authority={:.2} (motor {:.2})",
            *step,
            event.left_stretch01,
            event.left_load01,
            event.right_stretch01,
            event.right_load01,
            event.authority,
            authority
        ));
    }
}

fn main() {
    let seed = 42;
    println!("Starting grabber headless simulation (seed: {})", seed);

    let mut app = create_headless_app(seed);
    app.add_plugins(GrabberSimulationPlugin)
        // Один update = ровно один fixed step
        .insert_resource(TimeUpdateStrategy::ManualDuration(Duration::from_secs_f64(1.0 / 60.0)))
        .add_systems(FixedUpdate, log_strain.after(GrabSet::Authority));
    app.finish();
    app.cleanup();

    let scene = match build_scene(&mut app) {
        Ok(scene) => scene,
        Err(err) => {
            log_error(&format!("failed to build scene: {}", err));
            return;
        }
    };

    for tick in 0..TICKS {
        match tick {
            10 => {
                look_at_body(&mut app, scene.player, scene.hero);
                app.world_mut().send_event(GrabButtonEvent::pressed(scene.player, Hand::Left));
            }
            // Шагаем назад, ящик тянется следом
            90 => set_walk(&mut app, scene.player, Vec3::Z),
            210 => {
                set_walk(&mut app, scene.player, Vec3::ZERO);
                look_at_body(&mut app, scene.player, scene.heaviest);
                app.world_mut().send_event(GrabButtonEvent::pressed(scene.player, Hand::Right));
            }
            270 => {
                app.world_mut().send_event(GrabButtonEvent::pressed(scene.player, Hand::Left));
                app.world_mut().send_event(GrabButtonEvent::pressed(scene.player, Hand::Right));
            }
            _ => {}
        }

        app.update();
    }

    if let Some(transform) = app.world().get::<Transform>(scene.hero) {
        log_info(&format!("hero crate final position: {:?}", transform.translation));
    }
    let world = app.world_mut();
    let handles = world.query_filtered::<(), With<GrabHandle>>().iter(world).count();
    let ignored = world.resource::<IgnoredContactPairs>().len();
    log_info(&format!("handles alive: {}, ignored pairs: {}", handles, ignored));

    println!("Simulation complete!");
}
