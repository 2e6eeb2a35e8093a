//! Grab ECS systems
//!
//! - process_grab_buttons (Update): GrabButtonEvent → controller
//! - drive_grab_controllers (FixedUpdate): обе руки за physics step
//! - apply_grab_authority (FixedUpdate): strain → PlayerMotor authority

use bevy::ecs::system::StaticSystemParam;
use bevy::prelude::*;

use super::controller::{ButtonOutcome, GrabController};
use super::events::{GrabButtonEvent, GrabRejected, GrabReleased, GrabStarted, HandStrain};
use super::hand::{GrabRejection, Hand, Release};
use crate::components::{Player, PlayerCamera, PlayerColliders};
use crate::physics::{GrabBackend, PlayerMotor};

fn released_event(player: Entity, hand: Hand, release: Release) -> GrabReleased {
    GrabReleased {
        player,
        hand,
        body: release.target,
        reason: release.reason,
    }
}

/// Система: обработка кнопок рук
///
/// Неизвестный player entity → warning, событие пропускается.
pub fn process_grab_buttons<B: GrabBackend>(
    mut buttons: EventReader<GrabButtonEvent>,
    mut players: Query<(&mut GrabController, Option<&PlayerCamera>, Option<&PlayerColliders>), With<Player>>,
    mut backend: StaticSystemParam<B>,
    mut started: EventWriter<GrabStarted>,
    mut released: EventWriter<GrabReleased>,
    mut rejected: EventWriter<GrabRejected>,
) {
    let physics = B::physics(&mut *backend);

    for event in buttons.read() {
        let Ok((mut controller, camera, colliders)) = players.get_mut(event.player) else {
            crate::log_warning(&format!(
                "grab.input player={:?} hand={:?}: entity has no GrabController",
                event.player, event.hand
            ));
            continue;
        };

        let colliders = colliders.map(|c| c.0.as_slice()).unwrap_or(&[]);
        let outcome = controller.on_button(event.hand, event.phase, &mut *physics, camera, colliders);

        match outcome {
            ButtonOutcome::Started(start) => {
                if let Some(previous) = start.replaced {
                    released.write(released_event(event.player, event.hand, previous));
                }
                crate::log(&format!(
                    "✋ grab.start player={:?} hand={:?} body={:?} point={:?}",
                    event.player, start.hand, start.target, start.grab_point
                ));
                started.write(GrabStarted {
                    player: event.player,
                    hand: start.hand,
                    body: start.target,
                    grab_point: start.grab_point,
                });
            }
            ButtonOutcome::Released(release) => {
                crate::log(&format!(
                    "grab.release player={:?} hand={:?} body={:?} reason={}",
                    event.player, event.hand, release.target, release.reason
                ));
                released.write(released_event(event.player, event.hand, release));
            }
            ButtonOutcome::Rejected(rejection) => {
                match rejection {
                    GrabRejection::NoCamera => crate::log_warning(&format!(
                        "grab.reject player={:?} hand={:?}: {} (attempt skipped)",
                        event.player, event.hand, rejection
                    )),
                    _ => crate::log(&format!(
                        "grab.reject player={:?} hand={:?}: {}",
                        event.player, event.hand, rejection
                    )),
                }
                rejected.write(GrabRejected {
                    player: event.player,
                    hand: event.hand,
                    rejection,
                });
            }
            ButtonOutcome::Ignored => {}
        }
    }
}

/// Edge detector пропажи камеры: true только на первом тике gap'а
///
/// `gaps` — игроки, про которых warning уже выдан. Камера вернулась
/// (или руки пусты) → игрок убирается, следующий gap снова логируется.
fn camera_gap_started(gaps: &mut Vec<Entity>, player: Entity, missing: bool) -> bool {
    let known = gaps.contains(&player);
    match (missing, known) {
        (true, false) => {
            gaps.push(player);
            true
        }
        (false, true) => {
            gaps.retain(|&gap| gap != player);
            false
        }
        _ => false,
    }
}

/// Система: drive обеих рук каждого игрока (раз за fixed step)
pub fn drive_grab_controllers<B: GrabBackend>(
    time: Res<Time<Fixed>>,
    mut players: Query<(Entity, &mut GrabController, Option<&PlayerCamera>), With<Player>>,
    mut backend: StaticSystemParam<B>,
    mut released: EventWriter<GrabReleased>,
    mut strain_events: EventWriter<HandStrain>,
    mut camera_gaps: Local<Vec<Entity>>,
) {
    let delta = time.timestep().as_secs_f32();
    let physics = B::physics(&mut *backend);

    for (player, mut controller, camera) in players.iter_mut() {
        let holding = controller.is_grabbing(Hand::Left) || controller.is_grabbing(Hand::Right);
        if camera_gap_started(&mut camera_gaps, player, camera.is_none() && holding) {
            crate::log_warning(&format!("grab.drive player={:?}: no camera pose, ticks skipped", player));
        }

        let Some(report) = controller.fixed_update(&mut *physics, camera, delta) else {
            continue;
        };

        for hand in Hand::ALL {
            if let Some(release) = report.hand(hand).released {
                released.write(released_event(player, hand, release));
            }
        }

        strain_events.write(HandStrain {
            player,
            left_stretch01: report.left.stretch01,
            left_load01: report.left.load01,
            right_stretch01: report.right.stretch01,
            right_load01: report.right.load01,
            authority: report.authority,
        });
    }
}

/// Система: authority → motor (одна запись за step)
///
/// Игрок без motor → authority просто не применяется.
pub fn apply_grab_authority(mut players: Query<(&mut GrabController, Option<&mut PlayerMotor>), With<Player>>) {
    for (mut controller, motor) in players.iter_mut() {
        let Some(report) = controller.take_strain() else {
            continue;
        };
        if let Some(mut motor) = motor {
            motor.set_authority(report.authority);
        }
    }
}
