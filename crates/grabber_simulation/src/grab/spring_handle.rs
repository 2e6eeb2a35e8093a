//! SpringHandle — proxy тело между рукой и захваченным объектом
//!
//! Сила захвата прикладывается к handle, а не к объекту: handle лёгкий,
//! сидит на ball joint (translation locked, rotation free), и солвер сам
//! распределяет импульс. Объект вращается свободно вокруг точки захвата.
//!
//! Handle + joint создаются и уничтожаются только вместе (SpringHandle
//! владеет обоими, destroy поглощает self).

use bevy::prelude::*;

use crate::physics::{BodyId, ColliderId, ForceMode, GrabPhysics, HandleId, JointId};

/// Solver iterations которые поднимаются у объекта на время захвата
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SolverBoost {
    pub position_iterations: u32,
    pub velocity_iterations: u32,
}

/// Активный proxy (handle + joint)
#[derive(Debug, PartialEq, Eq)]
pub struct SpringHandle {
    handle: HandleId,
    joint: JointId,
    target: BodyId,
}

impl SpringHandle {
    /// Spawn handle в `grab_point` и прицепить к `target`
    ///
    /// Anchor handle = его local origin, anchor тела = local эквивалент
    /// `grab_point`. None → тело исчезло (ничего не создано).
    pub fn spawn(
        physics: &mut dyn GrabPhysics,
        target: BodyId,
        grab_point: Vec3,
        handle_mass: f32,
        boost: SolverBoost,
    ) -> Option<Self> {
        let body_local_anchor = physics.body_world_to_local(target, grab_point)?;

        let handle = physics.spawn_handle(grab_point, handle_mass);
        let Some(joint) = physics.create_ball_joint(handle, target, body_local_anchor) else {
            physics.despawn_handle(handle);
            return None;
        };

        // Меньше jitter на тяжёлых объектах
        physics.raise_solver_iterations(target, boost.position_iterations, boost.velocity_iterations);

        Some(Self { handle, joint, target })
    }

    pub fn handle(&self) -> HandleId {
        self.handle
    }

    pub fn target(&self) -> BodyId {
        self.target
    }

    pub fn position(&self, physics: &dyn GrabPhysics) -> Option<Vec3> {
        physics.handle_position(self.handle)
    }

    pub fn velocity(&self, physics: &dyn GrabPhysics) -> Option<Vec3> {
        physics.handle_velocity(self.handle)
    }

    /// Handle и joint ещё живы в солвере
    pub fn is_intact(&self, physics: &dyn GrabPhysics) -> bool {
        physics.handle_position(self.handle).is_some() && physics.joint_exists(self.joint)
    }

    /// Непрерывная сила на текущий physics step
    pub fn apply_force(&self, physics: &mut dyn GrabPhysics, force: Vec3) {
        physics.add_handle_force(self.handle, force, ForceMode::Force);
    }

    /// Joint, затем handle. Безопасно если солвер уже удалил что-то сам.
    pub fn destroy(self, physics: &mut dyn GrabPhysics) {
        physics.destroy_joint(self.joint);
        physics.despawn_handle(self.handle);
    }
}

/// Bookkeeping выключенных контактов (игрок ↔ захваченный коллайдер)
///
/// Хранит ровно те пары, которые выключил сам: restore включает их
/// обратно и ничего больше. Пары выключенные кем-то ещё до захвата
/// не трогаются.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CollisionIgnoreSet {
    pairs: Vec<(ColliderId, ColliderId)>,
}

impl CollisionIgnoreSet {
    /// Выключить контакты каждого non-trigger коллайдера игрока с `grabbed`
    ///
    /// Trigger-коллайдер объекта → пустой set (триггеры не контактируют).
    pub fn ignore(physics: &mut dyn GrabPhysics, player_colliders: &[ColliderId], grabbed: ColliderId) -> Self {
        let mut pairs = Vec::new();

        match physics.collider_is_trigger(grabbed) {
            Some(false) => {}
            _ => return Self { pairs },
        }

        for &player in player_colliders {
            if player == grabbed || physics.collider_is_trigger(player) != Some(false) {
                continue;
            }
            if physics.is_collision_ignored(player, grabbed) {
                continue;
            }
            physics.set_collision_ignored(player, grabbed, true);
            pairs.push((player, grabbed));
        }

        Self { pairs }
    }

    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    pub fn pairs(&self) -> &[(ColliderId, ColliderId)] {
        &self.pairs
    }

    /// Включить обратно все пары (в т.ч. при forced release)
    pub fn restore(self, physics: &mut dyn GrabPhysics) {
        for (player, grabbed) in self.pairs {
            physics.set_collision_ignored(player, grabbed, false);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::physics::{BodyDesc, ColliderDesc, Grabbable, HeadlessPhysics};

    const BOOST: SolverBoost = SolverBoost {
        position_iterations: 12,
        velocity_iterations: 12,
    };

    fn world_with_crate() -> (HeadlessPhysics, BodyId, ColliderId) {
        let mut physics = HeadlessPhysics::zero_gravity();
        let body = physics.add_body(BodyDesc::dynamic(Vec3::new(0.0, 1.0, -2.0), 10.0).grabbable(Grabbable::default()));
        let collider = physics.attach_collider(body, ColliderDesc::cuboid(Vec3::splat(0.3))).unwrap();
        (physics, body, collider)
    }

    #[test]
    fn test_spawn_creates_handle_and_joint_at_grab_point() {
        let (mut physics, body, _) = world_with_crate();
        let grab_point = Vec3::new(0.0, 1.0, -1.7);

        let spring = SpringHandle::spawn(&mut physics, body, grab_point, 0.2, BOOST).unwrap();

        assert_eq!(physics.handle_count(), 1);
        assert_eq!(physics.joint_count(), 1);
        assert_eq!(spring.position(&physics), Some(grab_point));
        assert_eq!(physics.solver_iterations(body), Some((12, 12)));
        assert!(spring.is_intact(&physics));
    }

    #[test]
    fn test_spawn_on_missing_body_creates_nothing() {
        let (mut physics, body, _) = world_with_crate();
        physics.remove_body(body);

        assert!(SpringHandle::spawn(&mut physics, body, Vec3::ZERO, 0.2, BOOST).is_none());
        assert_eq!(physics.handle_count(), 0);
        assert_eq!(physics.joint_count(), 0);
    }

    #[test]
    fn test_destroy_removes_both() {
        let (mut physics, body, _) = world_with_crate();
        let spring = SpringHandle::spawn(&mut physics, body, Vec3::new(0.0, 1.0, -1.7), 0.2, BOOST).unwrap();

        spring.destroy(&mut physics);

        assert_eq!(physics.handle_count(), 0);
        assert_eq!(physics.joint_count(), 0);
    }

    #[test]
    fn test_ignore_set_skips_triggers_and_restores_exactly() {
        let (mut physics, _, grabbed) = world_with_crate();
        let player_body = physics.add_body(BodyDesc::kinematic(Vec3::ZERO));
        let capsule = physics.attach_collider(player_body, ColliderDesc::sphere(0.4)).unwrap();
        let hand = physics.attach_collider(player_body, ColliderDesc::sphere(0.1)).unwrap();
        let interact_zone = physics
            .attach_collider(player_body, ColliderDesc::sphere(1.0).as_trigger())
            .unwrap();

        // Пара выключена заранее кем-то другим
        physics.set_collision_ignored(hand, grabbed, true);

        let set = CollisionIgnoreSet::ignore(&mut physics, &[capsule, hand, interact_zone], grabbed);
        assert_eq!(set.pairs(), &[(capsule, grabbed)]);
        assert!(physics.is_collision_ignored(capsule, grabbed));

        set.restore(&mut physics);
        assert!(!physics.is_collision_ignored(capsule, grabbed));
        assert!(physics.is_collision_ignored(hand, grabbed), "чужая пара не тронута");
        assert!(!physics.is_collision_ignored(interact_zone, grabbed));
    }

    #[test]
    fn test_ignore_set_empty_for_trigger_target() {
        let mut physics = HeadlessPhysics::zero_gravity();
        let body = physics.add_body(BodyDesc::dynamic(Vec3::ZERO, 1.0));
        let trigger = physics.attach_collider(body, ColliderDesc::sphere(0.2).as_trigger()).unwrap();
        let player = physics.add_static_collider(ColliderDesc::sphere(0.4));

        let set = CollisionIgnoreSet::ignore(&mut physics, &[player], trigger);
        assert!(set.is_empty());
        assert_eq!(physics.ignored_pair_count(), 0);
    }
}
