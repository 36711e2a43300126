//! Physics engine adapter - wraps rapier2d behind a small interface
//!
//! The adapter knows about ragdoll blueprints but nothing about players
//! or damage; ownership of bodies is tracked by the room in a side table
//! keyed on collider handles.

use std::collections::HashMap;

use nalgebra::vector;
use parking_lot::Mutex;
use rapier2d::prelude::*;

use crate::game::ragdoll::RagdollBlueprint;
use crate::game::tuning::Tuning;
use crate::ws::protocol::{PartName, Point};

const WALL_THICKNESS: f32 = 20.0;

/// A pairwise contact that started during the last step, with the
/// relative speed of the two bodies at drain time.
#[derive(Debug, Clone, Copy)]
pub struct ContactEvent {
    pub first: ColliderHandle,
    pub second: ColliderHandle,
    pub relative_speed: f32,
}

/// Handles for one spawned part
#[derive(Debug, Clone, Copy)]
pub struct PartBody {
    pub body: RigidBodyHandle,
    pub collider: ColliderHandle,
}

/// Handles for a fully spawned ragdoll
#[derive(Debug, Clone)]
pub struct RagdollBodies {
    parts: HashMap<PartName, PartBody>,
}

impl RagdollBodies {
    pub fn part(&self, name: PartName) -> Option<PartBody> {
        self.parts.get(&name).copied()
    }

    pub fn iter(&self) -> impl Iterator<Item = (PartName, PartBody)> + '_ {
        self.parts.iter().map(|(&name, &body)| (name, body))
    }
}

/// One isolated physics world (one per room)
pub struct PhysicsWorld {
    rigid_body_set: RigidBodySet,
    collider_set: ColliderSet,
    integration_parameters: IntegrationParameters,
    physics_pipeline: PhysicsPipeline,
    island_manager: IslandManager,
    broad_phase: DefaultBroadPhase,
    narrow_phase: NarrowPhase,
    impulse_joint_set: ImpulseJointSet,
    multibody_joint_set: MultibodyJointSet,
    ccd_solver: CCDSolver,
    query_pipeline: QueryPipeline,
    gravity: Vector<Real>,
}

impl PhysicsWorld {
    pub fn new(tuning: &Tuning) -> Self {
        let mut world = Self {
            rigid_body_set: RigidBodySet::new(),
            collider_set: ColliderSet::new(),
            integration_parameters: IntegrationParameters::default(),
            physics_pipeline: PhysicsPipeline::new(),
            island_manager: IslandManager::new(),
            broad_phase: DefaultBroadPhase::new(),
            narrow_phase: NarrowPhase::new(),
            impulse_joint_set: ImpulseJointSet::new(),
            multibody_joint_set: MultibodyJointSet::new(),
            ccd_solver: CCDSolver::new(),
            query_pipeline: QueryPipeline::new(),
            // Screen coordinates: y grows downward, gravity is positive
            gravity: vector![0.0, tuning.gravity_y],
        };

        world.create_arena(tuning);
        world
    }

    /// Static ground below the spawn area plus side walls, so ragdolls
    /// stay inside the visible arena.
    fn create_arena(&mut self, tuning: &Tuning) {
        let mid_x = tuning.arena_width / 2.0;
        let mid_y = tuning.ground_y / 2.0;

        let statics = [
            // ground
            (
                vector![mid_x, tuning.ground_y + WALL_THICKNESS / 2.0],
                mid_x + WALL_THICKNESS,
                WALL_THICKNESS / 2.0,
            ),
            // left wall
            (
                vector![-WALL_THICKNESS / 2.0, mid_y],
                WALL_THICKNESS / 2.0,
                tuning.ground_y,
            ),
            // right wall
            (
                vector![tuning.arena_width + WALL_THICKNESS / 2.0, mid_y],
                WALL_THICKNESS / 2.0,
                tuning.ground_y,
            ),
        ];

        for (position, half_width, half_height) in statics {
            let body = RigidBodyBuilder::fixed().translation(position).build();
            let handle = self.rigid_body_set.insert(body);
            let collider = ColliderBuilder::cuboid(half_width, half_height).build();
            self.collider_set
                .insert_with_parent(collider, handle, &mut self.rigid_body_set);
        }
    }

    /// Create bodies and spring joints for one ragdoll at the given origin.
    pub fn spawn_ragdoll(
        &mut self,
        blueprint: &RagdollBlueprint,
        origin: Point,
        tuning: &Tuning,
    ) -> RagdollBodies {
        let mut parts = HashMap::new();

        for def in &blueprint.parts {
            let body = RigidBodyBuilder::dynamic()
                .translation(vector![origin.x + def.offset.x, origin.y + def.offset.y])
                .linear_damping(tuning.body_damping)
                .ccd_enabled(true)
                .build();
            let body_handle = self.rigid_body_set.insert(body);

            // Unit mass per part keeps steering forces in body-relative units
            let collider = ColliderBuilder::ball(tuning.part_radius)
                .mass(1.0)
                .active_events(ActiveEvents::COLLISION_EVENTS)
                .build();
            let collider_handle = self.collider_set.insert_with_parent(
                collider,
                body_handle,
                &mut self.rigid_body_set,
            );

            parts.insert(
                def.name,
                PartBody {
                    body: body_handle,
                    collider: collider_handle,
                },
            );
        }

        for constraint in &blueprint.constraints {
            let (Some(a), Some(b)) = (parts.get(&constraint.a), parts.get(&constraint.b)) else {
                continue;
            };
            let joint = SpringJointBuilder::new(
                constraint.rest_length,
                tuning.constraint_stiffness,
                tuning.constraint_damping,
            )
            .build();
            self.impulse_joint_set.insert(a.body, b.body, joint, true);
        }

        RagdollBodies { parts }
    }

    /// Remove all bodies of a ragdoll (joints and colliders go with them).
    pub fn remove_ragdoll(&mut self, bodies: &RagdollBodies) {
        for (_, part) in bodies.iter() {
            if !self.rigid_body_set.contains(part.body) {
                continue;
            }
            self.rigid_body_set.remove(
                part.body,
                &mut self.island_manager,
                &mut self.collider_set,
                &mut self.impulse_joint_set,
                &mut self.multibody_joint_set,
                true,
            );
        }
        self.query_pipeline.update(&self.collider_set);
    }

    /// Replace the steering force on a body.
    pub fn apply_force(&mut self, handle: RigidBodyHandle, fx: f32, fy: f32) {
        if let Some(body) = self.rigid_body_set.get_mut(handle) {
            body.reset_forces(false);
            body.add_force(vector![fx, fy], true);
        }
    }

    /// Advance the simulation by `dt` and return the contacts that
    /// started during the step.
    ///
    /// Impact speeds are taken from the velocities going into the
    /// solver; post-solve velocities have the collision response
    /// already subtracted, which erases the head-on component.
    pub fn step(&mut self, dt: f32) -> Vec<ContactEvent> {
        self.integration_parameters.dt = dt;

        let pre_solve: HashMap<RigidBodyHandle, Vector<Real>> = self
            .rigid_body_set
            .iter()
            .map(|(handle, body)| (handle, *body.linvel()))
            .collect();

        let collector = ContactCollector::default();

        self.physics_pipeline.step(
            &self.gravity,
            &self.integration_parameters,
            &mut self.island_manager,
            &mut self.broad_phase,
            &mut self.narrow_phase,
            &mut self.rigid_body_set,
            &mut self.collider_set,
            &mut self.impulse_joint_set,
            &mut self.multibody_joint_set,
            &mut self.ccd_solver,
            None,
            &(),
            &collector,
        );

        self.query_pipeline.update(&self.collider_set);

        collector
            .started
            .into_inner()
            .into_iter()
            .filter_map(|(first, second)| {
                let relative_speed = self.relative_speed(&pre_solve, first, second)?;
                Some(ContactEvent {
                    first,
                    second,
                    relative_speed,
                })
            })
            .collect()
    }

    fn relative_speed(
        &self,
        pre_solve: &HashMap<RigidBodyHandle, Vector<Real>>,
        a: ColliderHandle,
        b: ColliderHandle,
    ) -> Option<f32> {
        let va = self.body_velocity(pre_solve, a)?;
        let vb = self.body_velocity(pre_solve, b)?;
        Some((va - vb).norm())
    }

    fn body_velocity(
        &self,
        pre_solve: &HashMap<RigidBodyHandle, Vector<Real>>,
        collider: ColliderHandle,
    ) -> Option<Vector<Real>> {
        let parent = self.collider_set.get(collider)?.parent()?;
        pre_solve
            .get(&parent)
            .copied()
            .or_else(|| self.rigid_body_set.get(parent).map(|body| *body.linvel()))
    }

    /// Current position of a body, if it still exists.
    pub fn position(&self, handle: RigidBodyHandle) -> Option<Point> {
        self.rigid_body_set.get(handle).map(|body| {
            let pos = body.translation();
            Point::new(pos.x, pos.y)
        })
    }

}

/// Collects collision-start events during one pipeline step so the
/// room can drain them as a pull-based list.
#[derive(Default)]
struct ContactCollector {
    started: Mutex<Vec<(ColliderHandle, ColliderHandle)>>,
}

impl EventHandler for ContactCollector {
    fn handle_collision_event(
        &self,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        event: CollisionEvent,
        _contact_pair: Option<&ContactPair>,
    ) {
        if let CollisionEvent::Started(first, second, _) = event {
            self.started.lock().push((first, second));
        }
    }

    fn handle_contact_force_event(
        &self,
        _dt: Real,
        _bodies: &RigidBodySet,
        _colliders: &ColliderSet,
        _contact_pair: &ContactPair,
        _total_force_magnitude: Real,
    ) {
    }
}
