use approx::assert_relative_eq;
use rigid_physics::*;

fn ground_3d(world: &mut PhysicsWorld3D) -> ColliderHandle {
    let ground = world.insert_body(
        RigidBodyBuilder::fixed()
            .translation(Vec3::new(0.0, -0.5, 0.0))
            .build()
            .unwrap(),
    );
    world
        .insert_collider(
            ColliderBuilder::cuboid(Vec3::new(10.0, 0.5, 10.0)).build().unwrap(),
            ground,
        )
        .unwrap()
}

fn ball_3d(world: &mut PhysicsWorld3D, at: Vec3, linvel: Vec3) -> RigidBodyHandle {
    let body = world.insert_body(
        RigidBodyBuilder::dynamic()
            .translation(at)
            .linvel(linvel)
            .build()
            .unwrap(),
    );
    world
        .insert_collider(ColliderBuilder::ball(0.5).build().unwrap(), body)
        .unwrap();
    body
}

#[test]
fn bodies_fall_under_gravity() {
    let mut world = PhysicsWorld3D::new();
    let body = ball_3d(&mut world, Vec3::new(0.0, 10.0, 0.0), Vec3::ZERO);

    world.step();

    let position_y = world.body(body).expect("body should exist").translation().y;
    assert!(position_y < 10.0, "body should start falling, y = {}", position_y);
}

#[test]
fn free_body_keeps_its_momentum() {
    let mut world = PhysicsWorld3D::with_params(Vec3::ZERO, IntegrationParameters::default());
    let body = ball_3d(&mut world, Vec3::ZERO, Vec3::new(1.0, 2.0, 3.0));
    world
        .body_mut(body)
        .unwrap()
        .set_angvel(Vec3::new(0.0, 1.5, 0.0), true);

    for _ in 0..60 {
        world.step();
    }

    let body = world.body(body).unwrap();
    assert_eq!(body.linvel(), Vec3::new(1.0, 2.0, 3.0));
    assert_relative_eq!(body.angvel().y, 1.5, epsilon = 1e-6);
    assert_relative_eq!(body.translation().x, 1.0, epsilon = 1e-3);
    assert_relative_eq!(body.translation().z, 3.0, epsilon = 1e-3);
}

#[test]
fn resting_ball_without_forces_stays_put() {
    let mut world = PhysicsWorld3D::with_params(Vec3::ZERO, IntegrationParameters::default());
    let start = Vec3::new(1.0, 2.0, 3.0);
    let body = ball_3d(&mut world, start, Vec3::ZERO);

    for _ in 0..500 {
        world.step();
    }

    let delta = world.body(body).unwrap().translation() - start;
    assert!(delta.abs().max_element() < 1e-6, "ball moved by {:?}", delta);
}

#[test]
fn head_on_collision_conserves_momentum() {
    let mut world = PhysicsWorld3D::with_params(Vec3::ZERO, IntegrationParameters::default());
    let left = ball_3d(&mut world, Vec3::new(-1.0, 0.0, 0.0), Vec3::new(1.0, 0.0, 0.0));
    let right = ball_3d(&mut world, Vec3::new(1.0, 0.0, 0.0), Vec3::new(-1.0, 0.0, 0.0));

    for _ in 0..120 {
        world.step();
    }

    let left = world.body(left).unwrap();
    let right = world.body(right).unwrap();
    let momentum = left.linvel() * left.mass() + right.linvel() * right.mass();
    assert!(momentum.length() < 1e-4, "momentum drifted to {:?}", momentum);
    assert!(left.linvel().x <= right.linvel().x + 1e-3, "balls still approaching");
    assert!(right.translation().x - left.translation().x > 0.95);
}

fn bounce_off_ground(impact_speed: f32) -> f32 {
    let mut world = PhysicsWorld2D::with_params(Vec2::ZERO, IntegrationParameters::default());
    let ground = world.insert_body(
        RigidBodyBuilder::fixed()
            .translation(Vec2::new(0.0, -0.5))
            .build()
            .unwrap(),
    );
    world
        .insert_collider(
            ColliderBuilder::cuboid(Vec2::new(10.0, 0.5))
                .restitution(1.0)
                .build()
                .unwrap(),
            ground,
        )
        .unwrap();
    let ball = world.insert_body(
        RigidBodyBuilder::dynamic()
            .translation(Vec2::new(0.0, 0.6))
            .linvel(Vec2::new(0.0, -impact_speed))
            .build()
            .unwrap(),
    );
    world
        .insert_collider(ColliderBuilder::ball(0.5).restitution(1.0).build().unwrap(), ball)
        .unwrap();

    for _ in 0..60 {
        world.step();
    }
    world.body(ball).unwrap().linvel().y
}

#[test]
fn restitution_needs_impact_above_threshold() {
    let threshold = IntegrationParameters::default().restitution_velocity_threshold;

    let fast = bounce_off_ground(threshold * 5.0);
    assert_relative_eq!(fast, threshold * 5.0, epsilon = 0.1);

    let slow = bounce_off_ground(threshold * 0.5);
    assert!(slow.abs() < 0.05, "slow ball bounced with vy = {}", slow);
}

#[test]
fn box_stack_settles_in_place() {
    let mut world = PhysicsWorld3D::new();
    ground_3d(&mut world);
    let boxes: Vec<RigidBodyHandle> = (0..3)
        .map(|i| {
            let body = world.insert_body(
                RigidBodyBuilder::dynamic()
                    .translation(Vec3::new(0.0, 0.5 + i as f32 * 1.05, 0.0))
                    .build()
                    .unwrap(),
            );
            world
                .insert_collider(ColliderBuilder::cuboid(Vec3::splat(0.5)).build().unwrap(), body)
                .unwrap();
            body
        })
        .collect();

    for _ in 0..300 {
        world.step();
    }

    for (i, handle) in boxes.iter().enumerate() {
        let body = world.body(*handle).unwrap();
        let expected = 0.5 + i as f32;
        assert!(
            (body.translation().y - expected).abs() < 0.2,
            "box {} at y = {}",
            i,
            body.translation().y
        );
        assert!(body.translation().x.abs() < 0.1);
    }
}

#[test]
fn resting_body_sleeps_and_wakes_on_impulse() {
    let mut world = PhysicsWorld3D::new();
    ground_3d(&mut world);
    let ball = ball_3d(&mut world, Vec3::new(0.0, 0.5, 0.0), Vec3::ZERO);

    for _ in 0..240 {
        world.step();
    }
    assert!(world.body(ball).unwrap().is_sleeping());
    assert_eq!(world.profiler().active_island_count, 0);

    world
        .body_mut(ball)
        .unwrap()
        .apply_impulse(Vec3::new(0.0, 5.0, 0.0), true);
    assert!(!world.body(ball).unwrap().is_sleeping());

    world.step();
    assert!(world.body(ball).unwrap().translation().y > 0.5);
}

#[test]
fn kinematic_body_follows_its_target() {
    let mut world = PhysicsWorld2D::new();
    let platform = world.insert_body(RigidBodyBuilder::kinematic().build().unwrap());
    world
        .insert_collider(ColliderBuilder::cuboid(Vec2::new(1.0, 0.1)).build().unwrap(), platform)
        .unwrap();

    let target = Transform::from_translation(Vec2::new(0.5, 0.0));
    world.body_mut(platform).unwrap().set_next_kinematic_position(target);
    world.step();

    let body = world.body(platform).unwrap();
    assert_relative_eq!(body.translation().x, 0.5, epsilon = 1e-5);
    assert_relative_eq!(body.linvel().x, 0.5 / world.params.dt, epsilon = 1e-2);

    for _ in 0..10 {
        world.step();
    }
    let body = world.body(platform).unwrap();
    assert_relative_eq!(body.translation().x, 0.5, epsilon = 1e-5);
    assert_eq!(body.linvel(), Vec2::ZERO);
}

#[test]
fn advance_runs_whole_steps() {
    let mut world = PhysicsWorld2D::new();
    let dt = world.params.dt;
    assert_eq!(world.advance(dt * 2.5), 2);
    assert_relative_eq!(world.interpolation_alpha(), 0.5, epsilon = 1e-3);
}

#[test]
fn removing_a_body_drops_its_colliders_and_joints() {
    let mut world = PhysicsWorld3D::new();
    let anchor = world.insert_body(RigidBodyBuilder::fixed().build().unwrap());
    let bob = ball_3d(&mut world, Vec3::new(0.0, -1.0, 0.0), Vec3::ZERO);
    let collider = world.body(bob).unwrap().colliders()[0];
    let joint = world
        .insert_joint(
            JointBuilder::ball()
                .local_anchor2(Vec3::new(0.0, 1.0, 0.0))
                .build(anchor, bob),
        )
        .unwrap();
    world.step();

    let removed = world.remove_body(bob).expect("body was live");
    assert_eq!(removed.colliders, vec![collider]);
    assert!(world.collider(collider).is_none());
    assert!(world.joint(joint).is_none());
    assert!(world.remove_body(bob).is_none());

    world.step();
    assert_eq!(world.profiler().body_count, 1);
}
