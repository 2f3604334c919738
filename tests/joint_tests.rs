use approx::assert_relative_eq;
use rigid_physics::*;

fn fixed_base_3d(world: &mut PhysicsWorld3D) -> RigidBodyHandle {
    world.insert_body(RigidBodyBuilder::fixed().build().unwrap())
}

fn dynamic_3d(world: &mut PhysicsWorld3D, at: Vec3, collider: ColliderBuilder<Dim3>) -> RigidBodyHandle {
    let body = world.insert_body(RigidBodyBuilder::dynamic().translation(at).build().unwrap());
    world.insert_collider(collider.build().unwrap(), body).unwrap();
    body
}

#[test]
fn pendulum_keeps_its_length() {
    let mut world = PhysicsWorld3D::new();
    let base = fixed_base_3d(&mut world);
    let bob = dynamic_3d(&mut world, Vec3::new(1.0, 0.0, 0.0), ColliderBuilder::ball(0.1));
    world
        .insert_joint(
            JointBuilder::ball()
                .local_anchor2(Vec3::new(-1.0, 0.0, 0.0))
                .build(base, bob),
        )
        .unwrap();

    let mut lowest = 0.0f32;
    for _ in 0..120 {
        world.step();
        let position = world.body(bob).unwrap().translation();
        lowest = lowest.min(position.y);
        assert!(
            (position.length() - 1.0).abs() < 0.05,
            "pendulum length drifted to {}",
            position.length()
        );
    }
    assert!(lowest < -0.9, "pendulum never swung down, lowest y = {}", lowest);
}

#[test]
fn ball_joint_anchors_at_body_origins_coincide() {
    let mut world = PhysicsWorld3D::new();
    let base = world.insert_body(
        RigidBodyBuilder::fixed()
            .translation(Vec3::new(0.0, 2.0, 0.0))
            .build()
            .unwrap(),
    );
    let body = world.insert_body(
        RigidBodyBuilder::dynamic()
            .translation(Vec3::new(0.0, 2.0, 0.0))
            .angular_damping(2.0)
            .build()
            .unwrap(),
    );
    // Offset collider: the body's center of mass hangs away from the joint.
    world
        .insert_collider(
            ColliderBuilder::ball(0.2)
                .translation(Vec3::new(0.5, 0.0, 0.0))
                .build()
                .unwrap(),
            body,
        )
        .unwrap();
    world
        .insert_joint(JointBuilder::ball().build(base, body))
        .unwrap();

    for _ in 0..600 {
        world.step();
    }

    let anchor1 = world.body(base).unwrap().translation();
    let anchor2 = world.body(body).unwrap().translation();
    let gap = (anchor1 - anchor2).length();
    assert!(
        gap < world.params.allowed_linear_error * 2.0,
        "anchors drifted apart by {}",
        gap
    );
    assert!(world.body(body).unwrap().center_of_mass().y < 2.0 - 0.4);
}

#[test]
fn fixed_joint_holds_body_in_place() {
    let mut world = PhysicsWorld3D::new();
    let base = fixed_base_3d(&mut world);
    let held = dynamic_3d(
        &mut world,
        Vec3::new(1.0, 0.0, 0.0),
        ColliderBuilder::cuboid(Vec3::splat(0.25)),
    );
    world
        .insert_joint(
            JointBuilder::fixed()
                .local_anchor1(Vec3::new(1.0, 0.0, 0.0))
                .build(base, held),
        )
        .unwrap();

    for _ in 0..120 {
        world.step();
    }

    let body = world.body(held).unwrap();
    assert!((body.translation() - Vec3::new(1.0, 0.0, 0.0)).length() < 0.05);
    assert!(body.rotation().angle_between(Quat::IDENTITY) < 0.05);
}

#[test]
fn prismatic_limit_stops_the_slider() {
    let mut world = PhysicsWorld3D::new();
    let base = fixed_base_3d(&mut world);
    let slider = dynamic_3d(&mut world, Vec3::ZERO, ColliderBuilder::cuboid(Vec3::splat(0.2)));
    world
        .insert_joint(
            JointBuilder::prismatic(Vec3::Y)
                .limits(-1.0, 0.0)
                .build(base, slider),
        )
        .unwrap();

    for _ in 0..120 {
        world.step();
    }

    let position = world.body(slider).unwrap().translation();
    assert!((position.y + 1.0).abs() < 0.1, "slider at y = {}", position.y);
    assert!(position.x.abs() < 0.05 && position.z.abs() < 0.05);
}

#[test]
fn revolute_motor_drives_wheel_2d() {
    let mut world = PhysicsWorld2D::with_params(Vec2::ZERO, IntegrationParameters::default());
    let base = world.insert_body(RigidBodyBuilder::fixed().build().unwrap());
    let wheel = world.insert_body(RigidBodyBuilder::dynamic().build().unwrap());
    world
        .insert_collider(ColliderBuilder::ball(0.5).build().unwrap(), wheel)
        .unwrap();
    let joint = world
        .insert_joint(JointBuilder::revolute(Vec2::X).motor(3.0, 100.0).build(base, wheel))
        .unwrap();

    for _ in 0..60 {
        world.step();
    }

    let body = world.body(wheel).unwrap();
    assert_relative_eq!(body.angvel(), 3.0, epsilon = 0.05);
    assert!(body.translation().length() < 1e-3);
    assert!(world.joint(joint).unwrap().impulses().iter().any(|i| *i != 0.0));
}

#[test]
fn revolute_limit_stops_falling_bar_2d() {
    let mut world = PhysicsWorld2D::new();
    let base = world.insert_body(RigidBodyBuilder::fixed().build().unwrap());
    let bar = world.insert_body(
        RigidBodyBuilder::dynamic()
            .translation(Vec2::new(1.0, 0.0))
            .build()
            .unwrap(),
    );
    world
        .insert_collider(ColliderBuilder::cuboid(Vec2::new(1.0, 0.1)).build().unwrap(), bar)
        .unwrap();
    world
        .insert_joint(
            JointBuilder::revolute(Vec2::X)
                .local_anchor2(Vec2::new(-1.0, 0.0))
                .limits(-0.5, 0.5)
                .build(base, bar),
        )
        .unwrap();

    for _ in 0..120 {
        world.step();
    }

    // The limit at half a radian keeps the bar's center near (cos 0.5, -sin 0.5).
    let position = world.body(bar).unwrap().translation();
    assert!((position.length() - 1.0).abs() < 0.05);
    assert!(position.y < -0.3 && position.y > -0.6, "bar center at {:?}", position);
}

#[test]
fn degenerate_joints_are_rejected() {
    let mut world = PhysicsWorld3D::new();
    let body = fixed_base_3d(&mut world);
    let other = dynamic_3d(&mut world, Vec3::ZERO, ColliderBuilder::ball(0.5));

    assert!(matches!(
        world.insert_joint(JointBuilder::ball().build(body, body)),
        Err(PhysicsError::DegenerateInput(_))
    ));
    assert!(matches!(
        world.insert_joint(JointBuilder::revolute(Vec3::Z).limits(1.0, -1.0).build(body, other)),
        Err(PhysicsError::DegenerateInput(_))
    ));
    assert!(matches!(
        world.insert_joint(JointBuilder::ball().build(body, RigidBodyHandle::invalid())),
        Err(PhysicsError::InvalidHandle)
    ));
}

#[test]
fn removing_a_joint_wakes_both_bodies() {
    let mut world = PhysicsWorld3D::new();
    let base = fixed_base_3d(&mut world);
    let bob = dynamic_3d(&mut world, Vec3::new(0.0, -1.0, 0.0), ColliderBuilder::ball(0.1));
    let joint = world
        .insert_joint(
            JointBuilder::ball()
                .local_anchor2(Vec3::new(0.0, 1.0, 0.0))
                .build(base, bob),
        )
        .unwrap();
    world.body_mut(bob).unwrap().sleep();

    assert!(world.remove_joint(joint).is_some());
    assert!(!world.body(bob).unwrap().is_sleeping());
    assert!(world.remove_joint(joint).is_none());

    for _ in 0..30 {
        world.step();
    }
    assert!(world.body(bob).unwrap().translation().y < -1.5, "bob should fall freely");
}
