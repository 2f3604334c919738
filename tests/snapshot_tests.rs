use rigid_physics::*;

fn pile() -> (PhysicsWorld3D, Vec<RigidBodyHandle>) {
    let mut world = PhysicsWorld3D::new();
    world.set_parallel_enabled(false);
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
        .unwrap();

    let mut handles = Vec::new();
    for i in 0..4 {
        let body = world.insert_body(
            RigidBodyBuilder::dynamic()
                .translation(Vec3::new(0.1 * i as f32, 0.6 + 1.1 * i as f32, 0.0))
                .angvel(Vec3::new(0.0, 0.3, 0.0))
                .build()
                .unwrap(),
        );
        let collider = if i % 2 == 0 {
            ColliderBuilder::cuboid(Vec3::splat(0.5))
        } else {
            ColliderBuilder::ball(0.5).friction(0.8)
        };
        world.insert_collider(collider.build().unwrap(), body).unwrap();
        handles.push(body);
    }
    let anchor = world.insert_body(
        RigidBodyBuilder::fixed()
            .translation(Vec3::new(3.0, 3.0, 0.0))
            .build()
            .unwrap(),
    );
    let bob = world.insert_body(
        RigidBodyBuilder::dynamic()
            .translation(Vec3::new(4.0, 3.0, 0.0))
            .build()
            .unwrap(),
    );
    world
        .insert_collider(ColliderBuilder::ball(0.2).build().unwrap(), bob)
        .unwrap();
    world
        .insert_joint(
            JointBuilder::ball()
                .local_anchor2(Vec3::new(-1.0, 0.0, 0.0))
                .build(anchor, bob),
        )
        .unwrap();
    handles.push(bob);
    (world, handles)
}

#[test]
fn restored_world_continues_identically() {
    let (mut world, handles) = pile();
    for _ in 0..30 {
        world.step();
    }

    let bytes = world.snapshot().unwrap();
    let mut restored = PhysicsWorld3D::from_snapshot(&bytes).unwrap();
    restored.set_parallel_enabled(false);

    for _ in 0..30 {
        world.step();
        restored.step();
    }

    for handle in &handles {
        let original = world.body(*handle).unwrap();
        let copy = restored.body(*handle).expect("handles survive a snapshot");
        assert_eq!(original.position(), copy.position());
        assert_eq!(original.velocity(), copy.velocity());
    }
}

#[test]
fn snapshot_of_restored_world_is_byte_identical() {
    let (mut world, _) = pile();
    for _ in 0..10 {
        world.step();
    }
    let bytes = world.snapshot().unwrap();
    let restored = PhysicsWorld3D::from_snapshot(&bytes).unwrap();
    assert_eq!(restored.snapshot().unwrap(), bytes);
}

#[test]
fn removed_handles_stay_dead_after_restore() {
    let (mut world, handles) = pile();
    world.remove_body(handles[0]);
    let bytes = world.snapshot().unwrap();

    let mut restored = PhysicsWorld3D::from_snapshot(&bytes).unwrap();
    assert!(restored.body(handles[0]).is_none());
    assert!(restored.body(handles[1]).is_some());

    let fresh = restored.insert_body(RigidBodyBuilder::dynamic().build().unwrap());
    assert_ne!(fresh, handles[0]);
    assert!(restored.body(handles[0]).is_none());
}

#[test]
fn wrong_dimension_is_rejected() {
    let (world, _) = pile();
    let bytes = world.snapshot().unwrap();

    let mut flat = PhysicsWorld2D::new();
    assert!(matches!(
        flat.restore(&bytes),
        Err(SnapshotError::DimensionMismatch { found: 3, expected: 2 })
    ));
    assert!(flat.bodies.is_empty());
}

#[test]
fn garbage_is_rejected() {
    assert!(matches!(
        PhysicsWorld3D::from_snapshot(b"not a snapshot"),
        Err(SnapshotError::BadMagic)
    ));
    assert!(matches!(
        PhysicsWorld3D::from_snapshot(b"RB"),
        Err(SnapshotError::Truncated { len: 2, .. })
    ));
}
