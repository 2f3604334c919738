use rigid_physics::{ColliderBuilder, PhysicsWorld3D, RigidBodyBuilder, Vec3};
use std::sync::{Arc, Mutex};
use std::thread;

#[test]
fn test_physics_world_is_sync_and_send() {
    fn assert_sync_send<T: Sync + Send>() {}
    assert_sync_send::<PhysicsWorld3D>();
    assert_sync_send::<rigid_physics::PhysicsWorld2D>();
}

#[test]
fn test_shared_physics_world_across_threads() {
    let mut world = PhysicsWorld3D::new();
    let body = world.insert_body(
        RigidBodyBuilder::dynamic()
            .translation(Vec3::new(0.0, 10.0, 0.0))
            .build()
            .unwrap(),
    );
    world
        .insert_collider(ColliderBuilder::ball(0.5).build().unwrap(), body)
        .unwrap();
    let world = Arc::new(Mutex::new(world));

    let mut handles = vec![];
    for _ in 0..4 {
        let world_clone = Arc::clone(&world);
        let handle = thread::spawn(move || {
            let mut world = world_clone.lock().unwrap();
            world.step();
        });
        handles.push(handle);
    }

    for handle in handles {
        handle.join().unwrap();
    }

    let world = world.lock().unwrap();
    assert!(world.body(body).unwrap().translation().y < 10.0);
}

#[test]
fn test_parallel_and_sequential_steps_agree() {
    let build = |parallel: bool| {
        let mut world = PhysicsWorld3D::new();
        world.set_parallel_enabled(parallel);
        let ground = world.insert_body(
            RigidBodyBuilder::fixed()
                .translation(Vec3::new(0.0, -0.5, 0.0))
                .build()
                .unwrap(),
        );
        world
            .insert_collider(
                ColliderBuilder::cuboid(Vec3::new(20.0, 0.5, 20.0)).build().unwrap(),
                ground,
            )
            .unwrap();
        let bodies: Vec<_> = (0..16)
            .map(|i| {
                let body = world.insert_body(
                    RigidBodyBuilder::dynamic()
                        .translation(Vec3::new((i % 4) as f32 * 2.0, 0.5 + (i / 4) as f32 * 1.2, 0.0))
                        .build()
                        .unwrap(),
                );
                world
                    .insert_collider(ColliderBuilder::ball(0.5).build().unwrap(), body)
                    .unwrap();
                body
            })
            .collect();
        (world, bodies)
    };

    let (mut sequential, handles) = build(false);
    let (mut parallel, _) = build(true);
    for _ in 0..60 {
        sequential.step();
        parallel.step();
    }
    for handle in handles {
        assert_eq!(
            sequential.body(handle).unwrap().position(),
            parallel.body(handle).unwrap().position()
        );
    }
}
