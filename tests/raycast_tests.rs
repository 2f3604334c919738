use approx::assert_relative_eq;
use rigid_physics::core::mesh::Aabb;
use rigid_physics::*;

fn box_at(world: &mut PhysicsWorld3D, at: Vec3, half: f32, sensor: bool) -> ColliderHandle {
    let body = world.insert_body(RigidBodyBuilder::fixed().translation(at).build().unwrap());
    world
        .insert_collider(
            ColliderBuilder::cuboid(Vec3::splat(half))
                .sensor(sensor)
                .build()
                .unwrap(),
            body,
        )
        .unwrap()
}

fn corridor() -> (PhysicsWorld3D, ColliderHandle, ColliderHandle, ColliderHandle) {
    let mut world = PhysicsWorld3D::new();
    let trigger = box_at(&mut world, Vec3::new(2.0, 0.0, 0.0), 0.5, true);
    let near = box_at(&mut world, Vec3::new(5.0, 0.0, 0.0), 0.5, false);
    let far = box_at(&mut world, Vec3::new(10.0, 0.0, 0.0), 1.0, false);
    world.update_query_pipeline();
    (world, trigger, near, far)
}

#[test]
fn ray_hits_nearest_collider() {
    let (world, trigger, near, _) = corridor();
    let ray = Ray::new(Vec3::ZERO, Vec3::X);

    let (hit, intersection) = world
        .cast_ray(&ray, 100.0, true, &QueryFilter::new())
        .expect("ray should hit");
    assert_eq!(hit, trigger);
    assert_relative_eq!(intersection.toi, 1.5, epsilon = 1e-5);

    let (hit, intersection) = world
        .cast_ray(&ray, 100.0, true, &QueryFilter::new().exclude_sensors())
        .expect("ray should hit");
    assert_eq!(hit, near);
    assert_relative_eq!(intersection.toi, 4.5, epsilon = 1e-5);
    assert_relative_eq!(intersection.normal.x, -1.0, epsilon = 1e-5);
}

#[test]
fn filters_and_max_toi_limit_hits() {
    let (world, _, near, far) = corridor();
    let ray = Ray::new(Vec3::ZERO, Vec3::X);

    let filter = QueryFilter::new().exclude_sensors().exclude_collider(near);
    let (hit, intersection) = world.cast_ray(&ray, 100.0, true, &filter).unwrap();
    assert_eq!(hit, far);
    assert_relative_eq!(intersection.toi, 9.0, epsilon = 1e-5);

    assert!(world.cast_ray(&ray, 1.0, true, &QueryFilter::new()).is_none());

    let only_layer_two = QueryFilter::new().groups(CollisionGroups::new(u32::MAX, 0b10));
    assert!(world.cast_ray(&ray, 100.0, true, &only_layer_two).is_none());
}

#[test]
fn all_hits_come_sorted() {
    let (world, trigger, near, far) = corridor();
    let hits = world.query_pipeline.intersections_with_ray(
        &world.colliders,
        &Ray::new(Vec3::ZERO, Vec3::X),
        100.0,
        true,
        &QueryFilter::new(),
    );
    let handles: Vec<ColliderHandle> = hits.iter().map(|(handle, _)| *handle).collect();
    assert_eq!(handles, vec![trigger, near, far]);
}

#[test]
fn ray_starting_inside_depends_on_solidity() {
    let (world, _, near, _) = corridor();
    let ray = Ray::new(Vec3::new(5.0, 0.0, 0.0), Vec3::X);
    let filter = QueryFilter::new().exclude_sensors();

    let (hit, intersection) = world.cast_ray(&ray, 100.0, true, &filter).unwrap();
    assert_eq!(hit, near);
    assert_eq!(intersection.toi, 0.0);
    assert_eq!(intersection.normal, Vec3::ZERO);

    let (hit, _) = world.cast_ray(&ray, 100.0, false, &filter).unwrap();
    assert_ne!(hit, near);
}

#[test]
fn point_and_region_queries() {
    let (world, trigger, near, far) = corridor();

    let inside = world.query_pipeline.intersections_with_point(
        &world.colliders,
        Vec3::new(10.5, 0.5, 0.0),
        &QueryFilter::new(),
    );
    assert_eq!(inside, vec![far]);

    let region = Aabb::new(Vec3::new(1.0, -1.0, -1.0), Vec3::new(6.0, 1.0, 1.0));
    let mut expected = vec![trigger, near];
    expected.sort();
    assert_eq!(world.query_pipeline.colliders_in_aabb(&region), expected);
}

#[test]
fn refreshing_an_unchanged_world_is_idempotent() {
    let (mut world, _, _, _) = corridor();
    let before = world.query_pipeline.clone();
    world.update_query_pipeline();
    assert_eq!(before, world.query_pipeline);
}

#[test]
fn ray_hits_ball_in_2d() {
    let mut world = PhysicsWorld2D::new();
    let body = world.insert_body(RigidBodyBuilder::fixed().build().unwrap());
    let ball = world
        .insert_collider(ColliderBuilder::ball(1.0).build().unwrap(), body)
        .unwrap();
    world.update_query_pipeline();

    let ray = Ray::new(Vec2::new(0.0, 10.0), Vec2::new(0.0, -1.0));
    let (hit, intersection) = world.cast_ray(&ray, 20.0, true, &QueryFilter::new()).unwrap();
    assert_eq!(hit, ball);
    assert_relative_eq!(intersection.toi, 9.0, epsilon = 1e-5);
    assert_relative_eq!(intersection.normal.x, 0.0, epsilon = 1e-5);
    assert_relative_eq!(intersection.normal.y, 1.0, epsilon = 1e-5);

    assert!(world.cast_ray(&ray, 8.5, true, &QueryFilter::new()).is_none());
    assert!(world
        .cast_ray(&Ray::new(Vec2::new(2.0, 10.0), Vec2::new(0.0, -1.0)), 20.0, true, &QueryFilter::new())
        .is_none());
}

#[test]
fn query_follows_moving_bodies_after_step() {
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

    for _ in 0..30 {
        world.step();
    }

    let y = world.body(body).unwrap().translation().y;
    let (_, intersection) = world
        .cast_ray(&Ray::new(Vec3::new(0.0, 20.0, 0.0), -Vec3::Y), 100.0, true, &QueryFilter::new())
        .unwrap();
    assert_relative_eq!(intersection.toi, 20.0 - y - 0.5, epsilon = 1e-4);
}
