use rigid_physics::*;

fn main() -> Result<(), PhysicsError> {
    let mut world = PhysicsWorld2D::new();
    for (i, radius) in [0.5, 1.0, 0.25].into_iter().enumerate() {
        let body = world.insert_body(
            RigidBodyBuilder::fixed()
                .translation(Vec2::new(3.0 + i as f32 * 3.0, 0.0))
                .build()?,
        );
        world.insert_collider(ColliderBuilder::ball(radius).build()?, body)?;
    }
    world.update_query_pipeline();

    let ray = Ray::new(Vec2::new(0.0, 0.0), Vec2::X);
    match world.cast_ray(&ray, 20.0, true, &QueryFilter::new()) {
        Some((collider, hit)) => println!(
            "Nearest hit: collider {} at t = {:.2}, normal = {:?}",
            collider.index(),
            hit.toi,
            hit.normal
        ),
        None => println!("Ray hits nothing"),
    }

    let hits = world
        .query_pipeline
        .intersections_with_ray(&world.colliders, &ray, 20.0, true, &QueryFilter::new());
    println!("Ray hits: {}", hits.len());
    Ok(())
}
