use rigid_physics::*;

fn main() -> Result<(), PhysicsError> {
    let mut world = PhysicsWorld3D::new();

    let ground = world.insert_body(
        RigidBodyBuilder::fixed()
            .translation(Vec3::new(0.0, -0.5, 0.0))
            .build()?,
    );
    world.insert_collider(ColliderBuilder::cuboid(Vec3::new(20.0, 0.5, 20.0)).build()?, ground)?;

    let mut stack = Vec::new();
    for i in 0..5 {
        let body = world.insert_body(
            RigidBodyBuilder::dynamic()
                .translation(Vec3::new(0.0, i as f32 * 1.05 + 0.5, 0.0))
                .build()?,
        );
        world.insert_collider(ColliderBuilder::cuboid(Vec3::splat(0.5)).build()?, body)?;
        stack.push(body);
    }

    let mut contacts_started = 0;
    for _ in 0..240 {
        world.step();
        contacts_started += world
            .events
            .drain_contact_events()
            .filter(|event| matches!(event, ContactEvent::Started(..)))
            .count();
    }

    println!("Simulated stack of {} boxes for 4 seconds", stack.len());
    for (i, handle) in stack.iter().enumerate() {
        if let Some(body) = world.body(*handle) {
            println!(
                "  box {i}: y = {:.3}, sleeping = {}",
                body.translation().y,
                body.is_sleeping()
            );
        }
    }
    println!("{contacts_started} contacts started");
    let profiler = world.profiler();
    println!(
        "last step: {:?}, {} contact pairs, {} awake islands",
        profiler.total_step_time, profiler.contact_pair_count, profiler.active_island_count
    );
    Ok(())
}
