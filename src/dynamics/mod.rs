//! Simulation dynamics modules: integration, forces, islands and the constraint solver.

pub mod forces;
pub mod integrator;
pub mod island;
pub mod parallel;
pub mod solver;

pub use forces::{DragForce, ForceGenerator, ForceRegistry, SpringForce};
pub use integrator::Integrator;
pub use island::{Island, IslandManager};
pub use solver::solve_islands;
