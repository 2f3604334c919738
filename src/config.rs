//! Global configuration constants and per-step integration parameters.

use serde::{Deserialize, Serialize};

use crate::math::Real;

/// Default gravity magnitude applied along -Y.
pub const DEFAULT_GRAVITY: Real = -9.81;

/// Default integration timestep (in seconds).
pub const DEFAULT_TIME_STEP: Real = 1.0 / 60.0;

/// Number of sequential-impulse passes performed per step.
pub const DEFAULT_VELOCITY_ITERATIONS: usize = 4;

/// Number of nonlinear position-correction passes performed per step.
pub const DEFAULT_POSITION_ITERATIONS: usize = 1;

/// Default damping applied to linear velocity.
pub const DEFAULT_LINEAR_DAMPING: Real = 0.0;

/// Default damping applied to angular velocity.
pub const DEFAULT_ANGULAR_DAMPING: Real = 0.0;

/// Default cell size for the broad-phase uniform grid.
pub const DEFAULT_BROADPHASE_CELL_SIZE: Real = 5.0;

/// Extra margin added around a broad-phase proxy so small motions do not reinsert it.
pub const DEFAULT_PROXY_MARGIN: Real = 0.1;

/// Proxies touching more cells than this go to the oversized list.
pub const MAX_CELLS_PER_PROXY: usize = 512;

/// Linear speed under which a body is a sleep candidate.
pub const DEFAULT_LINEAR_SLEEP_THRESHOLD: Real = 0.4;

/// Angular speed under which a body is a sleep candidate.
pub const DEFAULT_ANGULAR_SLEEP_THRESHOLD: Real = 0.5;

/// Time a whole island must stay below its thresholds before falling asleep.
pub const DEFAULT_TIME_UNTIL_SLEEP: Real = 2.0;

/// Upper bound on simulated substeps performed by one `advance` call.
pub const MAX_SUBSTEPS_PER_ADVANCE: usize = 8;

/// Parameters driving a single call to `PhysicsPipeline::step`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct IntegrationParameters {
    /// Timestep length in seconds.
    pub dt: Real,
    /// Fraction of the contact penetration recovered per position pass.
    pub erp: Real,
    /// Fraction of the joint drift recovered per position pass.
    pub joint_erp: Real,
    /// Scale applied to last step's impulses before the first velocity pass.
    pub warmstart_coeff: Real,
    /// Approach speed under which restitution is ignored.
    pub restitution_velocity_threshold: Real,
    /// Penetration left uncorrected to keep contacts stable.
    pub allowed_linear_error: Real,
    /// Joint angular drift left uncorrected.
    pub allowed_angular_error: Real,
    /// Distance under which contacts are generated before actual touching.
    pub prediction_distance: Real,
    pub max_linear_correction: Real,
    pub max_angular_correction: Real,
    pub max_velocity_iterations: usize,
    pub max_position_iterations: usize,
    /// Islands smaller than this are batched together into one solver job.
    pub min_island_size: usize,
    pub max_ccd_substeps: usize,
    /// Resolve only the first impact of each CCD body and leave it at its impact pose
    /// with the post-impact velocity; the rest of its motion happens next step.
    pub return_after_ccd_substep: bool,
    /// Treat already-penetrating, still approaching pairs as impacts at TOI 0.
    pub ccd_on_penetration_enabled: bool,
    pub time_until_sleep: Real,
}

impl Default for IntegrationParameters {
    fn default() -> Self {
        Self {
            dt: DEFAULT_TIME_STEP,
            erp: 0.2,
            joint_erp: 0.2,
            warmstart_coeff: 1.0,
            restitution_velocity_threshold: 1.0,
            allowed_linear_error: 0.005,
            allowed_angular_error: 0.001,
            prediction_distance: 0.002,
            max_linear_correction: 0.2,
            max_angular_correction: 0.2,
            max_velocity_iterations: DEFAULT_VELOCITY_ITERATIONS,
            max_position_iterations: DEFAULT_POSITION_ITERATIONS,
            min_island_size: 128,
            max_ccd_substeps: 1,
            return_after_ccd_substep: false,
            ccd_on_penetration_enabled: false,
            time_until_sleep: DEFAULT_TIME_UNTIL_SLEEP,
        }
    }
}

impl IntegrationParameters {
    /// Inverse of `dt`, or zero when the timestep is zero.
    pub fn inv_dt(&self) -> Real {
        if self.dt > 0.0 {
            1.0 / self.dt
        } else {
            0.0
        }
    }

    /// Effective CCD substep budget for this step.
    pub fn ccd_substeps(&self) -> usize {
        if self.return_after_ccd_substep {
            1
        } else {
            self.max_ccd_substeps.max(1)
        }
    }
}
