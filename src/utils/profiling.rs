use std::time::Duration;

/// Stage timings and counters collected during the last pipeline step.
#[derive(Debug, Default, Clone, Copy)]
pub struct PhysicsProfiler {
    pub broad_phase_time: Duration,
    pub narrow_phase_time: Duration,
    pub island_time: Duration,
    pub solver_time: Duration,
    pub integrator_time: Duration,
    pub ccd_time: Duration,
    pub total_step_time: Duration,

    pub body_count: usize,
    pub candidate_pair_count: usize,
    pub contact_pair_count: usize,
    pub active_island_count: usize,
    pub ccd_substeps: usize,
}

impl PhysicsProfiler {
    pub fn reset(&mut self) {
        *self = Self::default();
    }

    fn share(&self, stage: Duration) -> f32 {
        let total_us = self.total_step_time.as_micros() as f32;
        if total_us < 1.0 {
            0.0
        } else {
            stage.as_micros() as f32 / total_us * 100.0
        }
    }

    /// Logs the collected timings at debug level.
    pub fn report(&self) {
        if self.total_step_time.as_micros() < 1 {
            return;
        }

        log::debug!(
            "physics step: {:.2} ms | bodies {} | pairs {} | contacts {} | islands {} | ccd substeps {}",
            self.total_step_time.as_secs_f32() * 1000.0,
            self.body_count,
            self.candidate_pair_count,
            self.contact_pair_count,
            self.active_island_count,
            self.ccd_substeps
        );

        let stages = [
            ("broad phase", self.broad_phase_time),
            ("narrow phase", self.narrow_phase_time),
            ("islands", self.island_time),
            ("solver", self.solver_time),
            ("integrator", self.integrator_time),
            ("ccd", self.ccd_time),
        ];
        for (label, time) in stages {
            log::debug!(
                "  {:<12} {:.3} ms ({:.1}%)",
                label,
                time.as_secs_f32() * 1000.0,
                self.share(time)
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn share_is_zero_without_total() {
        let profiler = PhysicsProfiler::default();
        assert_eq!(profiler.share(Duration::from_millis(3)), 0.0);
    }

    #[test]
    fn reset_clears_counters() {
        let mut profiler = PhysicsProfiler {
            body_count: 4,
            solver_time: Duration::from_millis(2),
            ..Default::default()
        };
        profiler.reset();
        assert_eq!(profiler.body_count, 0);
        assert_eq!(profiler.solver_time, Duration::ZERO);
    }
}
