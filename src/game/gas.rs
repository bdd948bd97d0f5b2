//! Shrinking hazard zone
//!
//! The gas advances through numbered stages: each stage waits, then shrinks
//! the safe circle toward a new target. The stage number doubles as the
//! match admission gate; joining closes once the gas is past the early
//! game.

use rand::Rng;
use rand_chacha::ChaCha8Rng;

/// One shrink phase of the gas
#[derive(Debug, Clone)]
pub struct GasPhase {
    /// Target safe radius for this phase
    pub target_radius: f32,
    /// Seconds spent shrinking to the target
    pub shrink_duration: f32,
    /// Damage per second outside the safe circle
    pub damage_per_second: f32,
    /// Seconds of calm before the next phase
    pub delay_after: f32,
}

/// Gas configuration
#[derive(Debug, Clone)]
pub struct GasConfig {
    pub initial_radius: f32,
    /// Seconds before the first shrink
    pub initial_delay: f32,
    pub phases: Vec<GasPhase>,
}

impl Default for GasConfig {
    fn default() -> Self {
        Self {
            initial_radius: 512.0,
            initial_delay: 60.0,
            phases: vec![
                GasPhase {
                    target_radius: 320.0,
                    shrink_duration: 30.0,
                    damage_per_second: 1.0,
                    delay_after: 45.0,
                },
                GasPhase {
                    target_radius: 180.0,
                    shrink_duration: 25.0,
                    damage_per_second: 2.5,
                    delay_after: 30.0,
                },
                GasPhase {
                    target_radius: 80.0,
                    shrink_duration: 20.0,
                    damage_per_second: 5.0,
                    delay_after: 20.0,
                },
                GasPhase {
                    target_radius: 16.0,
                    shrink_duration: 15.0,
                    damage_per_second: 10.0,
                    delay_after: 0.0,
                },
            ],
        }
    }
}

pub struct Gas {
    config: GasConfig,
    /// Monotonic stage counter; increments on every wait/shrink transition
    pub stage: u32,

    pub center_x: f32,
    pub center_y: f32,
    pub radius: f32,

    target_center_x: f32,
    target_center_y: f32,
    target_radius: f32,

    phase_idx: usize,
    timer: f32,
    shrinking: bool,
}

impl Gas {
    pub fn new(config: GasConfig, map_center_x: f32, map_center_y: f32) -> Self {
        let radius = config.initial_radius;
        let timer = config.initial_delay;
        Self {
            config,
            stage: 0,
            center_x: map_center_x,
            center_y: map_center_y,
            radius,
            target_center_x: map_center_x,
            target_center_y: map_center_y,
            target_radius: radius,
            phase_idx: 0,
            timer,
            shrinking: false,
        }
    }

    pub fn is_inside(&self, x: f32, y: f32) -> bool {
        let dx = x - self.center_x;
        let dy = y - self.center_y;
        dx * dx + dy * dy <= self.radius * self.radius
    }

    pub fn damage_per_second(&self) -> f32 {
        let idx = self.phase_idx.min(self.config.phases.len().saturating_sub(1));
        self.config
            .phases
            .get(idx)
            .map(|p| p.damage_per_second)
            .unwrap_or(0.0)
    }

    /// Advance the gas state machine by one tick
    pub fn update(&mut self, dt: f32, rng: &mut ChaCha8Rng) {
        if self.phase_idx >= self.config.phases.len() && !self.shrinking {
            return;
        }

        self.timer -= dt;

        if self.timer <= 0.0 {
            if self.shrinking {
                // Finished shrinking, settle and start the post-phase delay
                self.radius = self.target_radius;
                self.center_x = self.target_center_x;
                self.center_y = self.target_center_y;
                self.shrinking = false;
                self.timer = self.config.phases[self.phase_idx].delay_after;
                self.phase_idx += 1;
                self.stage += 1;
            } else if self.phase_idx < self.config.phases.len() {
                // Start a new shrink toward a randomized center inside the
                // current circle
                let phase = &self.config.phases[self.phase_idx];
                let angle = rng.gen_range(0.0..std::f32::consts::TAU);
                let max_offset = (self.radius - phase.target_radius).max(0.0) * 0.5;
                let offset = if max_offset > 0.0 {
                    rng.gen_range(0.0..max_offset)
                } else {
                    0.0
                };

                self.target_center_x = self.center_x + angle.cos() * offset;
                self.target_center_y = self.center_y + angle.sin() * offset;
                self.target_radius = phase.target_radius;
                self.timer = phase.shrink_duration;
                self.shrinking = true;
                self.stage += 1;
            }
        }

        if self.shrinking {
            let phase = &self.config.phases[self.phase_idx];
            let progress = 1.0 - (self.timer / phase.shrink_duration).clamp(0.0, 1.0);
            let start_radius = if self.phase_idx == 0 {
                self.config.initial_radius
            } else {
                self.config.phases[self.phase_idx - 1].target_radius
            };
            self.radius = start_radius + (phase.target_radius - start_radius) * progress;
            self.center_x += (self.target_center_x - self.center_x) * progress * dt;
            self.center_y += (self.target_center_y - self.center_y) * progress * dt;
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    fn fast_config() -> GasConfig {
        GasConfig {
            initial_radius: 100.0,
            initial_delay: 1.0,
            phases: vec![
                GasPhase {
                    target_radius: 50.0,
                    shrink_duration: 1.0,
                    damage_per_second: 1.0,
                    delay_after: 1.0,
                },
                GasPhase {
                    target_radius: 10.0,
                    shrink_duration: 1.0,
                    damage_per_second: 2.0,
                    delay_after: 0.0,
                },
            ],
        }
    }

    fn run_secs(gas: &mut Gas, rng: &mut ChaCha8Rng, secs: f32) {
        let dt = 1.0 / 30.0;
        let ticks = (secs / dt) as u32;
        for _ in 0..ticks {
            gas.update(dt, rng);
        }
    }

    #[test]
    fn stage_advances_on_each_transition() {
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let mut gas = Gas::new(fast_config(), 0.0, 0.0);
        assert_eq!(gas.stage, 0);

        // initial delay elapses, first shrink begins
        run_secs(&mut gas, &mut rng, 1.1);
        assert_eq!(gas.stage, 1);

        // shrink completes
        run_secs(&mut gas, &mut rng, 1.1);
        assert_eq!(gas.stage, 2);
        assert!((gas.radius - 50.0).abs() < 1.0);
    }

    #[test]
    fn radius_shrinks_monotonically_during_phase() {
        let mut rng = ChaCha8Rng::seed_from_u64(2);
        let mut gas = Gas::new(fast_config(), 0.0, 0.0);
        run_secs(&mut gas, &mut rng, 1.1);

        let mut last = gas.radius;
        for _ in 0..10 {
            gas.update(1.0 / 30.0, &mut rng);
            assert!(gas.radius <= last);
            last = gas.radius;
        }
    }

    #[test]
    fn inside_check_uses_current_circle() {
        let gas = Gas::new(fast_config(), 0.0, 0.0);
        assert!(gas.is_inside(50.0, 0.0));
        assert!(!gas.is_inside(150.0, 0.0));
    }
}
