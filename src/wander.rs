use glam::Vec3;

use crate::config::WanderConfig;
use crate::math::{hash_unit, safe_normalize};

/// Per-agent destinations for [`Motion::Wander`](crate::config::Motion::Wander),
/// kept the same length as the population.
#[derive(Debug, Default, Clone)]
pub struct WanderTargets {
    targets: Vec<Vec3>,
}

impl WanderTargets {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.targets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    pub fn as_slice(&self) -> &[Vec3] {
        &self.targets
    }

    /// Exchanges the targets with a scratch buffer of the same length.
    pub(crate) fn swap_buffer(&mut self, other: &mut Vec<Vec3>) {
        debug_assert_eq!(self.targets.len(), other.len());
        std::mem::swap(&mut self.targets, other);
    }

    /// Grows with fresh random targets or truncates to `len`.
    pub fn resize(&mut self, len: usize, origin: Vec3, extent: f32, step: u32) {
        let start = self.targets.len();
        self.targets.truncate(len);
        self.targets
            .extend((start..len).map(|i| random_target(origin, extent, step, i as u32)));
    }
}

pub fn random_target(origin: Vec3, extent: f32, step: u32, index: u32) -> Vec3 {
    origin
        + Vec3::new(
            hash_unit(step, index, 0),
            hash_unit(step, index, 1),
            hash_unit(step, index, 2),
        ) * extent
}

/// Velocity that carries an agent at `position` towards its target. Picks a
/// new target first when the agent has arrived.
pub fn wander_velocity(
    position: Vec3,
    target: &mut Vec3,
    config: &WanderConfig,
    origin: Vec3,
    step: u32,
    index: u32,
) -> Vec3 {
    if position.distance_squared(*target) <= config.arrive_radius * config.arrive_radius {
        *target = random_target(origin, config.extent, step, index);
    }
    safe_normalize(*target - position, Vec3::X) * config.speed
}
