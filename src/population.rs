use glam::Vec3;
use rand::{rngs::SmallRng, Rng, SeedableRng};

use crate::math::{orientation_from_direction, safe_normalize};
use crate::provider::Transform;

/// Parallel position and velocity buffers; agent `i` owns slot `i` of each.
///
/// Positions are a per-tick cache of what the transform provider holds.
/// Velocities are the only state that survives between ticks.
#[derive(Debug, Default, Clone)]
pub struct AgentPopulation {
    positions: Vec<Vec3>,
    velocities: Vec<Vec3>,
}

impl AgentPopulation {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            positions: Vec::with_capacity(capacity),
            velocities: Vec::with_capacity(capacity),
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn push(&mut self, position: Vec3, velocity: Vec3) {
        self.positions.push(position);
        self.velocities.push(velocity);
    }

    pub fn truncate(&mut self, len: usize) {
        self.positions.truncate(len);
        self.velocities.truncate(len);
    }

    pub fn positions(&self) -> &[Vec3] {
        &self.positions
    }

    pub fn velocities(&self) -> &[Vec3] {
        &self.velocities
    }

    pub fn position(&self, index: usize) -> Option<Vec3> {
        self.positions.get(index).copied()
    }

    pub fn velocity(&self, index: usize) -> Option<Vec3> {
        self.velocities.get(index).copied()
    }

    pub fn is_consistent(&self) -> bool {
        self.positions.len() == self.velocities.len()
    }

    /// Split borrow for the tick phases.
    pub(crate) fn buffers_mut(&mut self) -> (&mut Vec<Vec3>, &mut Vec<Vec3>) {
        (&mut self.positions, &mut self.velocities)
    }

    /// Transforms matching the current state, oriented along each velocity.
    pub fn transforms(&self) -> Vec<Transform> {
        self.positions
            .iter()
            .zip(&self.velocities)
            .map(|(&position, &velocity)| {
                Transform::new(
                    position,
                    orientation_from_direction(velocity, glam::Quat::IDENTITY),
                )
            })
            .collect()
    }
}

/// Places new agents uniformly in a cube around the flock origin with a
/// uniformly random heading at `speed`.
#[derive(Debug, Clone)]
pub struct Spawner {
    rng: SmallRng,
    origin: Vec3,
    half_extent: f32,
    speed: f32,
}

impl Spawner {
    pub fn new(seed: u64, origin: Vec3, half_extent: f32, speed: f32) -> Self {
        Self {
            rng: SmallRng::seed_from_u64(seed),
            origin,
            half_extent: half_extent.max(0.0),
            speed,
        }
    }

    pub fn set_volume(&mut self, origin: Vec3, half_extent: f32, speed: f32) {
        self.origin = origin;
        self.half_extent = half_extent.max(0.0);
        self.speed = speed;
    }

    pub fn spawn(&mut self) -> (Vec3, Vec3) {
        let position = self.origin + self.unit_cube_point() * self.half_extent;
        (position, self.random_heading() * self.speed)
    }

    pub fn spawn_into(&mut self, population: &mut AgentPopulation, count: usize) {
        for _ in 0..count {
            let (position, velocity) = self.spawn();
            population.push(position, velocity);
        }
    }

    fn unit_cube_point(&mut self) -> Vec3 {
        Vec3::new(
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(-1.0..=1.0),
            self.rng.gen_range(-1.0..=1.0),
        )
    }

    // Uniform on the sphere: uniform z and azimuth.
    fn random_heading(&mut self) -> Vec3 {
        let z: f32 = self.rng.gen_range(-1.0..=1.0);
        let azimuth: f32 = self.rng.gen_range(0.0..std::f32::consts::TAU);
        let ring = (1.0 - z * z).max(0.0).sqrt();
        safe_normalize(
            Vec3::new(ring * azimuth.cos(), ring * azimuth.sin(), z),
            Vec3::X,
        )
    }
}
