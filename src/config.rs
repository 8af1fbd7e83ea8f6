use glam::Vec3;

use crate::error::ConfigError;

pub const MIN_ALIGNMENT_STRENGTH: f32 = 0.0;
pub const MAX_ALIGNMENT_STRENGTH: f32 = 500.0;
pub const MIN_SEPARATION_STRENGTH: f32 = 0.0;
pub const MAX_SEPARATION_STRENGTH: f32 = 60.0;
pub const MIN_COHESION_STRENGTH: f32 = 0.0;
pub const MAX_COHESION_STRENGTH: f32 = 15.0;
pub const MIN_PROXIMITY_RADIUS: f32 = 30.0;
pub const MAX_PROXIMITY_RADIUS: f32 = 1_200.0;

/// How the three flocking rules turn into a change of velocity. One model
/// applies to every rule within a tick.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Default)]
pub enum SteeringModel {
    /// Each rule returns a force; the sum is integrated as acceleration.
    #[default]
    Additive,
    /// Each rule rotates the heading part of the way towards its target,
    /// bounding the turn per tick.
    Spherical,
    /// Spherical blends, except alignment turns towards the average heading
    /// of neighbors rather than towards their average position.
    HeadingMatch,
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct WanderConfig {
    pub speed: f32,
    pub arrive_radius: f32,
    pub extent: f32,
}

impl Default for WanderConfig {
    fn default() -> Self {
        Self {
            speed: 400.0,
            arrive_radius: 20.0,
            extent: 1_000.0,
        }
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Default)]
pub enum Motion {
    #[default]
    Flock,
    /// Agents ignore each other and chase random targets around the origin.
    Wander(WanderConfig),
}

#[derive(Clone, Debug, PartialEq)]
pub struct SimulationConfig {
    pub alignment_strength: f32,
    pub separation_strength: f32,
    pub cohesion_strength: f32,
    pub proximity_radius: f32,
    pub min_speed: f32,
    pub max_speed: f32,
    pub spread_radius: f32,
    pub initial_population: usize,
    pub spawn_radius: f32,
    pub origin: Vec3,
    pub steering: SteeringModel,
    pub motion: Motion,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            alignment_strength: 302.0,
            separation_strength: 25.0,
            cohesion_strength: 1.3,
            proximity_radius: 70.0,
            min_speed: 90.0,
            max_speed: 650.0,
            spread_radius: 400.0,
            initial_population: 50,
            spawn_radius: 300.0,
            origin: Vec3::ZERO,
            steering: SteeringModel::Additive,
            motion: Motion::Flock,
        }
    }
}

impl SimulationConfig {
    /// Preset for the blending models, where alignment and cohesion
    /// strengths are blend fractions rather than force gains.
    pub fn smooth() -> Self {
        Self {
            alignment_strength: 0.35,
            cohesion_strength: 0.2,
            steering: SteeringModel::Spherical,
            ..Self::default()
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        check_range(
            "alignment strength",
            self.alignment_strength,
            MIN_ALIGNMENT_STRENGTH,
            MAX_ALIGNMENT_STRENGTH,
        )?;
        check_range(
            "separation strength",
            self.separation_strength,
            MIN_SEPARATION_STRENGTH,
            MAX_SEPARATION_STRENGTH,
        )?;
        check_range(
            "cohesion strength",
            self.cohesion_strength,
            MIN_COHESION_STRENGTH,
            MAX_COHESION_STRENGTH,
        )?;
        check_range(
            "proximity radius",
            self.proximity_radius,
            MIN_PROXIMITY_RADIUS,
            MAX_PROXIMITY_RADIUS,
        )?;

        check_positive("min speed", self.min_speed)?;
        check_positive("max speed", self.max_speed)?;
        if self.min_speed > self.max_speed {
            return Err(ConfigError::SpeedBounds {
                min: self.min_speed,
                max: self.max_speed,
            });
        }

        check_finite("spread radius", self.spread_radius)?;
        if self.spread_radius <= self.proximity_radius {
            return Err(ConfigError::SpreadInsideProximity {
                spread: self.spread_radius,
                proximity: self.proximity_radius,
            });
        }

        check_finite("spawn radius", self.spawn_radius)?;
        if self.spawn_radius < 0.0 {
            return Err(ConfigError::OutOfRange {
                field: "spawn radius",
                value: self.spawn_radius,
                min: 0.0,
                max: f32::MAX,
            });
        }
        check_finite("origin.x", self.origin.x)?;
        check_finite("origin.y", self.origin.y)?;
        check_finite("origin.z", self.origin.z)?;

        if let Motion::Wander(wander) = self.motion {
            check_positive("wander speed", wander.speed)?;
            check_positive("wander arrive radius", wander.arrive_radius)?;
            check_positive("wander extent", wander.extent)?;
        }

        Ok(())
    }
}

fn check_finite(field: &'static str, value: f32) -> Result<(), ConfigError> {
    if value.is_finite() {
        Ok(())
    } else {
        Err(ConfigError::NotFinite { field, value })
    }
}

fn check_positive(field: &'static str, value: f32) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if value > 0.0 {
        Ok(())
    } else {
        Err(ConfigError::NotPositive { field, value })
    }
}

fn check_range(field: &'static str, value: f32, min: f32, max: f32) -> Result<(), ConfigError> {
    check_finite(field, value)?;
    if (min..=max).contains(&value) {
        Ok(())
    } else {
        Err(ConfigError::OutOfRange {
            field,
            value,
            min,
            max,
        })
    }
}
