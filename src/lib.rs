use wasm_bindgen::prelude::*;

pub mod config;
pub mod error;
pub mod math;
pub mod neighbors;
pub mod population;
pub mod provider;
pub mod simulation;
pub mod steering;
pub mod wander;

pub use config::{Motion, SimulationConfig, SteeringModel, WanderConfig};
pub use error::{ConfigError, SimError};
pub use neighbors::{NeighborLists, NeighborQuery, NeighborSource, ViewCone};
pub use population::{AgentPopulation, Spawner};
pub use provider::{InstanceBuffer, Transform, TransformProvider};
pub use simulation::{Simulation, TickStats};
pub use steering::Steering;

pub(crate) const EPSILON: f32 = 1.0e-6;

/// Browser-facing handle. Agents live in an [`InstanceBuffer`] whose flat
/// render buffer JS can view directly through `transforms_ptr`.
#[wasm_bindgen]
pub struct Sim {
    inner: Simulation<InstanceBuffer>,
}

#[wasm_bindgen]
impl Sim {
    #[wasm_bindgen(constructor)]
    pub fn new(count: usize, seed: u32, spread_radius: f32) -> Result<Sim, JsError> {
        let config = SimulationConfig {
            initial_population: count,
            spread_radius,
            ..SimulationConfig::default()
        };
        let seed = if seed == 0 {
            getrandom::u64().map_err(|err| JsError::new(&err.to_string()))?
        } else {
            u64::from(seed)
        };

        let inner = Simulation::new(config, InstanceBuffer::new(), seed).map_err(js_error)?;
        Ok(Sim { inner })
    }

    pub fn step(&mut self, dt: f32) -> Result<(), JsError> {
        self.inner.tick(dt).map(|_| ()).map_err(js_error)
    }

    pub fn add_instances(&mut self, count: usize) -> Result<(), JsError> {
        self.inner.add_instances(count).map(|_| ()).map_err(js_error)
    }

    pub fn remove_instances(&mut self, count: usize) -> Result<(), JsError> {
        self.inner.remove_instances(count).map_err(js_error)
    }

    pub fn count(&self) -> usize {
        self.inner.len()
    }

    pub fn set_strengths(
        &mut self,
        alignment: f32,
        separation: f32,
        cohesion: f32,
    ) -> Result<(), JsError> {
        self.update_config(|config| {
            config.alignment_strength = alignment;
            config.separation_strength = separation;
            config.cohesion_strength = cohesion;
        })
    }

    pub fn set_speed_bounds(&mut self, min_speed: f32, max_speed: f32) -> Result<(), JsError> {
        self.update_config(|config| {
            config.min_speed = min_speed;
            config.max_speed = max_speed;
        })
    }

    pub fn set_proximity_radius(&mut self, radius: f32) -> Result<(), JsError> {
        self.update_config(|config| config.proximity_radius = radius)
    }

    pub fn set_spread_radius(&mut self, radius: f32) -> Result<(), JsError> {
        self.update_config(|config| config.spread_radius = radius)
    }

    /// Switches between additive forces and bounded heading blends. Strengths
    /// are reset to the preset for the chosen model.
    pub fn set_smooth_steering(&mut self, smooth: bool) -> Result<(), JsError> {
        self.update_config(|config| {
            let preset = if smooth {
                SimulationConfig::smooth()
            } else {
                SimulationConfig::default()
            };
            config.alignment_strength = preset.alignment_strength;
            config.separation_strength = preset.separation_strength;
            config.cohesion_strength = preset.cohesion_strength;
            config.steering = preset.steering;
        })
    }

    pub fn set_wander(&mut self, enabled: bool) -> Result<(), JsError> {
        self.update_config(|config| {
            config.motion = if enabled {
                Motion::Wander(WanderConfig::default())
            } else {
                Motion::Flock
            };
        })
    }

    pub fn transforms_ptr(&self) -> *const f32 {
        self.inner.provider().render_buffer().as_ptr()
    }

    pub fn transforms_len(&self) -> usize {
        self.inner.provider().render_buffer().len()
    }
}

impl Sim {
    fn update_config<F>(&mut self, edit: F) -> Result<(), JsError>
    where
        F: FnOnce(&mut SimulationConfig),
    {
        let mut config = self.inner.config().clone();
        edit(&mut config);
        self.inner.set_config(config).map_err(js_error)
    }
}

fn js_error(err: SimError) -> JsError {
    JsError::new(&err.to_string())
}
