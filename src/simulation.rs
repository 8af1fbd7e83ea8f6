use std::ops::Range;

use glam::{Quat, Vec3};
use rayon::prelude::*;
use tracing::{debug, info, warn};

use crate::config::{Motion, SimulationConfig, SteeringModel};
use crate::error::SimError;
use crate::math::{average, clamp_magnitude, orientation_from_direction, safe_normalize};
use crate::neighbors::{NeighborLists, NeighborQuery, NeighborSource};
use crate::population::{AgentPopulation, Spawner};
use crate::provider::{Transform, TransformProvider};
use crate::steering::{redirect, Steering};
use crate::wander::{wander_velocity, WanderTargets};

#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct TickStats {
    pub step: u32,
    pub agents: usize,
    /// Agents inside the turn-back zone at the edge of the spread radius.
    pub redirected: usize,
    /// Agents whose steering produced a non-finite result and was discarded.
    pub degenerate: usize,
    pub average_velocity: Vec3,
}

/// A flock of agents whose transforms live in a [`TransformProvider`].
///
/// Each [`tick`](Self::tick) runs three phases in order, each one a parallel
/// pass over disjoint agent indices that finishes before the next starts:
///
/// 1. snapshot every agent's position from the provider,
/// 2. compute every agent's next velocity from the snapshot into a scratch
///    buffer, then swap it in,
/// 3. integrate positions and hand the whole batch of transforms back to the
///    provider in one call.
///
/// Resizing takes `&mut self`, so it can never overlap a tick.
pub struct Simulation<P: TransformProvider> {
    config: SimulationConfig,
    provider: P,
    population: AgentPopulation,
    next_velocities: Vec<Vec3>,
    next_targets: Vec<Vec3>,
    commit: Vec<Transform>,
    neighbor_lists: Option<NeighborLists>,
    wander: WanderTargets,
    spawner: Spawner,
    step: u32,
}

impl<P: TransformProvider> Simulation<P> {
    /// Spawns `config.initial_population` agents into `provider`, replacing
    /// any instances it already holds.
    pub fn new(config: SimulationConfig, provider: P, seed: u64) -> Result<Self, SimError> {
        config.validate()?;

        let mut spawner = Spawner::new(
            seed,
            config.origin,
            config.spawn_radius,
            config.min_speed,
        );
        let mut population = AgentPopulation::with_capacity(config.initial_population);
        spawner.spawn_into(&mut population, config.initial_population);

        Self::assemble(config, provider, population, spawner)
    }

    /// Starts from explicit agent state instead of a random spawn.
    pub fn from_population(
        config: SimulationConfig,
        provider: P,
        population: AgentPopulation,
        seed: u64,
    ) -> Result<Self, SimError> {
        config.validate()?;
        let spawner = Spawner::new(
            seed,
            config.origin,
            config.spawn_radius,
            config.min_speed,
        );
        Self::assemble(config, provider, population, spawner)
    }

    fn assemble(
        config: SimulationConfig,
        mut provider: P,
        population: AgentPopulation,
        spawner: Spawner,
    ) -> Result<Self, SimError> {
        let existing = provider.instance_count();
        if existing > 0 {
            let indices: Vec<usize> = (0..existing).rev().collect();
            if !provider.remove_instances(&indices) {
                return Err(SimError::ProviderRejected);
            }
        }

        let expected = 0..population.len();
        let assigned = provider.add_instances(&population.transforms());
        if !assigned.iter().copied().eq(expected.clone()) {
            return Err(SimError::UnexpectedInstanceIndices {
                expected,
                actual: assigned,
            });
        }

        info!(
            agents = population.len(),
            steering = ?config.steering,
            motion = ?config.motion,
            "flock spawned"
        );

        Ok(Self {
            next_velocities: Vec::with_capacity(population.len()),
            next_targets: Vec::new(),
            commit: Vec::with_capacity(population.len()),
            config,
            provider,
            population,
            neighbor_lists: None,
            wander: WanderTargets::new(),
            spawner,
            step: 0,
        })
    }

    pub fn config(&self) -> &SimulationConfig {
        &self.config
    }

    pub fn provider(&self) -> &P {
        &self.provider
    }

    pub fn population(&self) -> &AgentPopulation {
        &self.population
    }

    pub fn len(&self) -> usize {
        self.population.len()
    }

    pub fn is_empty(&self) -> bool {
        self.population.is_empty()
    }

    pub fn step_count(&self) -> u32 {
        self.step
    }

    pub fn neighbor_lists(&self) -> Option<&NeighborLists> {
        self.neighbor_lists.as_ref()
    }

    pub fn wander_targets(&self) -> &WanderTargets {
        &self.wander
    }

    /// Replaces the configuration. An invalid config is rejected and the
    /// current one kept.
    pub fn set_config(&mut self, config: SimulationConfig) -> Result<(), SimError> {
        if let Err(err) = config.validate() {
            warn!(%err, "rejected simulation config");
            return Err(err.into());
        }

        self.spawner
            .set_volume(config.origin, config.spawn_radius, config.min_speed);
        if !matches!(config.motion, Motion::Wander(_)) {
            self.wander.resize(0, config.origin, 0.0, self.step);
        }
        self.config = config;
        Ok(())
    }

    /// Switches neighbor lookup to caller-supplied candidate lists, one per
    /// agent. Resizing the population discards them.
    pub fn set_neighbor_lists(&mut self, lists: NeighborLists) -> Result<(), SimError> {
        lists.validate(self.population.len())?;
        self.neighbor_lists = Some(lists);
        Ok(())
    }

    /// Goes back to scanning every agent.
    pub fn clear_neighbor_lists(&mut self) {
        self.neighbor_lists = None;
    }

    /// Spawns `count` agents at the end of the population and returns their
    /// indices.
    pub fn add_instances(&mut self, count: usize) -> Result<Range<usize>, SimError> {
        let start = self.population.len();
        let expected = start..start + count;
        if count == 0 {
            return Ok(expected);
        }

        let mut spawned = AgentPopulation::with_capacity(count);
        self.spawner.spawn_into(&mut spawned, count);

        let assigned = self.provider.add_instances(&spawned.transforms());
        if !assigned.iter().copied().eq(expected.clone()) {
            if !self.provider.remove_instances(&assigned) {
                warn!(?assigned, "could not roll back misplaced instances");
            }
            return Err(SimError::UnexpectedInstanceIndices {
                expected,
                actual: assigned,
            });
        }

        for (&position, &velocity) in spawned.positions().iter().zip(spawned.velocities()) {
            self.population.push(position, velocity);
        }
        self.drop_neighbor_lists();

        info!(added = count, agents = self.population.len(), "agents added");
        Ok(expected)
    }

    /// Removes the last `count` agents. Asking for more agents than exist
    /// fails without changing anything.
    pub fn remove_instances(&mut self, count: usize) -> Result<(), SimError> {
        let available = self.population.len();
        if count > available {
            warn!(requested = count, available, "remove exceeds population");
            return Err(SimError::RemoveExceedsPopulation {
                requested: count,
                available,
            });
        }
        if count == 0 {
            return Ok(());
        }

        let remaining = available - count;
        let indices: Vec<usize> = (remaining..available).rev().collect();
        if !self.provider.remove_instances(&indices) {
            return Err(SimError::ProviderRejected);
        }

        self.population.truncate(remaining);
        self.next_velocities.truncate(remaining);
        self.commit.truncate(remaining);
        if !self.wander.is_empty() {
            self.wander
                .resize(remaining, self.config.origin, 0.0, self.step);
        }
        self.drop_neighbor_lists();

        info!(removed = count, agents = remaining, "agents removed");
        Ok(())
    }

    fn drop_neighbor_lists(&mut self) {
        if self.neighbor_lists.take().is_some() {
            warn!("population resized; neighbor lists discarded");
        }
    }

    /// Advances the flock by `dt` seconds.
    pub fn tick(&mut self, dt: f32) -> Result<TickStats, SimError> {
        if !dt.is_finite() || dt < 0.0 {
            return Err(SimError::InvalidDeltaTime(dt));
        }

        let agents = self.population.len();
        let instances = self.provider.instance_count();
        if agents != instances || !self.population.is_consistent() {
            warn!(agents, instances, "population out of sync with provider");
            return Err(SimError::PopulationMismatch { agents, instances });
        }

        // Velocities, wander targets and the step count only change once the
        // provider accepts the commit.
        let step = self.step.wrapping_add(1);
        if let Motion::Wander(wander) = self.config.motion {
            self.wander
                .resize(agents, self.config.origin, wander.extent, step);
        }

        let config = &self.config;
        let provider = &self.provider;
        let (positions, velocities) = self.population.buffers_mut();

        positions
            .par_iter_mut()
            .enumerate()
            .try_for_each(|(i, slot)| {
                let transform = provider
                    .transform(i)
                    .ok_or(SimError::MissingTransform { index: i })?;
                *slot = transform.position;
                Ok::<(), SimError>(())
            })?;

        self.next_velocities.resize(agents, Vec3::ZERO);
        let snapshot: &[Vec3] = &positions[..];
        let previous: &[Vec3] = &velocities[..];
        let (redirected, degenerate) = match config.motion {
            Motion::Flock => {
                let source = match &self.neighbor_lists {
                    Some(lists) => NeighborSource::Prefiltered(lists),
                    None => NeighborSource::Exhaustive,
                };
                let steering = Steering::new(
                    NeighborQuery::new(snapshot, previous, config.proximity_radius, source),
                    config,
                );

                self.next_velocities
                    .par_iter_mut()
                    .enumerate()
                    .map(|(i, next)| {
                        let update =
                            flock_velocity(&steering, config, i, snapshot[i], previous[i], dt);
                        *next = update.velocity;
                        (update.redirected as usize, update.degenerate as usize)
                    })
                    .reduce(|| (0, 0), sum_counts)
            }
            Motion::Wander(wander) => {
                self.next_targets.clear();
                self.next_targets.extend_from_slice(self.wander.as_slice());

                self.next_velocities
                    .par_iter_mut()
                    .zip(self.next_targets.par_iter_mut())
                    .enumerate()
                    .map(|(i, (next, target))| {
                        let candidate = wander_velocity(
                            snapshot[i],
                            target,
                            &wander,
                            config.origin,
                            step,
                            i as u32,
                        );
                        let (velocity, degenerate) =
                            settle_velocity(candidate, previous[i], config);
                        *next = velocity;
                        (0, degenerate as usize)
                    })
                    .reduce(|| (0, 0), sum_counts)
            }
        };

        snapshot
            .par_iter()
            .zip(self.next_velocities.par_iter())
            .map(|(&position, &velocity)| {
                let next = position + velocity * dt;
                Transform::new(
                    if next.is_finite() { next } else { position },
                    orientation_from_direction(velocity, Quat::IDENTITY),
                )
            })
            .collect_into_vec(&mut self.commit);

        if !self.provider.batch_set_transforms(0, &self.commit) {
            warn!(step, agents, "provider rejected the tick commit");
            return Err(SimError::ProviderRejected);
        }

        std::mem::swap(velocities, &mut self.next_velocities);
        positions
            .par_iter_mut()
            .zip(self.commit.par_iter())
            .for_each(|(position, transform)| *position = transform.position);
        if matches!(config.motion, Motion::Wander(_)) {
            self.wander.swap_buffer(&mut self.next_targets);
        }
        self.step = step;

        let stats = TickStats {
            step,
            agents,
            redirected,
            degenerate,
            average_velocity: average(velocities),
        };

        if degenerate > 0 {
            warn!(step, degenerate, "discarded non-finite steering");
        }
        debug!(
            step,
            agents,
            redirected,
            average_speed = stats.average_velocity.length(),
            "tick"
        );
        Ok(stats)
    }
}

#[derive(Clone, Copy, Debug)]
struct AgentUpdate {
    velocity: Vec3,
    redirected: bool,
    degenerate: bool,
}

fn flock_velocity(
    steering: &Steering<'_>,
    config: &SimulationConfig,
    i: usize,
    position: Vec3,
    velocity: Vec3,
    dt: f32,
) -> AgentUpdate {
    let mut degenerate = false;
    let mut candidate = velocity;

    let redirected = match config.steering {
        SteeringModel::Additive => {
            let mut acceleration =
                steering.separate(i) + steering.align(i, dt) + steering.cohere(i);
            if !acceleration.is_finite() {
                acceleration = Vec3::ZERO;
                degenerate = true;
            }
            let redirected = redirect(&mut candidate, position, config);
            candidate += acceleration * dt;
            redirected
        }
        SteeringModel::Spherical | SteeringModel::HeadingMatch => {
            let speed = velocity.length();
            let heading = steering.cohere_blend(i, velocity);
            let heading = if config.steering == SteeringModel::HeadingMatch {
                steering.match_heading_blend(i, heading)
            } else {
                steering.align_blend(i, heading)
            };
            let blended = steering.separate_blend(i, heading * speed);
            if blended.is_finite() {
                candidate = blended;
            } else {
                degenerate = true;
            }
            redirect(&mut candidate, position, config)
        }
    };

    let (velocity, settled_degenerate) = settle_velocity(candidate, velocity, config);
    AgentUpdate {
        velocity,
        redirected,
        degenerate: degenerate || settled_degenerate,
    }
}

/// Clamps a candidate velocity into the configured speed band, falling back
/// to the previous heading when the candidate is unusable.
fn settle_velocity(candidate: Vec3, previous: Vec3, config: &SimulationConfig) -> (Vec3, bool) {
    let degenerate = !candidate.is_finite();
    let source = if degenerate { previous } else { candidate };

    let clamped = clamp_magnitude(source, config.min_speed, config.max_speed);
    if clamped == Vec3::ZERO || !clamped.is_finite() {
        return (safe_normalize(previous, Vec3::X) * config.min_speed, degenerate);
    }
    (clamped, degenerate)
}

fn sum_counts(a: (usize, usize), b: (usize, usize)) -> (usize, usize) {
    (a.0 + b.0, a.1 + b.1)
}
