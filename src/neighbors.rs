use glam::Vec3;

use crate::error::SimError;
use crate::math::safe_normalize;

/// Field of view used by a steering rule. A neighbor is visible when
/// `dot(forward, direction_to_neighbor) > min_dot`.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct ViewCone {
    pub min_dot: f32,
}

impl ViewCone {
    /// Rejects only neighbors exactly behind.
    pub const SEPARATION: Self = Self { min_dot: -1.0 };
    /// Narrow forward cone, 60 degrees either side.
    pub const ALIGNMENT: Self = Self { min_dot: 0.5 };
    /// Rejects neighbors within 60 degrees of straight behind.
    pub const COHESION: Self = Self { min_dot: -0.5 };

    pub fn sees(self, forward: Vec3, offset: Vec3) -> bool {
        forward.dot(safe_normalize(offset, Vec3::ZERO)) > self.min_dot
    }
}

/// Where candidate neighbors come from.
#[derive(Clone, Copy, Debug)]
pub enum NeighborSource<'a> {
    /// Scan the whole population.
    Exhaustive,
    /// Only consider the caller-supplied candidates for each agent.
    Prefiltered(&'a NeighborLists),
}

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Neighbor {
    pub index: usize,
    pub position: Vec3,
    pub velocity: Vec3,
    /// `position - self_position`.
    pub offset: Vec3,
    pub distance_sq: f32,
}

/// Read-only view of the per-tick snapshot used to find an agent's neighbors.
#[derive(Clone, Copy, Debug)]
pub struct NeighborQuery<'a> {
    positions: &'a [Vec3],
    velocities: &'a [Vec3],
    radius_sq: f32,
    source: NeighborSource<'a>,
}

impl<'a> NeighborQuery<'a> {
    pub fn new(
        positions: &'a [Vec3],
        velocities: &'a [Vec3],
        radius: f32,
        source: NeighborSource<'a>,
    ) -> Self {
        debug_assert_eq!(positions.len(), velocities.len());
        Self {
            positions,
            velocities,
            radius_sq: radius * radius,
            source,
        }
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    pub fn position(&self, i: usize) -> Vec3 {
        self.positions[i]
    }

    pub fn velocity(&self, i: usize) -> Vec3 {
        self.velocities[i]
    }

    /// Calls `callback` for every other agent within the proximity radius of
    /// `i` and, when `cone` is given, inside its field of view. Returns the
    /// number of candidates examined.
    pub fn for_each_neighbor<F>(
        &self,
        i: usize,
        cone: Option<(Vec3, ViewCone)>,
        mut callback: F,
    ) -> usize
    where
        F: FnMut(Neighbor),
    {
        let Some(&self_position) = self.positions.get(i) else {
            return 0;
        };

        let mut visit = |j: usize| {
            if j == i {
                return;
            }
            let (Some(&position), Some(&velocity)) =
                (self.positions.get(j), self.velocities.get(j))
            else {
                return;
            };

            let offset = position - self_position;
            let distance_sq = offset.length_squared();
            if distance_sq.is_nan() || distance_sq > self.radius_sq {
                return;
            }
            if let Some((forward, cone)) = cone {
                if !cone.sees(forward, offset) {
                    return;
                }
            }

            callback(Neighbor {
                index: j,
                position,
                velocity,
                offset,
                distance_sq,
            });
        };

        match self.source {
            NeighborSource::Exhaustive => {
                for j in 0..self.positions.len() {
                    visit(j);
                }
                self.positions.len().saturating_sub(1)
            }
            NeighborSource::Prefiltered(lists) => {
                let candidates = lists.candidates(i);
                for &j in candidates {
                    visit(j);
                }
                candidates.len()
            }
        }
    }
}

/// Caller-supplied candidate neighbors per agent, stored compactly.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct NeighborLists {
    offsets: Vec<usize>,
    indices: Vec<usize>,
}

impl NeighborLists {
    pub fn from_lists<I, L>(lists: I) -> Self
    where
        I: IntoIterator<Item = L>,
        L: AsRef<[usize]>,
    {
        let mut offsets = vec![0];
        let mut indices = Vec::new();
        for list in lists {
            indices.extend_from_slice(list.as_ref());
            offsets.push(indices.len());
        }
        Self { offsets, indices }
    }

    /// Brute-force candidate lists: every other agent within `radius`.
    pub fn within_radius(positions: &[Vec3], radius: f32) -> Self {
        let radius_sq = radius * radius;
        Self::from_lists(positions.iter().enumerate().map(|(i, &p)| {
            positions
                .iter()
                .enumerate()
                .filter(|&(j, &q)| j != i && p.distance_squared(q) <= radius_sq)
                .map(|(j, _)| j)
                .collect::<Vec<_>>()
        }))
    }

    pub fn agent_count(&self) -> usize {
        self.offsets.len().saturating_sub(1)
    }

    pub fn candidates(&self, agent: usize) -> &[usize] {
        match (self.offsets.get(agent), self.offsets.get(agent + 1)) {
            (Some(&start), Some(&end)) => &self.indices[start..end],
            _ => &[],
        }
    }

    /// Checks the lists describe exactly `agents` agents and only name
    /// indices below `agents`.
    pub fn validate(&self, agents: usize) -> Result<(), SimError> {
        if self.agent_count() != agents {
            return Err(SimError::NeighborListLength {
                lists: self.agent_count(),
                agents,
            });
        }
        for agent in 0..agents {
            if let Some(&candidate) = self.candidates(agent).iter().find(|&&j| j >= agents) {
                return Err(SimError::NeighborIndexOutOfRange { agent, candidate });
            }
        }
        Ok(())
    }
}
