use std::f32::consts::{FRAC_PI_2, FRAC_PI_4};

use glam::Vec3;

use crate::config::SimulationConfig;
use crate::math::{rotate_around_axis, safe_normalize, slerp_direction};
use crate::neighbors::{NeighborQuery, ViewCone};
use crate::EPSILON;

/// Closer than this fraction of the proximity radius before separation reacts.
pub const MIN_PROXIMITY_FACTOR: f32 = 0.1;
/// Neighbor count at which the spherical rules reach full strength.
pub const BLEND_SATURATION_COUNT: f32 = 15.0;
/// Width added to the turn-back zone inside the spread radius.
pub const REDIRECT_MARGIN: f32 = 1.0;

const MIN_TANGENT_LENGTH_SQ: f32 = 1.0e-6;

/// The flocking rules for one tick, evaluated against a read-only snapshot.
///
/// The additive rules (`separate`, `align`, `cohere`) return forces. The
/// spherical rules (`*_blend`) return a new heading or velocity and never turn
/// further than their strength allows. A tick uses one family, not both.
#[derive(Clone, Copy, Debug)]
pub struct Steering<'a> {
    query: NeighborQuery<'a>,
    config: &'a SimulationConfig,
}

impl<'a> Steering<'a> {
    pub fn new(query: NeighborQuery<'a>, config: &'a SimulationConfig) -> Self {
        Self { query, config }
    }

    pub fn forward(&self, i: usize) -> Vec3 {
        safe_normalize(self.query.velocity(i), Vec3::X)
    }

    pub fn separate(&self, i: usize) -> Vec3 {
        let radius = self.config.proximity_radius;
        let mut steering = Vec3::ZERO;
        let mut count = 0usize;

        self.query
            .for_each_neighbor(i, Some((self.forward(i), ViewCone::SEPARATION)), |n| {
                // A coincident neighbor has no direction to push away from.
                if n.distance_sq <= EPSILON {
                    return;
                }
                let factor = 1.0 - n.distance_sq.sqrt() / radius;
                if factor < MIN_PROXIMITY_FACTOR {
                    return;
                }
                steering += factor * (-n.offset).normalize();
                count += 1;
            });

        if count == 0 {
            return Vec3::ZERO;
        }
        steering / count as f32 * self.config.separation_strength
    }

    /// Treats `(self - other) / dt` as a velocity estimate for each neighbor
    /// in the forward cone and averages the normalized estimates.
    pub fn align(&self, i: usize, dt: f32) -> Vec3 {
        if dt <= 0.0 {
            return Vec3::ZERO;
        }

        let mut steering = Vec3::ZERO;
        let mut count = 0usize;

        self.query
            .for_each_neighbor(i, Some((self.forward(i), ViewCone::ALIGNMENT)), |n| {
                steering += safe_normalize(-n.offset / dt, Vec3::ZERO);
                count += 1;
            });

        if count == 0 {
            return Vec3::ZERO;
        }
        steering / count as f32 * self.config.alignment_strength
    }

    pub fn cohere(&self, i: usize) -> Vec3 {
        let Some(centroid) = self.centroid(i) else {
            return Vec3::ZERO;
        };
        safe_normalize(centroid.0 - self.query.position(i), Vec3::ZERO)
            * self.config.cohesion_strength
    }

    /// Pushes `velocity` away from each close neighbor, weighted by closeness,
    /// and returns it at its original speed.
    pub fn separate_blend(&self, i: usize, velocity: Vec3) -> Vec3 {
        let radius = self.config.proximity_radius;
        let strength = self.config.separation_strength;
        let mut blended = velocity;

        self.query
            .for_each_neighbor(i, Some((self.forward(i), ViewCone::SEPARATION)), |n| {
                let distance = n.distance_sq.sqrt();
                if distance <= EPSILON {
                    return;
                }
                blended += -n.offset * ((1.0 - distance / radius) / distance) * strength;
            });

        safe_normalize(blended, safe_normalize(velocity, Vec3::X)) * velocity.length()
    }

    /// Turns `direction` towards the average position of neighbors in the
    /// forward cone, taken as a direction from the origin.
    pub fn align_blend(&self, i: usize, direction: Vec3) -> Vec3 {
        let mut position_sum = Vec3::ZERO;
        let mut count = 0usize;

        self.query
            .for_each_neighbor(i, Some((self.forward(i), ViewCone::ALIGNMENT)), |n| {
                position_sum += n.position;
                count += 1;
            });

        if count == 0 {
            return safe_normalize(direction, Vec3::X);
        }
        let alpha = blend_alpha(count, self.config.alignment_strength);
        let target = safe_normalize(position_sum / count as f32, Vec3::ZERO);
        slerp_direction(direction, target, alpha)
    }

    /// Turns `direction` towards the average heading of neighbors that are
    /// not nearly straight behind.
    pub fn match_heading_blend(&self, i: usize, direction: Vec3) -> Vec3 {
        let mut heading_sum = Vec3::ZERO;
        let mut count = 0usize;

        self.query
            .for_each_neighbor(i, Some((self.forward(i), ViewCone::COHESION)), |n| {
                heading_sum += safe_normalize(n.velocity, Vec3::ZERO);
                count += 1;
            });

        if count == 0 {
            return safe_normalize(direction, Vec3::X);
        }
        let alpha = blend_alpha(count, self.config.alignment_strength);
        slerp_direction(direction, heading_sum / count as f32, alpha)
    }

    /// Turns `direction` towards `centroid - normalize(position)` for the
    /// visible neighbors.
    pub fn cohere_blend(&self, i: usize, direction: Vec3) -> Vec3 {
        let Some((centroid, count)) = self.centroid(i) else {
            return safe_normalize(direction, Vec3::X);
        };
        let alpha = blend_alpha(count, self.config.cohesion_strength);
        let target = centroid - safe_normalize(self.query.position(i), Vec3::ZERO);
        slerp_direction(direction, target, alpha)
    }

    fn centroid(&self, i: usize) -> Option<(Vec3, usize)> {
        let mut position_sum = Vec3::ZERO;
        let mut count = 0usize;

        self.query
            .for_each_neighbor(i, Some((self.forward(i), ViewCone::COHESION)), |n| {
                position_sum += n.position;
                count += 1;
            });

        (count > 0).then(|| (position_sum / count as f32, count))
    }
}

fn blend_alpha(count: usize, strength: f32) -> f32 {
    ((count as f32 / BLEND_SATURATION_COUNT).min(1.0) * strength).clamp(0.0, 1.0)
}

/// Bends `velocity` back towards the flock origin once the agent is inside the
/// turn-back zone at the edge of the spread radius. Speed is preserved.
///
/// The turn grows linearly from nothing at the inner edge of the zone to a
/// full turn at the spread radius, and keeps growing past it. Returns whether
/// the agent was in the zone.
pub fn redirect(velocity: &mut Vec3, position: Vec3, config: &SimulationConfig) -> bool {
    let threshold = config.spread_radius - config.proximity_radius - REDIRECT_MARGIN;
    let radial = position - config.origin;
    let distance = radial.length();
    if distance <= threshold {
        return false;
    }

    let speed = velocity.length();
    if speed <= EPSILON {
        return true;
    }

    let outward = safe_normalize(radial, Vec3::X);
    let current = *velocity / speed;
    let tangent_axis = current.cross(outward);

    let target = if tangent_axis.length_squared() > MIN_TANGENT_LENGTH_SQ {
        let tangent_axis = tangent_axis.normalize();
        let along_surface = rotate_around_axis(tangent_axis, outward, FRAC_PI_2);
        rotate_around_axis(along_surface, tangent_axis, -FRAC_PI_4)
    } else {
        -outward
    };

    let alpha = (distance - threshold) / (config.spread_radius - threshold);
    *velocity = slerp_direction(current, target, alpha) * speed;
    true
}

#[cfg(test)]
mod tests {
    use super::{redirect, Steering, REDIRECT_MARGIN};
    use crate::config::{SimulationConfig, SteeringModel};
    use crate::neighbors::{NeighborLists, NeighborQuery, NeighborSource};
    use glam::Vec3;

    fn config() -> SimulationConfig {
        SimulationConfig {
            proximity_radius: 70.0,
            separation_strength: 25.0,
            ..SimulationConfig::default()
        }
    }

    #[test]
    fn separation_matches_hand_computed_force() {
        let positions = [Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0)];
        let velocities = [Vec3::X * 100.0, -Vec3::X * 100.0];
        let config = config();
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);

        let force = Steering::new(query, &config).separate(0);
        let expected = 25.0 * (1.0 - 10.0 / 70.0);
        assert!((force.x + expected).abs() < 1.0e-4, "{force:?}");
        assert!(force.y.abs() < 1.0e-6 && force.z.abs() < 1.0e-6);
    }

    #[test]
    fn separation_vanishes_outside_radius() {
        let config = config();
        for distance in [70.0, 71.0, 500.0] {
            let positions = [Vec3::ZERO, Vec3::new(distance, 0.0, 0.0)];
            let velocities = [Vec3::X, -Vec3::X];
            let query =
                NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);
            assert_eq!(Steering::new(query, &config).separate(0), Vec3::ZERO);
        }
    }

    #[test]
    fn separation_is_mutual() {
        let positions = [Vec3::ZERO, Vec3::new(0.0, 20.0, 0.0)];
        let velocities = [Vec3::Y, -Vec3::Y];
        let config = config();
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);
        let steering = Steering::new(query, &config);

        assert!(steering.separate(0).y < 0.0);
        assert!(steering.separate(1).y > 0.0);
    }

    #[test]
    fn coincident_agents_do_not_produce_nan() {
        let positions = [Vec3::ONE; 3];
        let velocities = [Vec3::X, Vec3::Y, Vec3::Z];
        let config = config();
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);
        let steering = Steering::new(query, &config);

        for i in 0..3 {
            assert!(steering.separate(i).is_finite());
            assert!(steering.align(i, 0.016).is_finite());
            assert!(steering.cohere(i).is_finite());
            assert!(steering.separate_blend(i, velocities[i]).is_finite());
            assert!(steering.align_blend(i, velocities[i]).is_finite());
            assert!(steering.match_heading_blend(i, velocities[i]).is_finite());
            assert!(steering.cohere_blend(i, velocities[i]).is_finite());
        }
    }

    #[test]
    fn cohesion_points_at_visible_centroid() {
        let positions = [
            Vec3::ZERO,
            Vec3::new(20.0, 10.0, 0.0),
            Vec3::new(20.0, -10.0, 0.0),
            Vec3::new(-20.0, 0.0, 0.0),
        ];
        let velocities = [Vec3::X; 4];
        let config = config();
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);

        // Agent 3 is directly behind agent 0 and ignored.
        let force = Steering::new(query, &config).cohere(0);
        assert!((force - Vec3::X * config.cohesion_strength).length() < 1.0e-4);
    }

    #[test]
    fn align_ignores_neighbors_outside_forward_cone() {
        let positions = [Vec3::ZERO, Vec3::new(0.0, 30.0, 0.0)];
        let velocities = [Vec3::X, Vec3::X];
        let config = config();
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);

        assert_eq!(Steering::new(query, &config).align(0, 0.016), Vec3::ZERO);
    }

    fn blend_config(model: SteeringModel) -> SimulationConfig {
        SimulationConfig {
            alignment_strength: 15.0,
            cohesion_strength: 15.0,
            steering: model,
            ..config()
        }
    }

    #[test]
    fn align_blend_turns_towards_average_neighbor_position() {
        let positions = [Vec3::ZERO, Vec3::new(20.0, 20.0, 0.0)];
        let velocities = [Vec3::X * 100.0, Vec3::Y * 100.0];
        let config = blend_config(SteeringModel::Spherical);
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);

        // One neighbor at strength 15 gives alpha = 1.
        let heading = Steering::new(query, &config).align_blend(0, velocities[0]);
        let expected = Vec3::new(1.0, 1.0, 0.0).normalize();
        assert!((heading - expected).length() < 1.0e-4, "{heading:?}");
    }

    #[test]
    fn blended_alignment_ignores_neighbor_behind() {
        let positions = [Vec3::ZERO, Vec3::new(-20.0, 0.0, 0.0)];
        let velocities = [Vec3::X * 100.0, Vec3::Y * 100.0];
        let config = blend_config(SteeringModel::Spherical);
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);
        let steering = Steering::new(query, &config);

        assert_eq!(steering.align_blend(0, velocities[0]), Vec3::X);
        assert_eq!(steering.match_heading_blend(0, velocities[0]), Vec3::X);
        assert_eq!(steering.align(0, 0.016), Vec3::ZERO);
    }

    #[test]
    fn match_heading_blend_turns_towards_neighbor_heading() {
        let positions = [Vec3::ZERO, Vec3::new(5.0, 0.0, 0.0)];
        let velocities = [Vec3::X * 100.0, Vec3::Y * 100.0];
        let config = blend_config(SteeringModel::HeadingMatch);
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);

        let heading = Steering::new(query, &config).match_heading_blend(0, velocities[0]);
        assert!((heading - Vec3::Y).length() < 1.0e-4, "{heading:?}");
    }

    #[test]
    fn cohere_blend_targets_centroid_less_normalized_position() {
        let positions = [Vec3::new(100.0, 0.0, 0.0), Vec3::new(100.0, 50.0, 0.0)];
        let velocities = [Vec3::X * 100.0, Vec3::X * 100.0];
        let config = blend_config(SteeringModel::Spherical);
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);

        let heading = Steering::new(query, &config).cohere_blend(0, velocities[0]);
        let expected = Vec3::new(99.0, 50.0, 0.0).normalize();
        assert!((heading - expected).length() < 1.0e-4, "{heading:?}");
        assert!((heading - Vec3::new(0.893, 0.451, 0.0)).length() < 1.0e-3);
    }

    #[test]
    fn coincident_neighbor_does_not_dilute_separation() {
        let positions = [Vec3::ZERO, Vec3::new(10.0, 0.0, 0.0), Vec3::ZERO];
        let velocities = [Vec3::X * 100.0, -Vec3::X * 100.0, Vec3::Y * 100.0];
        let config = config();
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);

        let force = Steering::new(query, &config).separate(0);
        let expected = Vec3::new(-25.0 * (1.0 - 10.0 / 70.0), 0.0, 0.0);
        assert!((force - expected).length() < 1.0e-4, "{force:?}");
    }

    #[test]
    fn blends_without_neighbors_keep_heading() {
        let positions = [Vec3::ZERO, Vec3::new(500.0, 0.0, 0.0)];
        let velocities = [Vec3::Z * 3.0, Vec3::X];
        let config = SimulationConfig::smooth();
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);
        let steering = Steering::new(query, &config);

        assert_eq!(steering.align_blend(0, velocities[0]), Vec3::Z);
        assert_eq!(steering.match_heading_blend(0, velocities[0]), Vec3::Z);
        assert_eq!(steering.cohere_blend(0, velocities[0]), Vec3::Z);
        assert!((steering.separate_blend(0, velocities[0]) - velocities[0]).length() < 1.0e-5);
    }

    #[test]
    fn separate_blend_keeps_speed_and_turns_away() {
        let positions = [Vec3::ZERO, Vec3::new(10.0, 10.0, 0.0)];
        let velocities = [Vec3::X * 200.0, Vec3::X * 200.0];
        let config = config();
        let query = NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive);

        let velocity = Steering::new(query, &config).separate_blend(0, velocities[0]);
        assert!((velocity.length() - 200.0).abs() < 1.0e-2);
        assert!(velocity.y < 0.0);
    }

    #[test]
    fn prefiltered_and_exhaustive_agree() {
        let positions = [
            Vec3::ZERO,
            Vec3::new(12.0, 3.0, -4.0),
            Vec3::new(-30.0, 8.0, 2.0),
            Vec3::new(40.0, -20.0, 10.0),
        ];
        let velocities = [
            Vec3::new(1.0, 0.2, 0.0),
            Vec3::new(0.0, 1.0, 0.0),
            Vec3::new(-1.0, 0.0, 0.5),
            Vec3::new(0.3, 0.3, 0.3),
        ];
        let config = config();
        let lists = NeighborLists::within_radius(&positions, 70.0);
        let exhaustive = Steering::new(
            NeighborQuery::new(&positions, &velocities, 70.0, NeighborSource::Exhaustive),
            &config,
        );
        let prefiltered = Steering::new(
            NeighborQuery::new(
                &positions,
                &velocities,
                70.0,
                NeighborSource::Prefiltered(&lists),
            ),
            &config,
        );

        for i in 0..positions.len() {
            assert!((exhaustive.separate(i) - prefiltered.separate(i)).length() < 1.0e-4);
            assert!((exhaustive.cohere(i) - prefiltered.cohere(i)).length() < 1.0e-4);
            assert!((exhaustive.align(i, 0.02) - prefiltered.align(i, 0.02)).length() < 1.0e-4);
        }
    }

    #[test]
    fn redirect_turns_outward_agent_back() {
        let config = SimulationConfig::default();
        let outward = Vec3::X;
        let position = outward * (config.spread_radius - 0.5);
        let mut velocity = outward * 300.0;

        assert!(redirect(&mut velocity, position, &config));
        assert!(velocity.dot(outward) < 300.0);
        assert!((velocity.length() - 300.0).abs() < 1.0e-2);
    }

    #[test]
    fn redirect_banks_tangential_agent_inwards() {
        let config = SimulationConfig::default();
        let position = Vec3::X * config.spread_radius;
        let before = Vec3::new(1.0, 1.0, 0.0).normalize() * 200.0;
        let mut velocity = before;

        assert!(redirect(&mut velocity, position, &config));
        assert!(velocity.dot(Vec3::X) < before.dot(Vec3::X));
        // Full turn at the spread radius lands on the banked target.
        let expected = Vec3::new(-1.0, 1.0, 0.0).normalize() * 200.0;
        assert!((velocity - expected).length() < 1.0e-2, "{velocity:?}");
    }

    #[test]
    fn redirect_keeps_turning_past_spread_radius() {
        let config = SimulationConfig::default();
        let threshold = config.spread_radius - config.proximity_radius - REDIRECT_MARGIN;
        let zone = config.spread_radius - threshold;

        // alpha = 1.5: three quarters of a full circle leaves the heading
        // perpendicular to the outward direction.
        let mut velocity = Vec3::X * 300.0;
        assert!(redirect(&mut velocity, Vec3::X * (threshold + 1.5 * zone), &config));
        assert!(velocity.x.abs() < 0.5, "{velocity:?}");
        assert!((velocity.length() - 300.0).abs() < 1.0e-2);

        // alpha = 2: the over-rotation comes all the way round to outward.
        let mut velocity = Vec3::X * 300.0;
        assert!(redirect(&mut velocity, Vec3::X * (threshold + 2.0 * zone), &config));
        assert!((velocity - Vec3::X * 300.0).length() < 0.5, "{velocity:?}");
    }

    #[test]
    fn redirect_leaves_interior_agents_alone() {
        let config = SimulationConfig::default();
        let position = Vec3::new(0.0, 100.0, 0.0);
        let mut velocity = Vec3::Y * 250.0;

        assert!(!redirect(&mut velocity, position, &config));
        assert_eq!(velocity, Vec3::Y * 250.0);
    }
}
