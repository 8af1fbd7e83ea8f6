use glam::{Quat, Vec3};

pub const RENDER_FLOATS_PER_INSTANCE: usize = 7;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Transform {
    pub position: Vec3,
    pub rotation: Quat,
}

impl Transform {
    pub const IDENTITY: Self = Self {
        position: Vec3::ZERO,
        rotation: Quat::IDENTITY,
    };

    pub fn new(position: Vec3, rotation: Quat) -> Self {
        Self { position, rotation }
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::IDENTITY
    }
}

/// Storage for per-agent world transforms, usually backed by an instanced
/// renderer. Instance `i` belongs to agent `i`.
///
/// The simulation reads transforms from many worker threads at once, and
/// writes them back in a single batch per tick.
pub trait TransformProvider: Send + Sync {
    fn transform(&self, index: usize) -> Option<Transform>;

    /// Overwrites `transforms.len()` instances starting at `start`. Returns
    /// `false` without writing anything when the range is out of bounds.
    fn batch_set_transforms(&mut self, start: usize, transforms: &[Transform]) -> bool;

    /// Appends instances and returns the indices assigned to them.
    fn add_instances(&mut self, transforms: &[Transform]) -> Vec<usize>;

    /// Removes the given instances. Returns `false` without removing anything
    /// when an index is out of bounds.
    fn remove_instances(&mut self, indices: &[usize]) -> bool;

    fn instance_count(&self) -> usize;
}

/// In-memory provider that also keeps a flat `[px, py, pz, qx, qy, qz, qw]`
/// buffer per instance for instanced rendering.
#[derive(Debug, Default, Clone)]
pub struct InstanceBuffer {
    transforms: Vec<Transform>,
    render: Vec<f32>,
}

impl InstanceBuffer {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn transforms(&self) -> &[Transform] {
        &self.transforms
    }

    pub fn render_buffer(&self) -> &[f32] {
        &self.render
    }

    fn sync_render_buffer(&mut self, start: usize) {
        self.render
            .resize(self.transforms.len() * RENDER_FLOATS_PER_INSTANCE, 0.0);

        for (transform, slot) in self.transforms[start..].iter().zip(
            self.render[start * RENDER_FLOATS_PER_INSTANCE..]
                .chunks_exact_mut(RENDER_FLOATS_PER_INSTANCE),
        ) {
            slot[..3].copy_from_slice(&transform.position.to_array());
            slot[3..].copy_from_slice(&transform.rotation.to_array());
        }
    }
}

impl TransformProvider for InstanceBuffer {
    fn transform(&self, index: usize) -> Option<Transform> {
        self.transforms.get(index).copied()
    }

    fn batch_set_transforms(&mut self, start: usize, transforms: &[Transform]) -> bool {
        let Some(end) = start.checked_add(transforms.len()) else {
            return false;
        };
        if end > self.transforms.len() {
            return false;
        }

        self.transforms[start..end].copy_from_slice(transforms);
        self.sync_render_buffer(start);
        true
    }

    fn add_instances(&mut self, transforms: &[Transform]) -> Vec<usize> {
        let start = self.transforms.len();
        self.transforms.extend_from_slice(transforms);
        self.sync_render_buffer(start);
        (start..self.transforms.len()).collect()
    }

    fn remove_instances(&mut self, indices: &[usize]) -> bool {
        if indices.iter().any(|&index| index >= self.transforms.len()) {
            return false;
        }

        let mut sorted = indices.to_vec();
        sorted.sort_unstable_by(|a, b| b.cmp(a));
        sorted.dedup();
        for index in sorted {
            self.transforms.remove(index);
        }
        self.sync_render_buffer(0);
        true
    }

    fn instance_count(&self) -> usize {
        self.transforms.len()
    }
}

#[cfg(test)]
mod tests {
    use super::{InstanceBuffer, Transform, TransformProvider, RENDER_FLOATS_PER_INSTANCE};
    use glam::{Quat, Vec3};

    fn at(x: f32) -> Transform {
        Transform::new(Vec3::new(x, 0.0, 0.0), Quat::IDENTITY)
    }

    #[test]
    fn add_assigns_trailing_indices() {
        let mut buffer = InstanceBuffer::new();
        assert_eq!(buffer.add_instances(&[at(0.0), at(1.0)]), vec![0, 1]);
        assert_eq!(buffer.add_instances(&[at(2.0)]), vec![2]);
        assert_eq!(buffer.instance_count(), 3);
        assert_eq!(
            buffer.render_buffer().len(),
            3 * RENDER_FLOATS_PER_INSTANCE
        );
    }

    #[test]
    fn batch_set_rejects_out_of_range() {
        let mut buffer = InstanceBuffer::new();
        buffer.add_instances(&[at(0.0), at(1.0)]);

        assert!(!buffer.batch_set_transforms(1, &[at(5.0), at(6.0)]));
        assert_eq!(buffer.transform(1), Some(at(1.0)));

        assert!(buffer.batch_set_transforms(1, &[at(5.0)]));
        assert_eq!(buffer.transform(1), Some(at(5.0)));
        assert_eq!(buffer.render_buffer()[RENDER_FLOATS_PER_INSTANCE], 5.0);
    }

    #[test]
    fn remove_is_all_or_nothing() {
        let mut buffer = InstanceBuffer::new();
        buffer.add_instances(&[at(0.0), at(1.0), at(2.0)]);

        assert!(!buffer.remove_instances(&[2, 3]));
        assert_eq!(buffer.instance_count(), 3);

        assert!(buffer.remove_instances(&[2, 1]));
        assert_eq!(buffer.transforms(), &[at(0.0)]);
        assert_eq!(buffer.render_buffer().len(), RENDER_FLOATS_PER_INSTANCE);
    }
}
