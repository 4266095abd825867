use glam::Vec3;
use relume_gpu::PrefixVertex;

use crate::{BoundingBox, INVALID_ID};

const LEAF_SIZE: usize = 16;

/// Most neighbours a single query can ask for; matches the upper bound of
/// `final_gather_suffix_count`.
pub const MAX_NEAREST: usize = 8;

#[derive(Clone, Copy, Debug)]
struct Entry {
    point: Vec3,
    pixel: u32,
}

#[derive(Clone, Debug)]
enum Node {
    Internal {
        bounds: BoundingBox,
        left: u32,
        right: u32,
    },
    Leaf {
        bounds: BoundingBox,
        start: u32,
        len: u32,
    },
}

impl Node {
    fn bounds(&self) -> BoundingBox {
        match self {
            Self::Internal { bounds, .. } | Self::Leaf { bounds, .. } => {
                *bounds
            }
        }
    }
}

/// World-space search structure over prefix endpoints, rebuilt every frame
/// that has temporal history.
///
/// Median split along the widest axis; fine for the point counts at hand
/// and deterministic, which the resampling tests rely on.
#[derive(Clone, Debug, Default)]
pub struct PrefixSearchIndex {
    nodes: Vec<Node>,
    entries: Vec<Entry>,
    root: Option<u32>,
}

impl PrefixSearchIndex {
    pub fn build(vertices: &[PrefixVertex]) -> Self {
        let mut entries: Vec<_> = vertices
            .iter()
            .enumerate()
            .filter(|(_, vertex)| vertex.is_some())
            .map(|(pixel, vertex)| Entry {
                point: vertex.point,
                pixel: pixel as u32,
            })
            .collect();

        let mut this = Self::default();

        if entries.is_empty() {
            return this;
        }

        let len = entries.len();

        this.root = Some(this.split(&mut entries, 0, len));
        this.entries = entries;
        this
    }

    fn split(
        &mut self,
        entries: &mut [Entry],
        start: usize,
        end: usize,
    ) -> u32 {
        let bounds: BoundingBox = entries[start..end]
            .iter()
            .map(|entry| entry.point)
            .collect();

        if end - start <= LEAF_SIZE {
            self.nodes.push(Node::Leaf {
                bounds,
                start: start as u32,
                len: (end - start) as u32,
            });

            return (self.nodes.len() - 1) as u32;
        }

        let extent = bounds.extent();

        let axis = if extent.x >= extent.y && extent.x >= extent.z {
            0
        } else if extent.y >= extent.z {
            1
        } else {
            2
        };

        let mid = (start + end) / 2;

        entries[start..end].select_nth_unstable_by(mid - start, |a, b| {
            a.point[axis].total_cmp(&b.point[axis])
        });

        let left = self.split(entries, start, mid);
        let right = self.split(entries, mid, end);

        self.nodes.push(Node::Internal {
            bounds,
            left,
            right,
        });

        (self.nodes.len() - 1) as u32
    }

    pub fn is_empty(&self) -> bool {
        self.root.is_none()
    }

    /// Visits the pixel of every indexed endpoint within `radius` of
    /// `center`.
    ///
    /// Allocation-free; runs once per pixel inside the search pass. The
    /// stack bound holds because every split halves its range, so the tree
    /// depth never exceeds the bit width of the entry count.
    pub fn find_within(
        &self,
        center: Vec3,
        radius: f32,
        mut f: impl FnMut(u32, f32),
    ) {
        let Some(root) = self.root else {
            return;
        };

        let radius2 = radius * radius;
        let mut stack = [0; 64];
        let mut top = 1;

        stack[0] = root;

        while top > 0 {
            top -= 1;

            let node = &self.nodes[stack[top] as usize];

            if node.bounds().distance_squared(center) > radius2 {
                continue;
            }

            match node {
                Node::Internal { left, right, .. } => {
                    debug_assert!(top + 2 <= stack.len());

                    stack[top] = *left;
                    stack[top + 1] = *right;
                    top += 2;
                }

                Node::Leaf { start, len, .. } => {
                    let start = *start as usize;

                    for entry in &self.entries[start..start + *len as usize] {
                        let dist2 = entry.point.distance_squared(center);

                        if dist2 <= radius2 {
                            f(entry.pixel, dist2);
                        }
                    }
                }
            }
        }
    }

    /// Fills `out` with the closest endpoints within `radius`, as pixel ids
    /// sorted by distance; slots past the hit count keep [`INVALID_ID`].
    pub fn find_nearest(&self, center: Vec3, radius: f32, out: &mut [u32]) {
        let count = out.len();

        debug_assert!(count <= MAX_NEAREST);

        out.fill(INVALID_ID);

        let mut dist2s = [f32::INFINITY; MAX_NEAREST];
        let mut len = 0;

        self.find_within(center, radius, |pixel, dist2| {
            // Bounded insertion sort, ties broken by pixel id so queries
            // stay deterministic
            let mut at = len;

            while at > 0
                && (dist2 < dist2s[at - 1]
                    || (dist2 == dist2s[at - 1] && pixel < out[at - 1]))
            {
                at -= 1;
            }

            if at >= count {
                return;
            }

            let last = len.min(count - 1);

            for slot in (at..last).rev() {
                dist2s[slot + 1] = dist2s[slot];
                out[slot + 1] = out[slot];
            }

            dist2s[at] = dist2;
            out[at] = pixel;
            len = (len + 1).min(count);
        });
    }
}

#[cfg(test)]
mod tests {
    use glam::vec3;
    use relume_gpu::PREFIX_FLAG_VALID;

    use super::*;

    fn vertex(point: Vec3) -> PrefixVertex {
        PrefixVertex {
            point,
            flags: PREFIX_FLAG_VALID,
            ..Default::default()
        }
    }

    #[test]
    fn finds_exactly_the_points_in_range() {
        let vertices: Vec<_> = (0..100)
            .map(|i| vertex(vec3(i as f32, 0.0, 0.0)))
            .collect();

        let index = PrefixSearchIndex::build(&vertices);
        let mut found = Vec::new();

        index.find_within(vec3(50.0, 0.0, 0.0), 2.5, |pixel, _| {
            found.push(pixel);
        });

        found.sort();

        assert_eq!(found, vec![48, 49, 50, 51, 52]);
    }

    #[test]
    fn nearest_is_sorted_and_capped() {
        let vertices: Vec<_> = (0..100)
            .map(|i| vertex(vec3(i as f32, 0.0, 0.0)))
            .collect();

        let index = PrefixSearchIndex::build(&vertices);
        let mut found = [INVALID_ID; 3];

        index.find_nearest(vec3(50.2, 0.0, 0.0), 5.0, &mut found);

        assert_eq!(found, [50, 51, 49]);
    }

    #[test]
    fn nearest_leaves_sentinels_past_the_hit_count() {
        let vertices: Vec<_> = (0..100)
            .map(|i| vertex(vec3(i as f32, 0.0, 0.0)))
            .collect();

        let index = PrefixSearchIndex::build(&vertices);
        let mut found = [0; 4];

        index.find_nearest(vec3(50.2, 0.0, 0.0), 1.0, &mut found);

        assert_eq!(found, [50, 51, INVALID_ID, INVALID_ID]);
    }

    #[test]
    fn invalid_vertices_are_not_indexed() {
        let mut vertices =
            vec![vertex(vec3(0.0, 0.0, 0.0)), vertex(vec3(1.0, 0.0, 0.0))];

        vertices[0].flags = 0;

        let index = PrefixSearchIndex::build(&vertices);
        let mut found = Vec::new();

        index.find_within(Vec3::ZERO, 10.0, |pixel, _| found.push(pixel));

        assert_eq!(found, vec![1]);
    }

    #[test]
    fn empty_scene_builds_an_empty_index() {
        let index = PrefixSearchIndex::build(&[]);

        assert!(index.is_empty());

        index.find_within(Vec3::ZERO, 1.0, |_, _| {
            panic!("nothing to find");
        });
    }
}
