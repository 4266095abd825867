use log::info;
use rayon::prelude::*;

use crate::{Error, Result};

/// Ray tracing capability reported by the backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord)]
pub enum RayTracingTier {
    None,
    Tier1,
    Tier11,
}

#[derive(Clone, Debug)]
pub struct DeviceDescriptor {
    pub name: String,
    pub tier: RayTracingTier,
    /// Worker threads; `None` uses one per logical core.
    pub threads: Option<usize>,
}

impl Default for DeviceDescriptor {
    fn default() -> Self {
        Self {
            name: "cpu".into(),
            tier: RayTracingTier::Tier11,
            threads: None,
        }
    }
}

/// Execution context for the resampling passes.
///
/// Owns the thread pool the passes dispatch onto; nothing in the crate
/// touches global executor state, so two engines on two devices can run
/// side by side.
#[derive(Debug)]
pub struct Device {
    name: String,
    tier: RayTracingTier,
    pool: rayon::ThreadPool,
}

impl Device {
    pub fn new(desc: DeviceDescriptor) -> Result<Self> {
        if desc.tier < RayTracingTier::Tier11 {
            return Err(Error::UnsupportedDevice { name: desc.name });
        }

        let mut pool = rayon::ThreadPoolBuilder::new();

        if let Some(threads) = desc.threads {
            pool = pool.num_threads(threads);
        }

        let pool = pool.build().map_err(|_| Error::UnsupportedDevice {
            name: desc.name.clone(),
        })?;

        info!(
            "Creating device `{}` ({} threads)",
            desc.name,
            pool.current_num_threads()
        );

        Ok(Self {
            name: desc.name,
            tier: desc.tier,
            pool,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn tier(&self) -> RayTracingTier {
        self.tier
    }

    /// Runs `f` once per item, in parallel.
    pub fn for_each<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(usize, &mut T) + Sync,
    {
        self.pool.install(|| {
            items
                .par_iter_mut()
                .enumerate()
                .for_each(|(id, item)| f(id, item));
        });
    }

    /// Runs `f` once per `chunk`-sized slice of items, in parallel; the
    /// chunk id doubles as the element id for strided buffers.
    pub fn for_each_chunk<T, F>(&self, items: &mut [T], chunk: usize, f: F)
    where
        T: Send,
        F: Fn(usize, &mut [T]) + Sync,
    {
        assert!(chunk > 0);

        self.pool.install(|| {
            items
                .par_chunks_mut(chunk)
                .enumerate()
                .for_each(|(id, items)| f(id, items));
        });
    }

    /// Like [`Self::for_each_chunk()`], but over two buffers advancing in
    /// lockstep; used by passes that fill a packed buffer and a plain one
    /// for the same element.
    pub fn for_each_zip<A, B, F>(
        &self,
        a: &mut [A],
        chunk_a: usize,
        b: &mut [B],
        chunk_b: usize,
        f: F,
    ) where
        A: Send,
        B: Send,
        F: Fn(usize, &mut [A], &mut [B]) + Sync,
    {
        assert!(chunk_a > 0 && chunk_b > 0);

        self.pool.install(|| {
            a.par_chunks_mut(chunk_a)
                .zip(b.par_chunks_mut(chunk_b))
                .enumerate()
                .for_each(|(id, (a, b))| f(id, a, b));
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_devices_without_inline_ray_tracing() {
        let result = Device::new(DeviceDescriptor {
            name: "legacy-gpu".into(),
            tier: RayTracingTier::Tier1,
            threads: None,
        });

        assert!(matches!(result, Err(Error::UnsupportedDevice { .. })));
    }

    #[test]
    fn chunked_dispatch_covers_every_element() {
        let device = Device::new(DeviceDescriptor {
            threads: Some(4),
            ..Default::default()
        })
        .unwrap();

        let mut items = vec![0u32; 64];

        device.for_each_chunk(&mut items, 4, |id, chunk| {
            for item in chunk {
                *item = id as u32 + 1;
            }
        });

        assert!(items.iter().all(|item| *item > 0));
        assert_eq!(items[63], 16);
    }
}
