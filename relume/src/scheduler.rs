use std::sync::atomic::{AtomicU32, Ordering};

use bytemuck::{Pod, Zeroable};
use log::debug;
use relume_gpu::{PrefixVertex, Shift, SuffixSample};

use crate::Device;

/// Sentinel for "no neighbour" in pick buffers.
pub const INVALID_ID: u32 = u32::MAX;

/// Sentinel for "no record" in the per-slot offset table.
pub const INVALID_OFFSET: u32 = u32::MAX;

/// Hard cap on shift records per round; marks beyond it are silently
/// dropped, matching the fixed-size reconnection buffer this models.
pub const MAX_SHIFT_RECORDS: usize = 16 << 20;

/// How retrace work gets scheduled.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum RetraceSchedule {
    /// One thread per (pixel, neighbour, direction) slot, admissible or
    /// not.
    Naive,

    /// Admissible slots are compacted into a dense list first, so threads
    /// never idle on rejected pairs.
    #[default]
    Compact,
}

/// Dense-list element: pixel, neighbour slot and shift direction packed
/// into one word, with an extra word for the Talbot domain index.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Pod, Zeroable)]
pub struct WorkloadEntry {
    pub packed: u32,
    pub extra: u32,
}

impl WorkloadEntry {
    pub fn new(pixel: u32, slot: u32, reverse: bool) -> Self {
        debug_assert!(slot < 8);

        Self {
            packed: (pixel << 4) | (slot << 1) | (reverse as u32),
            extra: 0,
        }
    }

    pub fn with_extra(mut self, extra: u32) -> Self {
        self.extra = extra;
        self
    }

    pub fn pixel(self) -> u32 {
        self.packed >> 4
    }

    pub fn slot(self) -> u32 {
        (self.packed >> 1) & 0x7
    }

    pub fn is_reverse(self) -> bool {
        self.packed & 1 != 0
    }
}

/// Output of one shift evaluation, shared between the retrace and
/// resampling passes.
#[repr(C)]
#[derive(Clone, Copy, Debug, Default, PartialEq, Pod, Zeroable)]
pub struct ShiftRecord {
    pub sample: SuffixSample,
    /// Target density of the shifted sample in the destination domain.
    pub dst_pdf: f32,
    pub jacobian: f32,
    pub valid: u32,
    pub pad: u32,
}

impl ShiftRecord {
    pub fn new(shift: Shift, dst_vertex: &PrefixVertex) -> Self {
        if !shift.valid {
            return Self::default();
        }

        Self {
            sample: shift.sample,
            dst_pdf: shift.sample.target_pdf(dst_vertex),
            jacobian: shift.jacobian,
            valid: 1,
            pad: 0,
        }
    }

    pub fn is_valid(&self) -> bool {
        self.valid != 0
    }
}

/// Slot shape of one retrace round.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WorkloadKind {
    /// Two slots per neighbour: the forward shift into the canonical
    /// domain and the reverse shift out of it.
    Pairwise { neighbors: u32 },

    /// One slot per (sample, domain) pair; domain 0 is the canonical one.
    Talbot { neighbors: u32 },
}

impl WorkloadKind {
    pub fn slots_per_pixel(self) -> usize {
        match self {
            Self::Pairwise { neighbors } => (neighbors * 2) as usize,
            Self::Talbot { neighbors } => {
                (neighbors * (neighbors + 1)) as usize
            }
        }
    }

    pub fn entry(self, pixel: u32, within: u32) -> WorkloadEntry {
        match self {
            Self::Pairwise { .. } => {
                WorkloadEntry::new(pixel, within >> 1, within & 1 != 0)
            }

            Self::Talbot { neighbors } => {
                WorkloadEntry::new(pixel, within / (neighbors + 1), false)
                    .with_extra(within % (neighbors + 1))
            }
        }
    }
}

/// Per-round retrace scheduling state: which (pixel, neighbour, direction)
/// slots need a shift evaluated, and where each slot's record lives.
///
/// The offset table is keyed by the slot, not by append order, so the
/// resampling output is bit-identical between the two schedules.
#[derive(Debug)]
pub struct RetraceWorkload {
    schedule: RetraceSchedule,
    kind: WorkloadKind,
    offsets: Vec<u32>,
    entries: Vec<WorkloadEntry>,
    records: Vec<ShiftRecord>,
    counter: AtomicU32,
}

impl RetraceWorkload {
    pub fn new() -> Self {
        Self {
            schedule: RetraceSchedule::default(),
            kind: WorkloadKind::Pairwise { neighbors: 1 },
            offsets: Vec::new(),
            entries: Vec::new(),
            records: Vec::new(),
            counter: AtomicU32::new(0),
        }
    }

    pub fn kind(&self) -> WorkloadKind {
        self.kind
    }

    /// Number of slots marked admissible during the last
    /// [`Self::produce()`].
    pub fn marked(&self) -> u32 {
        self.counter.load(Ordering::Relaxed)
    }

    /// Marks admissible slots and schedules them.
    ///
    /// `mark` runs once per pixel and flags the pixel's admissible slots
    /// by writing any non-sentinel value into them.
    pub fn produce(
        &mut self,
        device: &Device,
        pixel_count: usize,
        kind: WorkloadKind,
        schedule: RetraceSchedule,
        mark: impl Fn(usize, &mut [u32]) + Sync,
    ) {
        let spp = kind.slots_per_pixel();

        self.schedule = schedule;
        self.kind = kind;
        self.offsets.clear();
        self.offsets.resize(pixel_count * spp, INVALID_OFFSET);
        self.counter.store(0, Ordering::Relaxed);

        let counter = &self.counter;

        device.for_each_chunk(&mut self.offsets, spp, |pixel, slots| {
            mark(pixel, slots);

            let marked =
                slots.iter().filter(|slot| **slot != INVALID_OFFSET).count();

            counter.fetch_add(marked as u32, Ordering::Relaxed);
        });

        self.compact();
    }

    /// Turns slot marks into record offsets.
    ///
    /// Compaction walks the slots in order, so the record list is
    /// deterministic regardless of how the marking threads interleaved.
    fn compact(&mut self) {
        let spp = self.kind.slots_per_pixel();

        self.entries.clear();

        match self.schedule {
            RetraceSchedule::Naive => {
                let len = self.offsets.len().min(MAX_SHIFT_RECORDS);

                for (slot, offset) in self.offsets.iter_mut().enumerate() {
                    *offset = if *offset != INVALID_OFFSET
                        && slot < MAX_SHIFT_RECORDS
                    {
                        slot as u32
                    } else {
                        INVALID_OFFSET
                    };
                }

                self.records.clear();
                self.records.resize(len, ShiftRecord::default());
            }

            RetraceSchedule::Compact => {
                let mut next = 0;

                for slot in 0..self.offsets.len() {
                    if self.offsets[slot] == INVALID_OFFSET {
                        continue;
                    }

                    if next >= MAX_SHIFT_RECORDS {
                        self.offsets[slot] = INVALID_OFFSET;
                        continue;
                    }

                    self.offsets[slot] = next as u32;

                    self.entries.push(
                        self.kind
                            .entry((slot / spp) as u32, (slot % spp) as u32),
                    );

                    next += 1;
                }

                if next >= MAX_SHIFT_RECORDS {
                    debug!(
                        "Shift record cap hit: {} slots marked, {} kept",
                        self.marked(),
                        next,
                    );
                }

                self.records.clear();
                self.records.resize(next, ShiftRecord::default());
            }
        }
    }

    /// Evaluates `f` for every scheduled slot, filling its record.
    ///
    /// Under the naive schedule this also visits unmarked slots; `f` is
    /// only called for marked ones, the rest keep an invalid record.
    pub fn retrace(
        &mut self,
        device: &Device,
        f: impl Fn(WorkloadEntry, &mut ShiftRecord) + Sync,
    ) {
        let spp = self.kind.slots_per_pixel();

        match self.schedule {
            RetraceSchedule::Naive => {
                let offsets = &self.offsets;
                let kind = self.kind;

                device.for_each(&mut self.records, |slot, record| {
                    if offsets[slot] == INVALID_OFFSET {
                        *record = ShiftRecord::default();
                    } else {
                        f(
                            kind.entry(
                                (slot / spp) as u32,
                                (slot % spp) as u32,
                            ),
                            record,
                        );
                    }
                });
            }

            RetraceSchedule::Compact => {
                let entries = &self.entries;

                device.for_each(&mut self.records, |id, record| {
                    f(entries[id], record);
                });
            }
        }
    }

    /// The record for given pixel and slot, if one was scheduled and the
    /// shift turned out valid.
    pub fn record(&self, pixel: usize, within: usize) -> Option<&ShiftRecord> {
        let spp = self.kind.slots_per_pixel();

        debug_assert!(within < spp);

        let offset = self.offsets[pixel * spp + within];

        if offset == INVALID_OFFSET {
            return None;
        }

        let record = &self.records[offset as usize];

        record.is_valid().then_some(record)
    }
}

impl Default for RetraceWorkload {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceDescriptor;

    fn device() -> Device {
        Device::new(DeviceDescriptor {
            threads: Some(2),
            ..Default::default()
        })
        .unwrap()
    }

    #[test]
    fn entry_packing_round_trips() {
        let entry = WorkloadEntry::new(12345, 5, true);

        assert_eq!(entry.pixel(), 12345);
        assert_eq!(entry.slot(), 5);
        assert!(entry.is_reverse());
    }

    fn run_schedule(schedule: RetraceSchedule) -> Vec<Option<f32>> {
        let device = device();
        let mut workload = RetraceWorkload::new();

        let kind = WorkloadKind::Pairwise { neighbors: 2 };

        // Mark every slot whose (pixel + slot) is even
        workload.produce(&device, 8, kind, schedule, |pixel, slots| {
            for (within, slot) in slots.iter_mut().enumerate() {
                if (pixel + within) % 2 == 0 {
                    *slot = 1;
                }
            }
        });

        workload.retrace(&device, |entry, record| {
            record.valid = 1;
            record.dst_pdf =
                (entry.pixel() * 100 + entry.slot() * 10) as f32
                    + entry.is_reverse() as u32 as f32;
        });

        (0..8)
            .flat_map(|pixel| {
                (0..kind.slots_per_pixel()).map(move |within| (pixel, within))
            })
            .map(|(pixel, within)| {
                workload.record(pixel, within).map(|record| record.dst_pdf)
            })
            .collect()
    }

    /// The two schedules must address records identically: same slots
    /// resolved, same values behind them.
    #[test]
    fn naive_and_compact_schedules_agree() {
        assert_eq!(
            run_schedule(RetraceSchedule::Naive),
            run_schedule(RetraceSchedule::Compact),
        );
    }

    #[test]
    fn compact_schedule_is_dense() {
        let device = device();
        let mut workload = RetraceWorkload::new();

        workload.produce(
            &device,
            4,
            WorkloadKind::Pairwise { neighbors: 1 },
            RetraceSchedule::Compact,
            |pixel, slots| {
                if pixel == 2 {
                    slots[0] = 1;
                    slots[1] = 1;
                }
            },
        );

        assert_eq!(workload.marked(), 2);
        assert_eq!(workload.records.len(), 2);
        assert_eq!(workload.entries.len(), 2);
    }
}
