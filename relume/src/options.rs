use relume_gpu::{ReservoirLayout, ShiftMapping, ShiftSettings};

use crate::{Error, KernelDefines, Result, RetraceSchedule};

/// Engine configuration.
///
/// Validated once, up front, through [`Options::validate()`]; passes assume
/// the ranges hold and only `debug_assert!` on them.
#[derive(Clone, Debug, PartialEq)]
pub struct Options {
    /// Reservoirs kept per pixel.
    pub reservoir_count_per_pixel: u32,

    /// Bounces a camera prefix takes before suffixes attach to it.
    pub minimum_prefix_length: u32,

    /// Bounces a suffix may take past the reconnection vertex.
    pub max_suffix_bounces: u32,

    /// Packed element layout of the suffix reservoir buffers; `Compressed`
    /// halves the footprint at the cost of lossy radiance and normal
    /// encodings.
    pub layout: ReservoirLayout,

    pub shift_mapping: ShiftMapping,
    pub shift: ShiftSettings,
    pub retrace_schedule: RetraceSchedule,
    pub subpath: SubpathSettings,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            reservoir_count_per_pixel: 1,
            minimum_prefix_length: 1,
            max_suffix_bounces: 4,
            layout: ReservoirLayout::Compressed,
            shift_mapping: ShiftMapping::Hybrid,
            shift: ShiftSettings::default(),
            retrace_schedule: RetraceSchedule::Compact,
            subpath: SubpathSettings::default(),
        }
    }
}

/// Subpath-reuse tunables.
#[derive(Clone, Debug, PartialEq)]
pub struct SubpathSettings {
    pub suffix_spatial_neighbor_count: u32,
    /// Screen-space reuse radius, in pixels.
    pub suffix_spatial_reuse_radius: f32,
    pub suffix_spatial_reuse_rounds: u32,
    pub suffix_temporal_reuse: bool,
    /// Confidence cap applied to history reservoirs during temporal merges.
    pub temporal_history_length: f32,
    pub num_integration_prefixes: u32,
    pub generate_canonical_suffix_for_each_prefix: bool,
    pub final_gather_suffix_count: u32,
    /// World-space radius of the final-gather prefix search.
    pub prefix_neighbor_search_radius: f32,
    pub use_talbot_mis_for_gather: bool,
    pub non_canonical_weight_multiplier: f32,
}

impl Default for SubpathSettings {
    fn default() -> Self {
        Self {
            suffix_spatial_neighbor_count: 4,
            suffix_spatial_reuse_radius: 32.0,
            suffix_spatial_reuse_rounds: 1,
            suffix_temporal_reuse: true,
            temporal_history_length: 20.0,
            num_integration_prefixes: 8,
            generate_canonical_suffix_for_each_prefix: false,
            final_gather_suffix_count: 1,
            prefix_neighbor_search_radius: 0.25,
            use_talbot_mis_for_gather: false,
            non_canonical_weight_multiplier: 1.0,
        }
    }
}

impl Options {
    pub fn validate(&self) -> Result<()> {
        fn check(
            option: &'static str,
            value: f32,
            min: f32,
            max: f32,
        ) -> Result<()> {
            if value < min || value > max {
                Err(Error::OptionOutOfRange {
                    option,
                    value,
                    min,
                    max,
                })
            } else {
                Ok(())
            }
        }

        check(
            "reservoir_count_per_pixel",
            self.reservoir_count_per_pixel as f32,
            1.0,
            8.0,
        )?;

        check(
            "minimum_prefix_length",
            self.minimum_prefix_length as f32,
            1.0,
            16.0,
        )?;

        check(
            "max_suffix_bounces",
            self.max_suffix_bounces as f32,
            1.0,
            16.0,
        )?;

        check(
            "shift.specular_roughness_threshold",
            self.shift.specular_roughness_threshold,
            0.0,
            1.0,
        )?;

        check(
            "shift.near_field_distance_threshold",
            self.shift.near_field_distance_threshold,
            0.0,
            f32::MAX,
        )?;

        let subpath = &self.subpath;

        check(
            "subpath.suffix_spatial_neighbor_count",
            subpath.suffix_spatial_neighbor_count as f32,
            1.0,
            8.0,
        )?;

        check(
            "subpath.suffix_spatial_reuse_radius",
            subpath.suffix_spatial_reuse_radius,
            0.0,
            f32::MAX,
        )?;

        check(
            "subpath.suffix_spatial_reuse_rounds",
            subpath.suffix_spatial_reuse_rounds as f32,
            0.0,
            16.0,
        )?;

        check(
            "subpath.temporal_history_length",
            subpath.temporal_history_length,
            0.0,
            100.0,
        )?;

        check(
            "subpath.num_integration_prefixes",
            subpath.num_integration_prefixes as f32,
            1.0,
            128.0,
        )?;

        check(
            "subpath.final_gather_suffix_count",
            subpath.final_gather_suffix_count as f32,
            1.0,
            8.0,
        )?;

        check(
            "subpath.prefix_neighbor_search_radius",
            subpath.prefix_neighbor_search_radius,
            0.0,
            f32::MAX,
        )?;

        check(
            "subpath.non_canonical_weight_multiplier",
            subpath.non_canonical_weight_multiplier,
            0.0,
            100.0,
        )?;

        Ok(())
    }

    /// Whether switching to `other` changes the size or layout of any
    /// persistent buffer, forcing reallocation on top of the usual
    /// recompile-and-reset.
    pub fn invalidates_buffers(&self, other: &Self) -> bool {
        self.layout != other.layout
            || self.reservoir_count_per_pixel != other.reservoir_count_per_pixel
            || self.subpath.suffix_spatial_neighbor_count
                != other.subpath.suffix_spatial_neighbor_count
            || self.subpath.final_gather_suffix_count
                != other.subpath.final_gather_suffix_count
            || self.subpath.use_talbot_mis_for_gather
                != other.subpath.use_talbot_mis_for_gather
    }

    /// Specialization defines baked into the resampling kernels; changing
    /// any of them invalidates the kernel cache.
    pub fn defines(&self) -> KernelDefines {
        vec![
            (
                "USE_RESERVOIR_COMPRESSION",
                match self.layout {
                    ReservoirLayout::Full => "0".into(),
                    ReservoirLayout::Compressed => "1".into(),
                },
            ),
            (
                "SHIFT_MAPPING",
                match self.shift_mapping {
                    ShiftMapping::Reconnection => "RECONNECTION".into(),
                    ShiftMapping::Hybrid => "HYBRID".into(),
                },
            ),
            (
                "RETRACE_SCHEDULE",
                match self.retrace_schedule {
                    RetraceSchedule::Naive => "NAIVE".into(),
                    RetraceSchedule::Compact => "COMPACT".into(),
                },
            ),
            (
                "SUFFIX_SPATIAL_NEIGHBOR_COUNT",
                self.subpath.suffix_spatial_neighbor_count.to_string(),
            ),
            (
                "FINAL_GATHER_SUFFIX_COUNT",
                self.subpath.final_gather_suffix_count.to_string(),
            ),
            (
                "USE_TALBOT_MIS_FOR_GATHER",
                if self.subpath.use_talbot_mis_for_gather {
                    "1".into()
                } else {
                    "0".into()
                },
            ),
        ]
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_options_validate() {
        Options::default().validate().unwrap();
    }

    #[test]
    fn out_of_range_neighbor_count_is_rejected() {
        let mut options = Options::default();

        options.subpath.suffix_spatial_neighbor_count = 9;

        assert!(matches!(
            options.validate(),
            Err(Error::OptionOutOfRange {
                option: "subpath.suffix_spatial_neighbor_count",
                ..
            })
        ));
    }

    #[test]
    fn layout_change_invalidates_buffers() {
        let a = Options::default();

        let b = Options {
            layout: ReservoirLayout::Full,
            ..a.clone()
        };

        assert!(a.invalidates_buffers(&b));

        let c = Options {
            shift_mapping: ShiftMapping::Reconnection,
            ..a.clone()
        };

        assert!(!a.invalidates_buffers(&c));
    }
}
