mod suffix;

pub use self::suffix::*;
use crate::WhiteNoise;

/// Buffer layout of packed reservoirs.
///
/// The compressed layout shrinks suffix reservoirs from three quads down to
/// two by storing radiance as RGB9E5 and the reconnection normal as a packed
/// octahedral word; switching layouts changes the element stride, so all
/// reservoir buffers get reallocated when this option flips.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ReservoirLayout {
    Full,
    #[default]
    Compressed,
}

/// A streaming weighted sample, maintained via weighted reservoir sampling.
///
/// `m` counts the candidates this reservoir has seen (its confidence weight
/// for MIS-style combination); `w` is the running sum of candidate weights
/// while a combine is in flight and the normalized unbiased contribution
/// weight once [`Self::normalize()`] or [`Self::normalize_mis()`] has run.
#[derive(Clone, Copy, Debug, Default, PartialEq)]
pub struct Reservoir<T> {
    pub sample: T,
    pub m: f32,
    pub w: f32,
}

impl<T> Reservoir<T>
where
    T: Clone + Copy,
{
    /// Offers a fresh candidate; returns whether it got selected.
    pub fn update(
        &mut self,
        wnoise: &mut WhiteNoise,
        sample: T,
        weight: f32,
    ) -> bool {
        self.m += 1.0;

        if weight <= 0.0 {
            return false;
        }

        self.w += weight;

        if wnoise.sample() * self.w <= weight {
            self.sample = sample;
            true
        } else {
            false
        }
    }

    /// Offers another reservoir's selected sample, carrying over its
    /// confidence; `weight` is the full candidate weight (MIS weight times
    /// target density times contribution weight times jacobian), computed by
    /// the caller.
    pub fn merge(
        &mut self,
        wnoise: &mut WhiteNoise,
        rhs: &Self,
        weight: f32,
    ) -> bool {
        if rhs.m <= 0.0 {
            return false;
        }

        self.m += rhs.m;

        if weight <= 0.0 {
            return false;
        }

        self.w += weight;

        if wnoise.sample() * self.w <= weight {
            self.sample = rhs.sample;
            true
        } else {
            false
        }
    }

    /// Turns the running weight sum into an unbiased contribution weight,
    /// assuming all candidates came from one strategy (uniform 1/M MIS).
    pub fn normalize(&mut self, pdf: f32) {
        let t = self.m * pdf;

        self.w = if t == 0.0 { 0.0 } else { self.w / t };
    }

    /// Like [`Self::normalize()`], but for combines whose candidate weights
    /// already carried proper MIS weights summing to one.
    pub fn normalize_mis(&mut self, pdf: f32) {
        self.w = if pdf == 0.0 { 0.0 } else { self.w / pdf };
    }

    pub fn clamp_m(&mut self, max: f32) {
        self.m = self.m.min(max);
    }

    pub fn is_empty(&self) -> bool {
        self.m <= 0.0
    }
}
