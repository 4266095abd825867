/// Helper for calculating factors for multiple importance sampling.
///
/// Code assumes we'd like to merge two samples, where `lhs` is the canonical
/// one and `rhs` is the (shifted) neighbour. All densities are target
/// densities; `lhs_rhs_pdf` must already include the reverse-shift jacobian,
/// the forward jacobian is passed separately via `rhs_jacobian`.
#[derive(Clone, Copy, Debug, Default)]
pub struct Mis {
    /// Confidence weight of the canonical sample.
    pub lhs_m: f32,

    /// Confidence weight of the neighbour sample.
    pub rhs_m: f32,

    /// Jacobian determinant of shifting the neighbour sample here; 1.0 if
    /// not applicable.
    pub rhs_jacobian: f32,

    /// `p_lhs(lhs)`: canonical sample's density in its own domain.
    pub lhs_lhs_pdf: f32,

    /// `p_rhs(lhs)`: canonical sample's density shifted into the neighbour's
    /// domain, jacobian included.
    pub lhs_rhs_pdf: f32,

    /// `p_lhs(rhs)`: neighbour sample's density shifted into the canonical
    /// domain.
    pub rhs_lhs_pdf: f32,

    /// `p_rhs(rhs)`: neighbour sample's density in its own domain.
    pub rhs_rhs_pdf: f32,
}

impl Mis {
    pub fn eval(self) -> MisResult {
        fn bal(x: f32, y: f32) -> f32 {
            let sum = x + y;

            if sum <= 0.0 {
                0.0
            } else {
                x / sum
            }
        }

        MisResult {
            lhs_mis: bal(
                self.lhs_m * self.lhs_lhs_pdf,
                self.rhs_m * self.lhs_rhs_pdf,
            ),
            rhs_mis: bal(
                self.rhs_m * self.rhs_rhs_pdf,
                self.lhs_m * self.rhs_lhs_pdf * self.rhs_jacobian,
            ),
        }
    }
}

#[derive(Clone, Copy, Debug, Default)]
pub struct MisResult {
    pub lhs_mis: f32,
    pub rhs_mis: f32,
}

/// Talbot-MIS weight of candidate `i`: `c_i * p_i[i] / sum_j(c_j * p_i[j])`,
/// where `p_i[j]` is candidate i's target density shifted into domain j
/// (jacobian folded in by the caller) and `c_j` are confidence weights.
///
/// Unlike the pairwise balance heuristic this evaluates every candidate's
/// density in every domain, which is what the gather retrace pass produces.
pub fn talbot_mis_weight(confidence: &[f32], p_i: &[f32], i: usize) -> f32 {
    let denom: f32 = confidence
        .iter()
        .zip(p_i)
        .map(|(c, p)| c * p)
        .sum();

    if denom <= 0.0 {
        0.0
    } else {
        confidence[i] * p_i[i] / denom
    }
}
