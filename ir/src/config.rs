//! The typed view of the backend-config blob carried on gemm custom-calls.
//!
//! On the instruction the config is an opaque JSON string; rewrites decode it
//! once per match attempt, treat the decoded record as immutable while
//! matching, and encode a fresh copy when they commit a change.

use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Fused scalar epilogue applied to the matmul result.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Epilogue {
    #[default]
    Default,
    Bias,
    Relu,
    Gelu,
    GeluAux,
    BiasRelu,
    BiasGelu,
    BiasGeluAux,
}

impl Epilogue {
    /// Epilogue after fusing a ReLU on top, if the combination exists.
    pub fn with_relu(self) -> Option<Epilogue> {
        match self {
            Self::Default => Some(Self::Relu),
            Self::Bias => Some(Self::BiasRelu),
            _ => None,
        }
    }

    /// Epilogue after fusing a tanh-approximation GELU on top. `aux` selects
    /// the variant that also emits the pre-activation value.
    pub fn with_gelu(self, aux: bool) -> Option<Epilogue> {
        match (self, aux) {
            (Self::Default, false) => Some(Self::Gelu),
            (Self::Default, true) => Some(Self::GeluAux),
            (Self::Bias, false) => Some(Self::BiasGelu),
            (Self::Bias, true) => Some(Self::BiasGeluAux),
            _ => None,
        }
    }

    /// True for the `*Aux` variants, which widen the call to a tuple output.
    pub fn has_aux_output(self) -> bool {
        matches!(self, Self::GeluAux | Self::BiasGeluAux)
    }
}

/// Which logical dimensions of each dot operand are batch and contracting
/// dimensions. Dimensions named in neither set are the free (output) rows and
/// columns.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DotDimensionNumbers {
    pub lhs_batch: SmallVec<[i64; 1]>,
    pub lhs_contracting: SmallVec<[i64; 1]>,
    pub rhs_batch: SmallVec<[i64; 1]>,
    pub rhs_contracting: SmallVec<[i64; 1]>,
}

impl DotDimensionNumbers {
    pub fn has_batch(&self) -> bool {
        !self.lhs_batch.is_empty() || !self.rhs_batch.is_empty()
    }

    /// Product of the lhs batch dimension sizes.
    pub fn batch_size(&self, lhs_dims: &[i64]) -> i64 {
        self.lhs_batch.iter().map(|&d| lhs_dims[d as usize]).product()
    }

    /// Number of rhs dimensions that are neither batch nor contracting.
    pub fn rhs_non_contracting_count(&self, rhs_rank: usize) -> usize {
        rhs_rank - self.rhs_batch.len() - self.rhs_contracting.len()
    }

    /// Product of the rhs free dimension sizes.
    pub fn rhs_non_contracting_size(&self, rhs_dims: &[i64]) -> i64 {
        rhs_dims
            .iter()
            .enumerate()
            .filter(|(i, _)| {
                let i = *i as i64;
                !self.rhs_batch.contains(&i) && !self.rhs_contracting.contains(&i)
            })
            .map(|(_, &d)| d)
            .product()
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Precision {
    #[default]
    Default,
    High,
    Highest,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrecisionConfig {
    pub operand_precision: SmallVec<[Precision; 2]>,
}

/// Backend config of a gemm custom-call: `alpha * op(A) * op(B) + beta * C`
/// plus a fused epilogue.
///
/// `alpha` and `beta` are meaningful only for non-int32 outputs.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GemmBackendConfig {
    pub alpha_real: f64,
    pub alpha_imag: f64,
    pub beta: f64,
    pub dot_dimension_numbers: DotDimensionNumbers,
    pub precision_config: PrecisionConfig,
    pub epilogue: Epilogue,
}

impl GemmBackendConfig {
    /// Fresh config for a newly lowered dot: `alpha = 1 + 0i`, `beta = 0`,
    /// no epilogue.
    pub fn for_dot(
        dot_dimension_numbers: DotDimensionNumbers,
        precision_config: PrecisionConfig,
    ) -> Self {
        Self {
            alpha_real: 1.0,
            alpha_imag: 0.0,
            beta: 0.0,
            dot_dimension_numbers,
            precision_config,
            epilogue: Epilogue::Default,
        }
    }

    /// Complex-multiply `(re, im)` into alpha.
    pub fn scale_alpha(&mut self, re: f64, im: f64) {
        let (ar, ai) = (self.alpha_real, self.alpha_imag);
        self.alpha_real = ar * re - ai * im;
        self.alpha_imag = ar * im + ai * re;
    }

    pub fn from_json(blob: &str) -> serde_json::Result<Self> {
        serde_json::from_str(blob)
    }

    pub fn to_json(&self) -> serde_json::Result<String> {
        serde_json::to_string(self)
    }
}

/// Runtime library entry point a gemm custom-call dispatches to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CustomCallTarget {
    GemmLegacy,
    GemmLt,
    GemmFp8,
}

impl CustomCallTarget {
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::GemmLegacy => "gemm-legacy",
            Self::GemmLt => "gemm-lt",
            Self::GemmFp8 => "gemm-fp8",
        }
    }
}

impl std::fmt::Display for CustomCallTarget {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
