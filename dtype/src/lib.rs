//! Primitive element types and hardware descriptors for the Zarya compiler.
//!
//! This crate is deliberately small: it defines the scalar element types the
//! IR can carry, their storage sizes and numeric ranges, and the GPU
//! compute-capability descriptor that rewrite passes consult for
//! hardware-gated transformations.

/// Scalar element type of an array shape.
///
/// Complex types are stored as interleaved (real, imaginary) pairs, so their
/// byte size is twice that of the component type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[derive(strum::EnumCount, strum::EnumIter, strum::VariantArray)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub enum PrimitiveType {
    /// Boolean predicate.
    Pred,

    S8,
    S32,

    F8E4M3,
    F8E5M2,
    F16,
    BF16,
    F32,
    F64,

    /// Single-precision complex.
    C64,
    /// Double-precision complex.
    C128,
}

impl PrimitiveType {
    pub const fn byte_size(&self) -> usize {
        match self {
            Self::Pred | Self::S8 | Self::F8E4M3 | Self::F8E5M2 => 1,
            Self::F16 | Self::BF16 => 2,
            Self::S32 | Self::F32 => 4,
            Self::F64 | Self::C64 => 8,
            Self::C128 => 16,
        }
    }

    pub const fn is_integer(&self) -> bool {
        matches!(self, Self::S8 | Self::S32)
    }

    pub const fn is_floating(&self) -> bool {
        matches!(self, Self::F8E4M3 | Self::F8E5M2 | Self::F16 | Self::BF16 | Self::F32 | Self::F64)
    }

    pub const fn is_complex(&self) -> bool {
        matches!(self, Self::C64 | Self::C128)
    }

    pub const fn is_fp8(&self) -> bool {
        matches!(self, Self::F8E4M3 | Self::F8E5M2)
    }

    /// Largest finite value representable in an FP8 format.
    ///
    /// Returns `None` for non-FP8 types. E4M3 follows the "FN" (finite-only)
    /// convention used by accelerator libraries: max = 448. E5M2 keeps the
    /// IEEE-style layout: max = 57344.
    pub const fn fp8_max(&self) -> Option<f64> {
        match self {
            Self::F8E4M3 => Some(448.0),
            Self::F8E5M2 => Some(57344.0),
            _ => None,
        }
    }

    pub const fn name(&self) -> &'static str {
        match self {
            Self::Pred => "pred",
            Self::S8 => "s8",
            Self::S32 => "s32",
            Self::F8E4M3 => "f8e4m3",
            Self::F8E5M2 => "f8e5m2",
            Self::F16 => "f16",
            Self::BF16 => "bf16",
            Self::F32 => "f32",
            Self::F64 => "f64",
            Self::C64 => "c64",
            Self::C128 => "c128",
        }
    }
}

impl std::fmt::Display for PrimitiveType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.name())
    }
}

/// CUDA compute capability, ordered lexicographically by (major, minor).
///
/// Rewrite passes capture one of these at construction time; the pass itself
/// never queries the hardware.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[cfg_attr(feature = "serde", derive(serde::Serialize, serde::Deserialize))]
pub struct ComputeCapability {
    pub major: i32,
    pub minor: i32,
}

impl ComputeCapability {
    pub const VOLTA: Self = Self { major: 7, minor: 0 };
    pub const AMPERE: Self = Self { major: 8, minor: 0 };
    pub const HOPPER: Self = Self { major: 9, minor: 0 };

    pub const fn new(major: i32, minor: i32) -> Self {
        Self { major, minor }
    }

    pub const fn is_at_least(&self, other: Self) -> bool {
        self.major > other.major || (self.major == other.major && self.minor >= other.minor)
    }
}

impl std::fmt::Display for ComputeCapability {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "sm_{}{}", self.major, self.minor)
    }
}
