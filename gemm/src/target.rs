//! Custom-call target selection and instruction naming.

use zarya_dtype::{ComputeCapability, PrimitiveType};
use zarya_ir::{Computation, CustomCallTarget, GemmBackendConfig, InstrId, Shape};

/// Largest batch-dimension product the lt runtime accepts.
pub const MAX_LT_BATCH: i64 = 65_535;

/// Largest rhs non-contracting element count for complex64 lt matmuls on
/// pre-Ampere hardware.
pub const COMPLEX64_LT_RHS_ROW_LIMIT: i64 = 4_194_240;

/// Accumulator precision the lt library runs a combination at.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ComputeType {
    F16,
    F32,
    F64,
    I32,
    /// f16 inputs upconverted and accumulated in f32.
    F16AsF32,
    Bf16AsF32,
    Tf32AsF32,
}

/// One row of the lt library's supported (compute, scale, operand, output)
/// combinations. The compute and scale columns are carried as data so the
/// table stays diffable against library release notes.
#[derive(Debug, Clone, Copy)]
pub struct LtTypeCombination {
    pub compute: ComputeType,
    pub scale: PrimitiveType,
    pub operand: PrimitiveType,
    pub output: PrimitiveType,
}

const fn row(
    compute: ComputeType,
    scale: PrimitiveType,
    operand: PrimitiveType,
    output: PrimitiveType,
) -> LtTypeCombination {
    LtTypeCombination { compute, scale, operand, output }
}

/// Type combinations the lt matmul entry point supports. Lookup keys on
/// (operand, output); both operands must share one element type.
pub const LT_TYPE_TABLE: &[LtTypeCombination] = &[
    row(ComputeType::F16, PrimitiveType::F16, PrimitiveType::F16, PrimitiveType::F16),
    row(ComputeType::I32, PrimitiveType::S32, PrimitiveType::S8, PrimitiveType::S32),
    row(ComputeType::I32, PrimitiveType::F32, PrimitiveType::S8, PrimitiveType::S8),
    row(ComputeType::F32, PrimitiveType::F32, PrimitiveType::BF16, PrimitiveType::BF16),
    row(ComputeType::F32, PrimitiveType::F32, PrimitiveType::F16, PrimitiveType::F16),
    row(ComputeType::F32, PrimitiveType::F32, PrimitiveType::S8, PrimitiveType::F32),
    row(ComputeType::F32, PrimitiveType::F32, PrimitiveType::BF16, PrimitiveType::F32),
    row(ComputeType::F32, PrimitiveType::F32, PrimitiveType::F16, PrimitiveType::F32),
    row(ComputeType::F32, PrimitiveType::F32, PrimitiveType::F32, PrimitiveType::F32),
    row(ComputeType::F32, PrimitiveType::C64, PrimitiveType::C64, PrimitiveType::C64),
    row(ComputeType::F16AsF32, PrimitiveType::F32, PrimitiveType::F32, PrimitiveType::F32),
    row(ComputeType::F16AsF32, PrimitiveType::C64, PrimitiveType::C64, PrimitiveType::C64),
    row(ComputeType::Bf16AsF32, PrimitiveType::F32, PrimitiveType::F32, PrimitiveType::F32),
    row(ComputeType::Bf16AsF32, PrimitiveType::C64, PrimitiveType::C64, PrimitiveType::C64),
    row(ComputeType::Tf32AsF32, PrimitiveType::F32, PrimitiveType::F32, PrimitiveType::F32),
    row(ComputeType::Tf32AsF32, PrimitiveType::C64, PrimitiveType::C64, PrimitiveType::C64),
    row(ComputeType::F64, PrimitiveType::F64, PrimitiveType::F64, PrimitiveType::F64),
    row(ComputeType::F64, PrimitiveType::C128, PrimitiveType::C128, PrimitiveType::C128),
];

fn lt_supports(operand: PrimitiveType, output: PrimitiveType) -> bool {
    LT_TYPE_TABLE.iter().any(|r| r.operand == operand && r.output == output)
}

/// Pick `gemm-lt` when the module allows it and the combination is
/// admissible, otherwise fall back to `gemm-legacy`.
pub(crate) fn choose_gemm_target(
    comp: &Computation,
    lhs: InstrId,
    rhs: InstrId,
    out_shape: &Shape,
    config: &GemmBackendConfig,
    capability: ComputeCapability,
    enable_lt: bool,
) -> CustomCallTarget {
    if !enable_lt {
        return CustomCallTarget::GemmLegacy;
    }
    let (Some(lhs_ty), Some(rhs_ty), Some(out_ty)) = (
        comp.shape(lhs).element_type(),
        comp.shape(rhs).element_type(),
        out_shape.element_type(),
    ) else {
        return CustomCallTarget::GemmLegacy;
    };
    // The lt path has no int8 matmul entry point in this library version.
    if lhs_ty == PrimitiveType::S8 || rhs_ty == PrimitiveType::S8 {
        return CustomCallTarget::GemmLegacy;
    }
    if lhs_ty != rhs_ty || !lt_supports(lhs_ty, out_ty) {
        return CustomCallTarget::GemmLegacy;
    }
    let dnums = &config.dot_dimension_numbers;
    let (Some(lhs_dims), Some(rhs_dims)) = (comp.shape(lhs).dims(), comp.shape(rhs).dims()) else {
        return CustomCallTarget::GemmLegacy;
    };
    if dnums.batch_size(lhs_dims) > MAX_LT_BATCH {
        return CustomCallTarget::GemmLegacy;
    }
    // Pre-Ampere lt kernels cannot address large complex64 output panels.
    if out_ty == PrimitiveType::C64
        && !capability.is_at_least(ComputeCapability::AMPERE)
        && dnums.rhs_non_contracting_size(rhs_dims) > COMPLEX64_LT_RHS_ROW_LIMIT
    {
        return CustomCallTarget::GemmLegacy;
    }
    CustomCallTarget::GemmLt
}

/// Base instruction name for a gemm custom-call, uniquified module-wide by
/// the caller.
pub(crate) fn gemm_base_name(target: CustomCallTarget, has_batch: bool) -> &'static str {
    match target {
        CustomCallTarget::GemmLt => "cublas-lt-matmul",
        CustomCallTarget::GemmFp8 => "cublas-lt-matmul-f8",
        CustomCallTarget::GemmLegacy => {
            if has_batch {
                "cublas-batch-gemm"
            } else {
                "cublas-gemm"
            }
        }
    }
}
