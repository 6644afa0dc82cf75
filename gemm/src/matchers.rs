//! Pattern matchers, one module per dispatching opcode.
//!
//! Each handler re-checks its own preconditions against the live graph; the
//! driver only routes by opcode. Handlers that commit a rewrite set the
//! visitor's `changed` flag and sweep unreachable nodes so later user-count
//! checks stay honest.

pub(crate) mod add;
pub(crate) mod dot;
pub(crate) mod fp8;
pub(crate) mod maximum;
pub(crate) mod multiply;

use zarya_dtype::PrimitiveType;
use zarya_ir::{Computation, CustomCallTarget, InstrId, Op};

/// Target of a gemm custom-call, or `None` for any other instruction.
pub(crate) fn gemm_target(comp: &Computation, id: InstrId) -> Option<CustomCallTarget> {
    comp.custom_call_target(id)
}

/// True for both matmul lowerings the epilogue matchers apply to.
pub(crate) fn is_cublas_gemm(comp: &Computation, id: InstrId) -> bool {
    matches!(
        gemm_target(comp, id),
        Some(CustomCallTarget::GemmLegacy | CustomCallTarget::GemmLt)
    )
}

pub(crate) fn is_lt_gemm(comp: &Computation, id: InstrId) -> bool {
    gemm_target(comp, id) == Some(CustomCallTarget::GemmLt)
}

/// Look through one slice or bitcast view. Returns the underlying value and
/// the view instruction, if any.
pub(crate) fn strip_view(comp: &Computation, id: InstrId) -> (InstrId, Option<InstrId>) {
    match comp.op(id) {
        Op::Slice { src, .. } | Op::Bitcast { src } => (*src, Some(id)),
        _ => (id, None),
    }
}

/// Element types the lt library supports fused bias/activation epilogues for.
pub(crate) fn supports_epilogue_fusion(ty: PrimitiveType) -> bool {
    matches!(
        ty,
        PrimitiveType::F16 | PrimitiveType::BF16 | PrimitiveType::F32 | PrimitiveType::F64
    )
}
