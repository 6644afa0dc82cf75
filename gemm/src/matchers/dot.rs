//! Lowering of `dot` instructions to gemm custom-calls.

use zarya_dtype::PrimitiveType;
use zarya_ir::{GemmBackendConfig, InstrId, Op};

use crate::error::Result;
use crate::matchers::fp8;
use crate::target::choose_gemm_target;
use crate::visitor::GemmRewriteVisitor;

/// Operand element types the runtime has a matmul kernel for.
fn is_supported_operand_type(ty: PrimitiveType) -> bool {
    matches!(
        ty,
        PrimitiveType::S8
            | PrimitiveType::F16
            | PrimitiveType::BF16
            | PrimitiveType::F32
            | PrimitiveType::F64
            | PrimitiveType::C64
            | PrimitiveType::C128
    )
}

/// True for transposes a later layout-assignment step folds into the matmul
/// itself; lowering across them here would pin the unfused operand order.
fn is_foldable_transpose(v: &GemmRewriteVisitor<'_>, id: InstrId) -> bool {
    matches!(v.comp().op(id), Op::Transpose { .. }) && v.comp().shape(id).rank() == Some(2)
}

pub(crate) fn handle_dot(v: &mut GemmRewriteVisitor<'_>, dot: InstrId) -> Result<()> {
    let Op::Dot { lhs, rhs, dot_dimension_numbers, precision_config } = v.comp().op(dot) else {
        return Ok(());
    };
    let (lhs, rhs) = (*lhs, *rhs);
    let dnums = dot_dimension_numbers.clone();
    let precision = precision_config.clone();

    if is_foldable_transpose(v, lhs) || is_foldable_transpose(v, rhs) {
        tracing::trace!(dot = %v.comp().instr(dot).name(), "skipping dot with foldable transpose");
        return Ok(());
    }
    let (Some(lhs_ty), Some(rhs_ty)) =
        (v.comp().shape(lhs).element_type(), v.comp().shape(rhs).element_type())
    else {
        return Ok(());
    };
    if lhs_ty != rhs_ty || !is_supported_operand_type(lhs_ty) {
        return Ok(());
    }

    let config = GemmBackendConfig::for_dot(dnums, precision);
    let out_shape = v.comp().shape(dot).clone();
    let target = choose_gemm_target(
        v.comp(),
        lhs,
        rhs,
        &out_shape,
        &config,
        v.capability,
        v.module.config.enable_lt_gemm,
    );

    let call = v.comp_mut().add_gemm_custom_call(target, &[lhs, rhs], &config, out_shape)?;
    v.comp_mut().copy_metadata(dot, call);
    v.comp_mut().replace_instruction(dot, call)?;
    v.assign_gemm_name(call)?;
    v.committed("dot", call);

    fp8::try_rewrite_scaled_gemm(v, call)?;
    Ok(())
}
