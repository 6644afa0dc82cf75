//! Add patterns: vector-bias epilogues, bitcast commutation, and
//! matrix-bias (beta) fusion.

use smallvec::SmallVec;
use zarya_ir::pattern::any_order;
use zarya_ir::{BinaryOp, CustomCallTarget, Epilogue, GemmBackendConfig, InstrId, Op};

use crate::error::Result;
use crate::fold::fold_constant_bias;
use crate::matchers::{is_cublas_gemm, is_lt_gemm, supports_epilogue_fusion};
use crate::visitor::GemmRewriteVisitor;

pub(crate) fn handle_add(v: &mut GemmRewriteVisitor<'_>, add: InstrId) -> Result<()> {
    if try_fuse_vector_bias(v, add)? {
        return Ok(());
    }
    if try_commute_bitcast(v, add)? {
        return Ok(());
    }
    try_fuse_matrix_bias(v, add)?;
    Ok(())
}

/// `add(gemm, broadcast(vector))` (directly or through a slice of the gemm)
/// appends the vector as a bias operand of the lt call.
///
/// The broadcast is admissible when the bias vector covers exactly the
/// most-minor physical dimensions of the gemm output, in physical order;
/// that is the contiguity the lt library requires of its bias pointer.
fn try_fuse_vector_bias(v: &mut GemmRewriteVisitor<'_>, add: InstrId) -> Result<bool> {
    let comp = v.comp();
    let Op::Binary(BinaryOp::Add, a, b) = comp.op(add) else { return Ok(false) };
    let matched = any_order(*a, *b, |lhs, rhs| {
        let (gemm, slice) = match comp.op(lhs) {
            Op::Slice { src, .. } => (*src, Some(lhs)),
            _ => (lhs, None),
        };
        if !is_lt_gemm(comp, gemm) {
            return None;
        }
        let Op::Broadcast { src: bias, dims } = comp.op(rhs) else { return None };
        Some((gemm, slice, *bias, dims.clone()))
    });
    let Some((gemm, slice, bias, broadcast_dims)) = matched else { return Ok(false) };

    if comp.user_count(gemm) != 1 {
        return Ok(false);
    }
    if let Some(slice) = slice
        && comp.user_count(slice) != 1
    {
        return Ok(false);
    }
    let Some(out_ty) = comp.shape(gemm).element_type() else { return Ok(false) };
    if !supports_epilogue_fusion(out_ty) {
        return Ok(false);
    }
    let mut config = comp.gemm_backend_config(gemm)?;
    if config.epilogue != Epilogue::Default {
        return Ok(false);
    }

    let Some(rhs_operand) = comp.op(gemm).operand(1) else { return Ok(false) };
    let Some(rhs_rank) = comp.shape(rhs_operand).rank() else { return Ok(false) };
    let Some(bias_rank) = comp.shape(bias).rank() else { return Ok(false) };
    if bias_rank != config.dot_dimension_numbers.rhs_non_contracting_count(rhs_rank) {
        return Ok(false);
    }

    // The bias must span the k most-minor physical dimensions of the output,
    // with its own layout mirroring their physical order and its sizes taken
    // from the unsliced gemm output. A slice that narrows a covered dimension
    // leaves the bias too small for the call, so size mismatches decline.
    let Some(out_layout) = comp.shape(gemm).minor_to_major() else { return Ok(false) };
    let Some(out_dims) = comp.shape(gemm).dims() else { return Ok(false) };
    let Some(bias_layout) = comp.shape(bias).minor_to_major() else { return Ok(false) };
    let Some(bias_dims) = comp.shape(bias).dims() else { return Ok(false) };
    for i in 0..bias_rank {
        let physical = out_layout[i];
        let Some(position) = broadcast_dims.iter().position(|&d| d == physical) else {
            return Ok(false);
        };
        if bias_layout[i] != position as i64 {
            return Ok(false);
        }
        if bias_dims[position] != out_dims[physical as usize] {
            return Ok(false);
        }
    }

    config.epilogue = Epilogue::Bias;
    v.comp_mut().append_operand(gemm, bias)?;
    v.comp_mut().set_gemm_backend_config(gemm, &config)?;
    let replacement = slice.unwrap_or(gemm);
    v.comp_mut().replace_instruction(add, replacement)?;
    v.committed("vector-bias", gemm);
    Ok(true)
}

/// `add(bitcast(gemm), other)` commutes the bitcast below the add, producing
/// `bitcast(add(gemm, bitcast(other)))` so the matrix-bias fusion can see a
/// same-shaped add. Only attempted when that fusion would go through.
fn try_commute_bitcast(v: &mut GemmRewriteVisitor<'_>, add: InstrId) -> Result<bool> {
    let comp = v.comp();
    let Op::Binary(BinaryOp::Add, a, b) = comp.op(add) else { return Ok(false) };
    let matched = any_order(*a, *b, |lhs, rhs| {
        let Op::Bitcast { src: gemm } = comp.op(lhs) else { return None };
        is_cublas_gemm(comp, *gemm).then_some((lhs, *gemm, rhs))
    });
    let Some((bitcast, gemm, other)) = matched else { return Ok(false) };

    if comp.user_count(bitcast) != 1 {
        return Ok(false);
    }
    if comp.shape(other).byte_size() != comp.shape(gemm).byte_size() {
        return Ok(false);
    }
    let config = comp.gemm_backend_config(gemm)?;
    if !matrix_bias_admissible(v, gemm, &config) {
        return Ok(false);
    }

    let gemm_shape = comp.shape(gemm).clone();
    let add_shape = comp.shape(add).clone();
    let comp = v.comp_mut();
    let other_view = comp.add(Op::Bitcast { src: other }, gemm_shape.clone());
    let inner = comp.add(Op::Binary(BinaryOp::Add, gemm, other_view), gemm_shape);
    let outer = comp.add(Op::Bitcast { src: inner }, add_shape);
    comp.replace_instruction(add, outer)?;
    v.committed("bitcast-commute", outer);

    try_fuse_matrix_bias(v, inner)?;
    Ok(true)
}

/// `add(gemm, bias)` with matching shapes folds into `beta = 1` with the
/// bias as the third operand.
fn try_fuse_matrix_bias(v: &mut GemmRewriteVisitor<'_>, add: InstrId) -> Result<bool> {
    let comp = v.comp();
    let Op::Binary(BinaryOp::Add, a, b) = comp.op(add) else { return Ok(false) };
    let Some((gemm, bias)) = any_order(*a, *b, |gemm, bias| {
        (is_cublas_gemm(comp, gemm) && comp.shape(gemm).compatible(comp.shape(bias)))
            .then_some((gemm, bias))
    }) else {
        return Ok(false);
    };

    let mut config = comp.gemm_backend_config(gemm)?;
    if !matrix_bias_admissible(v, gemm, &config) {
        return Ok(false);
    }

    let bias = fold_constant_bias(v.comp_mut(), bias);
    let comp = v.comp();
    let target = comp
        .custom_call_target(gemm)
        .unwrap_or(CustomCallTarget::GemmLegacy);
    // The runtime accumulates in place; advertise that the bias buffer may
    // back the output unless someone else still reads it.
    let bias_is_parameter = matches!(comp.op(bias), Op::Parameter { .. });
    let aliases = target == CustomCallTarget::GemmLegacy
        || (!bias_is_parameter && comp.user_count(bias) <= 1);

    let mut operands: SmallVec<[InstrId; 7]> = comp.op(gemm).operands().into_iter().collect();
    operands.insert(2, bias);
    config.beta = 1.0;
    let shape = comp.shape(gemm).clone();

    let comp = v.comp_mut();
    let fused = comp.add_gemm_custom_call(target, &operands, &config, shape)?;
    if aliases {
        comp.set_output_operand_aliasing(fused, [2])?;
    }
    comp.copy_metadata(gemm, fused);
    comp.replace_instruction(add, fused)?;
    v.assign_gemm_name(fused)?;
    v.committed("matrix-bias", fused);
    Ok(true)
}

fn matrix_bias_admissible(
    v: &GemmRewriteVisitor<'_>,
    gemm: InstrId,
    config: &GemmBackendConfig,
) -> bool {
    let comp = v.comp();
    // beta is not representable for int32 accumulation.
    if comp.shape(gemm).element_type() == Some(zarya_dtype::PrimitiveType::S32) {
        return false;
    }
    if config.beta != 0.0 {
        return false;
    }
    if comp.user_count(gemm) != 1 {
        return false;
    }
    matches!(config.epilogue, Epilogue::Default | Epilogue::Bias)
}
