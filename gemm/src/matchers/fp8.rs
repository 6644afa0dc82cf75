//! FP8 matmul rewrites.
//!
//! Two matchers cooperate here. The scaled-gemm matcher fires right after a
//! dot is lowered: when both operands are dequantized FP8 values
//! (`convert(fp8) * broadcast(scale)`), the whole dequantization moves into a
//! 7-operand `gemm-fp8` call. The output-epilogue matcher then recognizes the
//! requantization pattern `convert(clamp(divide(gemm, d_scale)))` downstream
//! of such a call and folds the d-scale and the optional DAmax reduction into
//! the call itself.

use smallvec::SmallVec;
use zarya_dtype::{ComputeCapability, PrimitiveType};
use zarya_ir::pattern::{any_order, broadcast_of_scalar_const, scalar_const};
use zarya_ir::{
    BinaryOp, ConstValue, CustomCallTarget, InstrId, Literal, Op, ReduceKind, Shape, UnaryOp,
};

use crate::error::Result;
use crate::matchers::{gemm_target, is_cublas_gemm};
use crate::visitor::GemmRewriteVisitor;

/// Hardware tile granularity of the FP8 tensor-core path.
const FP8_DIM_MULTIPLE: i64 = 16;

fn is_supported_fp8_pair(a: PrimitiveType, b: PrimitiveType) -> bool {
    // e5m2 x e5m2 has no kernel; every other fp8 pairing does.
    a.is_fp8() && b.is_fp8() && !(a == PrimitiveType::F8E5M2 && b == PrimitiveType::F8E5M2)
}

fn is_supported_fp8_output(ty: PrimitiveType) -> bool {
    ty.is_fp8()
        || matches!(ty, PrimitiveType::BF16 | PrimitiveType::F16 | PrimitiveType::F32)
}

/// `convert(fp8) * broadcast(scalar scale)`, used once.
fn match_scaled_operand(
    v: &GemmRewriteVisitor<'_>,
    id: InstrId,
) -> Option<(InstrId, InstrId)> {
    let comp = v.comp();
    let Op::Binary(BinaryOp::Multiply, p, q) = comp.op(id) else { return None };
    let found = any_order(*p, *q, |convert, scale| {
        let Op::Convert { src } = comp.op(convert) else { return None };
        if !comp.shape(*src).element_type().is_some_and(|ty| ty.is_fp8()) {
            return None;
        }
        let Op::Broadcast { src: scale, .. } = comp.op(scale) else { return None };
        if !comp.shape(*scale).is_scalar() {
            return None;
        }
        Some((*src, *scale))
    })?;
    (comp.user_count(id) == 1).then_some(found)
}

/// Rewrite a freshly lowered lt gemm over dequantized FP8 operands into a
/// `gemm-fp8` call carrying the raw FP8 buffers and their scales.
pub(crate) fn try_rewrite_scaled_gemm(
    v: &mut GemmRewriteVisitor<'_>,
    gemm: InstrId,
) -> Result<bool> {
    if !is_cublas_gemm(v.comp(), gemm) || !v.module.config.enable_lt_gemm {
        return Ok(false);
    }
    if !v.capability.is_at_least(ComputeCapability::HOPPER) {
        return Ok(false);
    }
    let comp = v.comp();
    let operands = comp.op(gemm).operands();
    let [a_mul, b_mul] = operands.as_slice() else { return Ok(false) };
    let Some((a, a_scale)) = match_scaled_operand(v, *a_mul) else { return Ok(false) };
    let Some((b, b_scale)) = match_scaled_operand(v, *b_mul) else { return Ok(false) };

    let comp = v.comp();
    let (Some(a_ty), Some(b_ty)) =
        (comp.shape(a).element_type(), comp.shape(b).element_type())
    else {
        return Ok(false);
    };
    if !is_supported_fp8_pair(a_ty, b_ty) {
        return Ok(false);
    }
    let (Some(a_dims), Some(b_dims)) = (comp.shape(a).dims(), comp.shape(b).dims()) else {
        return Ok(false);
    };
    if a_dims.iter().chain(b_dims).any(|&d| d % FP8_DIM_MULTIPLE != 0) {
        return Ok(false);
    }
    if b_dims.len() < 2 {
        return Ok(false);
    }
    let Some(out_ty) = comp.shape(gemm).element_type() else { return Ok(false) };
    if !is_supported_fp8_output(out_ty) {
        return Ok(false);
    }
    let Some(out_dims) = comp.shape(gemm).dims() else { return Ok(false) };
    let out_dims: SmallVec<[i64; 4]> = out_dims.into();

    let config = comp.gemm_backend_config(gemm)?;
    // The library accumulates FP8 outputs via a bf16 C matrix.
    let c_ty = if out_ty.is_fp8() { PrimitiveType::BF16 } else { out_ty };
    // The kernel wants B pre-transposed in its last two dimensions.
    let mut permutation: SmallVec<[i64; 4]> = (0..b_dims.len() as i64).collect();
    permutation.swap(b_dims.len() - 2, b_dims.len() - 1);

    let comp = v.comp_mut();
    let a_scale = comp.add_convert(a_scale, PrimitiveType::F32);
    let b_scale = comp.add_convert(b_scale, PrimitiveType::F32);
    let zero = comp.add_constant(Literal::zero(c_ty));
    let c = comp.add_broadcast(zero, &[], Shape::array(c_ty, &out_dims));
    let c_scale = comp.add_constant(Literal::one(PrimitiveType::F32));
    let d_scale = comp.add_constant(Literal::one(PrimitiveType::F32));
    let b_transposed = comp.add_transpose(b, &permutation);
    let call = comp.add_gemm_custom_call(
        CustomCallTarget::GemmFp8,
        &[a, b_transposed, c, a_scale, b_scale, c_scale, d_scale],
        &config,
        Shape::array(c_ty, &out_dims),
    )?;
    comp.copy_metadata(gemm, call);
    v.assign_gemm_name(call)?;

    if out_ty.is_fp8() {
        // Keep the module well-typed: the coerced bf16 output converts back
        // to the original fp8 type until the output-epilogue matcher folds
        // the requantization into the call.
        let back = v.comp_mut().add_convert(call, out_ty);
        v.comp_mut().replace_instruction(gemm, back)?;
    } else {
        v.comp_mut().replace_instruction(gemm, call)?;
    }
    v.committed("fp8-scaled-gemm", call);
    Ok(true)
}

/// The `abs -> reduce(max, -inf)` sibling computing the output amax.
fn match_damax(v: &GemmRewriteVisitor<'_>, abs: InstrId) -> Option<InstrId> {
    let comp = v.comp();
    let Op::Unary(UnaryOp::Abs, _) = comp.op(abs) else { return None };
    if comp.user_count(abs) != 1 {
        return None;
    }
    let reduce = *comp.users(abs).first()?;
    let Op::Reduce { init, kind: ReduceKind::Max, .. } = comp.op(reduce) else { return None };
    let init = scalar_const(comp, *init)?;
    (init == ConstValue::Float(f64::NEG_INFINITY)).then_some(reduce)
}

/// Fold the FP8 requantization epilogue
/// `convert(clamp(-max, divide(gemm, broadcast(d_scale)), max))` into the
/// `gemm-fp8` call, along with an optional DAmax reduction over the
/// unquantized output.
pub(crate) fn handle_convert(v: &mut GemmRewriteVisitor<'_>, convert: InstrId) -> Result<()> {
    let comp = v.comp();
    let Op::Convert { src: clamp } = comp.op(convert) else { return Ok(()) };
    let Some(out_ty) = comp.shape(convert).element_type() else { return Ok(()) };
    let Some(max) = out_ty.fp8_max() else { return Ok(()) };

    let Op::Clamp { lo, x: divide, hi } = comp.op(*clamp) else { return Ok(()) };
    let (lo, hi) = (*lo, *hi);
    // Divide is not commutative: the gemm must be the dividend.
    let Op::Binary(BinaryOp::Divide, gemm, scale_bcast) = comp.op(*divide) else {
        return Ok(());
    };
    let (divide, gemm, scale_bcast) = (*divide, *gemm, *scale_bcast);
    if gemm_target(comp, gemm) != Some(CustomCallTarget::GemmFp8) {
        return Ok(());
    }
    let Op::Broadcast { src: d_scale, .. } = comp.op(scale_bcast) else { return Ok(()) };
    let d_scale = *d_scale;
    if !comp.shape(d_scale).is_scalar() {
        return Ok(());
    }

    // The clamp bounds must be exactly the representable range of the target
    // type, compared at f32 precision.
    let bound = |id: InstrId| broadcast_of_scalar_const(comp, id).and_then(|c| c.as_f64());
    let (Some(lo), Some(hi)) = (bound(lo), bound(hi)) else { return Ok(()) };
    if (lo as f32) != -(max as f32) || (hi as f32) != (max as f32) {
        return Ok(());
    }

    // Besides the divide, the gemm may feed exactly one DAmax computation.
    let mut distinct: SmallVec<[InstrId; 4]> = comp.users(gemm).iter().copied().collect();
    distinct.sort_unstable();
    distinct.dedup();
    let damax = match distinct.as_slice() {
        [single] if *single == divide => None,
        [x, y] if *x == divide => match match_damax(v, *y) {
            Some(reduce) => Some(reduce),
            None => return Ok(()),
        },
        [x, y] if *y == divide => match match_damax(v, *x) {
            Some(reduce) => Some(reduce),
            None => return Ok(()),
        },
        _ => return Ok(()),
    };

    let comp = v.comp();
    let Some(out_dims) = comp.shape(gemm).dims() else { return Ok(()) };
    let out_dims: SmallVec<[i64; 4]> = out_dims.into();
    let Some(scale_ty) = comp.shape(d_scale).element_type() else { return Ok(()) };

    // Requantize inside the call: a bf16 zero C matrix, and 1/d_scale as the
    // d-scale operand.
    let comp = v.comp_mut();
    let zero = comp.add_constant(Literal::zero(PrimitiveType::BF16));
    let c = comp.add_broadcast(zero, &[], Shape::array(PrimitiveType::BF16, &out_dims));
    comp.set_operand(gemm, 2, c)?;
    let one = comp.add_constant(Literal::one(scale_ty));
    let inverse = comp.add_binary(BinaryOp::Divide, one, d_scale);
    let inverse = comp.add_convert(inverse, PrimitiveType::F32);
    comp.set_operand(gemm, 6, inverse)?;

    let Op::CustomCall { target, operands, backend_config, output_operand_aliasing } =
        comp.op(gemm).clone()
    else {
        return Ok(());
    };
    let quantized_shape = Shape::array(out_ty, &out_dims);

    if let Some(reduce) = damax {
        let tuple_shape =
            Shape::tuple(vec![quantized_shape, Shape::scalar(PrimitiveType::F32)]);
        let wide = comp.add(
            Op::CustomCall { target, operands, backend_config, output_operand_aliasing },
            tuple_shape,
        );
        comp.copy_metadata(gemm, wide);
        let quantized = comp.add_get_tuple_element(wide, 0)?;
        let amax = comp.add_get_tuple_element(wide, 1)?;
        let reduce_ty = comp.shape(reduce).element_type().unwrap_or(PrimitiveType::F32);
        let amax = comp.add_convert(amax, reduce_ty);
        comp.replace_instruction(reduce, amax)?;
        v.comp_mut().replace_instruction(convert, quantized)?;
        v.assign_gemm_name(wide)?;
        v.committed("fp8-epilogue-damax", wide);
    } else {
        let call = comp.add(
            Op::CustomCall { target, operands, backend_config, output_operand_aliasing },
            quantized_shape,
        );
        comp.copy_metadata(gemm, call);
        comp.replace_instruction(convert, call)?;
        v.assign_gemm_name(call)?;
        v.committed("fp8-epilogue", call);
    }
    Ok(())
}
