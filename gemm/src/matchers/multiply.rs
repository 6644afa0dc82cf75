//! Multiply patterns: scalar-alpha folding and tanh-approximation GELU.

use zarya_ir::pattern::{any_order, approx_eq, broadcast_of_scalar_const};
use zarya_ir::{BinaryOp, InstrId, Op, Shape, UnaryOp};

use crate::error::{InternalSnafu, Result};
use crate::matchers::{is_cublas_gemm, is_lt_gemm};
use crate::visitor::GemmRewriteVisitor;

const SQRT_2_OVER_PI: f64 = 0.797_884_560_802_865_4;
const GELU_CUBE_COEFFICIENT: f64 = 0.044_715;

/// Distinct gemm users the matched GELU tree itself accounts for: the outer
/// multiply, the inner sum, the cube, and the square. Any user beyond these
/// reads the pre-activation value, so the fusion must emit the `*Aux` tuple.
const GELU_AUX_USER_THRESHOLD: usize = 4;

pub(crate) fn handle_multiply(v: &mut GemmRewriteVisitor<'_>, mul: InstrId) -> Result<()> {
    if try_fold_scalar_alpha(v, mul)? {
        return Ok(());
    }
    try_fuse_gelu(v, mul)?;
    Ok(())
}

/// `multiply(gemm, broadcast(scalar))` folds the scalar into `alpha`,
/// provided the gemm has no other consumers and no accumulation yet.
fn try_fold_scalar_alpha(v: &mut GemmRewriteVisitor<'_>, mul: InstrId) -> Result<bool> {
    let comp = v.comp();
    let Op::Binary(BinaryOp::Multiply, a, b) = comp.op(mul) else { return Ok(false) };
    let Some((gemm, scale)) = any_order(*a, *b, |gemm, scale| {
        if is_cublas_gemm(comp, gemm) {
            broadcast_of_scalar_const(comp, scale).map(|value| (gemm, value))
        } else {
            None
        }
    }) else {
        return Ok(false);
    };

    if comp.user_count(gemm) != 1 {
        return Ok(false);
    }
    if comp.shape(gemm).element_type().is_some_and(|ty| ty.is_integer()) {
        return Ok(false);
    }
    let mut config = comp.gemm_backend_config(gemm)?;
    if config.beta != 0.0 {
        return Ok(false);
    }
    let Some((re, im)) = scale.as_complex() else { return Ok(false) };

    config.scale_alpha(re, im);
    v.comp_mut().set_gemm_backend_config(gemm, &config)?;
    v.comp_mut().replace_instruction(mul, gemm)?;
    v.committed("scalar-alpha", gemm);
    Ok(true)
}

/// Recognize `x * (0.5 * (1 + tanh(sqrt(2/pi) * (x + 0.044715 * x^3))))`
/// around an lt gemm `x` and fuse it as a GELU epilogue.
fn try_fuse_gelu(v: &mut GemmRewriteVisitor<'_>, mul: InstrId) -> Result<bool> {
    let comp = v.comp();
    let Op::Binary(BinaryOp::Multiply, a, b) = comp.op(mul) else { return Ok(false) };
    let Some(gemm) = any_order(*a, *b, |gemm, tail| {
        (is_lt_gemm(comp, gemm) && matches_gelu_tail(v, gemm, tail)).then_some(gemm)
    }) else {
        return Ok(false);
    };

    let config = comp.gemm_backend_config(gemm)?;
    let aux = comp.user_count(gemm) > GELU_AUX_USER_THRESHOLD;
    let Some(epilogue) = config.epilogue.with_gelu(aux) else { return Ok(false) };
    let mut config = config;
    config.epilogue = epilogue;

    if !aux {
        v.comp_mut().set_gemm_backend_config(gemm, &config)?;
        v.comp_mut().replace_instruction(mul, gemm)?;
        v.committed("gelu", gemm);
        return Ok(true);
    }

    // Widen to a (activation, pre-activation) tuple so the remaining
    // consumers of the gemm read the unactivated value.
    let out_shape = comp.shape(gemm).clone();
    let Op::CustomCall { target, operands, output_operand_aliasing, .. } = comp.op(gemm).clone()
    else {
        return InternalSnafu { message: "lt gemm is not a custom-call".to_string() }.fail();
    };
    let tuple_shape = Shape::tuple(vec![out_shape.clone(), out_shape]);
    let comp = v.comp_mut();
    let wide = comp.add_gemm_custom_call(target, &operands, &config, tuple_shape)?;
    comp.set_output_operand_aliasing(wide, output_operand_aliasing)?;
    comp.copy_metadata(gemm, wide);
    let activated = comp.add_get_tuple_element(wide, 0)?;
    let preactivation = comp.add_get_tuple_element(wide, 1)?;
    comp.replace_all_uses(gemm, preactivation)?;
    comp.remove(gemm);
    comp.replace_instruction(mul, activated)?;
    v.assign_gemm_name(wide)?;
    v.committed("gelu-aux", wide);
    Ok(true)
}

/// Match the `0.5 * (1 + tanh(...))` factor of the GELU expansion against
/// the gemm `x`. Every commutative node is tried in both operand orders, and
/// constants are compared with a relative tolerance so literals rounded
/// through f32 still match.
fn matches_gelu_tail(v: &GemmRewriteVisitor<'_>, x: InstrId, tail: InstrId) -> bool {
    let comp = v.comp();
    let near = |id: InstrId, expected: f64| {
        broadcast_of_scalar_const(comp, id)
            .and_then(|value| value.as_f64())
            .is_some_and(|value| approx_eq(value, expected))
    };
    let factor = |id: InstrId, constant: f64| {
        let Op::Binary(BinaryOp::Multiply, p, q) = comp.op(id) else { return None };
        any_order(*p, *q, |c, rest| near(c, constant).then_some(rest))
    };
    let addend = |id: InstrId, constant: f64| {
        let Op::Binary(BinaryOp::Add, p, q) = comp.op(id) else { return None };
        any_order(*p, *q, |c, rest| near(c, constant).then_some(rest))
    };

    // 0.5 * (1 + tanh(...))
    let Some(one_plus) = factor(tail, 0.5) else { return false };
    let Some(tanh) = addend(one_plus, 1.0) else { return false };
    let Op::Unary(UnaryOp::Tanh, inner) = comp.op(tanh) else { return false };
    // sqrt(2/pi) * (x + 0.044715 * x^3)
    let Some(sum) = factor(*inner, SQRT_2_OVER_PI) else { return false };
    let Op::Binary(BinaryOp::Add, p, q) = comp.op(sum) else { return false };
    let Some(cube_term) = any_order(*p, *q, |lhs, rest| (lhs == x).then_some(rest)) else {
        return false;
    };
    let Some(cube) = factor(cube_term, GELU_CUBE_COEFFICIENT) else { return false };
    is_cube_of(v, cube, x)
}

fn is_cube_of(v: &GemmRewriteVisitor<'_>, cube: InstrId, x: InstrId) -> bool {
    let comp = v.comp();
    let is_square = |id: InstrId| {
        matches!(comp.op(id), Op::Binary(BinaryOp::Multiply, p, q) if *p == x && *q == x)
    };
    let Op::Binary(BinaryOp::Multiply, p, q) = comp.op(cube) else { return false };
    any_order(*p, *q, |lhs, rhs| (lhs == x && is_square(rhs)).then_some(())).is_some()
}
