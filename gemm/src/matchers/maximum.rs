//! `maximum(gemm, 0)` fuses as a ReLU epilogue.

use zarya_ir::pattern::{any_order, broadcast_of_scalar_const};
use zarya_ir::{BinaryOp, InstrId, Op};

use crate::error::Result;
use crate::matchers::{is_lt_gemm, strip_view};
use crate::visitor::GemmRewriteVisitor;

pub(crate) fn handle_maximum(v: &mut GemmRewriteVisitor<'_>, max: InstrId) -> Result<()> {
    let comp = v.comp();
    let Op::Binary(BinaryOp::Maximum, a, b) = comp.op(max) else { return Ok(()) };
    let matched = any_order(*a, *b, |lhs, zero| {
        if !broadcast_of_scalar_const(comp, zero).is_some_and(|value| value.is_zero()) {
            return None;
        }
        let (gemm, view) = strip_view(comp, lhs);
        is_lt_gemm(comp, gemm).then_some((gemm, view))
    });
    let Some((gemm, view)) = matched else { return Ok(()) };

    if comp.user_count(gemm) != 1 {
        return Ok(());
    }
    if let Some(view) = view
        && comp.user_count(view) != 1
    {
        return Ok(());
    }
    let mut config = comp.gemm_backend_config(gemm)?;
    let Some(epilogue) = config.epilogue.with_relu() else { return Ok(()) };

    config.epilogue = epilogue;
    v.comp_mut().set_gemm_backend_config(gemm, &config)?;
    let replacement = view.unwrap_or(gemm);
    v.comp_mut().replace_instruction(max, replacement)?;
    v.committed("relu", gemm);
    Ok(())
}
