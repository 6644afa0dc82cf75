//! Constant folding of matrix-bias operands.
//!
//! A bias that is a broadcast of a constant (possibly under one reshape,
//! transpose, or bitcast) is materialized as a single constant instruction so
//! the fused call reads a plain buffer. Anything the evaluator cannot handle
//! passes the original bias through unchanged.

use zarya_ir::{Computation, InstrId, Op};

/// Biases larger than this are left symbolic; materializing them would bloat
/// the module for no runtime win.
pub const MAX_FOLDED_BIAS_BYTES: usize = 8 * 1024 * 1024;

enum Wrapper {
    None,
    Reshape,
    Transpose(Vec<i64>),
}

pub(crate) fn fold_constant_bias(comp: &mut Computation, bias: InstrId) -> InstrId {
    let (wrapper, bcast) = match comp.op(bias) {
        Op::Reshape { src } | Op::Bitcast { src } => (Wrapper::Reshape, *src),
        Op::Transpose { src, permutation } => {
            (Wrapper::Transpose(permutation.to_vec()), *src)
        }
        Op::Broadcast { .. } => (Wrapper::None, bias),
        _ => return bias,
    };
    let Op::Broadcast { src: konst, dims } = comp.op(bcast) else { return bias };
    let broadcast_dims = dims.clone();
    let Op::Constant { literal } = comp.op(*konst) else { return bias };
    if literal.is_scalar() || literal.byte_size() > MAX_FOLDED_BIAS_BYTES {
        return bias;
    }
    let literal = literal.clone();

    let Some(bcast_dims) = comp.shape(bcast).dims() else { return bias };
    let Some(expanded) = literal.broadcast(bcast_dims, &broadcast_dims) else { return bias };

    let folded = match wrapper {
        Wrapper::None => expanded,
        Wrapper::Reshape => {
            // Bitcasts that change the element type are not pure relabelings.
            if comp.shape(bias).element_type() != Some(expanded.element_type()) {
                return bias;
            }
            let Some(target_dims) = comp.shape(bias).dims() else { return bias };
            match expanded.reshape(target_dims) {
                Some(lit) => lit,
                None => return bias,
            }
        }
        Wrapper::Transpose(permutation) => match expanded.transpose(&permutation) {
            Some(lit) => lit,
            None => return bias,
        },
    };

    let id = comp.add_constant(folded);
    tracing::debug!(bias = %comp.instr(bias).name(), "folded constant bias");
    id
}
