//! Small match helpers shared by rewrite passes.

use crate::literal::{ConstValue, Literal};
use crate::module::Computation;
use crate::op::{InstrId, Op};

/// Try a two-operand pattern in both orders. `f` receives the candidate pair
/// and returns `Some` on a match; commutative matchers wrap their body in
/// this instead of duplicating it.
#[inline]
pub fn any_order<T>(
    a: InstrId,
    b: InstrId,
    mut f: impl FnMut(InstrId, InstrId) -> Option<T>,
) -> Option<T> {
    f(a, b).or_else(|| f(b, a))
}

/// The literal behind a constant instruction.
#[inline]
pub fn try_const(comp: &Computation, id: InstrId) -> Option<&Literal> {
    match comp.op(id) {
        Op::Constant { literal } => Some(literal),
        _ => None,
    }
}

/// The value of a scalar constant instruction.
#[inline]
pub fn scalar_const(comp: &Computation, id: InstrId) -> Option<ConstValue> {
    try_const(comp, id)?.scalar_value()
}

/// The scalar constant behind `id`, looking through one broadcast.
#[inline]
pub fn broadcast_of_scalar_const(comp: &Computation, id: InstrId) -> Option<ConstValue> {
    match comp.op(id) {
        Op::Broadcast { src, .. } => scalar_const(comp, *src),
        _ => scalar_const(comp, id),
    }
}

/// Relative tolerance for recognizing activation-function constants that have
/// been rounded through a lower-precision literal.
const CONST_MATCH_REL_TOL: f64 = 128.0 * f64::EPSILON;

/// Near-equality with a relative tolerance of 128 ulps at f64 precision.
#[inline]
pub fn approx_eq(a: f64, b: f64) -> bool {
    if a == b {
        return true;
    }
    (a - b).abs() <= CONST_MATCH_REL_TOL * a.abs().max(b.abs())
}
