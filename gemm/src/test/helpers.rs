//! Shared builders for rewrite tests.

use std::collections::HashSet;

use smallvec::smallvec;
use zarya_dtype::{ComputeCapability, PrimitiveType};
use zarya_ir::{
    BinaryOp, Computation, ConstValue, CustomCallTarget, DotDimensionNumbers, GemmBackendConfig,
    InstrId, Literal, Module, Op, PrecisionConfig, Shape,
};

use crate::GemmRewriter;

pub fn run_pass(module: &mut Module) -> bool {
    run_pass_with(module, ComputeCapability::AMPERE)
}

pub fn run_pass_with(module: &mut Module, capability: ComputeCapability) -> bool {
    GemmRewriter::new(capability).run(module, &HashSet::new()).unwrap()
}

/// Module with one empty entry computation on the "main" thread.
pub fn new_module() -> (Module, usize) {
    let mut module = Module::new("test");
    let index = module.add_computation(Computation::new("entry", "main"));
    (module, index)
}

/// Plain rank-2 dot dimension numbers: contract lhs dim 1 with rhs dim 0.
pub fn matmul_dnums() -> DotDimensionNumbers {
    DotDimensionNumbers {
        lhs_batch: smallvec![],
        lhs_contracting: smallvec![1],
        rhs_batch: smallvec![],
        rhs_contracting: smallvec![0],
    }
}

/// `parameter(0) dot parameter(1)` of shapes `[m,k] x [k,n] -> [m,n]`.
pub fn build_matmul(
    comp: &mut Computation,
    ty: PrimitiveType,
    out_ty: PrimitiveType,
    m: i64,
    k: i64,
    n: i64,
) -> (InstrId, InstrId, InstrId) {
    let p0 = comp.add_parameter(0, Shape::array(ty, &[m, k]), "p0");
    let p1 = comp.add_parameter(1, Shape::array(ty, &[k, n]), "p1");
    let dot = comp.add(
        Op::Dot {
            lhs: p0,
            rhs: p1,
            dot_dimension_numbers: matmul_dnums(),
            precision_config: PrecisionConfig::default(),
        },
        Shape::array(out_ty, &[m, n]),
    );
    (p0, p1, dot)
}

/// Broadcast of a scalar constant to `dims`.
pub fn broadcast_scalar(
    comp: &mut Computation,
    ty: PrimitiveType,
    value: ConstValue,
    dims: &[i64],
) -> InstrId {
    let konst = comp.add_constant(Literal::scalar(ty, value));
    comp.add_broadcast(konst, &[], Shape::array(ty, dims))
}

/// All live custom-calls in the computation.
pub fn live_custom_calls(comp: &Computation) -> Vec<InstrId> {
    comp.live_instructions()
        .filter(|(_, instr)| matches!(instr.op(), Op::CustomCall { .. }))
        .map(|(id, _)| id)
        .collect()
}

/// The single live gemm custom-call.
pub fn the_gemm(comp: &Computation) -> InstrId {
    let calls = live_custom_calls(comp);
    assert_eq!(calls.len(), 1, "expected exactly one live custom-call");
    calls[0]
}

pub fn config_of(comp: &Computation, id: InstrId) -> GemmBackendConfig {
    comp.gemm_backend_config(id).unwrap()
}

pub fn target_of(comp: &Computation, id: InstrId) -> CustomCallTarget {
    comp.custom_call_target(id).unwrap()
}

/// Count live instructions matching a predicate.
pub fn count_live(comp: &Computation, pred: impl Fn(&Op) -> bool) -> usize {
    comp.live_instructions().filter(|(_, instr)| pred(instr.op())).count()
}

/// True when any live instruction is a `multiply`/`add`/`maximum` binary.
pub fn has_live_binary(comp: &Computation, op: BinaryOp) -> bool {
    count_live(comp, |o| matches!(o, Op::Binary(b, ..) if *b == op)) > 0
}
