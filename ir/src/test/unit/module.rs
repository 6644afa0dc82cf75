use zarya_dtype::PrimitiveType;

use crate::config::{CustomCallTarget, GemmBackendConfig, PrecisionConfig};
use crate::error::Error;
use crate::literal::{ConstValue, Literal};
use crate::module::{Computation, Module};
use crate::op::{BinaryOp, Op};
use crate::shape::Shape;

fn f32_matrix() -> Shape {
    Shape::array(PrimitiveType::F32, &[4, 4])
}

#[test]
fn add_registers_uses() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    let p1 = comp.add_parameter(1, f32_matrix(), "p1");
    let sum = comp.add_binary(BinaryOp::Add, p0, p1);
    let twice = comp.add_binary(BinaryOp::Add, sum, sum);
    assert_eq!(comp.users(p0), &[sum]);
    assert_eq!(comp.users(sum), &[twice, twice]);
    assert_eq!(comp.user_count(sum), 1);
    assert_eq!(comp.op(sum).operands().as_slice(), &[p0, p1]);
}

#[test]
fn replace_all_uses_repoints_operands_and_root() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    let p1 = comp.add_parameter(1, f32_matrix(), "p1");
    let old = comp.add_binary(BinaryOp::Add, p0, p1);
    let user = comp.add_binary(BinaryOp::Multiply, old, p1);
    let new = comp.add_binary(BinaryOp::Maximum, p0, p1);
    comp.set_root(old);

    comp.replace_all_uses(old, new).unwrap();
    assert_eq!(comp.op(user).operands().as_slice(), &[new, p1]);
    assert_eq!(comp.root(), Some(new));
    assert!(comp.users(old).is_empty());
    assert_eq!(comp.users(new), &[user]);
}

#[test]
fn replace_instruction_checks_shapes() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    let wide = comp.add_parameter(1, Shape::array(PrimitiveType::F32, &[8, 8]), "p1");
    let old = comp.add_binary(BinaryOp::Add, p0, p0);
    comp.set_root(old);

    let err = comp.replace_instruction(old, wide).unwrap_err();
    assert!(matches!(err, Error::ReplacementShapeMismatch { .. }));

    let new = comp.add_binary(BinaryOp::Multiply, p0, p0);
    comp.replace_instruction(old, new).unwrap();
    assert!(comp.is_removed(old));
    assert_eq!(comp.root(), Some(new));
    // The removed add no longer counts as a user of p0.
    assert_eq!(comp.users(p0), &[new, new]);
}

#[test]
fn set_operand_repairs_use_lists() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    let p1 = comp.add_parameter(1, f32_matrix(), "p1");
    let p2 = comp.add_parameter(2, f32_matrix(), "p2");
    let sum = comp.add_binary(BinaryOp::Add, p0, p1);

    comp.set_operand(sum, 1, p2).unwrap();
    assert_eq!(comp.op(sum).operands().as_slice(), &[p0, p2]);
    assert!(comp.users(p1).is_empty());
    assert_eq!(comp.users(p2), &[sum]);

    let err = comp.set_operand(sum, 5, p2).unwrap_err();
    assert!(matches!(err, Error::OperandIndexOutOfRange { index: 5, arity: 2, .. }));
}

#[test]
fn append_operand_only_on_custom_calls() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    let p1 = comp.add_parameter(1, f32_matrix(), "p1");
    let config =
        GemmBackendConfig::for_dot(Default::default(), PrecisionConfig::default());
    let call = comp
        .add_gemm_custom_call(CustomCallTarget::GemmLt, &[p0, p1], &config, f32_matrix())
        .unwrap();
    let bias = comp.add_parameter(2, Shape::array(PrimitiveType::F32, &[4]), "bias");

    comp.append_operand(call, bias).unwrap();
    assert_eq!(comp.op(call).operands().as_slice(), &[p0, p1, bias]);
    assert_eq!(comp.users(bias), &[call]);

    let sum = comp.add_binary(BinaryOp::Add, p0, p1);
    assert!(matches!(comp.append_operand(sum, bias), Err(Error::NotVariadic { .. })));
}

#[test]
fn backend_config_roundtrip_on_instruction() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    let p1 = comp.add_parameter(1, f32_matrix(), "p1");
    let mut config = GemmBackendConfig::for_dot(Default::default(), PrecisionConfig::default());
    let call = comp
        .add_gemm_custom_call(CustomCallTarget::GemmLt, &[p0, p1], &config, f32_matrix())
        .unwrap();

    config.beta = 1.0;
    comp.set_gemm_backend_config(call, &config).unwrap();
    assert_eq!(comp.gemm_backend_config(call).unwrap().beta, 1.0);

    assert!(matches!(comp.gemm_backend_config(p0), Err(Error::NotACustomCall { .. })));
}

#[test]
fn post_order_visits_operands_first() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    let p1 = comp.add_parameter(1, f32_matrix(), "p1");
    let sum = comp.add_binary(BinaryOp::Add, p0, p1);
    let product = comp.add_binary(BinaryOp::Multiply, sum, p0);
    comp.set_root(product);

    let order = comp.post_order();
    let pos = |id| order.iter().position(|&x| x == id).unwrap();
    assert!(pos(p0) < pos(sum));
    assert!(pos(p1) < pos(sum));
    assert!(pos(sum) < pos(product));
    assert_eq!(order.len(), 4);
}

#[test]
fn sweep_unreachable_spares_parameters() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    let p1 = comp.add_parameter(1, f32_matrix(), "p1");
    let orphan = comp.add_binary(BinaryOp::Add, p0, p1);
    let root = comp.add_binary(BinaryOp::Multiply, p0, p0);
    comp.set_root(root);

    comp.sweep_unreachable();
    assert!(comp.is_removed(orphan));
    assert!(!comp.is_removed(p1));
    assert!(!comp.is_removed(root));
    // The swept add released its uses of the parameters.
    assert!(comp.users(p1).is_empty());
}

#[test]
fn constant_helper_takes_shape_from_literal() {
    let mut comp = Computation::new("main", "main");
    let id = comp.add_constant(Literal::new(
        PrimitiveType::F32,
        &[2],
        vec![ConstValue::Float(1.0), ConstValue::Float(2.0)],
    ));
    assert_eq!(comp.shape(id), &Shape::array(PrimitiveType::F32, &[2]));
    assert!(matches!(comp.op(id), Op::Constant { .. }));
}

#[test]
fn convert_helper_skips_noop_conversions() {
    let mut comp = Computation::new("main", "main");
    let p0 = comp.add_parameter(0, f32_matrix(), "p0");
    assert_eq!(comp.add_convert(p0, PrimitiveType::F32), p0);
    let converted = comp.add_convert(p0, PrimitiveType::BF16);
    assert_ne!(converted, p0);
    assert_eq!(comp.shape(converted).element_type(), Some(PrimitiveType::BF16));
}

#[test]
fn uniquify_name_counts_per_base() {
    let mut module = Module::new("m");
    assert_eq!(module.uniquify_name("cublas-lt-matmul"), "cublas-lt-matmul");
    assert_eq!(module.uniquify_name("cublas-lt-matmul"), "cublas-lt-matmul.1");
    assert_eq!(module.uniquify_name("cublas-lt-matmul"), "cublas-lt-matmul.2");
    assert_eq!(module.uniquify_name("cublas-gemm"), "cublas-gemm");
}

#[test]
fn get_tuple_element_shapes() {
    let mut comp = Computation::new("main", "main");
    let shape = Shape::tuple(vec![f32_matrix(), Shape::scalar(PrimitiveType::F32)]);
    let p0 = comp.add_parameter(0, shape, "p0");
    let first = comp.add_get_tuple_element(p0, 0).unwrap();
    assert_eq!(comp.shape(first), &f32_matrix());
    assert!(matches!(
        comp.add_get_tuple_element(p0, 2),
        Err(Error::TupleIndexOutOfRange { index: 2, arity: 2, .. })
    ));
    let scalar = comp.add_parameter(1, Shape::scalar(PrimitiveType::F32), "p1");
    assert!(matches!(comp.add_get_tuple_element(scalar, 0), Err(Error::NotATuple { .. })));
}
