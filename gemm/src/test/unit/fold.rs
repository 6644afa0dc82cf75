use zarya_dtype::PrimitiveType;
use zarya_ir::{Computation, ConstValue, Literal, Op, Shape};

use crate::fold::{MAX_FOLDED_BIAS_BYTES, fold_constant_bias};

fn floats(values: &[f64]) -> Vec<ConstValue> {
    values.iter().map(|&v| ConstValue::Float(v)).collect()
}

#[test]
fn folds_plain_broadcast() {
    let mut comp = Computation::new("c", "main");
    let konst =
        comp.add_constant(Literal::new(PrimitiveType::F32, &[2], floats(&[1.0, 2.0])));
    let spread = comp.add_broadcast(konst, &[1], Shape::array(PrimitiveType::F32, &[2, 2]));

    let folded = fold_constant_bias(&mut comp, spread);
    assert_ne!(folded, spread);
    let Op::Constant { literal } = comp.op(folded) else { panic!("not folded") };
    assert_eq!(literal.dims(), &[2, 2]);
    assert_eq!(literal.values(), floats(&[1.0, 2.0, 1.0, 2.0]).as_slice());
}

#[test]
fn folds_broadcast_under_transpose() {
    let mut comp = Computation::new("c", "main");
    let konst =
        comp.add_constant(Literal::new(PrimitiveType::F32, &[2], floats(&[1.0, 2.0])));
    let spread = comp.add_broadcast(konst, &[1], Shape::array(PrimitiveType::F32, &[3, 2]));
    let flipped = comp.add_transpose(spread, &[1, 0]);

    let folded = fold_constant_bias(&mut comp, flipped);
    let Op::Constant { literal } = comp.op(folded) else { panic!("not folded") };
    assert_eq!(literal.dims(), &[2, 3]);
    assert_eq!(
        literal.values(),
        floats(&[1.0, 1.0, 1.0, 2.0, 2.0, 2.0]).as_slice()
    );
}

#[test]
fn folds_broadcast_under_reshape() {
    let mut comp = Computation::new("c", "main");
    let konst =
        comp.add_constant(Literal::new(PrimitiveType::F32, &[2], floats(&[1.0, 2.0])));
    let spread = comp.add_broadcast(konst, &[1], Shape::array(PrimitiveType::F32, &[2, 2]));
    let flat = comp.add(Op::Reshape { src: spread }, Shape::array(PrimitiveType::F32, &[4]));

    let folded = fold_constant_bias(&mut comp, flat);
    let Op::Constant { literal } = comp.op(folded) else { panic!("not folded") };
    assert_eq!(literal.dims(), &[4]);
}

#[test]
fn scalar_constants_pass_through() {
    let mut comp = Computation::new("c", "main");
    let konst = comp.add_constant(Literal::scalar(PrimitiveType::F32, ConstValue::Float(3.0)));
    let spread = comp.add_broadcast(konst, &[], Shape::array(PrimitiveType::F32, &[4, 4]));
    assert_eq!(fold_constant_bias(&mut comp, spread), spread);
}

#[test]
fn non_constant_bias_passes_through() {
    let mut comp = Computation::new("c", "main");
    let param = comp.add_parameter(0, Shape::array(PrimitiveType::F32, &[4]), "p0");
    let spread = comp.add_broadcast(param, &[1], Shape::array(PrimitiveType::F32, &[4, 4]));
    assert_eq!(fold_constant_bias(&mut comp, spread), spread);
    assert_eq!(fold_constant_bias(&mut comp, param), param);
}

#[test]
fn oversized_constants_pass_through() {
    let n = (MAX_FOLDED_BIAS_BYTES / PrimitiveType::F32.byte_size()) as i64 + 1;
    let mut comp = Computation::new("c", "main");
    let konst = comp.add_constant(Literal::new(
        PrimitiveType::F32,
        &[n],
        vec![ConstValue::Float(0.0); n as usize],
    ));
    let spread = comp.add_broadcast(konst, &[1], Shape::array(PrimitiveType::F32, &[2, n]));
    assert_eq!(fold_constant_bias(&mut comp, spread), spread);
}

#[test]
fn type_changing_bitcast_passes_through() {
    let mut comp = Computation::new("c", "main");
    let konst =
        comp.add_constant(Literal::new(PrimitiveType::F32, &[2], floats(&[1.0, 2.0])));
    let spread = comp.add_broadcast(konst, &[1], Shape::array(PrimitiveType::F32, &[2, 2]));
    let cast = comp.add(Op::Bitcast { src: spread }, Shape::array(PrimitiveType::S32, &[2, 2]));
    assert_eq!(fold_constant_bias(&mut comp, cast), cast);
}
