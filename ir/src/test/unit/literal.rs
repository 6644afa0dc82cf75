use proptest::prelude::*;
use zarya_dtype::PrimitiveType;

use crate::literal::{ConstValue, Literal};

fn floats(values: &[f64]) -> Vec<ConstValue> {
    values.iter().map(|&v| ConstValue::Float(v)).collect()
}

#[test]
fn scalar_roundtrip() {
    let lit = Literal::scalar(PrimitiveType::F32, ConstValue::Float(2.5));
    assert!(lit.is_scalar());
    assert_eq!(lit.scalar_value(), Some(ConstValue::Float(2.5)));
    assert_eq!(lit.byte_size(), 4);
}

#[test]
fn zero_and_one_follow_element_class() {
    assert_eq!(Literal::zero(PrimitiveType::S32).scalar_value(), Some(ConstValue::Int(0)));
    assert_eq!(Literal::one(PrimitiveType::F16).scalar_value(), Some(ConstValue::Float(1.0)));
    assert_eq!(
        Literal::one(PrimitiveType::C64).scalar_value(),
        Some(ConstValue::Complex { re: 1.0, im: 0.0 })
    );
}

#[test]
fn broadcast_vector_along_columns() {
    // [10, 20] broadcast into a 2x2 matrix along dimension 1: rows repeat.
    let lit = Literal::new(PrimitiveType::F32, &[2], floats(&[10.0, 20.0]));
    let out = lit.broadcast(&[2, 2], &[1]).unwrap();
    assert_eq!(out.dims(), &[2, 2]);
    assert_eq!(out.values(), floats(&[10.0, 20.0, 10.0, 20.0]).as_slice());
}

#[test]
fn broadcast_vector_along_rows() {
    let lit = Literal::new(PrimitiveType::F32, &[2], floats(&[10.0, 20.0]));
    let out = lit.broadcast(&[2, 2], &[0]).unwrap();
    assert_eq!(out.values(), floats(&[10.0, 10.0, 20.0, 20.0]).as_slice());
}

#[test]
fn broadcast_scalar_splats() {
    let lit = Literal::scalar(PrimitiveType::F32, ConstValue::Float(7.0));
    let out = lit.broadcast(&[3], &[]).unwrap();
    assert_eq!(out.values(), floats(&[7.0, 7.0, 7.0]).as_slice());
}

#[test]
fn broadcast_dimension_mismatch_fails() {
    let lit = Literal::new(PrimitiveType::F32, &[3], floats(&[1.0, 2.0, 3.0]));
    assert!(lit.broadcast(&[2, 2], &[1]).is_none());
    assert!(lit.broadcast(&[3, 3], &[0, 1]).is_none());
}

#[test]
fn transpose_2x3() {
    let lit =
        Literal::new(PrimitiveType::F32, &[2, 3], floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    let out = lit.transpose(&[1, 0]).unwrap();
    assert_eq!(out.dims(), &[3, 2]);
    assert_eq!(out.values(), floats(&[1.0, 4.0, 2.0, 5.0, 3.0, 6.0]).as_slice());
}

#[test]
fn reshape_preserves_row_major_order() {
    let lit = Literal::new(PrimitiveType::F32, &[2, 3], floats(&[1.0, 2.0, 3.0, 4.0, 5.0, 6.0]));
    let out = lit.reshape(&[3, 2]).unwrap();
    assert_eq!(out.dims(), &[3, 2]);
    assert_eq!(out.values(), lit.values());
    assert!(lit.reshape(&[4]).is_none());
}

proptest! {
    #[test]
    fn broadcast_then_transpose_preserves_element_multiset(
        values in prop::collection::vec(-100.0f64..100.0, 1..8),
    ) {
        let n = values.len() as i64;
        let lit = Literal::new(PrimitiveType::F64, &[n], floats(&values));
        let wide = lit.broadcast(&[2, n], &[1]).unwrap();
        let flipped = wide.transpose(&[1, 0]).unwrap();
        prop_assert_eq!(flipped.dims(), &[n, 2]);
        for (i, v) in values.iter().enumerate() {
            prop_assert_eq!(flipped.values()[2 * i], ConstValue::Float(*v));
            prop_assert_eq!(flipped.values()[2 * i + 1], ConstValue::Float(*v));
        }
    }
}
