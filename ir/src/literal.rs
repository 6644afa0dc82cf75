use smallvec::{SmallVec, smallvec};
use zarya_dtype::PrimitiveType;

use crate::shape::{Dims, Shape};

/// A single constant element.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ConstValue {
    Float(f64),
    Int(i64),
    Bool(bool),
    Complex { re: f64, im: f64 },
}

impl ConstValue {
    /// Real value of a non-complex numeric constant.
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Self::Float(v) => Some(*v),
            Self::Int(v) => Some(*v as f64),
            Self::Bool(_) | Self::Complex { .. } => None,
        }
    }

    /// (re, im) view of any numeric constant; reals get a zero imaginary part.
    pub fn as_complex(&self) -> Option<(f64, f64)> {
        match self {
            Self::Float(v) => Some((*v, 0.0)),
            Self::Int(v) => Some((*v as f64, 0.0)),
            Self::Complex { re, im } => Some((*re, *im)),
            Self::Bool(_) => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        match self {
            Self::Float(v) => *v == 0.0,
            Self::Int(v) => *v == 0,
            Self::Complex { re, im } => *re == 0.0 && *im == 0.0,
            Self::Bool(_) => false,
        }
    }

    pub fn zero(ty: PrimitiveType) -> Self {
        if ty.is_integer() {
            Self::Int(0)
        } else if ty.is_complex() {
            Self::Complex { re: 0.0, im: 0.0 }
        } else {
            Self::Float(0.0)
        }
    }

    pub fn one(ty: PrimitiveType) -> Self {
        if ty.is_integer() {
            Self::Int(1)
        } else if ty.is_complex() {
            Self::Complex { re: 1.0, im: 0.0 }
        } else {
            Self::Float(1.0)
        }
    }
}

/// A dense constant: element type, dims, and row-major element values.
///
/// This carries just enough evaluation (broadcast, transpose, reshape) for the
/// bias constant-folding done by the gemm rewriter; it is not a general
/// interpreter.
#[derive(Debug, Clone, PartialEq)]
pub struct Literal {
    element_type: PrimitiveType,
    dims: Dims,
    values: Vec<ConstValue>,
}

impl Literal {
    pub fn new(element_type: PrimitiveType, dims: &[i64], values: Vec<ConstValue>) -> Self {
        debug_assert_eq!(dims.iter().product::<i64>() as usize, values.len());
        Self { element_type, dims: dims.into(), values }
    }

    pub fn scalar(element_type: PrimitiveType, value: ConstValue) -> Self {
        Self { element_type, dims: Dims::new(), values: vec![value] }
    }

    pub fn zero(element_type: PrimitiveType) -> Self {
        Self::scalar(element_type, ConstValue::zero(element_type))
    }

    pub fn one(element_type: PrimitiveType) -> Self {
        Self::scalar(element_type, ConstValue::one(element_type))
    }

    pub fn element_type(&self) -> PrimitiveType {
        self.element_type
    }

    pub fn dims(&self) -> &[i64] {
        &self.dims
    }

    pub fn values(&self) -> &[ConstValue] {
        &self.values
    }

    pub fn is_scalar(&self) -> bool {
        self.dims.is_empty()
    }

    pub fn scalar_value(&self) -> Option<ConstValue> {
        if self.is_scalar() { self.values.first().copied() } else { None }
    }

    pub fn shape(&self) -> Shape {
        Shape::array(self.element_type, &self.dims)
    }

    pub fn byte_size(&self) -> usize {
        self.values.len() * self.element_type.byte_size()
    }

    /// Broadcast into `to_dims`, where `broadcast_dims[i]` names the output
    /// dimension that input dimension `i` maps to. Scalar sources take an
    /// empty `broadcast_dims` and splat.
    pub fn broadcast(&self, to_dims: &[i64], broadcast_dims: &[i64]) -> Option<Literal> {
        if broadcast_dims.len() != self.dims.len() {
            return None;
        }
        for (i, &out_dim) in broadcast_dims.iter().enumerate() {
            let out_dim = usize::try_from(out_dim).ok()?;
            if *to_dims.get(out_dim)? != self.dims[i] {
                return None;
            }
        }

        let count = to_dims.iter().product::<i64>();
        let count = usize::try_from(count).ok()?;
        let mut values = Vec::with_capacity(count);
        let src_strides = row_major_strides(&self.dims);
        let mut index: SmallVec<[i64; 4]> = smallvec![0; to_dims.len()];
        for _ in 0..count {
            let mut src = 0usize;
            for (i, &out_dim) in broadcast_dims.iter().enumerate() {
                src += index[out_dim as usize] as usize * src_strides[i];
            }
            values.push(self.values[src]);
            advance(&mut index, to_dims);
        }
        Some(Literal { element_type: self.element_type, dims: to_dims.into(), values })
    }

    /// Permute dimensions: output dimension `i` is input dimension
    /// `permutation[i]`.
    pub fn transpose(&self, permutation: &[i64]) -> Option<Literal> {
        if permutation.len() != self.dims.len() {
            return None;
        }
        let mut out_dims = Dims::with_capacity(self.dims.len());
        for &p in permutation {
            out_dims.push(*self.dims.get(usize::try_from(p).ok()?)?);
        }

        let src_strides = row_major_strides(&self.dims);
        let mut values = Vec::with_capacity(self.values.len());
        let mut index: SmallVec<[i64; 4]> = smallvec![0; out_dims.len()];
        for _ in 0..self.values.len() {
            let mut src = 0usize;
            for (i, &p) in permutation.iter().enumerate() {
                src += index[i] as usize * src_strides[p as usize];
            }
            values.push(self.values[src]);
            advance(&mut index, &out_dims);
        }
        Some(Literal { element_type: self.element_type, dims: out_dims, values })
    }

    /// Reinterpret with new dims of the same element count. Row-major order is
    /// preserved, so this is a pure relabeling.
    pub fn reshape(&self, new_dims: &[i64]) -> Option<Literal> {
        if new_dims.iter().product::<i64>() != self.dims.iter().product::<i64>() {
            return None;
        }
        Some(Literal {
            element_type: self.element_type,
            dims: new_dims.into(),
            values: self.values.clone(),
        })
    }
}

fn row_major_strides(dims: &[i64]) -> SmallVec<[usize; 4]> {
    let mut strides: SmallVec<[usize; 4]> = smallvec![1; dims.len()];
    for i in (0..dims.len().saturating_sub(1)).rev() {
        strides[i] = strides[i + 1] * dims[i + 1] as usize;
    }
    strides
}

/// Increment a row-major multi-index.
fn advance(index: &mut [i64], dims: &[i64]) {
    for i in (0..dims.len()).rev() {
        index[i] += 1;
        if index[i] < dims[i] {
            return;
        }
        index[i] = 0;
    }
}
