use smallvec::SmallVec;
use zarya_dtype::PrimitiveType;

/// Logical dimension sizes.
pub type Dims = SmallVec<[i64; 4]>;

/// Physical layout: dimension indices ordered minor-to-major.
pub type Layout = SmallVec<[i64; 4]>;

/// Shape of an IR value: a typed array with an explicit physical layout, or a
/// tuple of shapes.
///
/// `minor_to_major[0]` names the fastest-varying (most minor) logical
/// dimension. The default layout is row-major, i.e. `[rank-1, ..., 1, 0]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Shape {
    Array { element_type: PrimitiveType, dims: Dims, minor_to_major: Layout },
    Tuple { elements: Vec<Shape> },
}

impl Shape {
    /// Array shape with the default row-major layout.
    pub fn array(element_type: PrimitiveType, dims: &[i64]) -> Self {
        let minor_to_major = (0..dims.len() as i64).rev().collect();
        Self::Array { element_type, dims: dims.into(), minor_to_major }
    }

    pub fn array_with_layout(
        element_type: PrimitiveType,
        dims: &[i64],
        minor_to_major: &[i64],
    ) -> Self {
        Self::Array { element_type, dims: dims.into(), minor_to_major: minor_to_major.into() }
    }

    pub fn scalar(element_type: PrimitiveType) -> Self {
        Self::Array { element_type, dims: Dims::new(), minor_to_major: Layout::new() }
    }

    pub fn tuple(elements: Vec<Shape>) -> Self {
        Self::Tuple { elements }
    }

    pub fn element_type(&self) -> Option<PrimitiveType> {
        match self {
            Self::Array { element_type, .. } => Some(*element_type),
            Self::Tuple { .. } => None,
        }
    }

    pub fn dims(&self) -> Option<&[i64]> {
        match self {
            Self::Array { dims, .. } => Some(dims),
            Self::Tuple { .. } => None,
        }
    }

    pub fn minor_to_major(&self) -> Option<&[i64]> {
        match self {
            Self::Array { minor_to_major, .. } => Some(minor_to_major),
            Self::Tuple { .. } => None,
        }
    }

    pub fn rank(&self) -> Option<usize> {
        self.dims().map(<[i64]>::len)
    }

    pub fn is_scalar(&self) -> bool {
        matches!(self, Self::Array { dims, .. } if dims.is_empty())
    }

    pub fn is_tuple(&self) -> bool {
        matches!(self, Self::Tuple { .. })
    }

    /// Number of elements in an array shape.
    pub fn element_count(&self) -> Option<i64> {
        self.dims().map(|dims| dims.iter().product())
    }

    /// Dense storage size. Tuples sum their elements.
    pub fn byte_size(&self) -> usize {
        match self {
            Self::Array { element_type, dims, .. } => {
                dims.iter().product::<i64>() as usize * element_type.byte_size()
            }
            Self::Tuple { elements } => elements.iter().map(Shape::byte_size).sum(),
        }
    }

    /// Same dims and layout, different element type.
    pub fn with_element_type(&self, ty: PrimitiveType) -> Self {
        match self {
            Self::Array { dims, minor_to_major, .. } => Self::Array {
                element_type: ty,
                dims: dims.clone(),
                minor_to_major: minor_to_major.clone(),
            },
            Self::Tuple { elements } => {
                Self::Tuple { elements: elements.iter().map(|s| s.with_element_type(ty)).collect() }
            }
        }
    }

    pub fn tuple_element(&self, index: usize) -> Option<&Shape> {
        match self {
            Self::Tuple { elements } => elements.get(index),
            Self::Array { .. } => None,
        }
    }

    /// True when both shapes are arrays with identical element type and dims.
    /// Layout is intentionally ignored: rewrites may retarget views whose
    /// layout annotation differs while the logical value is the same.
    pub fn compatible(&self, other: &Shape) -> bool {
        match (self, other) {
            (
                Self::Array { element_type: a_ty, dims: a_dims, .. },
                Self::Array { element_type: b_ty, dims: b_dims, .. },
            ) => a_ty == b_ty && a_dims == b_dims,
            (Self::Tuple { elements: a }, Self::Tuple { elements: b }) => {
                a.len() == b.len() && a.iter().zip(b).all(|(x, y)| x.compatible(y))
            }
            _ => false,
        }
    }
}

impl std::fmt::Display for Shape {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Array { element_type, dims, .. } => {
                write!(f, "{element_type}[")?;
                for (i, d) in dims.iter().enumerate() {
                    if i > 0 {
                        write!(f, ",")?;
                    }
                    write!(f, "{d}")?;
                }
                write!(f, "]")
            }
            Self::Tuple { elements } => {
                write!(f, "(")?;
                for (i, s) in elements.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{s}")?;
                }
                write!(f, ")")
            }
        }
    }
}
