use smallvec::SmallVec;

use crate::config::{CustomCallTarget, DotDimensionNumbers, PrecisionConfig};
use crate::literal::Literal;

/// Index of an instruction inside its computation's arena.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct InstrId(pub u32);

impl std::fmt::Display for InstrId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "%{}", self.0)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    Abs,
    Exp,
    Log,
    Negate,
    Sqrt,
    Tanh,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Maximum,
    Minimum,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReduceKind {
    Add,
    Max,
    Min,
}

/// Instruction payload. Operands are embedded `InstrId`s; the surrounding
/// [`Computation`](crate::Computation) maintains the inverse use-lists.
#[derive(Debug, Clone, PartialEq)]
pub enum Op {
    Parameter {
        index: i64,
    },
    Constant {
        literal: Literal,
    },
    Unary(UnaryOp, InstrId),
    Binary(BinaryOp, InstrId, InstrId),
    Clamp {
        lo: InstrId,
        x: InstrId,
        hi: InstrId,
    },
    Dot {
        lhs: InstrId,
        rhs: InstrId,
        dot_dimension_numbers: DotDimensionNumbers,
        precision_config: PrecisionConfig,
    },
    /// `dims[i]` is the output dimension that input dimension `i` maps to.
    Broadcast {
        src: InstrId,
        dims: SmallVec<[i64; 4]>,
    },
    Reshape {
        src: InstrId,
    },
    Bitcast {
        src: InstrId,
    },
    Transpose {
        src: InstrId,
        permutation: SmallVec<[i64; 4]>,
    },
    Slice {
        src: InstrId,
        starts: SmallVec<[i64; 4]>,
        limits: SmallVec<[i64; 4]>,
        strides: SmallVec<[i64; 4]>,
    },
    Convert {
        src: InstrId,
    },
    Reduce {
        src: InstrId,
        init: InstrId,
        kind: ReduceKind,
        dims: SmallVec<[i64; 4]>,
    },
    CustomCall {
        target: CustomCallTarget,
        operands: SmallVec<[InstrId; 7]>,
        /// Opaque JSON blob; see [`GemmBackendConfig`](crate::GemmBackendConfig).
        backend_config: String,
        /// Operand indices whose buffers may alias the output.
        output_operand_aliasing: SmallVec<[usize; 1]>,
    },
    GetTupleElement {
        src: InstrId,
        index: usize,
    },
    Tuple {
        elements: SmallVec<[InstrId; 2]>,
    },
}

impl Op {
    pub fn mnemonic(&self) -> &'static str {
        match self {
            Self::Parameter { .. } => "parameter",
            Self::Constant { .. } => "constant",
            Self::Unary(op, _) => match op {
                UnaryOp::Abs => "abs",
                UnaryOp::Exp => "exp",
                UnaryOp::Log => "log",
                UnaryOp::Negate => "negate",
                UnaryOp::Sqrt => "sqrt",
                UnaryOp::Tanh => "tanh",
            },
            Self::Binary(op, ..) => match op {
                BinaryOp::Add => "add",
                BinaryOp::Subtract => "subtract",
                BinaryOp::Multiply => "multiply",
                BinaryOp::Divide => "divide",
                BinaryOp::Maximum => "maximum",
                BinaryOp::Minimum => "minimum",
            },
            Self::Clamp { .. } => "clamp",
            Self::Dot { .. } => "dot",
            Self::Broadcast { .. } => "broadcast",
            Self::Reshape { .. } => "reshape",
            Self::Bitcast { .. } => "bitcast",
            Self::Transpose { .. } => "transpose",
            Self::Slice { .. } => "slice",
            Self::Convert { .. } => "convert",
            Self::Reduce { .. } => "reduce",
            Self::CustomCall { .. } => "custom-call",
            Self::GetTupleElement { .. } => "get-tuple-element",
            Self::Tuple { .. } => "tuple",
        }
    }

    /// Visit every operand slot in order, without allocating.
    pub fn for_each_operand(&self, mut f: impl FnMut(InstrId)) {
        match self {
            Self::Parameter { .. } | Self::Constant { .. } => {}
            Self::Unary(_, a)
            | Self::Reshape { src: a }
            | Self::Bitcast { src: a }
            | Self::Transpose { src: a, .. }
            | Self::Slice { src: a, .. }
            | Self::Convert { src: a }
            | Self::Broadcast { src: a, .. }
            | Self::GetTupleElement { src: a, .. } => f(*a),
            Self::Binary(_, a, b) | Self::Dot { lhs: a, rhs: b, .. } => {
                f(*a);
                f(*b);
            }
            Self::Clamp { lo, x, hi } => {
                f(*lo);
                f(*x);
                f(*hi);
            }
            Self::Reduce { src, init, .. } => {
                f(*src);
                f(*init);
            }
            Self::CustomCall { operands, .. } => operands.iter().copied().for_each(f),
            Self::Tuple { elements } => elements.iter().copied().for_each(f),
        }
    }

    /// Mutable visit of every operand slot in order.
    pub fn for_each_operand_mut(&mut self, mut f: impl FnMut(&mut InstrId)) {
        match self {
            Self::Parameter { .. } | Self::Constant { .. } => {}
            Self::Unary(_, a)
            | Self::Reshape { src: a }
            | Self::Bitcast { src: a }
            | Self::Transpose { src: a, .. }
            | Self::Slice { src: a, .. }
            | Self::Convert { src: a }
            | Self::Broadcast { src: a, .. }
            | Self::GetTupleElement { src: a, .. } => f(a),
            Self::Binary(_, a, b) | Self::Dot { lhs: a, rhs: b, .. } => {
                f(a);
                f(b);
            }
            Self::Clamp { lo, x, hi } => {
                f(lo);
                f(x);
                f(hi);
            }
            Self::Reduce { src, init, .. } => {
                f(src);
                f(init);
            }
            Self::CustomCall { operands, .. } => operands.iter_mut().for_each(f),
            Self::Tuple { elements } => elements.iter_mut().for_each(f),
        }
    }

    pub fn operands(&self) -> SmallVec<[InstrId; 4]> {
        let mut out = SmallVec::new();
        self.for_each_operand(|id| out.push(id));
        out
    }

    pub fn operand_count(&self) -> usize {
        let mut n = 0;
        self.for_each_operand(|_| n += 1);
        n
    }

    pub fn operand(&self, index: usize) -> Option<InstrId> {
        let mut i = 0;
        let mut found = None;
        self.for_each_operand(|id| {
            if i == index {
                found = Some(id);
            }
            i += 1;
        });
        found
    }
}
