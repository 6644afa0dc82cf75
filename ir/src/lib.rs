//! HLO-like typed IR for the Zarya compiler.
//!
//! A [`Module`] holds named [`Computation`]s; each computation is an arena of
//! [`Instruction`]s addressed by [`InstrId`], with operands embedded in the
//! [`Op`] enum and inverse use-lists maintained by the mutation primitives.
//! Rewrite passes edit the graph exclusively through those primitives
//! ([`Computation::replace_instruction`], [`Computation::replace_all_uses`],
//! [`Computation::set_operand`], [`Computation::append_operand`]), which keep
//! use-lists and the root pointer consistent.

pub mod config;
pub mod error;
pub mod literal;
pub mod module;
pub mod op;
pub mod pattern;
pub mod shape;


pub use config::{
    CustomCallTarget, DotDimensionNumbers, Epilogue, GemmBackendConfig, Precision, PrecisionConfig,
};
pub use error::{Error, Result};
pub use literal::{ConstValue, Literal};
pub use module::{Computation, Instruction, Metadata, Module, ModuleConfig};
pub use op::{BinaryOp, InstrId, Op, ReduceKind, UnaryOp};
pub use shape::{Dims, Layout, Shape};
