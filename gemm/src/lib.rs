//! GPU GEMM rewriter for the Zarya compiler.
//!
//! Lowers `dot` instructions to cuBLAS-style gemm custom-calls and then
//! fuses the elementwise patterns around them into the calls' backend
//! configs: scalar alpha factors, matrix and vector biases, ReLU and
//! tanh-approximation GELU epilogues, and the FP8 quantization patterns
//! (scaled operands, requantized outputs, DAmax).
//!
//! ```no_run
//! use std::collections::HashSet;
//! use zarya_dtype::ComputeCapability;
//! use zarya_gemm::GemmRewriter;
//! # let mut module = zarya_ir::Module::new("m");
//!
//! let rewriter = GemmRewriter::new(ComputeCapability::HOPPER);
//! let changed = rewriter.run(&mut module, &HashSet::new())?;
//! # Ok::<(), zarya_gemm::Error>(())
//! ```

pub mod error;
pub mod fold;
pub(crate) mod matchers;
pub mod target;
pub mod visitor;


pub use error::{Error, Result};
pub use fold::MAX_FOLDED_BIAS_BYTES;
pub use target::{COMPLEX64_LT_RHS_ROW_LIMIT, LT_TYPE_TABLE, MAX_LT_BATCH};
pub use visitor::GemmRewriter;
