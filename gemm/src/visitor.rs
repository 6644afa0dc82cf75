//! The rewrite driver: one post-order walk per eligible computation.

use std::collections::HashSet;

use zarya_dtype::ComputeCapability;
use zarya_ir::{BinaryOp, InstrId, Module, Op};

use crate::error::Result;
use crate::matchers;
use crate::target;

/// Rewrites dot products and their surrounding elementwise epilogues into
/// cuBLAS-style gemm custom-calls.
///
/// The pass is a single post-order walk per computation. Post-order
/// guarantees a dot is lowered before the elementwise consumers that fuse
/// into it are visited, so each fusion only ever looks one step around an
/// already-lowered gemm.
#[derive(Debug, Clone, Copy)]
pub struct GemmRewriter {
    capability: ComputeCapability,
}

impl GemmRewriter {
    pub fn new(capability: ComputeCapability) -> Self {
        Self { capability }
    }

    /// Run over every non-fusion computation whose execution thread is in
    /// `execution_threads` (empty set: all threads). Returns whether anything
    /// changed.
    pub fn run(&self, module: &mut Module, execution_threads: &HashSet<String>) -> Result<bool> {
        let mut changed = false;
        for index in 0..module.computation_count() {
            {
                let comp = module.computation(index);
                if comp.is_fusion() {
                    continue;
                }
                if !execution_threads.is_empty()
                    && !execution_threads.contains(comp.execution_thread())
                {
                    continue;
                }
            }
            let mut visitor = GemmRewriteVisitor {
                module: &mut *module,
                comp: index,
                capability: self.capability,
                changed: false,
            };
            visitor.run()?;
            changed |= visitor.changed;
        }
        Ok(changed)
    }
}

enum Dispatch {
    Dot,
    Multiply,
    Add,
    Maximum,
    Convert,
    Skip,
}

pub(crate) struct GemmRewriteVisitor<'m> {
    pub(crate) module: &'m mut Module,
    pub(crate) comp: usize,
    pub(crate) capability: ComputeCapability,
    pub(crate) changed: bool,
}

impl GemmRewriteVisitor<'_> {
    pub(crate) fn comp(&self) -> &zarya_ir::Computation {
        self.module.computation(self.comp)
    }

    pub(crate) fn comp_mut(&mut self) -> &mut zarya_ir::Computation {
        self.module.computation_mut(self.comp)
    }

    fn run(&mut self) -> Result<()> {
        let order = self.comp().post_order();
        for id in order {
            if self.comp().is_removed(id) {
                continue;
            }
            let dispatch = match self.comp().op(id) {
                Op::Dot { .. } => Dispatch::Dot,
                Op::Binary(BinaryOp::Multiply, ..) => Dispatch::Multiply,
                Op::Binary(BinaryOp::Add, ..) => Dispatch::Add,
                Op::Binary(BinaryOp::Maximum, ..) => Dispatch::Maximum,
                Op::Convert { .. } => Dispatch::Convert,
                _ => Dispatch::Skip,
            };
            match dispatch {
                Dispatch::Dot => matchers::dot::handle_dot(self, id)?,
                Dispatch::Multiply => matchers::multiply::handle_multiply(self, id)?,
                Dispatch::Add => matchers::add::handle_add(self, id)?,
                Dispatch::Maximum => matchers::maximum::handle_maximum(self, id)?,
                Dispatch::Convert => matchers::fp8::handle_convert(self, id)?,
                Dispatch::Skip => {}
            }
        }
        Ok(())
    }

    /// Name a freshly created gemm custom-call, uniquified module-wide.
    pub(crate) fn assign_gemm_name(&mut self, id: InstrId) -> Result<()> {
        let target = self
            .comp()
            .custom_call_target(id)
            .ok_or_else(|| zarya_ir::Error::NotACustomCall {
                name: self.comp().instr(id).name().to_string(),
            })?;
        let config = self.comp().gemm_backend_config(id)?;
        let base = target::gemm_base_name(target, config.dot_dimension_numbers.has_batch());
        let name = self.module.uniquify_name(base);
        self.comp_mut().set_name(id, name);
        Ok(())
    }

    /// Commit bookkeeping shared by every successful rewrite.
    pub(crate) fn committed(&mut self, matcher: &str, id: InstrId) {
        tracing::debug!(matcher, instr = %self.comp().instr(id).name(), "rewrite applied");
        self.comp_mut().sweep_unreachable();
        self.changed = true;
    }
}
