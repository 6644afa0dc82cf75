//! Module / computation / instruction arena and the graph mutation
//! primitives rewrite passes are built on.
//!
//! Instructions are arena slots addressed by [`InstrId`]; removal is
//! tombstoning plus use-list repair, so ids stay stable across rewrites.
//! Every structural edit goes through the primitives here, which keep the
//! inverse use-lists (one entry per use site) consistent with the operand
//! slots embedded in [`Op`].

use std::collections::HashMap;

use smallvec::SmallVec;
use zarya_dtype::PrimitiveType;

use crate::config::{CustomCallTarget, GemmBackendConfig};
use crate::error::{Error, Result};
use crate::literal::Literal;
use crate::op::{BinaryOp, InstrId, Op, UnaryOp};
use crate::shape::Shape;

/// Provenance of an instruction, carried through rewrites.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Metadata {
    pub op_name: String,
    pub source_file: String,
    pub source_line: i32,
}

impl Metadata {
    pub fn is_empty(&self) -> bool {
        self.op_name.is_empty() && self.source_file.is_empty() && self.source_line == 0
    }
}

#[derive(Debug, Clone)]
pub struct Instruction {
    op: Op,
    shape: Shape,
    name: String,
    metadata: Metadata,
    /// One entry per use site; a user appears twice if it uses us twice.
    users: SmallVec<[InstrId; 2]>,
    removed: bool,
}

impl Instruction {
    pub fn op(&self) -> &Op {
        &self.op
    }

    pub fn shape(&self) -> &Shape {
        &self.shape
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn metadata(&self) -> &Metadata {
        &self.metadata
    }

    pub fn is_removed(&self) -> bool {
        self.removed
    }
}

#[derive(Debug, Clone)]
pub struct Computation {
    name: String,
    execution_thread: String,
    is_fusion: bool,
    instrs: Vec<Instruction>,
    root: Option<InstrId>,
}

impl Computation {
    pub fn new(name: impl Into<String>, execution_thread: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            execution_thread: execution_thread.into(),
            is_fusion: false,
            instrs: Vec::new(),
            root: None,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn execution_thread(&self) -> &str {
        &self.execution_thread
    }

    pub fn is_fusion(&self) -> bool {
        self.is_fusion
    }

    pub fn set_fusion(&mut self, is_fusion: bool) {
        self.is_fusion = is_fusion;
    }

    pub fn root(&self) -> Option<InstrId> {
        self.root
    }

    pub fn set_root(&mut self, id: InstrId) {
        self.root = Some(id);
    }

    // ---- arena access ------------------------------------------------------

    pub fn instr(&self, id: InstrId) -> &Instruction {
        &self.instrs[id.0 as usize]
    }

    fn instr_mut(&mut self, id: InstrId) -> &mut Instruction {
        &mut self.instrs[id.0 as usize]
    }

    pub fn op(&self, id: InstrId) -> &Op {
        &self.instr(id).op
    }

    pub fn shape(&self, id: InstrId) -> &Shape {
        &self.instr(id).shape
    }

    pub fn is_removed(&self, id: InstrId) -> bool {
        self.instr(id).removed
    }

    /// Use-site list: a user appears once per operand slot referencing `id`.
    pub fn users(&self, id: InstrId) -> &[InstrId] {
        &self.instr(id).users
    }

    /// Number of distinct user instructions.
    pub fn user_count(&self, id: InstrId) -> usize {
        let mut distinct: SmallVec<[InstrId; 8]> = self.instr(id).users.iter().copied().collect();
        distinct.sort_unstable();
        distinct.dedup();
        distinct.len()
    }

    /// All live instructions, in arena order.
    pub fn live_instructions(&self) -> impl Iterator<Item = (InstrId, &Instruction)> {
        self.instrs
            .iter()
            .enumerate()
            .filter(|(_, instr)| !instr.removed)
            .map(|(i, instr)| (InstrId(i as u32), instr))
    }

    // ---- construction ------------------------------------------------------

    /// Append a new instruction and register it as a user of its operands.
    pub fn add(&mut self, op: Op, shape: Shape) -> InstrId {
        let id = InstrId(self.instrs.len() as u32);
        op.for_each_operand(|operand| {
            debug_assert!((operand.0 as usize) < self.instrs.len());
            self.instrs[operand.0 as usize].users.push(id);
        });
        let name = format!("{}.{}", op.mnemonic(), id.0);
        self.instrs.push(Instruction { op, shape, name, metadata: Metadata::default(), users: SmallVec::new(), removed: false });
        id
    }

    pub fn add_parameter(&mut self, index: i64, shape: Shape, name: impl Into<String>) -> InstrId {
        let id = self.add(Op::Parameter { index }, shape);
        self.instr_mut(id).name = name.into();
        id
    }

    pub fn add_constant(&mut self, literal: Literal) -> InstrId {
        let shape = literal.shape();
        self.add(Op::Constant { literal }, shape)
    }

    /// Elementwise binary op; result shape follows the lhs.
    pub fn add_binary(&mut self, op: BinaryOp, lhs: InstrId, rhs: InstrId) -> InstrId {
        let shape = self.shape(lhs).clone();
        self.add(Op::Binary(op, lhs, rhs), shape)
    }

    pub fn add_unary(&mut self, op: UnaryOp, src: InstrId) -> InstrId {
        let shape = self.shape(src).clone();
        self.add(Op::Unary(op, src), shape)
    }

    /// Convert to `ty`, or return `src` unchanged if it already has that type.
    pub fn add_convert(&mut self, src: InstrId, ty: PrimitiveType) -> InstrId {
        if self.shape(src).element_type() == Some(ty) {
            return src;
        }
        let shape = self.shape(src).with_element_type(ty);
        self.add(Op::Convert { src }, shape)
    }

    pub fn add_broadcast(&mut self, src: InstrId, dims: &[i64], shape: Shape) -> InstrId {
        self.add(Op::Broadcast { src, dims: dims.into() }, shape)
    }

    pub fn add_transpose(&mut self, src: InstrId, permutation: &[i64]) -> InstrId {
        let permutation: SmallVec<[i64; 4]> = permutation.into();
        let shape = match self.shape(src) {
            Shape::Array { element_type, dims, .. } => {
                let out: SmallVec<[i64; 4]> =
                    permutation.iter().map(|&p| dims[p as usize]).collect();
                Shape::array(*element_type, &out)
            }
            tuple @ Shape::Tuple { .. } => tuple.clone(),
        };
        self.add(Op::Transpose { src, permutation }, shape)
    }

    pub fn add_get_tuple_element(&mut self, src: InstrId, index: usize) -> Result<InstrId> {
        let shape = match self.shape(src) {
            Shape::Tuple { elements } => elements
                .get(index)
                .cloned()
                .ok_or_else(|| Error::TupleIndexOutOfRange {
                    name: self.instr(src).name.clone(),
                    index,
                    arity: elements.len(),
                })?,
            Shape::Array { .. } => {
                return Err(Error::NotATuple { name: self.instr(src).name.clone() });
            }
        };
        Ok(self.add(Op::GetTupleElement { src, index }, shape))
    }

    /// Custom-call with a freshly encoded gemm backend config.
    pub fn add_gemm_custom_call(
        &mut self,
        target: CustomCallTarget,
        operands: &[InstrId],
        config: &GemmBackendConfig,
        shape: Shape,
    ) -> Result<InstrId> {
        let backend_config = config.to_json().map_err(|source| Error::MalformedBackendConfig {
            name: "custom-call".into(),
            message: source.to_string(),
        })?;
        Ok(self.add(
            Op::CustomCall {
                target,
                operands: operands.into(),
                backend_config,
                output_operand_aliasing: SmallVec::new(),
            },
            shape,
        ))
    }

    // ---- mutation primitives ----------------------------------------------

    pub fn set_name(&mut self, id: InstrId, name: impl Into<String>) {
        self.instr_mut(id).name = name.into();
    }

    pub fn set_metadata(&mut self, id: InstrId, metadata: Metadata) {
        self.instr_mut(id).metadata = metadata;
    }

    pub fn copy_metadata(&mut self, from: InstrId, to: InstrId) {
        let metadata = self.instr(from).metadata.clone();
        self.instr_mut(to).metadata = metadata;
    }

    /// Redirect every use of `old` (including the root slot) to `new`.
    /// `old` stays live with an empty use-list.
    pub fn replace_all_uses(&mut self, old: InstrId, new: InstrId) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if self.instr(new).removed {
            return Err(Error::InstructionRemoved { name: self.instr(new).name.clone() });
        }
        let users = std::mem::take(&mut self.instr_mut(old).users);
        for &user in &users {
            self.instrs[user.0 as usize].op.for_each_operand_mut(|operand| {
                if *operand == old {
                    *operand = new;
                }
            });
        }
        self.instr_mut(new).users.extend_from_slice(&users);
        if self.root == Some(old) {
            self.root = Some(new);
        }
        Ok(())
    }

    /// Replace `old` with the shape-compatible `new`: repoint all uses,
    /// propagate metadata, and remove `old`.
    pub fn replace_instruction(&mut self, old: InstrId, new: InstrId) -> Result<()> {
        if old == new {
            return Ok(());
        }
        if !self.instr(old).shape.compatible(&self.instr(new).shape) {
            return Err(Error::ReplacementShapeMismatch {
                old: self.instr(old).name.clone(),
                new: self.instr(new).name.clone(),
                old_shape: self.instr(old).shape.to_string(),
                new_shape: self.instr(new).shape.to_string(),
            });
        }
        if self.instr(new).metadata.is_empty() && !self.instr(old).metadata.is_empty() {
            self.copy_metadata(old, new);
        }
        self.replace_all_uses(old, new)?;
        self.remove(old);
        Ok(())
    }

    /// Tombstone `id` and drop its use entries from its operands.
    pub fn remove(&mut self, id: InstrId) {
        if self.instr(id).removed {
            return;
        }
        self.instr_mut(id).removed = true;
        let operands = self.instr(id).op.operands();
        for operand in operands {
            let users = &mut self.instr_mut(operand).users;
            if let Some(pos) = users.iter().position(|&u| u == id) {
                users.remove(pos);
            }
        }
    }

    /// Rewrite one operand slot, repairing both use-lists.
    pub fn set_operand(&mut self, id: InstrId, index: usize, new: InstrId) -> Result<()> {
        let arity = self.instr(id).op.operand_count();
        let Some(old) = self.instr(id).op.operand(index) else {
            return Err(Error::OperandIndexOutOfRange {
                name: self.instr(id).name.clone(),
                index,
                arity,
            });
        };
        if old == new {
            return Ok(());
        }
        if self.instr(new).removed {
            return Err(Error::InstructionRemoved { name: self.instr(new).name.clone() });
        }
        let mut slot = 0;
        self.instrs[id.0 as usize].op.for_each_operand_mut(|operand| {
            if slot == index {
                *operand = new;
            }
            slot += 1;
        });
        let users = &mut self.instr_mut(old).users;
        if let Some(pos) = users.iter().position(|&u| u == id) {
            users.remove(pos);
        }
        self.instr_mut(new).users.push(id);
        Ok(())
    }

    /// Append an operand to a (variadic) custom-call.
    pub fn append_operand(&mut self, id: InstrId, new: InstrId) -> Result<()> {
        if self.instr(new).removed {
            return Err(Error::InstructionRemoved { name: self.instr(new).name.clone() });
        }
        match &mut self.instr_mut(id).op {
            Op::CustomCall { operands, .. } => operands.push(new),
            _ => return Err(Error::NotVariadic { name: self.instr(id).name.clone() }),
        }
        self.instr_mut(new).users.push(id);
        Ok(())
    }

    // ---- traversal ---------------------------------------------------------

    /// Operands-before-users order over the instructions reachable from the
    /// root. Empty when no root is set.
    pub fn post_order(&self) -> Vec<InstrId> {
        let Some(root) = self.root else { return Vec::new() };
        let mut order = Vec::with_capacity(self.instrs.len());
        let mut visited = vec![false; self.instrs.len()];
        // (id, children already pushed)
        let mut stack: Vec<(InstrId, bool)> = vec![(root, false)];
        while let Some((id, expanded)) = stack.pop() {
            if visited[id.0 as usize] {
                continue;
            }
            if expanded {
                visited[id.0 as usize] = true;
                order.push(id);
            } else {
                stack.push((id, true));
                self.instr(id).op.for_each_operand(|operand| {
                    if !visited[operand.0 as usize] {
                        stack.push((operand, false));
                    }
                });
            }
        }
        order
    }

    /// Remove everything unreachable from the root, so that later user-count
    /// checks observe honest counts. Parameters are exempt.
    pub fn sweep_unreachable(&mut self) {
        let mut reachable = vec![false; self.instrs.len()];
        for id in self.post_order() {
            reachable[id.0 as usize] = true;
        }
        for i in 0..self.instrs.len() {
            let id = InstrId(i as u32);
            if reachable[i] || self.instr(id).removed {
                continue;
            }
            if matches!(self.instr(id).op, Op::Parameter { .. }) {
                continue;
            }
            self.remove(id);
        }
    }

    // ---- custom-call accessors ---------------------------------------------

    pub fn custom_call_target(&self, id: InstrId) -> Option<CustomCallTarget> {
        match &self.instr(id).op {
            Op::CustomCall { target, .. } => Some(*target),
            _ => None,
        }
    }

    /// Decode the backend config of a gemm custom-call.
    pub fn gemm_backend_config(&self, id: InstrId) -> Result<GemmBackendConfig> {
        match &self.instr(id).op {
            Op::CustomCall { backend_config, .. } => GemmBackendConfig::from_json(backend_config)
                .map_err(|source| Error::MalformedBackendConfig {
                    name: self.instr(id).name.clone(),
                    message: source.to_string(),
                }),
            _ => Err(Error::NotACustomCall { name: self.instr(id).name.clone() }),
        }
    }

    /// Encode `config` back onto a gemm custom-call.
    pub fn set_gemm_backend_config(&mut self, id: InstrId, config: &GemmBackendConfig) -> Result<()> {
        let blob = config.to_json().map_err(|source| Error::MalformedBackendConfig {
            name: self.instr(id).name.clone(),
            message: source.to_string(),
        })?;
        match &mut self.instr_mut(id).op {
            Op::CustomCall { backend_config, .. } => {
                *backend_config = blob;
                Ok(())
            }
            _ => Err(Error::NotACustomCall { name: self.instr(id).name.clone() }),
        }
    }

    pub fn set_output_operand_aliasing(
        &mut self,
        id: InstrId,
        aliasing: impl Into<SmallVec<[usize; 1]>>,
    ) -> Result<()> {
        match &mut self.instr_mut(id).op {
            Op::CustomCall { output_operand_aliasing, .. } => {
                *output_operand_aliasing = aliasing.into();
                Ok(())
            }
            _ => Err(Error::NotACustomCall { name: self.instr(id).name.clone() }),
        }
    }

    pub fn output_operand_aliasing(&self, id: InstrId) -> Option<&[usize]> {
        match &self.instr(id).op {
            Op::CustomCall { output_operand_aliasing, .. } => Some(output_operand_aliasing),
            _ => None,
        }
    }
}

/// Module-wide knobs rewrite passes consult.
#[derive(Debug, Clone)]
pub struct ModuleConfig {
    /// When false, dots lower to the legacy target unconditionally.
    pub enable_lt_gemm: bool,
}

impl Default for ModuleConfig {
    fn default() -> Self {
        Self { enable_lt_gemm: true }
    }
}

#[derive(Debug, Clone)]
pub struct Module {
    name: String,
    computations: Vec<Computation>,
    pub config: ModuleConfig,
    name_counters: HashMap<String, u64>,
}

impl Module {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            computations: Vec::new(),
            config: ModuleConfig::default(),
            name_counters: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn add_computation(&mut self, computation: Computation) -> usize {
        self.computations.push(computation);
        self.computations.len() - 1
    }

    pub fn computation_count(&self) -> usize {
        self.computations.len()
    }

    pub fn computation(&self, index: usize) -> &Computation {
        &self.computations[index]
    }

    pub fn computation_mut(&mut self, index: usize) -> &mut Computation {
        &mut self.computations[index]
    }

    pub fn computations(&self) -> impl Iterator<Item = &Computation> {
        self.computations.iter()
    }

    /// Module-unique name derived from `base`: `base`, `base.1`, `base.2`, ...
    pub fn uniquify_name(&mut self, base: &str) -> String {
        let count = self.name_counters.entry(base.to_string()).or_insert(0);
        *count += 1;
        if *count == 1 { base.to_string() } else { format!("{base}.{}", *count - 1) }
    }
}
