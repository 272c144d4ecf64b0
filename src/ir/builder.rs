//! Insertion-point builder for function bodies.
//!
//! A builder is a lightweight cursor (function, current block) over the
//! module; nested lowering saves and restores the whole cursor rather than
//! sharing one. Instructions are stamped with the cursor's current debug
//! location.

use crate::diag::SourceLoc;
use crate::ir::{
    BlockId, Const, InstId, IrBlock, IrBody, IrInst, IrModule, IrType, Op, Operand, Terminator,
    TyId, ValueId,
};

#[derive(Debug, Clone, Copy)]
pub struct IrBuilder {
    pub func: ValueId,
    pub block: BlockId,
    pub debug_loc: Option<SourceLoc>,
}

impl IrBuilder {
    /// Position a builder at the entry block of `func`'s (existing) body.
    pub fn at_entry(m: &IrModule, func: ValueId) -> Self {
        let entry = m.body(func).entry;
        Self {
            func,
            block: entry,
            debug_loc: None,
        }
    }

    pub fn new_block(&mut self, m: &mut IrModule) -> BlockId {
        let body = m.body_mut(self.func);
        let id = BlockId(body.blocks.len() as u32);
        body.blocks.push(IrBlock::default());
        id
    }

    pub fn select_block(&mut self, block: BlockId) {
        self.block = block;
    }

    pub fn is_terminated(&self, m: &IrModule) -> bool {
        !matches!(
            m.body(self.func).block(self.block).term,
            Terminator::Unterminated
        )
    }

    pub fn terminate(&mut self, m: &mut IrModule, term: Terminator) {
        debug_assert!(
            !matches!(term, Terminator::Unterminated),
            "cannot terminate with Unterminated"
        );
        let block = &mut m.body_mut(self.func).blocks[self.block.index()];
        // Keep the first terminator: statements after an unconditional exit
        // have already been diagnosed upstream.
        if matches!(block.term, Terminator::Unterminated) {
            block.term = term;
        }
    }

    pub fn emit(&mut self, m: &mut IrModule, op: Op, ty: TyId, operands: Vec<Operand>) -> InstId {
        let loc = self.debug_loc;
        let body = m.body_mut(self.func);
        let id = InstId(body.insts.len() as u32);
        body.insts.push(IrInst {
            op,
            ty,
            operands,
            loc,
            mark: None,
        });
        body.blocks[self.block.index()].insts.push(id);
        id
    }

    pub fn inst_ty(&self, m: &IrModule, id: InstId) -> TyId {
        m.body(self.func).inst(id).ty
    }

    /// Result type of an operand in the current function.
    pub fn operand_ty(&self, m: &mut IrModule, operand: Operand) -> TyId {
        match operand {
            Operand::Inst(id) => self.inst_ty(m, id),
            Operand::Global(id) => m.value(id).ty,
            Operand::Const(Const::Int(_)) => m.types.intern(IrType::Int {
                signed: true,
                bits: 32,
            }),
            Operand::Const(Const::Float(_)) => m.types.intern(IrType::Float { bits: 32 }),
            Operand::Const(Const::Bool(_)) => m.types.intern(IrType::Bool),
            Operand::Const(Const::Str(_)) | Operand::Const(Const::Unit) => {
                m.types.intern(IrType::Void)
            }
            Operand::Type(_) => m.types.intern(IrType::Void),
        }
    }

    // --- Convenience emitters ---

    pub fn emit_var(&mut self, m: &mut IrModule, slot_ty: TyId) -> InstId {
        let ptr_ty = m.types.intern(IrType::Ptr { pointee: slot_ty });
        self.emit(m, Op::Var, ptr_ty, vec![])
    }

    pub fn emit_load(&mut self, m: &mut IrModule, ptr: Operand) -> InstId {
        let ptr_ty = self.operand_ty(m, ptr);
        let mut pointee = m.types.pointee(ptr_ty).unwrap_or(ptr_ty);
        // Loading through a pointer-to-atomic yields the inner value.
        if let IrType::Atomic { inner } = m.types.kind(pointee) {
            pointee = *inner;
        }
        self.emit(m, Op::Load, pointee, vec![ptr])
    }

    pub fn emit_store(&mut self, m: &mut IrModule, ptr: Operand, value: Operand) -> InstId {
        let ptr_ty = self.operand_ty(m, ptr);
        let void = m.types.intern(IrType::Void);
        let atomic = m
            .types
            .pointee(ptr_ty)
            .map(|p| matches!(m.types.kind(p), IrType::Atomic { .. }))
            .unwrap_or(false);
        let op = if atomic { Op::AtomicStore } else { Op::Store };
        self.emit(m, op, void, vec![ptr, value])
    }

    pub fn emit_call(
        &mut self,
        m: &mut IrModule,
        ret_ty: TyId,
        callee: Operand,
        args: Vec<Operand>,
    ) -> InstId {
        let mut operands = Vec::with_capacity(args.len() + 1);
        operands.push(callee);
        operands.extend(args);
        self.emit(m, Op::Call, ret_ty, operands)
    }

    pub fn emit_field_addr(
        &mut self,
        m: &mut IrModule,
        field_ty: TyId,
        base: Operand,
        index: usize,
    ) -> InstId {
        let ptr_ty = m.types.intern(IrType::Ptr { pointee: field_ty });
        self.emit(m, Op::FieldAddr { index }, ptr_ty, vec![base])
    }

    pub fn emit_elem_addr(
        &mut self,
        m: &mut IrModule,
        elem_ty: TyId,
        base: Operand,
        index: Operand,
    ) -> InstId {
        let ptr_ty = m.types.intern(IrType::Ptr { pointee: elem_ty });
        self.emit(m, Op::ElemAddr, ptr_ty, vec![base, index])
    }

    pub fn emit_undef(&mut self, m: &mut IrModule, ty: TyId) -> InstId {
        self.emit(m, Op::Undef, ty, vec![])
    }
}

/// Create a function body with its entry block and parameter instructions,
/// returning the builder positioned at the entry.
pub fn begin_body(m: &mut IrModule, func: ValueId) -> (IrBuilder, Vec<InstId>) {
    let param_tys = m.func(func).param_tys.clone();
    m.func_mut(func).body = Some(IrBody::new());
    let mut builder = IrBuilder::at_entry(m, func);
    let params = param_tys
        .iter()
        .enumerate()
        .map(|(i, ty)| builder.emit(m, Op::Param { index: i as u32 }, *ty, vec![]))
        .collect();
    (builder, params)
}

#[cfg(test)]
#[path = "../tests/t_ir_builder.rs"]
mod tests;
