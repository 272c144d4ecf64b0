//! Call lowering: the full protocol around a single `call` instruction.
//!
//! In order: resolve the callee statically, bind the `this` argument, fill
//! missing arguments from parameter defaults, pass by-ref arguments as
//! addresses (or temporaries with copy-in), append the implicit result and
//! error-out slots, emit the call, then run write-back fixups in argument
//! order and route a raised error to the nearest handler.

use crate::ast::{Decl, DeclKind, DeclRef, Expr, ExprKind, FuncDecl, ParamDir, Subst, Type};
use crate::ir::{Const, IrArg, IrType, Op, Operand, Terminator};
use crate::lower::context::Lowerer;
use crate::lower::errors::{LowerError, LowerErrorKind};
use crate::lower::materialize::AddressMode;
use crate::lower::value::LoweredVal;

/// A by-ref argument passed through a temporary; the temporary's final value
/// is written back to the original destination after the call.
struct Fixup {
    dest: LoweredVal,
    temp: Operand,
}

impl<'a> Lowerer<'a> {
    pub(super) fn lower_call(
        &mut self,
        expr: &Expr,
        callee: &Expr,
        args: &[Expr],
        _is_try: bool,
    ) -> Result<LoweredVal, LowerError> {
        // Taken up front so argument sub-expressions cannot grab a slot the
        // enclosing statement staged for this call.
        let dest_hint = self.dest_hint.take();

        // Callees are resolved statically by the checker; anything else here
        // is a fatal inconsistency.
        let (func_ref, this_base) = match &callee.kind {
            ExprKind::DeclRef(dr) => (dr.clone(), None),
            ExprKind::Member { base, member } => {
                let base_val = self.lower_member_base(base)?;
                (member.clone(), Some(base_val))
            }
            _ => return Err(LowerErrorKind::UnresolvedCallee(callee.id).into()),
        };

        let func_decl = self.module.decl(func_ref.decl);
        let DeclKind::Func(func) = &func_decl.kind else {
            return Err(LowerErrorKind::UnresolvedCallee(callee.id).into());
        };

        let callee_val = self.emit_decl_ref(&func_ref)?;
        let callee_op = self.get_simple_val(callee_val)?;

        let mut operands = vec![callee_op];
        let mut fixups: Vec<Fixup> = Vec::new();

        if let Some(base) = this_base {
            operands.push(self.lower_this_arg(func_decl, base, &mut fixups)?);
        }

        // Defaults evaluate in a child scope so their temporaries cannot
        // shadow or leak into the caller's bindings. The callee's generic
        // parameters are bound to this call site's arguments first, so a
        // default referring to one sees the same substitution the callee
        // will.
        self.push_env();
        let explicit = args.len();
        if explicit < func.params.len() {
            self.bind_substituted_generic_args(&func_ref)?;
        }
        for (i, param_id) in func.params.iter().enumerate() {
            let DeclKind::Param(param) = &self.module.decl(*param_id).kind else {
                return Err(LowerErrorKind::InconsistentMapping.into());
            };
            let op = if i < explicit {
                self.lower_arg(&args[i], param.dir, &mut fixups)?
            } else {
                let Some(default) = &param.default else {
                    return Err(LowerErrorKind::UncheckedAst(expr.id).into());
                };
                self.lower_operand(default)?
            };
            // Later defaults may refer to earlier parameters.
            self.bind(*param_id, LoweredVal::Simple(op));
            operands.push(op);
        }
        self.pop_env();

        // A non-copyable result is returned through a caller-provided slot:
        // the destination the enclosing statement staged, or a fresh
        // temporary.
        let ret_dest = if self.returns_non_copyable(func) {
            let dest = match dest_hint {
                Some(dest) => dest,
                None => {
                    let ret_ty = self.lower_type(&func.ret_ty)?;
                    self.emit_var(ret_ty)?
                }
            };
            operands.push(dest);
            Some(dest)
        } else {
            // Unused; hand it back so the stager falls back to a copy.
            self.dest_hint = dest_hint;
            None
        };

        // A throwing callee gets the implicit error-out slots.
        let error_slots = match &func.error_ty {
            Some(error_ty) => {
                let err_ty = self.lower_type(error_ty)?;
                let err_ptr = self.emit_var(err_ty)?;
                let bool_ty = self.ir.types.intern(IrType::Bool);
                let threw_ptr = self.emit_var(bool_ty)?;
                self.emit_store(threw_ptr, Operand::Const(Const::Bool(false)))?;
                operands.push(err_ptr);
                operands.push(threw_ptr);
                Some((err_ptr, threw_ptr))
            }
            None => None,
        };

        let call_ret_ty = if ret_dest.is_some() {
            self.ir.types.intern(IrType::Void)
        } else {
            self.lower_type(&expr.ty)?
        };
        let call = self.emit(Op::Call, call_ret_ty, operands)?;

        for fixup in fixups {
            let value = self.emit_load(fixup.temp)?;
            self.assign(fixup.dest, Operand::Inst(value))?;
        }

        // Propagation is the same with or without `try`; the keyword is a
        // checker-side obligation marker.
        if let Some((err_ptr, threw_ptr)) = error_slots {
            self.route_raised_error(expr, err_ptr, threw_ptr)?;
        }

        if let Some(dest) = ret_dest {
            return Ok(LoweredVal::Ptr(dest));
        }
        if matches!(func.ret_ty, Type::Void) {
            return Ok(LoweredVal::None);
        }
        Ok(LoweredVal::Simple(Operand::Inst(call)))
    }

    /// The `this` argument: an address for mutating callees (with write-back
    /// when only a temporary address exists), a plain value otherwise.
    fn lower_this_arg(
        &mut self,
        func_decl: &Decl,
        base: LoweredVal,
        fixups: &mut Vec<Fixup>,
    ) -> Result<Operand, LowerError> {
        if !func_decl.modifiers.is_mutating {
            return self.get_simple_val(base);
        }
        if let Some(addr) = self.try_get_address(base, AddressMode::Aggressive)? {
            return Ok(addr);
        }
        let value = self.get_simple_val(base)?;
        let ty = self.operand_ty(value)?;
        let temp = self.emit_var(ty)?;
        self.emit_store(temp, value)?;
        fixups.push(Fixup { dest: base, temp });
        Ok(temp)
    }

    fn lower_arg(
        &mut self,
        arg: &Expr,
        dir: ParamDir,
        fixups: &mut Vec<Fixup>,
    ) -> Result<Operand, LowerError> {
        if !dir.is_by_ref() {
            return self.lower_operand(arg);
        }
        let dest = self.lower_lvalue_expr(arg)?;
        if let Some(addr) = self.try_get_address(dest, AddressMode::Aggressive)? {
            return Ok(addr);
        }
        // No direct address: pass a temporary, copying the current value in
        // when the callee may read it, and copying back out when the callee
        // may write it.
        let ty = self.lowered_val_ty(dest)?;
        let temp = self.emit_var(ty)?;
        if dir.needs_copy_in() {
            let current = self.get_simple_val(dest)?;
            self.emit_store(temp, current)?;
        }
        if dir.needs_fixup() {
            fixups.push(Fixup { dest, temp });
        }
        Ok(temp)
    }

    /// Bind the callee's generic parameters to the arguments applied by the
    /// reference, positionally, in the current (defaults) scope.
    fn bind_substituted_generic_args(&mut self, func_ref: &DeclRef) -> Result<(), LowerError> {
        let module = self.module;
        for subst in &func_ref.substs {
            let Subst::Generic { generic, args } = subst else {
                continue;
            };
            let DeclKind::Generic(g) = &module.decl(*generic).kind else {
                return Err(LowerErrorKind::InconsistentMapping.into());
            };
            for (p_id, arg) in g.params.iter().zip(args) {
                let val = match self.lower_val(arg)? {
                    IrArg::Value(v) => LoweredVal::Simple(Operand::Global(v)),
                    IrArg::Type(t) => LoweredVal::Simple(Operand::Type(t)),
                };
                self.bind(*p_id, val);
            }
        }
        Ok(())
    }

    /// Whether an expression is a call whose result comes back through the
    /// implicit trailing destination parameter.
    pub(super) fn is_non_copyable_call(&self, expr: &Expr) -> bool {
        let callee = match &expr.kind {
            ExprKind::Call { callee, .. } => callee,
            ExprKind::TryCall(inner) => match &inner.kind {
                ExprKind::Call { callee, .. } => callee,
                _ => return false,
            },
            _ => return false,
        };
        let decl = match &callee.kind {
            ExprKind::DeclRef(dr) => dr.decl,
            ExprKind::Member { member, .. } => member.decl,
            _ => return false,
        };
        match &self.module.decl(decl).kind {
            DeclKind::Func(func) => self.returns_non_copyable(func),
            _ => false,
        }
    }

    fn returns_non_copyable(&self, func: &FuncDecl) -> bool {
        let Type::Struct(dr) = &func.ret_ty else {
            return false;
        };
        matches!(
            &self.module.decl(dr.decl).kind,
            DeclKind::Struct(s) if s.is_non_copyable
        )
    }

    /// After a call to a throwing function: check the flag and branch to the
    /// nearest catch handler, or re-raise through this function's own
    /// error-out slots.
    fn route_raised_error(
        &mut self,
        expr: &Expr,
        err_ptr: Operand,
        threw_ptr: Operand,
    ) -> Result<(), LowerError> {
        let threw = self.emit_load(threw_ptr)?;
        let raise_bb = self.new_block()?;
        let cont_bb = self.new_block()?;
        self.terminate(Terminator::Branch {
            cond: Operand::Inst(threw),
            then_bb: raise_bb,
            else_bb: cont_bb,
        })?;
        self.select_block(raise_bb)?;
        let err = self.emit_load(err_ptr)?;
        if let Some(handler) = self.catch_handlers.last().copied() {
            self.emit_store(handler.err_var, Operand::Inst(err))?;
            self.terminate(Terminator::Jump(handler.block))?;
        } else if let Some(out) = self.error_out {
            self.emit_store(out.err_ptr, Operand::Inst(err))?;
            self.emit_store(out.threw_ptr, Operand::Const(Const::Bool(true)))?;
            self.emit_error_return()?;
        } else {
            // A raise with nowhere to go should have been rejected upstream.
            return Err(LowerErrorKind::UncheckedAst(expr.id).into());
        }
        self.select_block(cont_bb)?;
        Ok(())
    }

    /// Return after storing to the error-out slots. The normal result is
    /// undefined; callers must check the flag before using it.
    pub(super) fn emit_error_return(&mut self) -> Result<(), LowerError> {
        let builder = self.cursor()?;
        let ret_ty = self.ir.func(builder.func).ret_ty;
        if matches!(self.ir.types.kind(ret_ty), IrType::Void) {
            self.terminate(Terminator::Return(None))?;
        } else {
            let undef = self.emit(Op::Undef, ret_ty, vec![])?;
            self.terminate(Terminator::Return(Some(Operand::Inst(undef))))?;
        }
        Ok(())
    }

    /// The IR type a lowered value would have when read.
    pub(super) fn lowered_val_ty(&mut self, val: LoweredVal) -> Result<crate::ir::TyId, LowerError> {
        use crate::lower::value::ExtRec;
        match val {
            LoweredVal::None => Ok(self.ir.types.intern(IrType::Void)),
            LoweredVal::Simple(op) => self.operand_ty(op),
            LoweredVal::Ptr(ptr) => {
                let ptr_ty = self.operand_ty(ptr)?;
                self.ir
                    .types
                    .pointee(ptr_ty)
                    .ok_or_else(|| LowerErrorKind::InvalidValFlavor.into())
            }
            LoweredVal::BoundStorage(id) => match self.ext.get(id) {
                ExtRec::BoundStorage(info) => Ok(info.result_ty),
                _ => Err(LowerErrorKind::InvalidValFlavor.into()),
            },
            LoweredVal::BoundMember(id) => match self.ext.get(id) {
                ExtRec::BoundMember(info) => Ok(info.result_ty),
                _ => Err(LowerErrorKind::InvalidValFlavor.into()),
            },
            LoweredVal::Swizzled(id) => match self.ext.get(id) {
                ExtRec::Swizzled(info) => Ok(info.result_ty),
                _ => Err(LowerErrorKind::InvalidValFlavor.into()),
            },
            LoweredVal::SwizzledMatrix(id) => match self.ext.get(id) {
                ExtRec::SwizzledMatrix(info) => Ok(info.result_ty),
                _ => Err(LowerErrorKind::InvalidValFlavor.into()),
            },
            LoweredVal::ExtractedExistential(id) => match self.ext.get(id) {
                ExtRec::ExtractedExistential(info) => Ok(info.result_ty),
                _ => Err(LowerErrorKind::InvalidValFlavor.into()),
            },
            LoweredVal::ImplicitCastedLValue(id) => match self.ext.get(id) {
                ExtRec::ImplicitCast(info) => Ok(info.outer_ty),
                _ => Err(LowerErrorKind::InvalidValFlavor.into()),
            },
        }
    }
}

#[cfg(test)]
#[path = "../tests/t_lower_call.rs"]
mod tests;
