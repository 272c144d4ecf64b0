//! Expression lowering.
//!
//! Expressions lower to `LoweredVal`s rather than straight to instructions so
//! that a single lowering serves both value and assignment positions. The
//! `lvalue_ctx` flag on the context only changes decisions that cannot be
//! deferred (casts in assignment position); everything else stays symmetric
//! and `materialize`/`assign` commit later.

use crate::ast::{BinaryOp, DeclKind, Expr, ExprKind, Type, UnaryOp};
use crate::ir::{BinOp, Const, IrArg, Op, Operand, Terminator, UnOp};
use crate::lower::context::Lowerer;
use crate::lower::errors::{LowerError, LowerErrorKind};
use crate::lower::value::{
    BoundMemberInfo, BoundStorageInfo, ExtRec, ExtractedExistentialInfo, ImplicitCastInfo,
    SwizzledLValueInfo, SwizzledMatrixLValueInfo,
};
use crate::lower::value::LoweredVal;

impl<'a> Lowerer<'a> {
    /// Lower an expression in value position.
    pub(super) fn lower_rvalue_expr(&mut self, expr: &Expr) -> Result<LoweredVal, LowerError> {
        let saved = self.lvalue_ctx;
        self.lvalue_ctx = false;
        let result = self.lower_expr(expr);
        self.lvalue_ctx = saved;
        result
    }

    /// Lower an expression in assignment position.
    pub(super) fn lower_lvalue_expr(&mut self, expr: &Expr) -> Result<LoweredVal, LowerError> {
        let saved = self.lvalue_ctx;
        self.lvalue_ctx = true;
        let result = self.lower_expr(expr);
        self.lvalue_ctx = saved;
        result
    }

    /// Lower an expression all the way to an r-value operand.
    pub(super) fn lower_operand(&mut self, expr: &Expr) -> Result<Operand, LowerError> {
        let val = self.lower_rvalue_expr(expr)?;
        self.get_simple_val(val)
    }

    pub(super) fn lower_expr(&mut self, expr: &Expr) -> Result<LoweredVal, LowerError> {
        self.set_debug_loc(expr.loc)?;
        let result = self.lower_expr_kind(expr);
        result.map_err(|e| e.or_loc(expr.loc))
    }

    fn lower_expr_kind(&mut self, expr: &Expr) -> Result<LoweredVal, LowerError> {
        match &expr.kind {
            ExprKind::IntLit(v) => Ok(LoweredVal::Simple(Operand::Const(Const::Int(*v)))),
            ExprKind::FloatLit(v) => Ok(LoweredVal::Simple(Operand::Const(Const::float(*v)))),
            ExprKind::BoolLit(v) => Ok(LoweredVal::Simple(Operand::Const(Const::Bool(*v)))),
            ExprKind::StringLit(s) => {
                let id = self.ir.intern_string(s);
                Ok(LoweredVal::Simple(Operand::Const(Const::Str(id))))
            }

            ExprKind::DeclRef(dr) => {
                if dr.substs.is_empty() {
                    if let Some(val) = self.lookup(dr.decl) {
                        return Ok(val);
                    }
                }
                self.emit_decl_ref(dr)
            }

            ExprKind::This => match self.this_val {
                LoweredVal::None => Err(LowerErrorKind::InconsistentMapping.into()),
                val => Ok(val),
            },

            ExprKind::Member { base, member } => {
                let base_val = self.lower_member_base(base)?;
                let result_ty = self.lower_type(&expr.ty)?;
                match &self.module.decl(member.decl).kind {
                    DeclKind::Field(field) => {
                        let index = field.index;
                        let rec = self.ext.alloc(ExtRec::BoundMember(BoundMemberInfo {
                            base: base_val,
                            member: member.clone(),
                            field_index: Some(index),
                            result_ty,
                        }));
                        Ok(LoweredVal::BoundMember(rec))
                    }
                    DeclKind::Property(_) => {
                        let rec = self.ext.alloc(ExtRec::BoundStorage(BoundStorageInfo {
                            storage: member.clone(),
                            base: base_val,
                            args: Vec::new(),
                            result_ty,
                        }));
                        Ok(LoweredVal::BoundStorage(rec))
                    }
                    DeclKind::Func(_) | DeclKind::Generic(_) => {
                        let rec = self.ext.alloc(ExtRec::BoundMember(BoundMemberInfo {
                            base: base_val,
                            member: member.clone(),
                            field_index: None,
                            result_ty,
                        }));
                        Ok(LoweredVal::BoundMember(rec))
                    }
                    // Static members resolve like any other declaration.
                    _ => self.emit_decl_ref(member),
                }
            }

            ExprKind::Swizzle { base, indices } => {
                let mut base_val = self.lower_expr(base)?;
                let mut indices = indices.clone();
                // Fold swizzle-of-swizzle into one composed swizzle at
                // construction time; neither read nor write sees two steps.
                if let LoweredVal::Swizzled(id) = base_val {
                    let inner = self.ext.swizzled(id).clone();
                    indices = indices
                        .iter()
                        .map(|&i| inner.indices[i as usize])
                        .collect();
                    base_val = inner.base;
                }
                let result_ty = self.lower_type(&expr.ty)?;
                let rec = self.ext.alloc(ExtRec::Swizzled(SwizzledLValueInfo {
                    base: base_val,
                    indices,
                    result_ty,
                }));
                Ok(LoweredVal::Swizzled(rec))
            }

            ExprKind::MatrixSwizzle { base, coords } => {
                let base_val = self.lower_expr(base)?;
                let result_ty = self.lower_type(&expr.ty)?;
                let rec = self
                    .ext
                    .alloc(ExtRec::SwizzledMatrix(SwizzledMatrixLValueInfo {
                        base: base_val,
                        coords: coords.clone(),
                        result_ty,
                    }));
                Ok(LoweredVal::SwizzledMatrix(rec))
            }

            ExprKind::Index { base, args } => self.lower_index(expr, base, args),

            ExprKind::Call { callee, args } => self.lower_call(expr, callee, args, false),

            ExprKind::TryCall(inner) => match &inner.kind {
                ExprKind::Call { callee, args } => self.lower_call(inner, callee, args, true),
                _ => Err(LowerErrorKind::UncheckedAst(inner.id).into()),
            },

            ExprKind::Assign { left, right } => {
                let dest = self.lower_lvalue_expr(left)?;
                // A call whose result comes back through the implicit
                // destination parameter fills an addressable left side
                // directly, with no intermediate copy.
                if let LoweredVal::Ptr(addr) = dest {
                    if self.is_non_copyable_call(right) {
                        self.dest_hint = Some(addr);
                        let val = self.lower_rvalue_expr(right)?;
                        if self.dest_hint.take().is_some() {
                            let src = self.get_simple_val(val)?;
                            self.assign(dest, src)?;
                        }
                        return Ok(dest);
                    }
                }
                let src = self.lower_operand(right)?;
                self.assign(dest, src)?;
                Ok(dest)
            }

            ExprKind::Cast { kind, inner } => {
                let outer_ty = self.lower_type(&expr.ty)?;
                if self.lvalue_ctx {
                    let base = self.lower_expr(inner)?;
                    let inner_ty = self.lower_type(&inner.ty)?;
                    let rec = self.ext.alloc(ExtRec::ImplicitCast(ImplicitCastInfo {
                        base,
                        kind: *kind,
                        outer_ty,
                        inner_ty,
                    }));
                    return Ok(LoweredVal::ImplicitCastedLValue(rec));
                }
                let value = self.lower_operand(inner)?;
                let inst = self.emit_cast(*kind, value, outer_ty)?;
                Ok(LoweredVal::Simple(Operand::Inst(inst)))
            }

            ExprKind::And { left, right } => self.lower_short_circuit(left, right, true),
            ExprKind::Or { left, right } => self.lower_short_circuit(left, right, false),

            ExprKind::Select {
                cond,
                then_val,
                else_val,
            } => {
                // Both arms are evaluated; select is a lane-wise pick, not
                // control flow.
                let cond = self.lower_operand(cond)?;
                let then_val = self.lower_operand(then_val)?;
                let else_val = self.lower_operand(else_val)?;
                let result_ty = self.lower_type(&expr.ty)?;
                let inst = self.emit(Op::Select, result_ty, vec![cond, then_val, else_val])?;
                Ok(LoweredVal::Simple(Operand::Inst(inst)))
            }

            ExprKind::BinOp { op, left, right } => {
                let left = self.lower_operand(left)?;
                let right = self.lower_operand(right)?;
                let result_ty = self.lower_type(&expr.ty)?;
                let inst =
                    self.emit(Op::BinOp(Self::bin_op(*op)), result_ty, vec![left, right])?;
                Ok(LoweredVal::Simple(Operand::Inst(inst)))
            }

            ExprKind::UnOp { op, arg } => {
                let arg = self.lower_operand(arg)?;
                let result_ty = self.lower_type(&expr.ty)?;
                let op = match op {
                    UnaryOp::Neg => UnOp::Neg,
                    UnaryOp::Not => UnOp::Not,
                };
                let inst = self.emit(Op::UnOp(op), result_ty, vec![arg])?;
                Ok(LoweredVal::Simple(Operand::Inst(inst)))
            }

            ExprKind::InitList(items) => self.lower_init_list(expr, items),

            ExprKind::MakeExistential { inner, witness } => {
                let value = self.lower_operand(inner)?;
                let witness = self.lower_witness(witness)?;
                let result_ty = self.lower_type(&expr.ty)?;
                let inst = self.emit(
                    Op::MakeExistential,
                    result_ty,
                    vec![value, Self::arg_operand(witness)],
                )?;
                Ok(LoweredVal::Simple(Operand::Inst(inst)))
            }
        }
    }

    /// Lower the base of a member access. An existential base is opened
    /// first: the concrete value and witness are extracted, and the original
    /// location is remembered so writes can rewrap.
    pub(super) fn lower_member_base(&mut self, base: &Expr) -> Result<LoweredVal, LowerError> {
        let base_val = self.lower_expr(base)?;
        if !matches!(base.ty, Type::Interface(_)) {
            return Ok(base_val);
        }
        let existential_ty = self.lower_type(&base.ty)?;
        let simple = self.get_simple_val(base_val)?;
        let value = self.emit(Op::ExtractExistentialValue, existential_ty, vec![simple])?;
        let void = self.ir.types.intern(crate::ir::IrType::Void);
        let witness = self.emit(Op::ExtractExistentialWitness, void, vec![simple])?;
        let rec = self
            .ext
            .alloc(ExtRec::ExtractedExistential(ExtractedExistentialInfo {
                value: Operand::Inst(value),
                witness: Operand::Inst(witness),
                orig: base_val,
                result_ty: existential_ty,
                existential_ty,
            }));
        Ok(LoweredVal::ExtractedExistential(rec))
    }

    fn lower_index(
        &mut self,
        expr: &Expr,
        base: &Expr,
        args: &[Expr],
    ) -> Result<LoweredVal, LowerError> {
        // Subscript access on an aggregate routes through its accessors.
        if let Type::Struct(dr) = &base.ty {
            let Some(subscript) = self.find_subscript(dr.decl) else {
                return Err(LowerErrorKind::UncheckedAst(expr.id).into());
            };
            let base_val = self.lower_expr(base)?;
            let mut operands = Vec::with_capacity(args.len());
            for arg in args {
                operands.push(self.lower_operand(arg)?);
            }
            let result_ty = self.lower_type(&expr.ty)?;
            let storage = crate::ast::DeclRef {
                decl: subscript,
                substs: dr.substs.clone(),
            };
            let rec = self.ext.alloc(ExtRec::BoundStorage(BoundStorageInfo {
                storage,
                base: base_val,
                args: operands,
                result_ty,
            }));
            return Ok(LoweredVal::BoundStorage(rec));
        }

        // Vector/matrix/array element access.
        let base_val = self.lower_expr(base)?;
        let [index] = args else {
            return Err(LowerErrorKind::UncheckedAst(expr.id).into());
        };
        let index = self.lower_operand(index)?;
        let result_ty = self.lower_type(&expr.ty)?;
        if let Some(addr) =
            self.try_get_address(base_val, crate::lower::materialize::AddressMode::Default)?
        {
            let ptr_ty = self.ir.types.intern(crate::ir::IrType::Ptr {
                pointee: result_ty,
            });
            let inst = self.emit(Op::ElemAddr, ptr_ty, vec![addr, index])?;
            return Ok(LoweredVal::Ptr(Operand::Inst(inst)));
        }
        let value = self.get_simple_val(base_val)?;
        let inst = self.emit(Op::ElemExtract, result_ty, vec![value, index])?;
        Ok(LoweredVal::Simple(Operand::Inst(inst)))
    }

    fn find_subscript(&self, decl: crate::ast::DeclId) -> Option<crate::ast::DeclId> {
        let DeclKind::Struct(s) = &self.module.decl(decl).kind else {
            return None;
        };
        s.members
            .iter()
            .copied()
            .find(|m| matches!(self.module.decl(*m).kind, DeclKind::Subscript(_)))
    }

    /// `&&` and `||` evaluate the right operand only when it matters.
    fn lower_short_circuit(
        &mut self,
        left: &Expr,
        right: &Expr,
        is_and: bool,
    ) -> Result<LoweredVal, LowerError> {
        let bool_ty = self.ir.types.intern(crate::ir::IrType::Bool);
        let result = self.emit_var(bool_ty)?;
        let lhs = self.lower_operand(left)?;
        self.emit_store(result, lhs)?;
        let rhs_bb = self.new_block()?;
        let merge_bb = self.new_block()?;
        let (then_bb, else_bb) = if is_and {
            (rhs_bb, merge_bb)
        } else {
            (merge_bb, rhs_bb)
        };
        self.terminate(Terminator::Branch {
            cond: lhs,
            then_bb,
            else_bb,
        })?;
        self.select_block(rhs_bb)?;
        let rhs = self.lower_operand(right)?;
        self.emit_store(result, rhs)?;
        self.terminate(Terminator::Jump(merge_bb))?;
        self.select_block(merge_bb)?;
        let loaded = self.emit_load(result)?;
        Ok(LoweredVal::Simple(Operand::Inst(loaded)))
    }

    fn lower_init_list(
        &mut self,
        expr: &Expr,
        items: &[Expr],
    ) -> Result<LoweredVal, LowerError> {
        let result_ty = self.lower_type(&expr.ty)?;
        if items.is_empty() {
            let inst = self.emit(Op::Undef, result_ty, vec![])?;
            return Ok(LoweredVal::Simple(Operand::Inst(inst)));
        }
        let mut operands = Vec::with_capacity(items.len());
        for item in items {
            operands.push(self.lower_operand(item)?);
        }
        let op = match &expr.ty {
            Type::Vector { .. } => Op::MakeVector,
            Type::Matrix { .. } => Op::MakeMatrix,
            Type::Array { .. } => Op::MakeArray,
            Type::Struct(_) => Op::MakeStruct,
            // A one-element list over a scalar is just that value.
            _ if operands.len() == 1 => {
                return Ok(LoweredVal::Simple(operands[0]));
            }
            _ => return Err(LowerErrorKind::UncheckedAst(expr.id).into()),
        };
        let inst = self.emit(op, result_ty, operands)?;
        Ok(LoweredVal::Simple(Operand::Inst(inst)))
    }

    pub(super) fn arg_operand(arg: IrArg) -> Operand {
        match arg {
            IrArg::Value(v) => Operand::Global(v),
            IrArg::Type(t) => Operand::Type(t),
        }
    }

    fn bin_op(op: BinaryOp) -> BinOp {
        match op {
            BinaryOp::Add => BinOp::Add,
            BinaryOp::Sub => BinOp::Sub,
            BinaryOp::Mul => BinOp::Mul,
            BinaryOp::Div => BinOp::Div,
            BinaryOp::Eq => BinOp::Eq,
            BinaryOp::Ne => BinOp::Ne,
            BinaryOp::Lt => BinOp::Lt,
            BinaryOp::Gt => BinOp::Gt,
            BinaryOp::LtEq => BinOp::LtEq,
            BinaryOp::GtEq => BinOp::GtEq,
        }
    }
}

#[cfg(test)]
#[path = "../tests/t_lower_expr.rs"]
mod tests;
