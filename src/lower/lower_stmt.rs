//! Statement lowering.
//!
//! Control flow is built out of explicit blocks and terminators; there is no
//! structured-region reconstruction here. Deferred statements are collected
//! per lexical scope and replayed, innermost-first, in a dedicated scope-end
//! block on every path that leaves the scope: fall-through, break, continue,
//! and return.

use crate::ast::{DeclKind, Expr, ExprKind, NodeId, Stmt, StmtKind};
use crate::diag::DiagCode;
use crate::ir::{Const, IrType, Op, Operand, Terminator};
use crate::lower::context::{CatchHandler, DeferScope, Lowerer};
use crate::lower::errors::{LowerError, LowerErrorKind};
use crate::lower::value::LoweredVal;

impl<'a> Lowerer<'a> {
    pub(super) fn lower_stmt(&mut self, stmt: &'a Stmt) -> Result<(), LowerError> {
        self.set_debug_loc(stmt.loc)?;
        self.lower_stmt_kind(stmt).map_err(|e| e.or_loc(stmt.loc))
    }

    fn lower_stmt_kind(&mut self, stmt: &'a Stmt) -> Result<(), LowerError> {
        match &stmt.kind {
            StmtKind::Block(stmts) => self.lower_block(stmts),

            StmtKind::Empty => Ok(()),

            StmtKind::Local(decl_id) => {
                let DeclKind::Var(var) = &self.module.decl(*decl_id).kind else {
                    return Err(LowerErrorKind::InconsistentMapping.into());
                };
                let ty = self.lower_type(&var.ty)?;
                // An initializer returning through the implicit destination
                // parameter fills the local's slot directly.
                if let Some(init) = &var.init {
                    if self.is_non_copyable_call(init) {
                        let slot = self.emit_local(ty, None)?;
                        self.dest_hint = Some(slot);
                        let val = self.lower_rvalue_expr(init)?;
                        if self.dest_hint.take().is_some() {
                            let value = self.get_simple_val(val)?;
                            self.emit_store(slot, value)?;
                        }
                        self.bind(*decl_id, LoweredVal::Ptr(slot));
                        return Ok(());
                    }
                }
                let init = match &var.init {
                    Some(init) => Some(self.lower_operand(init)?),
                    None => None,
                };
                let slot = self.emit_local(ty, init)?;
                self.bind(*decl_id, LoweredVal::Ptr(slot));
                Ok(())
            }

            StmtKind::Expr(expr) => {
                self.lower_rvalue_expr(expr)?;
                Ok(())
            }

            StmtKind::If {
                cond,
                then_branch,
                else_branch,
            } => {
                let cond = self.lower_operand(cond)?;
                let then_bb = self.new_block()?;
                let merge_bb = self.new_block()?;
                let else_bb = match else_branch {
                    Some(_) => self.new_block()?,
                    None => merge_bb,
                };
                self.terminate(Terminator::Branch {
                    cond,
                    then_bb,
                    else_bb,
                })?;
                self.select_block(then_bb)?;
                self.lower_stmt(then_branch)?;
                if !self.block_terminated() {
                    self.terminate(Terminator::Jump(merge_bb))?;
                }
                if let Some(else_branch) = else_branch {
                    self.select_block(else_bb)?;
                    self.lower_stmt(else_branch)?;
                    if !self.block_terminated() {
                        self.terminate(Terminator::Jump(merge_bb))?;
                    }
                }
                self.select_block(merge_bb)
            }

            StmtKind::While { cond, body } => {
                let header = self.new_block()?;
                self.terminate(Terminator::Jump(header))?;
                self.select_block(header)?;
                let cond = self.lower_operand(cond)?;
                let body_bb = self.new_block()?;
                let exit_bb = self.new_block()?;
                self.terminate(Terminator::Branch {
                    cond,
                    then_bb: body_bb,
                    else_bb: exit_bb,
                })?;
                self.break_labels.insert(stmt.id, exit_bb);
                self.continue_labels.insert(stmt.id, header);
                self.defer_scopes.push(DeferScope {
                    breakable: Some(stmt.id),
                    defers: Vec::new(),
                });
                self.select_block(body_bb)?;
                self.lower_stmt(body)?;
                if !self.block_terminated() {
                    self.terminate(Terminator::Jump(header))?;
                }
                self.defer_scopes.pop();
                self.select_block(exit_bb)
            }

            StmtKind::For {
                init,
                cond,
                step,
                body,
            } => {
                // Init bindings are scoped to the loop.
                self.push_env();
                if let Some(init) = init {
                    self.lower_stmt(init)?;
                }
                let header = self.new_block()?;
                self.terminate(Terminator::Jump(header))?;
                self.select_block(header)?;
                let body_bb = self.new_block()?;
                let exit_bb = self.new_block()?;
                match cond {
                    Some(cond) => {
                        let cond = self.lower_operand(cond)?;
                        self.terminate(Terminator::Branch {
                            cond,
                            then_bb: body_bb,
                            else_bb: exit_bb,
                        })?;
                    }
                    None => self.terminate(Terminator::Jump(body_bb))?,
                }
                let step_bb = self.new_block()?;
                self.break_labels.insert(stmt.id, exit_bb);
                self.continue_labels.insert(stmt.id, step_bb);
                self.defer_scopes.push(DeferScope {
                    breakable: Some(stmt.id),
                    defers: Vec::new(),
                });
                self.select_block(body_bb)?;
                self.lower_stmt(body)?;
                if !self.block_terminated() {
                    self.terminate(Terminator::Jump(step_bb))?;
                }
                self.defer_scopes.pop();
                self.select_block(step_bb)?;
                if let Some(step) = step {
                    self.lower_rvalue_expr(step)?;
                }
                self.terminate(Terminator::Jump(header))?;
                self.pop_env();
                self.select_block(exit_bb)
            }

            StmtKind::Switch { scrutinee, body } => self.lower_switch(stmt.id, scrutinee, body),

            // Labels are handled by the enclosing switch; seeing one here
            // means the checker let a stray label through.
            StmtKind::Case(_) | StmtKind::Default => {
                Err(LowerErrorKind::UncheckedAst(stmt.id).into())
            }

            StmtKind::Break { target } => {
                let depth = self.breakable_depth(*target)?;
                self.run_defers_down_to(depth)?;
                let bb = *self
                    .break_labels
                    .get(target)
                    .ok_or(LowerErrorKind::MissingLoopTarget(*target))?;
                self.terminate(Terminator::Jump(bb))
            }

            StmtKind::Continue { target } => {
                let depth = self.breakable_depth(*target)?;
                self.run_defers_down_to(depth)?;
                let bb = *self
                    .continue_labels
                    .get(target)
                    .ok_or(LowerErrorKind::MissingLoopTarget(*target))?;
                self.terminate(Terminator::Jump(bb))
            }

            StmtKind::Return(expr) => {
                let value = match expr {
                    Some(expr) => Some(self.lower_operand(expr)?),
                    None => None,
                };
                self.run_defers_down_to(0)?;
                match (self.return_dest, value) {
                    // Non-copyable results go out through the caller's slot.
                    (Some(dest), Some(value)) => {
                        self.emit_store(dest, value)?;
                        self.terminate(Terminator::Return(None))
                    }
                    (_, value) => self.terminate(Terminator::Return(value)),
                }
            }

            StmtKind::Defer(inner) => {
                let scope = self
                    .defer_scopes
                    .last_mut()
                    .ok_or(LowerErrorKind::InconsistentMapping)?;
                scope.defers.push(inner);
                Ok(())
            }

            StmtKind::Throw(expr) => {
                let value = self.lower_operand(expr)?;
                if let Some(handler) = self.catch_handlers.last().copied() {
                    self.emit_store(handler.err_var, value)?;
                    return self.terminate(Terminator::Jump(handler.block));
                }
                if let Some(out) = self.error_out {
                    self.emit_store(out.err_ptr, value)?;
                    self.emit_store(out.threw_ptr, Operand::Const(Const::Bool(true)))?;
                    self.run_defers_down_to(0)?;
                    return self.emit_error_return();
                }
                Err(LowerErrorKind::UncheckedAst(stmt.id).into())
            }

            StmtKind::TryCatch {
                body,
                err_param,
                handler,
            } => self.lower_try_catch(body, *err_param, handler),

            StmtKind::Discard => {
                let void = self.ir.types.intern(IrType::Void);
                self.emit(Op::Discard, void, vec![])?;
                self.terminate(Terminator::Unreachable)
            }
        }
    }

    fn lower_block(&mut self, stmts: &'a [Stmt]) -> Result<(), LowerError> {
        self.push_env();
        self.defer_scopes.push(DeferScope {
            breakable: None,
            defers: Vec::new(),
        });
        let mut warned = false;
        for stmt in stmts {
            // Statements after an unconditional exit still lower, in a fresh
            // block, so later errors in them are not masked.
            if self.block_terminated() {
                if !warned {
                    self.sink.warn(
                        DiagCode::UnreachableCode,
                        Some(stmt.loc),
                        "statement is never executed",
                    );
                    warned = true;
                }
                let bb = self.new_block()?;
                self.select_block(bb)?;
            }
            self.lower_stmt(stmt)?;
        }
        if !self.block_terminated() {
            let depth = self.defer_scopes.len() - 1;
            self.run_defers_down_to(depth)?;
        }
        self.defer_scopes.pop();
        self.pop_env();
        Ok(())
    }

    /// Two passes over the switch body: collect the labels and build the
    /// terminator, then lower the statements into the label blocks. A switch
    /// with no labels reduces to the scrutinee's side effects.
    fn lower_switch(
        &mut self,
        switch_id: NodeId,
        scrutinee: &Expr,
        body: &'a Stmt,
    ) -> Result<(), LowerError> {
        let scrutinee = self.lower_operand(scrutinee)?;

        let StmtKind::Block(stmts) = &body.kind else {
            return Err(LowerErrorKind::UncheckedAst(body.id).into());
        };

        let mut cases: Vec<(i64, crate::ir::BlockId)> = Vec::new();
        let mut default_bb = None;
        let mut label_blocks: Vec<(usize, crate::ir::BlockId)> = Vec::new();
        for (i, s) in stmts.iter().enumerate() {
            match &s.kind {
                StmtKind::Case(value) => {
                    let value = Self::case_value(value)?;
                    let bb = self.new_block()?;
                    cases.push((value, bb));
                    label_blocks.push((i, bb));
                }
                StmtKind::Default => {
                    let bb = self.new_block()?;
                    default_bb = Some(bb);
                    label_blocks.push((i, bb));
                }
                _ => {}
            }
        }
        if label_blocks.is_empty() {
            return Ok(());
        }

        let exit_bb = self.new_block()?;
        self.break_labels.insert(switch_id, exit_bb);
        self.terminate(Terminator::Switch {
            scrutinee,
            cases,
            default_bb: default_bb.unwrap_or(exit_bb),
        })?;

        self.push_env();
        self.defer_scopes.push(DeferScope {
            breakable: Some(switch_id),
            defers: Vec::new(),
        });
        let mut next_label = 0;
        for (i, s) in stmts.iter().enumerate() {
            if next_label < label_blocks.len() && label_blocks[next_label].0 == i {
                let bb = label_blocks[next_label].1;
                next_label += 1;
                // A case reached from the previous one falls through.
                if !self.block_terminated() {
                    self.terminate(Terminator::Jump(bb))?;
                }
                self.select_block(bb)?;
                continue;
            }
            self.lower_stmt(s)?;
        }
        if !self.block_terminated() {
            let depth = self.defer_scopes.len() - 1;
            self.run_defers_down_to(depth)?;
            self.terminate(Terminator::Jump(exit_bb))?;
        }
        self.defer_scopes.pop();
        self.pop_env();
        self.select_block(exit_bb)
    }

    fn case_value(expr: &Expr) -> Result<i64, LowerError> {
        match &expr.kind {
            ExprKind::IntLit(v) => Ok(*v),
            ExprKind::BoolLit(v) => Ok(*v as i64),
            _ => Err(LowerErrorKind::UncheckedAst(expr.id).into()),
        }
    }

    fn lower_try_catch(
        &mut self,
        body: &'a Stmt,
        err_param: Option<crate::ast::DeclId>,
        handler: &'a Stmt,
    ) -> Result<(), LowerError> {
        let err_ty = match err_param {
            Some(param) => match &self.module.decl(param).kind {
                DeclKind::Param(p) => self.lower_type(&p.ty)?,
                _ => return Err(LowerErrorKind::InconsistentMapping.into()),
            },
            // Error value is discarded; any slot type will do.
            None => self.ir.types.intern(IrType::Int {
                signed: true,
                bits: 32,
            }),
        };
        let err_var = self.emit_var(err_ty)?;
        let handler_bb = self.new_block()?;
        let merge_bb = self.new_block()?;

        self.catch_handlers.push(CatchHandler {
            block: handler_bb,
            err_var,
        });
        self.lower_stmt(body)?;
        if !self.block_terminated() {
            self.terminate(Terminator::Jump(merge_bb))?;
        }
        self.catch_handlers.pop();

        self.select_block(handler_bb)?;
        self.push_env();
        if let Some(param) = err_param {
            self.bind(param, LoweredVal::Ptr(err_var));
        }
        self.lower_stmt(handler)?;
        if !self.block_terminated() {
            self.terminate(Terminator::Jump(merge_bb))?;
        }
        self.pop_env();
        self.select_block(merge_bb)
    }

    // --- Defer replay ---

    /// Index of the defer scope opened by the breakable statement `target`.
    fn breakable_depth(&self, target: NodeId) -> Result<usize, LowerError> {
        self.defer_scopes
            .iter()
            .rposition(|s| s.breakable == Some(target))
            .ok_or_else(|| LowerErrorKind::MissingLoopTarget(target).into())
    }

    /// Replay the deferred statements of every scope from the innermost down
    /// to (and including) `first`, innermost scope first, in a dedicated
    /// scope-end block. Scopes stay registered; each exit path replays its
    /// own copy.
    pub(super) fn run_defers_down_to(&mut self, first: usize) -> Result<(), LowerError> {
        let mut pending: Vec<&'a Stmt> = Vec::new();
        for scope in self.defer_scopes[first..].iter().rev() {
            pending.extend(scope.defers.iter().rev().copied());
        }
        if pending.is_empty() {
            return Ok(());
        }
        let bb = self.new_block()?;
        self.terminate(Terminator::Jump(bb))?;
        self.select_block(bb)?;
        for stmt in pending {
            self.lower_stmt(stmt)?;
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "../tests/t_lower_stmt.rs"]
mod tests;
