//! The forward-mode transcriber.
//!
//! Transcription walks the source body block by block, cloning each
//! instruction onto the primal side and synthesizing its derivative on the
//! differential side. Values with no derivative carry `None` in the side
//! map; consumers that need one synthesize a zero of the right type, so a
//! missing derivative never aborts the whole function.

use indexmap::IndexMap;

use crate::diag::{DiagCode, DiagnosticSink};
use crate::ir::builder::IrBuilder;
use crate::ir::{
    ArrayLen, BinOp, BlockId, Const, Decoration, DiffMark, InstId, IrBody, IrCastKind, IrFunc,
    IrGlobalKind, IrModule, IrType, Op, Operand, Terminator, TyId, UnOp, ValueId,
};

use super::TranscribeError;

pub struct ForwardTranscriber<'a> {
    ir: &'a mut IrModule,
    sink: &'a mut DiagnosticSink,
    /// Source function -> already-transcribed derivative function.
    done: IndexMap<ValueId, ValueId>,
}

impl<'a> ForwardTranscriber<'a> {
    pub fn new(ir: &'a mut IrModule, sink: &'a mut DiagnosticSink) -> Self {
        Self {
            ir,
            sink,
            done: IndexMap::new(),
        }
    }

    /// Transcribe `func` into its forward-derivative companion, memoized.
    pub fn transcribe(&mut self, func: ValueId) -> Result<ValueId, TranscribeError> {
        if let Some(d) = self.done.get(&func) {
            return Ok(*d);
        }
        let IrGlobalKind::Func(src) = &self.ir.value(func).kind else {
            return Err(TranscribeError::NotAFunction(func));
        };
        if src.body.is_none() {
            return Err(TranscribeError::MissingBody);
        }
        let src_param_tys = src.param_tys.clone();
        let src_ret_ty = src.ret_ty;
        let loc = self.ir.value(func).loc;

        let param_tys: Vec<TyId> = src_param_tys
            .iter()
            .map(|t| self.pair_of(*t).unwrap_or(*t))
            .collect();
        let ret_ty = self.pair_of(src_ret_ty).unwrap_or(src_ret_ty);
        let func_ty = self.ir.types.intern(IrType::Func {
            params: param_tys.clone(),
            ret: ret_ty,
        });
        let d_func = self.ir.push_value(
            func_ty,
            IrGlobalKind::Func(IrFunc {
                param_tys,
                ret_ty,
                body: None,
            }),
            loc,
        );
        let name = self
            .ir
            .find_decoration(func, |d| match d {
                Decoration::NameHint(n) => Some(n.clone()),
                _ => None,
            })
            .unwrap_or_default();
        self.ir
            .decorate(d_func, Decoration::NameHint(format!("{}.fwd", name)));

        // Register before emitting: recursive differentiable calls resolve
        // to this very value.
        self.done.insert(func, d_func);
        self.emit_body(func, d_func)?;
        Ok(d_func)
    }

    // --- Differential types ---

    /// The differential type of `ty`, or `None` for non-differentiable types.
    /// Differentials share the primal's shape.
    fn differential_of(&mut self, ty: TyId) -> Option<TyId> {
        match self.ir.types.kind(ty).clone() {
            IrType::Float { .. } => Some(ty),
            IrType::Vector { elem, .. } | IrType::Matrix { elem, .. } => {
                self.differential_of(elem).map(|_| ty)
            }
            IrType::Array { elem, .. } => self.differential_of(elem).map(|_| ty),
            IrType::Pair { .. } => Some(ty),
            IrType::Struct { value } => self
                .ir
                .find_decoration(value, |d| match d {
                    Decoration::ZeroMethod(f) => Some(*f),
                    _ => None,
                })
                .map(|_| ty),
            IrType::Ptr { pointee } => {
                // A pointer is differentiable when its pointee is; the
                // differential is a pointer to the pointee's differential.
                let d = self.differential_of(pointee)?;
                Some(self.ir.types.intern(IrType::Ptr { pointee: d }))
            }
            _ => None,
        }
    }

    fn pair_of(&mut self, ty: TyId) -> Option<TyId> {
        // Pointer parameters stay pointers; only value types pair up.
        if matches!(self.ir.types.kind(ty), IrType::Ptr { .. }) {
            return None;
        }
        let diff = self.differential_of(ty)?;
        Some(self.ir.types.intern(IrType::Pair {
            primal: ty,
            diff,
        }))
    }

    // --- Zero synthesis ---

    /// Emit a zero differential of `ty`, recursing through aggregates.
    /// Returns `None` (after a diagnostic) when no zero can be built.
    fn zero_of(&mut self, b: &mut IrBuilder, ty: TyId) -> Option<Operand> {
        match self.ir.types.kind(ty).clone() {
            IrType::Float { .. } => Some(Operand::Const(Const::float(0.0))),
            IrType::Int { .. } => Some(Operand::Const(Const::Int(0))),
            IrType::Bool => Some(Operand::Const(Const::Bool(false))),
            IrType::Vector { elem, .. } => {
                let zero = self.zero_of(b, elem)?;
                let inst = b.emit(self.ir, Op::Splat, ty, vec![zero]);
                self.mark(b.func, inst, DiffMark::Differential);
                Some(Operand::Inst(inst))
            }
            IrType::Matrix { elem, rows, cols } => {
                let row_ty = self.ir.types.intern(IrType::Vector { elem, count: cols });
                let mut rows_ops = Vec::with_capacity(rows as usize);
                for _ in 0..rows {
                    rows_ops.push(self.zero_of(b, row_ty)?);
                }
                let inst = b.emit(self.ir, Op::MakeMatrix, ty, rows_ops);
                self.mark(b.func, inst, DiffMark::Differential);
                Some(Operand::Inst(inst))
            }
            IrType::Array { elem, count } => {
                let ArrayLen::Const(n) = count else {
                    self.report_no_zero(ty);
                    return None;
                };
                let mut elems = Vec::with_capacity(n as usize);
                for _ in 0..n {
                    elems.push(self.zero_of(b, elem)?);
                }
                let inst = b.emit(self.ir, Op::MakeArray, ty, elems);
                self.mark(b.func, inst, DiffMark::Differential);
                Some(Operand::Inst(inst))
            }
            IrType::Pair { primal, diff } => {
                let p = self.zero_of(b, primal)?;
                let d = self.zero_of(b, diff)?;
                let inst = b.emit(self.ir, Op::MakePair, ty, vec![p, d]);
                self.mark(b.func, inst, DiffMark::Differential);
                Some(Operand::Inst(inst))
            }
            IrType::Struct { value } => {
                let zero_fn = self.ir.find_decoration(value, |d| match d {
                    Decoration::ZeroMethod(f) => Some(*f),
                    _ => None,
                });
                match zero_fn {
                    Some(f) => {
                        let inst = b.emit_call(self.ir, ty, Operand::Global(f), vec![]);
                        self.mark(b.func, inst, DiffMark::Differential);
                        Some(Operand::Inst(inst))
                    }
                    None => {
                        self.report_no_zero(ty);
                        None
                    }
                }
            }
            _ => {
                self.report_no_zero(ty);
                None
            }
        }
    }

    fn report_no_zero(&mut self, ty: TyId) {
        let text = self.ir.type_to_string(ty);
        self.sink.error(
            DiagCode::CouldNotGenerateZero,
            None,
            format!("no zero differential for type {}", text),
        );
    }

    // --- Body transcription ---

    fn emit_body(&mut self, src_func: ValueId, d_func: ValueId) -> Result<(), TranscribeError> {
        let src_body: IrBody = self.ir.body(src_func).clone();
        let d_param_tys = self.ir.func(d_func).param_tys.clone();
        let src_param_tys = self.ir.func(src_func).param_tys.clone();
        let d_ret_ty = self.ir.func(d_func).ret_ty;

        self.ir.func_mut(d_func).body = Some(IrBody::new());
        let mut b = IrBuilder::at_entry(self.ir, d_func);
        // Blocks map one to one, in order.
        for _ in 1..src_body.blocks.len() {
            b.new_block(self.ir);
        }

        let mut primal: IndexMap<InstId, Operand> = IndexMap::new();
        let mut diff: IndexMap<InstId, Option<Operand>> = IndexMap::new();

        for (bi, block) in src_body.blocks.iter().enumerate() {
            b.select_block(BlockId(bi as u32));
            for inst_id in &block.insts {
                self.transcribe_inst(
                    &mut b,
                    &src_body,
                    *inst_id,
                    &src_param_tys,
                    &d_param_tys,
                    &mut primal,
                    &mut diff,
                );
            }
            let term = self.transcribe_term(&mut b, &block.term, d_ret_ty, &primal, &mut diff);
            if !matches!(term, Terminator::Unterminated) {
                b.terminate(self.ir, term);
            }
        }
        Ok(())
    }

    fn transcribe_inst(
        &mut self,
        b: &mut IrBuilder,
        src: &IrBody,
        id: InstId,
        src_param_tys: &[TyId],
        d_param_tys: &[TyId],
        primal: &mut IndexMap<InstId, Operand>,
        diff: &mut IndexMap<InstId, Option<Operand>>,
    ) {
        let inst = src.inst(id).clone();
        b.debug_loc = inst.loc;

        // Parameters split their pair into the two side maps up front.
        if let Op::Param { index } = inst.op {
            let i = index as usize;
            let new_ty = d_param_tys[i];
            let param = b.emit(self.ir, Op::Param { index }, new_ty, vec![]);
            if new_ty != src_param_tys[i] {
                let p = b.emit(
                    self.ir,
                    Op::PairPrimal,
                    src_param_tys[i],
                    vec![Operand::Inst(param)],
                );
                self.mark(b.func, p, DiffMark::Mixed);
                let diff_ty = self
                    .differential_of(src_param_tys[i])
                    .unwrap_or(src_param_tys[i]);
                let d = b.emit(self.ir, Op::PairDiff, diff_ty, vec![Operand::Inst(param)]);
                self.mark(b.func, d, DiffMark::Mixed);
                primal.insert(id, Operand::Inst(p));
                diff.insert(id, Some(Operand::Inst(d)));
            } else {
                primal.insert(id, Operand::Inst(param));
                diff.insert(id, None);
            }
            return;
        }

        // Primal side: a straight clone over mapped operands.
        let p_operands: Vec<Operand> = inst.operands.iter().map(|o| Self::map(primal, *o)).collect();
        let p_inst = b.emit(self.ir, inst.op.clone(), inst.ty, p_operands.clone());
        self.mark(b.func, p_inst, DiffMark::Primal);
        primal.insert(id, Operand::Inst(p_inst));

        // Differential side.
        let d_value = self.differential_inst(b, &inst, &p_operands, diff, primal);
        diff.insert(id, d_value);
    }

    /// Derivative of one instruction, or `None` when the result carries no
    /// differential.
    fn differential_inst(
        &mut self,
        b: &mut IrBuilder,
        inst: &crate::ir::IrInst,
        p_operands: &[Operand],
        diff: &IndexMap<InstId, Option<Operand>>,
        _primal: &IndexMap<InstId, Operand>,
    ) -> Option<Operand> {
        let d_ty = self.differential_of(inst.ty);
        let d_of = |this: &mut Self, b: &mut IrBuilder, op: Operand| -> Option<Operand> {
            match op {
                Operand::Inst(i) => diff.get(&i).copied().flatten(),
                Operand::Const(Const::Float(_)) => Some(Operand::Const(Const::float(0.0))),
                _ => None,
            }
            .or_else(|| {
                let ty = b.operand_ty(this.ir, op);
                let dt = this.differential_of(ty)?;
                this.zero_of(b, dt)
            })
        };

        match &inst.op {
            Op::BinOp(BinOp::Add) | Op::BinOp(BinOp::Sub) => {
                let ty = d_ty?;
                let da = d_of(self, b, inst.operands[0])?;
                let db = d_of(self, b, inst.operands[1])?;
                let d = b.emit(self.ir, inst.op.clone(), ty, vec![da, db]);
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }
            Op::BinOp(BinOp::Mul) => {
                // d(a*b) = da*b + a*db
                let ty = d_ty?;
                let da = d_of(self, b, inst.operands[0])?;
                let db = d_of(self, b, inst.operands[1])?;
                let (a, bb) = (p_operands[0], p_operands[1]);
                let t1 = b.emit(self.ir, Op::BinOp(BinOp::Mul), ty, vec![da, bb]);
                self.mark(b.func, t1, DiffMark::Differential);
                let t2 = b.emit(self.ir, Op::BinOp(BinOp::Mul), ty, vec![a, db]);
                self.mark(b.func, t2, DiffMark::Differential);
                let d = b.emit(
                    self.ir,
                    Op::BinOp(BinOp::Add),
                    ty,
                    vec![Operand::Inst(t1), Operand::Inst(t2)],
                );
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }
            Op::BinOp(BinOp::Div) => {
                // d(a/b) = (da*b - a*db) / (b*b)
                let ty = d_ty?;
                let da = d_of(self, b, inst.operands[0])?;
                let db = d_of(self, b, inst.operands[1])?;
                let (a, bb) = (p_operands[0], p_operands[1]);
                let t1 = b.emit(self.ir, Op::BinOp(BinOp::Mul), ty, vec![da, bb]);
                self.mark(b.func, t1, DiffMark::Differential);
                let t2 = b.emit(self.ir, Op::BinOp(BinOp::Mul), ty, vec![a, db]);
                self.mark(b.func, t2, DiffMark::Differential);
                let num = b.emit(
                    self.ir,
                    Op::BinOp(BinOp::Sub),
                    ty,
                    vec![Operand::Inst(t1), Operand::Inst(t2)],
                );
                self.mark(b.func, num, DiffMark::Differential);
                let den = b.emit(self.ir, Op::BinOp(BinOp::Mul), ty, vec![bb, bb]);
                self.mark(b.func, den, DiffMark::Differential);
                let d = b.emit(
                    self.ir,
                    Op::BinOp(BinOp::Div),
                    ty,
                    vec![Operand::Inst(num), Operand::Inst(den)],
                );
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }
            // Comparisons and logic have no differential.
            Op::BinOp(_) | Op::UnOp(UnOp::Not) => None,

            Op::UnOp(UnOp::Neg) => {
                let ty = d_ty?;
                let da = d_of(self, b, inst.operands[0])?;
                let d = b.emit(self.ir, Op::UnOp(UnOp::Neg), ty, vec![da]);
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }

            Op::Var => {
                // A slot for a differentiable value gets a shadow slot.
                let pointee = self.ir.types.pointee(inst.ty)?;
                let d_pointee = self.differential_of(pointee)?;
                let d = b.emit_var(self.ir, d_pointee);
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }
            Op::Load => {
                let d_ptr = match inst.operands[0] {
                    Operand::Inst(i) => diff.get(&i).copied().flatten()?,
                    _ => return None,
                };
                let d = b.emit_load(self.ir, d_ptr);
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }
            Op::Store | Op::AtomicStore => {
                let d_ptr = match inst.operands[0] {
                    Operand::Inst(i) => diff.get(&i).copied().flatten(),
                    _ => None,
                };
                if let Some(d_ptr) = d_ptr {
                    let d_value = d_of(self, b, inst.operands[1])?;
                    let d = b.emit_store(self.ir, d_ptr, d_value);
                    self.mark(b.func, d, DiffMark::Differential);
                }
                None
            }

            // Shape-preserving ops apply unchanged to the differentials.
            Op::Swizzle { .. }
            | Op::FieldExtract { .. }
            | Op::ElemExtract
            | Op::MakeVector
            | Op::MakeMatrix
            | Op::MakeArray
            | Op::MakeStruct
            | Op::Splat
            | Op::Cast(IrCastKind::Numeric) => {
                let ty = d_ty?;
                let mut d_operands = Vec::with_capacity(inst.operands.len());
                for op in &inst.operands {
                    d_operands.push(d_of(self, b, *op)?);
                }
                let d = b.emit(self.ir, inst.op.clone(), ty, d_operands);
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }

            Op::Select => {
                let ty = d_ty?;
                // The condition is primal; only the arms differentiate.
                let dt = d_of(self, b, inst.operands[1])?;
                let de = d_of(self, b, inst.operands[2])?;
                let d = b.emit(self.ir, Op::Select, ty, vec![p_operands[0], dt, de]);
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }

            Op::Call => self.differential_call(b, inst, p_operands, diff),

            Op::DebugLine { .. } | Op::Discard => None,
            Op::Undef => {
                let ty = d_ty?;
                let d = b.emit(self.ir, Op::Undef, ty, vec![]);
                self.mark(b.func, d, DiffMark::Differential);
                Some(Operand::Inst(d))
            }

            _ => {
                let ty = d_ty?;
                self.sink.warn(
                    DiagCode::CannotDifferentiate,
                    inst.loc,
                    format!("treating `{}` as constant", inst.op),
                );
                self.zero_of(b, ty)
            }
        }
    }

    /// Calls to differentiable functions chain into their transcribed
    /// companions with paired arguments; anything else is treated as
    /// constant with a zero differential.
    fn differential_call(
        &mut self,
        b: &mut IrBuilder,
        inst: &crate::ir::IrInst,
        p_operands: &[Operand],
        diff: &IndexMap<InstId, Option<Operand>>,
    ) -> Option<Operand> {
        let Operand::Global(callee) = inst.operands[0] else {
            let ty = self.differential_of(inst.ty)?;
            return self.zero_of(b, ty);
        };
        let differentiable = self
            .ir
            .find_decoration(callee, |d| match d {
                Decoration::Differentiable => Some(()),
                _ => None,
            })
            .is_some();
        if !differentiable {
            let ty = self.differential_of(inst.ty)?;
            self.sink.warn(
                DiagCode::CannotDifferentiate,
                inst.loc,
                "call to non-differentiable function treated as constant",
            );
            return self.zero_of(b, ty);
        }
        let d_callee = match self.transcribe(callee) {
            Ok(f) => f,
            Err(_) => {
                let ty = self.differential_of(inst.ty)?;
                return self.zero_of(b, ty);
            }
        };

        // Pair up each argument that the companion expects paired.
        let d_param_tys = self.ir.func(d_callee).param_tys.clone();
        let mut args = Vec::with_capacity(inst.operands.len() - 1);
        for (i, (src_op, p_op)) in inst.operands[1..]
            .iter()
            .zip(&p_operands[1..])
            .enumerate()
        {
            let want = d_param_tys[i];
            if let IrType::Pair { diff: diff_ty, .. } = self.ir.types.kind(want).clone() {
                let d_arg = match src_op {
                    Operand::Inst(id) => diff.get(id).copied().flatten(),
                    _ => None,
                };
                let d_arg = match d_arg {
                    Some(d) => d,
                    None => self.zero_of(b, diff_ty)?,
                };
                let pair = b.emit(self.ir, Op::MakePair, want, vec![*p_op, d_arg]);
                self.mark(b.func, pair, DiffMark::Mixed);
                args.push(Operand::Inst(pair));
            } else {
                args.push(*p_op);
            }
        }

        let ret_ty = self.ir.func(d_callee).ret_ty;
        let call = b.emit_call(self.ir, ret_ty, Operand::Global(d_callee), args);
        self.mark(b.func, call, DiffMark::Mixed);
        if let IrType::Pair { primal, diff: d } = self.ir.types.kind(ret_ty).clone() {
            // The primal clone of this call is redundant next to the pair
            // call; keep the pair's primal as the authoritative result.
            let p = b.emit(self.ir, Op::PairPrimal, primal, vec![Operand::Inst(call)]);
            self.mark(b.func, p, DiffMark::Mixed);
            let dv = b.emit(self.ir, Op::PairDiff, d, vec![Operand::Inst(call)]);
            self.mark(b.func, dv, DiffMark::Mixed);
            Some(Operand::Inst(dv))
        } else {
            None
        }
    }

    fn transcribe_term(
        &mut self,
        b: &mut IrBuilder,
        term: &Terminator,
        d_ret_ty: TyId,
        primal: &IndexMap<InstId, Operand>,
        diff: &mut IndexMap<InstId, Option<Operand>>,
    ) -> Terminator {
        match term {
            Terminator::Jump(bb) => Terminator::Jump(*bb),
            Terminator::Branch {
                cond,
                then_bb,
                else_bb,
            } => Terminator::Branch {
                cond: Self::map(primal, *cond),
                then_bb: *then_bb,
                else_bb: *else_bb,
            },
            Terminator::Switch {
                scrutinee,
                cases,
                default_bb,
            } => Terminator::Switch {
                scrutinee: Self::map(primal, *scrutinee),
                cases: cases.clone(),
                default_bb: *default_bb,
            },
            Terminator::Return(Some(value)) => {
                let p = Self::map(primal, *value);
                if let IrType::Pair { diff: diff_ty, .. } = self.ir.types.kind(d_ret_ty).clone() {
                    let d = match value {
                        Operand::Inst(id) => diff.get(id).copied().flatten(),
                        Operand::Const(Const::Float(_)) => {
                            Some(Operand::Const(Const::float(0.0)))
                        }
                        _ => None,
                    };
                    let d = d.or_else(|| self.zero_of(b, diff_ty)).unwrap_or(p);
                    let pair = b.emit(self.ir, Op::MakePair, d_ret_ty, vec![p, d]);
                    self.mark(b.func, pair, DiffMark::Mixed);
                    Terminator::Return(Some(Operand::Inst(pair)))
                } else {
                    Terminator::Return(Some(p))
                }
            }
            Terminator::Return(None) => Terminator::Return(None),
            Terminator::Unreachable => Terminator::Unreachable,
            Terminator::Unterminated => Terminator::Unterminated,
        }
    }

    fn map(primal: &IndexMap<InstId, Operand>, op: Operand) -> Operand {
        match op {
            Operand::Inst(id) => primal.get(&id).copied().unwrap_or(op),
            _ => op,
        }
    }

    fn mark(&mut self, func: ValueId, inst: InstId, mark: DiffMark) {
        self.ir.body_mut(func).insts[inst.index()].mark = Some(mark);
    }
}

#[cfg(test)]
#[path = "../tests/t_autodiff.rs"]
mod tests;
