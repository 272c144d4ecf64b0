//! Declaration lowering.
//!
//! `ensure_decl` is the single entry point: it memoizes per declaration, and
//! every lowering below registers its result (the outermost generic wrapper,
//! when there is one) BEFORE recursing into member types, bodies, or witness
//! entries, so cyclic references land on the already-created shell instead of
//! re-lowering.

use crate::ast::{
    AccessorKind, DeclId, DeclKind, DeclRef, ExprKind, ParamDir, Satisfaction, Stmt, Type,
};
use crate::diag::DiagCode;
use crate::ir::builder::begin_body;
use crate::ir::{
    Const, Decoration, GenericParamKind, IrArg, IrFunc, IrGeneric, IrGlobalKind, IrType, Operand,
    Terminator, TyId, ValueId,
};
use crate::lower::context::{ErrorOut, Lowerer};
use crate::lower::errors::{LowerError, LowerErrorKind};
use crate::lower::value::LoweredVal;

/// The lowered signature of a function or accessor.
struct FuncSig<'m> {
    /// `Some(by_ref)` for member functions; the receiver type is separate.
    this: Option<(TyId, bool)>,
    /// (decl, lowered type, passed by address) per declared parameter.
    params: Vec<(DeclId, TyId, bool)>,
    /// Declared result type before any dest-parameter rewrite.
    ret_ty: TyId,
    /// The result travels through a caller-provided slot.
    dest: bool,
    /// Thrown error type for throwing functions.
    err_ty: Option<TyId>,
    body: Option<&'m Stmt>,
    /// Implicit trailing new-value parameter of a `set` accessor.
    set_value: Option<TyId>,
}

impl<'a> Lowerer<'a> {
    /// Lower a declaration to its module-scope value, memoized.
    pub(super) fn ensure_decl(&mut self, decl_id: DeclId) -> Result<LoweredVal, LowerError> {
        if let Some(val) = self.lookup(decl_id) {
            return Ok(val);
        }
        let module = self.module;
        let result = match &module.decl(decl_id).kind {
            DeclKind::Func(_) | DeclKind::Accessor(_) => self.lower_func_decl(decl_id),
            DeclKind::Struct(_) => self.lower_struct_decl(decl_id),
            DeclKind::Interface(_) => self.lower_interface_decl(decl_id),
            DeclKind::Conformance(_) => self.lower_witness_table(decl_id),
            DeclKind::Var(_) => self.lower_global_var(decl_id),
            // A generic is named through its inner declaration.
            DeclKind::Generic(g) => self.ensure_decl(g.inner),
            // Everything else is either bound in an environment (generic and
            // function parameters) or has no value of its own (fields,
            // associated types, storage declarations).
            _ => Err(LowerErrorKind::InconsistentMapping.into()),
        };
        result.map_err(|e| e.or_loc(module.decl(decl_id).loc))
    }

    // --- Generic wrapping ---

    /// Create generic shells for every `Generic` ancestor of `decl`,
    /// outermost first, binding each parameter in a fresh environment scope.
    /// Shells stay unsealed until `finish_outer_generics`.
    pub(super) fn emit_outer_generics(
        &mut self,
        decl_id: DeclId,
    ) -> Result<Vec<ValueId>, LowerError> {
        let module = self.module;
        let mut chain: Vec<DeclId> = module
            .ancestors(decl_id)
            .filter(|a| matches!(module.decl(*a).kind, DeclKind::Generic(_)))
            .collect();
        if chain.is_empty() {
            return Ok(Vec::new());
        }
        chain.reverse();

        self.push_env();
        let void = self.ir.types.intern(IrType::Void);
        let mut generics = Vec::with_capacity(chain.len());
        for g_id in chain {
            let DeclKind::Generic(g) = &module.decl(g_id).kind else {
                continue;
            };
            let generic = self.ir.push_value(
                void,
                IrGlobalKind::Generic(IrGeneric {
                    params: Vec::new(),
                    inner: None,
                }),
                Some(module.decl(g_id).loc),
            );
            let mut params = Vec::with_capacity(g.params.len());
            for (index, p_id) in g.params.iter().enumerate() {
                let p = module.decl(*p_id);
                let kind = match &p.kind {
                    DeclKind::GenericTypeParam => GenericParamKind::Type,
                    DeclKind::GenericValueParam { ty } => GenericParamKind::Value {
                        ty: self.lower_type(ty)?,
                    },
                    DeclKind::GenericConstraint { interface, .. } => GenericParamKind::Witness {
                        interface: self.emit_decl_ref_value(interface)?,
                    },
                    _ => return Err(LowerErrorKind::InconsistentMapping.into()),
                };
                let param_ty = match kind {
                    GenericParamKind::Value { ty } => ty,
                    _ => void,
                };
                let param = self.ir.push_value(
                    param_ty,
                    IrGlobalKind::GenericParam {
                        index: index as u32,
                        kind,
                    },
                    Some(p.loc),
                );
                self.ir
                    .decorate(param, Decoration::NameHint(p.name.clone()));
                self.bind(*p_id, LoweredVal::Simple(Operand::Global(param)));
                params.push(param);
            }
            if let IrGlobalKind::Generic(shell) = &mut self.ir.value_mut(generic).kind {
                shell.params = params;
            }
            generics.push(generic);
        }
        Ok(generics)
    }

    /// Seal the generic shells around `inner`, innermost first, and drop the
    /// parameter scope. Returns the outermost wrapped value.
    pub(super) fn finish_outer_generics(&mut self, generics: Vec<ValueId>, inner: IrArg) -> IrArg {
        if generics.is_empty() {
            return inner;
        }
        let mut curr = inner;
        for g in generics.iter().rev() {
            if let IrGlobalKind::Generic(shell) = &mut self.ir.value_mut(*g).kind {
                shell.inner = Some(curr);
            }
            curr = IrArg::Value(*g);
        }
        self.pop_env();
        curr
    }

    // --- Functions and accessors ---

    fn lower_func_decl(&mut self, decl_id: DeclId) -> Result<LoweredVal, LowerError> {
        let module = self.module;
        let decl = module.decl(decl_id);
        let generics = self.emit_outer_generics(decl_id)?;
        let sig = self.func_signature(decl_id)?;

        let mut param_tys = Vec::new();
        if let Some((this_ty, by_ref)) = sig.this {
            param_tys.push(if by_ref {
                self.ir.types.intern(IrType::Ptr { pointee: this_ty })
            } else {
                this_ty
            });
        }
        for (_, ty, by_ref) in &sig.params {
            param_tys.push(if *by_ref {
                self.ir.types.intern(IrType::Ptr { pointee: *ty })
            } else {
                *ty
            });
        }
        if let Some(value_ty) = sig.set_value {
            param_tys.push(value_ty);
        }
        let void = self.ir.types.intern(IrType::Void);
        let ret_ty = if sig.dest {
            let dest_ty = self.ir.types.intern(IrType::Ptr {
                pointee: sig.ret_ty,
            });
            param_tys.push(dest_ty);
            void
        } else {
            sig.ret_ty
        };
        if let Some(err_ty) = sig.err_ty {
            param_tys.push(self.ir.types.intern(IrType::Ptr { pointee: err_ty }));
            let bool_ty = self.ir.types.intern(IrType::Bool);
            param_tys.push(self.ir.types.intern(IrType::Ptr { pointee: bool_ty }));
        }

        let func_ty = self.ir.types.intern(IrType::Func {
            params: param_tys.clone(),
            ret: ret_ty,
        });
        let func = self.ir.push_value(
            func_ty,
            IrGlobalKind::Func(IrFunc {
                param_tys,
                ret_ty,
                body: None,
            }),
            Some(decl.loc),
        );
        self.decorate_decl(func, decl_id);

        // Register before lowering the body so recursive calls resolve.
        let outermost = generics.first().copied().unwrap_or(func);
        self.globals
            .insert(decl_id, LoweredVal::Simple(Operand::Global(outermost)));

        let has_body = sig.body.is_some() && !decl.modifiers.is_imported;
        if let (Some(body), true) = (sig.body, has_body) {
            self.lower_func_body(func, &sig, body)?;
        }

        self.finish_outer_generics(generics, IrArg::Value(func));
        Ok(LoweredVal::Simple(Operand::Global(outermost)))
    }

    fn lower_func_body(
        &mut self,
        func: ValueId,
        sig: &FuncSig<'a>,
        body: &'a Stmt,
    ) -> Result<(), LowerError> {
        let saved = self.save_scope();
        let (builder, param_insts) = begin_body(&mut self.ir, func);
        self.builder = Some(builder);
        self.this_val = LoweredVal::None;
        self.return_dest = None;
        self.dest_hint = None;
        self.error_out = None;
        self.lvalue_ctx = false;
        self.push_env();

        let mut next = 0;
        if let Some((_, by_ref)) = sig.this {
            let op = Operand::Inst(param_insts[next]);
            self.this_val = if by_ref {
                LoweredVal::Ptr(op)
            } else {
                LoweredVal::Simple(op)
            };
            next += 1;
        }
        for (p_id, _, by_ref) in &sig.params {
            let op = Operand::Inst(param_insts[next]);
            let val = if *by_ref {
                LoweredVal::Ptr(op)
            } else {
                LoweredVal::Simple(op)
            };
            self.bind(*p_id, val);
            next += 1;
        }
        if sig.set_value.is_some() {
            next += 1;
        }
        if sig.dest {
            self.return_dest = Some(Operand::Inst(param_insts[next]));
            next += 1;
        }
        if sig.err_ty.is_some() {
            self.error_out = Some(ErrorOut {
                err_ptr: Operand::Inst(param_insts[next]),
                threw_ptr: Operand::Inst(param_insts[next + 1]),
            });
        }

        self.lower_stmt(body)?;
        if !self.block_terminated() {
            let ret_ty = self.ir.func(func).ret_ty;
            if matches!(self.ir.types.kind(ret_ty), IrType::Void) {
                self.terminate(Terminator::Return(None))?;
            } else {
                // A non-void function falling off the end was diagnosed by
                // the checker; the path cannot execute.
                self.terminate(Terminator::Unreachable)?;
            }
        }

        self.restore_scope(saved);
        Ok(())
    }

    fn func_signature(&mut self, decl_id: DeclId) -> Result<FuncSig<'a>, LowerError> {
        let module = self.module;
        let decl = module.decl(decl_id);
        match &decl.kind {
            DeclKind::Func(func) => {
                let this = match self.receiver_struct(decl_id) {
                    Some(struct_id) => {
                        let ty = self.lower_type(&Type::Struct(DeclRef::direct(struct_id)))?;
                        Some((ty, decl.modifiers.is_mutating))
                    }
                    None => None,
                };
                let mut params = Vec::with_capacity(func.params.len());
                for p_id in &func.params {
                    let DeclKind::Param(p) = &module.decl(*p_id).kind else {
                        return Err(LowerErrorKind::InconsistentMapping.into());
                    };
                    let ty = self.lower_type(&p.ty)?;
                    params.push((*p_id, ty, p.dir.is_by_ref()));
                }
                let ret_ty = self.lower_type(&func.ret_ty)?;
                let dest = match &func.ret_ty {
                    Type::Struct(dr) => matches!(
                        &module.decl(dr.decl).kind,
                        DeclKind::Struct(s) if s.is_non_copyable
                    ),
                    _ => false,
                };
                let err_ty = match &func.error_ty {
                    Some(ty) => Some(self.lower_type(ty)?),
                    None => None,
                };
                Ok(FuncSig {
                    this,
                    params,
                    ret_ty,
                    dest,
                    err_ty,
                    body: func.body.as_ref(),
                    set_value: None,
                })
            }
            DeclKind::Accessor(accessor) => {
                let storage_id = decl
                    .parent
                    .ok_or(LowerErrorKind::InconsistentMapping)?;
                let (DeclKind::Subscript(storage) | DeclKind::Property(storage)) =
                    &module.decl(storage_id).kind
                else {
                    return Err(LowerErrorKind::InconsistentMapping.into());
                };
                // Getters take the receiver by value; set and ref take it by
                // address.
                let this = match self.receiver_struct(storage_id) {
                    Some(struct_id) => {
                        let ty = self.lower_type(&Type::Struct(DeclRef::direct(struct_id)))?;
                        Some((ty, accessor.kind != AccessorKind::Get))
                    }
                    None => None,
                };
                let mut params = Vec::with_capacity(storage.index_params.len());
                for p_id in &storage.index_params {
                    let DeclKind::Param(p) = &module.decl(*p_id).kind else {
                        return Err(LowerErrorKind::InconsistentMapping.into());
                    };
                    let ty = self.lower_type(&p.ty)?;
                    params.push((*p_id, ty, p.dir.is_by_ref()));
                }
                let storage_ty = self.lower_type(&storage.ty)?;
                let (ret_ty, set_value) = match accessor.kind {
                    AccessorKind::Get => (storage_ty, None),
                    AccessorKind::Set => {
                        (self.ir.types.intern(IrType::Void), Some(storage_ty))
                    }
                    AccessorKind::Ref => (
                        self.ir.types.intern(IrType::Ptr {
                            pointee: storage_ty,
                        }),
                        None,
                    ),
                };
                Ok(FuncSig {
                    this,
                    params,
                    ret_ty,
                    dest: false,
                    err_ty: None,
                    body: accessor.body.as_ref(),
                    set_value,
                })
            }
            _ => Err(LowerErrorKind::InconsistentMapping.into()),
        }
    }

    /// The struct a member declaration receives as `this`, skipping generic
    /// and storage wrappers on the way out.
    fn receiver_struct(&self, decl_id: DeclId) -> Option<DeclId> {
        self.module
            .ancestors(decl_id)
            .find(|a| matches!(self.module.decl(*a).kind, DeclKind::Struct(_)))
    }

    // --- Aggregate types ---

    fn lower_struct_decl(&mut self, decl_id: DeclId) -> Result<LoweredVal, LowerError> {
        let module = self.module;
        let decl = module.decl(decl_id);
        let DeclKind::Struct(s) = &decl.kind else {
            return Err(LowerErrorKind::InconsistentMapping.into());
        };
        let generics = self.emit_outer_generics(decl_id)?;
        let void = self.ir.types.intern(IrType::Void);
        let value = self.ir.push_value(
            void,
            IrGlobalKind::StructType { fields: Vec::new() },
            Some(decl.loc),
        );
        self.decorate_decl(value, decl_id);

        let outermost = generics.first().copied().unwrap_or(value);
        self.globals
            .insert(decl_id, LoweredVal::Simple(Operand::Global(outermost)));
        if !generics.is_empty() {
            // Inside its own generic scope the struct refers to itself
            // unapplied.
            self.bind(decl_id, LoweredVal::Simple(Operand::Global(value)));
        }

        let mut fields: Vec<Option<TyId>> = vec![None; s.fields.len()];
        for f_id in &s.fields {
            let DeclKind::Field(field) = &module.decl(*f_id).kind else {
                return Err(LowerErrorKind::InconsistentMapping.into());
            };
            let slot = fields
                .get_mut(field.index)
                .ok_or(LowerErrorKind::InconsistentMapping)?;
            *slot = Some(self.lower_type(&field.ty)?);
        }
        let fields = fields
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(LowerErrorKind::InconsistentMapping)?;
        if let IrGlobalKind::StructType { fields: slot } = &mut self.ir.value_mut(value).kind {
            *slot = fields;
        }

        self.finish_outer_generics(generics, IrArg::Value(value));
        Ok(LoweredVal::Simple(Operand::Global(outermost)))
    }

    fn lower_interface_decl(&mut self, decl_id: DeclId) -> Result<LoweredVal, LowerError> {
        let module = self.module;
        let decl = module.decl(decl_id);
        let DeclKind::Interface(interface) = &decl.kind else {
            return Err(LowerErrorKind::InconsistentMapping.into());
        };
        let generics = self.emit_outer_generics(decl_id)?;
        let void = self.ir.types.intern(IrType::Void);
        let value = self.ir.push_value(
            void,
            IrGlobalKind::InterfaceType {
                requirements: Vec::new(),
            },
            Some(decl.loc),
        );
        self.decorate_decl(value, decl_id);

        let outermost = generics.first().copied().unwrap_or(value);
        self.globals
            .insert(decl_id, LoweredVal::Simple(Operand::Global(outermost)));

        // One key per logical requirement: each inherited interface is one
        // slot, each requirement one, plus one per associated-type
        // constraint.
        let mut requirements = Vec::new();
        for inherited in &interface.inherited {
            requirements.push(self.requirement_key(inherited.decl));
        }
        for r_id in &interface.requirements {
            requirements.push(self.requirement_key(*r_id));
            if let DeclKind::AssocType(assoc) = &module.decl(*r_id).kind {
                for index in 0..assoc.constraints.len() {
                    requirements.push(self.constraint_key(*r_id, index));
                }
            }
        }
        if let IrGlobalKind::InterfaceType { requirements: slot } =
            &mut self.ir.value_mut(value).kind
        {
            *slot = requirements;
        }

        self.finish_outer_generics(generics, IrArg::Value(value));
        Ok(LoweredVal::Simple(Operand::Global(outermost)))
    }

    // --- Witness tables ---

    pub(super) fn lower_witness_table(&mut self, decl_id: DeclId) -> Result<LoweredVal, LowerError> {
        if let Some(table) = self.witness_tables.get(&decl_id) {
            return Ok(LoweredVal::Simple(Operand::Global(*table)));
        }
        let module = self.module;
        let decl = module.decl(decl_id);
        let DeclKind::Conformance(conf) = &decl.kind else {
            return Err(LowerErrorKind::InconsistentMapping.into());
        };
        let generics = self.emit_outer_generics(decl_id)?;
        let interface = self.emit_decl_ref_value(&conf.interface)?;
        let table_ty = self.ir.types.intern(IrType::WitnessTable { interface });
        let table = self.ir.push_value(
            table_ty,
            IrGlobalKind::WitnessTable {
                interface,
                entries: Vec::new(),
            },
            Some(decl.loc),
        );
        self.ir
            .decorate(table, Decoration::NameHint(decl.name.clone()));

        // Stand-in registration: satisfying members may reference this very
        // witness (e.g. methods over `This`).
        let outermost = generics.first().copied().unwrap_or(table);
        self.witness_tables.insert(decl_id, outermost);
        self.globals
            .insert(decl_id, LoweredVal::Simple(Operand::Global(outermost)));
        if !generics.is_empty() {
            self.bind(decl_id, LoweredVal::Simple(Operand::Global(table)));
        }

        let mut entries = Vec::with_capacity(conf.satisfactions.len());
        for (req, satisfaction) in &conf.satisfactions {
            let key = self.requirement_key(*req);
            let arg = match satisfaction {
                Satisfaction::Value(dr) => IrArg::Value(self.emit_decl_ref_value(dr)?),
                Satisfaction::Type(ty) => IrArg::Type(self.lower_type(ty)?),
                Satisfaction::SubWitness(w) => self.lower_witness(w)?,
            };
            entries.push((key, arg));
        }
        if let IrGlobalKind::WitnessTable { entries: slot, .. } =
            &mut self.ir.value_mut(table).kind
        {
            *slot = entries;
        }

        self.attach_zero_method(decl_id, conf)?;

        self.finish_outer_generics(generics, IrArg::Value(table));
        Ok(LoweredVal::Simple(Operand::Global(outermost)))
    }

    /// Conformances to the differentiability interface mark the concrete
    /// struct with its zero function so transcription can synthesize zeros.
    fn attach_zero_method(
        &mut self,
        _decl_id: DeclId,
        conf: &crate::ast::ConformanceDecl,
    ) -> Result<(), LowerError> {
        let module = self.module;
        if module.decl(conf.interface.decl).name != "IDifferentiable" {
            return Ok(());
        }
        let Type::Struct(sub) = &conf.sub_ty else {
            return Ok(());
        };
        for (req, satisfaction) in &conf.satisfactions {
            if module.decl(*req).name != "dzero" {
                continue;
            }
            if let Satisfaction::Value(dr) = satisfaction {
                let zero_fn = self.emit_decl_ref_value(dr)?;
                let struct_value = self.emit_decl_ref_value(sub)?;
                self.ir
                    .decorate(struct_value, Decoration::ZeroMethod(zero_fn));
            }
        }
        Ok(())
    }

    // --- Global variables ---

    fn lower_global_var(&mut self, decl_id: DeclId) -> Result<LoweredVal, LowerError> {
        let module = self.module;
        let decl = module.decl(decl_id);
        let DeclKind::Var(var) = &decl.kind else {
            return Err(LowerErrorKind::InconsistentMapping.into());
        };
        let ty = self.lower_type(&var.ty)?;
        // Only constant initializers; anything else would need an init
        // function, which this core does not synthesize.
        let init = match &var.init {
            Some(init) => match &init.kind {
                ExprKind::IntLit(v) => Some(Const::Int(*v)),
                ExprKind::FloatLit(v) => Some(Const::float(*v)),
                ExprKind::BoolLit(v) => Some(Const::Bool(*v)),
                _ => {
                    self.sink.error(
                        DiagCode::UnimplementedConstruct,
                        Some(init.loc),
                        "global initializer must be a constant",
                    );
                    None
                }
            },
            None => None,
        };
        let ptr_ty = self.ir.types.intern(IrType::Ptr { pointee: ty });
        let value = self
            .ir
            .push_value(ptr_ty, IrGlobalKind::GlobalVar { init }, Some(decl.loc));
        self.decorate_decl(value, decl_id);
        let val = LoweredVal::Ptr(Operand::Global(value));
        self.globals.insert(decl_id, val);
        Ok(val)
    }

    // --- Shared decoration of named globals ---

    fn decorate_decl(&mut self, value: ValueId, decl_id: DeclId) {
        let decl = self.module.decl(decl_id);
        self.ir
            .decorate(value, Decoration::NameHint(decl.name.clone()));
        if decl.modifiers.is_imported {
            self.ir.decorate(value, Decoration::Import);
        } else if decl.modifiers.is_public {
            self.ir.decorate(value, Decoration::Export);
        }
        if let Some(stage) = decl.modifiers.entry_point {
            self.ir.decorate(
                value,
                Decoration::EntryPoint {
                    stage,
                    name: decl.name.clone(),
                },
            );
        }
        if decl.modifiers.is_differentiable {
            self.ir.decorate(value, Decoration::Differentiable);
        }
        if let Some(op) = &decl.modifiers.intrinsic {
            self.ir.decorate(value, Decoration::Intrinsic(op.clone()));
        }
        if self.opts.emit_debug_info {
            self.ensure_debug_source(decl.loc.file);
        }
    }

    /// Check entry-point parameters for by-ref directions the pipeline
    /// cannot honor; inputs must be plain values.
    pub(super) fn check_entry_point(&mut self, decl_id: DeclId) {
        let module = self.module;
        let decl = module.decl(decl_id);
        let DeclKind::Func(func) = &decl.kind else {
            return;
        };
        for p_id in &func.params {
            let p = module.decl(*p_id);
            if let DeclKind::Param(param) = &p.kind {
                if param.dir != ParamDir::In {
                    self.sink.error(
                        DiagCode::MissingInputDecoration,
                        Some(p.loc),
                        format!("entry-point parameter `{}` must be an input", p.name),
                    );
                }
            }
        }
    }
}

#[cfg(test)]
#[path = "../tests/t_lower_decl.rs"]
mod tests;
