//! Lowering of AST types, compile-time values, declaration references and
//! witnesses into IR entities.
//!
//! Declaration references are where generic substitution happens. Three
//! substitution forms are handled distinctly:
//! - generic application: specialize the lowered generic with lowered
//!   arguments, flattening conjunction witnesses into separate operands;
//! - interface/this-type lookup: witness-method lookup for requirements,
//!   specialization over `This` for concrete members;
//! - no substitution: direct memoized emission via `ensure_decl`.
//!
//! All module-scope derived values (specializations, lookups, witness
//! tuples) are cached so a structurally-equal reference always yields the
//! identical IR entity.

use crate::ast::{DeclId, DeclRef, ScalarKind, Subst, Type, Val, Witness};
use crate::ir::{
    ArrayLen, IrArg, IrGlobalKind, IrType, Operand, TyId, ValueId,
};
use crate::lower::context::Lowerer;
use crate::lower::errors::{LowerError, LowerErrorKind};
use crate::lower::value::LoweredVal;

impl<'a> Lowerer<'a> {
    // --- Types ---

    pub(super) fn lower_type(&mut self, ty: &Type) -> Result<TyId, LowerError> {
        let kind = match ty {
            Type::Void => IrType::Void,
            Type::Scalar(kind) => Self::scalar_ir_type(*kind),
            Type::Vector { elem, count } => {
                let elem = self.ir.types.intern(Self::scalar_ir_type(*elem));
                IrType::Vector {
                    elem,
                    count: *count,
                }
            }
            Type::Matrix { elem, rows, cols } => {
                let elem = self.ir.types.intern(Self::scalar_ir_type(*elem));
                IrType::Matrix {
                    elem,
                    rows: *rows,
                    cols: *cols,
                }
            }
            Type::Array { elem, count } => {
                let elem = self.lower_type(elem)?;
                let count = match count.as_ref() {
                    Val::Int(n) => ArrayLen::Const(*n as u64),
                    other => match self.lower_val(other)? {
                        IrArg::Value(v) => ArrayLen::Value(v),
                        IrArg::Type(_) => {
                            return Err(LowerErrorKind::InconsistentMapping.into());
                        }
                    },
                };
                IrType::Array { elem, count }
            }
            Type::Struct(dr) => IrType::Struct {
                value: self.emit_decl_ref_value(dr)?,
            },
            Type::Interface(dr) => IrType::Interface {
                value: self.emit_decl_ref_value(dr)?,
            },
            Type::Param(dr) => {
                // A type argument bound in the environment (e.g. at a call
                // site for default-argument evaluation) substitutes directly.
                if let Some(LoweredVal::Simple(Operand::Type(t))) = self.lookup(dr.decl) {
                    return Ok(t);
                }
                IrType::Param {
                    value: self.emit_decl_ref_value(dr)?,
                }
            }
            Type::This(interface) => {
                // Bound to the implicit this-type parameter while lowering
                // inside the interface's generic wrapper.
                let val = self
                    .lookup(*interface)
                    .ok_or(LowerErrorKind::InconsistentMapping)?;
                IrType::Param {
                    value: self.global_of(val)?,
                }
            }
            Type::Atomic(inner) => IrType::Atomic {
                inner: self.lower_type(inner)?,
            },
            Type::Ptr(pointee) => IrType::Ptr {
                pointee: self.lower_type(pointee)?,
            },
            Type::Func { params, ret } => {
                let params = params
                    .iter()
                    .map(|p| self.lower_type(p))
                    .collect::<Result<Vec<_>, _>>()?;
                let ret = self.lower_type(ret)?;
                IrType::Func { params, ret }
            }
            Type::Error => IrType::Error,
        };
        Ok(self.ir.types.intern(kind))
    }

    pub(super) fn scalar_ir_type(kind: ScalarKind) -> IrType {
        match kind {
            ScalarKind::Bool => IrType::Bool,
            ScalarKind::Int => IrType::Int {
                signed: true,
                bits: 32,
            },
            ScalarKind::UInt => IrType::Int {
                signed: false,
                bits: 32,
            },
            ScalarKind::Float => IrType::Float { bits: 32 },
            ScalarKind::Half => IrType::Float { bits: 16 },
        }
    }

    // --- Compile-time values ---

    pub(super) fn lower_val(&mut self, val: &Val) -> Result<IrArg, LowerError> {
        match val {
            Val::Type(ty) => Ok(IrArg::Type(self.lower_type(ty)?)),
            // One IR constant per distinct value, so structurally-equal
            // specializations hit the same cache entry.
            Val::Int(value) => {
                if let Some(v) = self.const_ints.get(value) {
                    return Ok(IrArg::Value(*v));
                }
                let ty = self.ir.types.intern(IrType::Int {
                    signed: true,
                    bits: 32,
                });
                let v = self
                    .ir
                    .push_value(ty, IrGlobalKind::ConstInt { value: *value }, None);
                self.const_ints.insert(*value, v);
                Ok(IrArg::Value(v))
            }
            Val::Witness(w) => self.lower_witness(w),
        }
    }

    /// Lower a generic argument, flattening conjunction witnesses into one
    /// operand per leg so the operand list matches the generic's parameter
    /// list shape.
    pub(super) fn lower_generic_arg(
        &mut self,
        val: &Val,
        out: &mut Vec<IrArg>,
    ) -> Result<(), LowerError> {
        if let Val::Witness(Witness::Conjunction(legs)) = val {
            for leg in legs {
                out.push(self.lower_witness(leg)?);
            }
            return Ok(());
        }
        out.push(self.lower_val(val)?);
        Ok(())
    }

    // --- Witnesses ---

    pub(super) fn lower_witness(&mut self, witness: &Witness) -> Result<IrArg, LowerError> {
        match witness {
            // A conformance declaration lowers to its witness table; a
            // generic constraint resolves to the witness parameter bound in
            // the enclosing generic's environment.
            Witness::Declared(dr) => Ok(IrArg::Value(self.emit_decl_ref_value(dr)?)),
            Witness::Transitive { base, requirement } => {
                let base = self.lower_witness(base)?;
                let key = self.requirement_key(*requirement);
                Ok(IrArg::Value(self.lookup_method_global(base, key)))
            }
            Witness::Conjunction(legs) => {
                let elems = legs
                    .iter()
                    .map(|leg| self.lower_witness(leg))
                    .collect::<Result<Vec<_>, _>>()?;
                Ok(IrArg::Value(self.witness_tuple(elems)))
            }
            Witness::Extract { base, index } => {
                let base = self.lower_witness(base)?;
                let IrArg::Value(base) = base else {
                    return Err(LowerErrorKind::UnexpectedWitness.into());
                };
                // Fold a direct extraction out of a known tuple.
                if let IrGlobalKind::WitnessTuple { elems } = &self.ir.value(base).kind {
                    if let Some(elem) = elems.get(*index) {
                        return Ok(*elem);
                    }
                    return Err(LowerErrorKind::UnexpectedWitness.into());
                }
                Ok(IrArg::Value(self.tuple_extract(base, *index)))
            }
        }
    }

    // --- Declaration references ---

    /// Lower a declaration reference, applying its substitutions in order.
    pub(super) fn emit_decl_ref(&mut self, dr: &DeclRef) -> Result<LoweredVal, LowerError> {
        if dr.substs.is_empty() {
            return self.ensure_decl(dr.decl);
        }

        let mut current: Option<ValueId> = None;
        for subst in &dr.substs {
            match subst {
                Subst::Generic { args, .. } => {
                    let base = match current {
                        Some(v) => v,
                        None => {
                            let val = self.ensure_decl(dr.decl)?;
                            self.global_of(val)?
                        }
                    };
                    let mut ir_args = Vec::with_capacity(args.len());
                    for arg in args {
                        self.lower_generic_arg(arg, &mut ir_args)?;
                    }
                    current = Some(self.specialize(base, ir_args));
                }
                Subst::ThisType {
                    interface,
                    sub_ty,
                    witness,
                } => {
                    if self.decl_is_under(dr.decl, *interface) {
                        // An interface requirement: dispatch through the
                        // witness table.
                        let key = self.requirement_key(dr.decl);
                        let w = self.lower_witness(witness)?;
                        current = Some(self.lookup_method_global(w, key));
                    } else {
                        // A concrete member generic over `This`: specialize
                        // with the concrete type and its subtype witness.
                        let base = match current {
                            Some(v) => v,
                            None => {
                                let val = self.ensure_decl(dr.decl)?;
                                self.global_of(val)?
                            }
                        };
                        let ty = self.lower_type(sub_ty)?;
                        let w = self.lower_witness(witness)?;
                        current = Some(self.specialize(base, vec![IrArg::Type(ty), w]));
                    }
                }
            }
        }

        let value = current.ok_or(LowerErrorKind::InconsistentMapping)?;
        Ok(LoweredVal::Simple(Operand::Global(value)))
    }

    /// Lower a declaration reference that must denote a module-scope value.
    pub(super) fn emit_decl_ref_value(&mut self, dr: &DeclRef) -> Result<ValueId, LowerError> {
        let val = self.emit_decl_ref(dr)?;
        self.global_of(val)
    }

    pub(super) fn global_of(&self, val: LoweredVal) -> Result<ValueId, LowerError> {
        match val {
            LoweredVal::Simple(Operand::Global(v)) => Ok(v),
            LoweredVal::Ptr(Operand::Global(v)) => Ok(v),
            _ => Err(LowerErrorKind::InconsistentMapping.into()),
        }
    }

    pub(super) fn decl_is_under(&self, decl: DeclId, ancestor: DeclId) -> bool {
        decl == ancestor || self.module.ancestors(decl).any(|a| a == ancestor)
    }

    // --- Memoized module-scope derivations ---

    /// The stable lookup key for an interface requirement. Exactly one key
    /// exists per logical requirement, however many types implement it.
    pub(super) fn requirement_key(&mut self, decl: DeclId) -> ValueId {
        if let Some(key) = self.requirement_keys.get(&decl) {
            return *key;
        }
        let void = self.ir.types.intern(IrType::Void);
        let name = self.module.decl(decl).name.clone();
        let key = self.ir.push_value(void, IrGlobalKind::RequirementKey, None);
        self.ir
            .decorate(key, crate::ir::Decoration::NameHint(name));
        self.requirement_keys.insert(decl, key);
        key
    }

    /// Extra requirement key for the `index`-th constraint on an associated
    /// type, beyond the key for the associated type itself.
    pub(super) fn constraint_key(&mut self, assoc: DeclId, index: usize) -> ValueId {
        if let Some(key) = self.constraint_keys.get(&(assoc, index)) {
            return *key;
        }
        let void = self.ir.types.intern(IrType::Void);
        let name = format!("{}.{}", self.module.decl(assoc).name, index);
        let key = self.ir.push_value(void, IrGlobalKind::RequirementKey, None);
        self.ir
            .decorate(key, crate::ir::Decoration::NameHint(name));
        self.constraint_keys.insert((assoc, index), key);
        key
    }

    pub(super) fn specialize(&mut self, base: ValueId, args: Vec<IrArg>) -> ValueId {
        let cache_key = (base, args.clone());
        if let Some(v) = self.specialize_cache.get(&cache_key) {
            return *v;
        }
        let ty = self.ir.types.intern(IrType::Dependent { generic: base });
        let v = self
            .ir
            .push_value(ty, IrGlobalKind::Specialize { base, args }, None);
        self.specialize_cache.insert(cache_key, v);
        v
    }

    pub(super) fn lookup_method_global(&mut self, table: IrArg, key: ValueId) -> ValueId {
        let cache_key = (table, key);
        if let Some(v) = self.lookup_cache.get(&cache_key) {
            return *v;
        }
        let void = self.ir.types.intern(IrType::Void);
        let v = self
            .ir
            .push_value(void, IrGlobalKind::LookupMethod { table, key }, None);
        self.lookup_cache.insert(cache_key, v);
        v
    }

    pub(super) fn witness_tuple(&mut self, elems: Vec<IrArg>) -> ValueId {
        if let Some(v) = self.tuple_cache.get(&elems) {
            return *v;
        }
        let void = self.ir.types.intern(IrType::Void);
        let v = self.ir.push_value(
            void,
            IrGlobalKind::WitnessTuple {
                elems: elems.clone(),
            },
            None,
        );
        self.tuple_cache.insert(elems, v);
        v
    }

    pub(super) fn tuple_extract(&mut self, base: ValueId, index: usize) -> ValueId {
        if let Some(v) = self.tuple_extract_cache.get(&(base, index)) {
            return *v;
        }
        let void = self.ir.types.intern(IrType::Void);
        let v = self
            .ir
            .push_value(void, IrGlobalKind::TupleExtract { base, index }, None);
        self.tuple_extract_cache.insert((base, index), v);
        v
    }
}
