//! Turning lowered values into instructions.
//!
//! Expression lowering hands back deferred flavors (bound storage, bound
//! members, swizzles, extracted existentials) precisely so that reads and
//! writes can commit to different accessors. This module is the read side:
//! `materialize` reduces any flavor to `Simple` or `Ptr`, `get_simple_val`
//! goes all the way to an operand, and `try_get_address` forms an address
//! without forcing a load when one can be had.

use crate::ast::{AccessorKind, CastKind, DeclId, DeclKind, DeclRef};
use crate::ir::{Const, InstId, IrCastKind, IrType, Op, Operand, TyId};
use crate::lower::context::Lowerer;
use crate::lower::errors::{LowerError, LowerErrorKind};
use crate::lower::value::LoweredVal;

/// How eagerly `try_get_address` is allowed to commit to an address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(super) enum AddressMode {
    /// Only addresses that denote the whole logical location.
    Default,
    /// Also partial addresses, e.g. one lane of a swizzle.
    Aggressive,
}

impl<'a> Lowerer<'a> {
    // --- Read side ---

    /// Reduce a lowered value to `None`, `Simple`, or `Ptr`, emitting any
    /// getter calls and extraction instructions that takes.
    pub(super) fn materialize(&mut self, val: LoweredVal) -> Result<LoweredVal, LowerError> {
        match val {
            LoweredVal::None | LoweredVal::Simple(_) | LoweredVal::Ptr(_) => Ok(val),

            LoweredVal::BoundStorage(id) => {
                let info = self.ext.bound_storage(id).clone();
                // Prefer the getter; fall back to a ref accessor.
                if let Some(getter) = self.find_accessor(info.storage.decl, AccessorKind::Get) {
                    let this_op = self.storage_this(&info.base, AccessorKind::Get)?;
                    let result = self.call_accessor(
                        &info.storage,
                        getter,
                        this_op,
                        &info.args,
                        None,
                        info.result_ty,
                    )?;
                    return Ok(LoweredVal::Simple(Operand::Inst(result)));
                }
                if let Some(ref_acc) = self.find_accessor(info.storage.decl, AccessorKind::Ref) {
                    let this_op = self.storage_this(&info.base, AccessorKind::Ref)?;
                    let ptr_ty = self.ir.types.intern(IrType::Ptr {
                        pointee: info.result_ty,
                    });
                    let result = self.call_accessor(
                        &info.storage,
                        ref_acc,
                        this_op,
                        &info.args,
                        None,
                        ptr_ty,
                    )?;
                    return Ok(LoweredVal::Ptr(Operand::Inst(result)));
                }
                Err(LowerErrorKind::NoGetter.into())
            }

            LoweredVal::BoundMember(id) => {
                let info = self.ext.bound_member(id).clone();
                let Some(index) = info.field_index else {
                    // A method bound to a base: the callable itself.
                    return self.emit_decl_ref(&info.member);
                };
                match self.materialize(info.base)? {
                    LoweredVal::Ptr(base) => {
                        let ptr_ty = self.ir.types.intern(IrType::Ptr {
                            pointee: info.result_ty,
                        });
                        let addr =
                            self.emit(Op::FieldAddr { index }, ptr_ty, vec![base])?;
                        Ok(LoweredVal::Ptr(Operand::Inst(addr)))
                    }
                    LoweredVal::Simple(base) => {
                        let inst =
                            self.emit(Op::FieldExtract { index }, info.result_ty, vec![base])?;
                        Ok(LoweredVal::Simple(Operand::Inst(inst)))
                    }
                    _ => Err(LowerErrorKind::InvalidValFlavor.into()),
                }
            }

            LoweredVal::Swizzled(id) => {
                let info = self.ext.swizzled(id).clone();
                let base = self.get_simple_val(info.base)?;
                let inst = self.emit(
                    Op::Swizzle {
                        indices: info.indices,
                    },
                    info.result_ty,
                    vec![base],
                )?;
                Ok(LoweredVal::Simple(Operand::Inst(inst)))
            }

            LoweredVal::SwizzledMatrix(id) => {
                let info = self.ext.swizzled_matrix(id).clone();
                let base = self.get_simple_val(info.base)?;
                let inst = self.read_matrix_elems(base, &info.coords, info.result_ty)?;
                Ok(LoweredVal::Simple(Operand::Inst(inst)))
            }

            LoweredVal::ExtractedExistential(id) => {
                let info = self.ext.extracted_existential(id).clone();
                Ok(LoweredVal::Simple(info.value))
            }

            LoweredVal::ImplicitCastedLValue(id) => {
                let info = self.ext.implicit_cast(id).clone();
                let inner = self.get_simple_val(info.base)?;
                let inst = self.emit_cast(info.kind, inner, info.outer_ty)?;
                Ok(LoweredVal::Simple(Operand::Inst(inst)))
            }
        }
    }

    /// Reduce a lowered value all the way to an r-value operand.
    pub(super) fn get_simple_val(&mut self, val: LoweredVal) -> Result<Operand, LowerError> {
        match self.materialize(val)? {
            LoweredVal::None => Ok(Operand::Const(Const::Unit)),
            LoweredVal::Simple(op) => Ok(op),
            LoweredVal::Ptr(ptr) => Ok(Operand::Inst(self.emit_load(ptr)?)),
            _ => Err(LowerErrorKind::InvalidValFlavor.into()),
        }
    }

    /// Try to form an address for a lowered value without loading it.
    /// Returns `None` when the value has no usable address; callers then
    /// fall back to getter/setter calls or temporaries.
    pub(super) fn try_get_address(
        &mut self,
        val: LoweredVal,
        mode: AddressMode,
    ) -> Result<Option<Operand>, LowerError> {
        match val {
            LoweredVal::Ptr(ptr) => Ok(Some(ptr)),

            LoweredVal::BoundStorage(id) => {
                let info = self.ext.bound_storage(id).clone();
                let Some(ref_acc) = self.find_accessor(info.storage.decl, AccessorKind::Ref)
                else {
                    return Ok(None);
                };
                let this_op = self.storage_this(&info.base, AccessorKind::Ref)?;
                let ptr_ty = self.ir.types.intern(IrType::Ptr {
                    pointee: info.result_ty,
                });
                let result = self.call_accessor(
                    &info.storage,
                    ref_acc,
                    this_op,
                    &info.args,
                    None,
                    ptr_ty,
                )?;
                Ok(Some(Operand::Inst(result)))
            }

            LoweredVal::BoundMember(id) => {
                let info = self.ext.bound_member(id).clone();
                let Some(index) = info.field_index else {
                    return Ok(None);
                };
                let Some(base) = self.try_get_address(info.base, mode)? else {
                    return Ok(None);
                };
                let ptr_ty = self.ir.types.intern(IrType::Ptr {
                    pointee: info.result_ty,
                });
                let addr = self.emit(Op::FieldAddr { index }, ptr_ty, vec![base])?;
                Ok(Some(Operand::Inst(addr)))
            }

            // A single-lane swizzle has a real element address, but taking it
            // commits to that one lane; only do so when asked to be eager.
            LoweredVal::Swizzled(id) if mode == AddressMode::Aggressive => {
                let info = self.ext.swizzled(id).clone();
                if info.indices.len() != 1 {
                    return Ok(None);
                }
                let Some(base) = self.try_get_address(info.base, mode)? else {
                    return Ok(None);
                };
                let ptr_ty = self.ir.types.intern(IrType::Ptr {
                    pointee: info.result_ty,
                });
                let addr = self.emit(
                    Op::ElemAddr,
                    ptr_ty,
                    vec![base, Operand::Const(Const::Int(info.indices[0] as i64))],
                )?;
                Ok(Some(Operand::Inst(addr)))
            }

            _ => Ok(None),
        }
    }

    /// Form an address no matter what: fall back to a temporary holding the
    /// current value. The temporary does not write back; callers that need
    /// write-back handle it themselves.
    pub(super) fn get_address_or_temp(&mut self, val: LoweredVal) -> Result<Operand, LowerError> {
        if let Some(addr) = self.try_get_address(val, AddressMode::Aggressive)? {
            return Ok(addr);
        }
        let value = self.get_simple_val(val)?;
        let ty = self.operand_ty(value)?;
        let temp = self.emit_var(ty)?;
        self.emit_store(temp, value)?;
        Ok(temp)
    }

    // --- Accessor plumbing ---

    pub(super) fn find_accessor(&self, storage: DeclId, kind: AccessorKind) -> Option<DeclId> {
        let accessors = match &self.module.decl(storage).kind {
            DeclKind::Subscript(s) | DeclKind::Property(s) => &s.accessors,
            _ => return None,
        };
        accessors.iter().copied().find(|id| {
            matches!(&self.module.decl(*id).kind, DeclKind::Accessor(a) if a.kind == kind)
        })
    }

    /// The `this` argument for an accessor call. Getters take the base by
    /// value; setters and ref accessors need its address.
    pub(super) fn storage_this(
        &mut self,
        base: &LoweredVal,
        kind: AccessorKind,
    ) -> Result<Option<Operand>, LowerError> {
        match base {
            LoweredVal::None => Ok(None),
            _ if kind == AccessorKind::Get => Ok(Some(self.get_simple_val(*base)?)),
            _ => Ok(Some(self.get_address_or_temp(*base)?)),
        }
    }

    /// Call one accessor of a subscript/property. `extra` is the new value
    /// for a setter; index arguments precede it.
    pub(super) fn call_accessor(
        &mut self,
        storage: &DeclRef,
        accessor: DeclId,
        this_op: Option<Operand>,
        args: &[Operand],
        extra: Option<Operand>,
        ret_ty: TyId,
    ) -> Result<InstId, LowerError> {
        // The accessor inherits the storage reference's substitutions.
        let accessor_ref = DeclRef {
            decl: accessor,
            substs: storage.substs.clone(),
        };
        let callee_val = self.emit_decl_ref(&accessor_ref)?;
        let callee = self.get_simple_val(callee_val)?;
        let mut operands = Vec::with_capacity(args.len() + 2);
        operands.push(callee);
        operands.extend(this_op);
        operands.extend_from_slice(args);
        operands.extend(extra);
        self.emit(Op::Call, ret_ty, operands)
    }

    // --- Cast and matrix-read helpers ---

    pub(super) fn emit_cast(
        &mut self,
        kind: CastKind,
        value: Operand,
        to_ty: TyId,
    ) -> Result<InstId, LowerError> {
        match kind {
            CastKind::Numeric => self.emit(Op::Cast(IrCastKind::Numeric), to_ty, vec![value]),
            CastKind::Bit => self.emit(Op::Cast(IrCastKind::Bit), to_ty, vec![value]),
            CastKind::Splat => self.emit(Op::Splat, to_ty, vec![value]),
        }
    }

    /// Read selected (row, col) elements of a matrix value, producing a
    /// scalar for one coordinate and a vector otherwise.
    fn read_matrix_elems(
        &mut self,
        matrix: Operand,
        coords: &[(u32, u32)],
        result_ty: TyId,
    ) -> Result<InstId, LowerError> {
        let matrix_ty = self.operand_ty(matrix)?;
        let row_ty = self
            .ir
            .types
            .row_ty(matrix_ty)
            .ok_or(LowerErrorKind::InvalidValFlavor)?;
        let elem_ty = self
            .ir
            .types
            .elem_ty(row_ty)
            .ok_or(LowerErrorKind::InvalidValFlavor)?;
        let mut elems = Vec::with_capacity(coords.len());
        for (row, col) in coords {
            let row_val = self.emit(
                Op::ElemExtract,
                row_ty,
                vec![matrix, Operand::Const(Const::Int(*row as i64))],
            )?;
            let elem = self.emit(
                Op::ElemExtract,
                elem_ty,
                vec![
                    Operand::Inst(row_val),
                    Operand::Const(Const::Int(*col as i64)),
                ],
            )?;
            elems.push(Operand::Inst(elem));
        }
        if let [single] = elems[..] {
            match single {
                Operand::Inst(id) => return Ok(id),
                _ => return Err(LowerErrorKind::InvalidValFlavor.into()),
            }
        }
        self.emit(Op::MakeVector, result_ty, elems)
    }
}

#[cfg(test)]
#[path = "../tests/t_materialize.rs"]
mod tests;
