//! The write side of lowered values.
//!
//! `assign` walks a priority ladder: a direct store when the destination has
//! an address, masked swizzle stores, setter calls, ref-accessor stores, and
//! finally read-modify-write through a temporary for destinations that can
//! only be updated wholesale.

use crate::ast::{AccessorKind, CastKind};
use crate::ir::{Const, IrType, Op, Operand, TyId};
use crate::lower::context::Lowerer;
use crate::lower::errors::{LowerError, LowerErrorKind};
use crate::lower::materialize::AddressMode;
use crate::lower::value::LoweredVal;

impl<'a> Lowerer<'a> {
    /// Store `src` into the location denoted by `dest`.
    pub(super) fn assign(&mut self, dest: LoweredVal, src: Operand) -> Result<(), LowerError> {
        match dest {
            LoweredVal::Ptr(ptr) => self.emit_store(ptr, src),

            LoweredVal::None | LoweredVal::Simple(_) => {
                Err(LowerErrorKind::InvalidValFlavor.into())
            }

            LoweredVal::Swizzled(id) => {
                let info = self.ext.swizzled(id).clone();
                // With an address for the base vector a single masked store
                // suffices; otherwise rebuild the vector and assign it back.
                if let Some(base) = self.try_get_address(info.base, AddressMode::Default)? {
                    let void = self.ir.types.intern(IrType::Void);
                    self.emit(
                        Op::SwizzledStore {
                            indices: info.indices,
                        },
                        void,
                        vec![base, src],
                    )?;
                    return Ok(());
                }
                let old = self.get_simple_val(info.base)?;
                let old_ty = self.operand_ty(old)?;
                let new = self.emit(
                    Op::SwizzleSet {
                        indices: info.indices,
                    },
                    old_ty,
                    vec![old, src],
                )?;
                self.assign(info.base, Operand::Inst(new))
            }

            LoweredVal::SwizzledMatrix(id) => {
                let info = self.ext.swizzled_matrix(id).clone();
                if let Some(base) = self.try_get_address(info.base, AddressMode::Default)? {
                    return self.store_matrix_elems(base, &info.coords, src);
                }
                // Round-trip through a temporary matrix.
                let old = self.get_simple_val(info.base)?;
                let old_ty = self.operand_ty(old)?;
                let temp = self.emit_var(old_ty)?;
                self.emit_store(temp, old)?;
                self.store_matrix_elems(temp, &info.coords, src)?;
                let updated = self.emit_load(temp)?;
                self.assign(info.base, Operand::Inst(updated))
            }

            LoweredVal::BoundStorage(id) => {
                let info = self.ext.bound_storage(id).clone();
                if let Some(setter) = self.find_accessor(info.storage.decl, AccessorKind::Set) {
                    let this_op = self.storage_this(&info.base, AccessorKind::Set)?;
                    let void = self.ir.types.intern(IrType::Void);
                    self.call_accessor(
                        &info.storage,
                        setter,
                        this_op,
                        &info.args,
                        Some(src),
                        void,
                    )?;
                    return Ok(());
                }
                if let Some(ref_acc) = self.find_accessor(info.storage.decl, AccessorKind::Ref) {
                    let this_op = self.storage_this(&info.base, AccessorKind::Ref)?;
                    let ptr_ty = self.ir.types.intern(IrType::Ptr {
                        pointee: info.result_ty,
                    });
                    let addr = self.call_accessor(
                        &info.storage,
                        ref_acc,
                        this_op,
                        &info.args,
                        None,
                        ptr_ty,
                    )?;
                    return self.emit_store(Operand::Inst(addr), src);
                }
                Err(LowerErrorKind::NoSetter.into())
            }

            LoweredVal::BoundMember(id) => {
                let info = self.ext.bound_member(id).clone();
                let Some(index) = info.field_index else {
                    return Err(LowerErrorKind::InvalidValFlavor.into());
                };
                if let Some(addr) = self.try_get_address(dest, AddressMode::Default)? {
                    return self.emit_store(addr, src);
                }
                // No address for the base aggregate: read it, update the
                // field in a temporary, write the whole value back.
                let old = self.get_simple_val(info.base)?;
                let old_ty = self.operand_ty(old)?;
                let temp = self.emit_var(old_ty)?;
                self.emit_store(temp, old)?;
                let ptr_ty = self.ir.types.intern(IrType::Ptr {
                    pointee: info.result_ty,
                });
                let field = self.emit(Op::FieldAddr { index }, ptr_ty, vec![temp])?;
                self.emit_store(Operand::Inst(field), src)?;
                let updated = self.emit_load(temp)?;
                self.assign(info.base, Operand::Inst(updated))
            }

            LoweredVal::ExtractedExistential(id) => {
                let info = self.ext.extracted_existential(id).clone();
                let wrapped = self.emit(
                    Op::MakeExistential,
                    info.existential_ty,
                    vec![src, info.witness],
                )?;
                self.assign(info.orig, Operand::Inst(wrapped))
            }

            LoweredVal::ImplicitCastedLValue(id) => {
                let info = self.ext.implicit_cast(id).clone();
                // Splat has no inverse; the checker never produces one in
                // assignment position.
                if info.kind == CastKind::Splat {
                    return Err(LowerErrorKind::InvalidValFlavor.into());
                }
                let narrowed = self.emit_cast(info.kind, src, info.inner_ty)?;
                self.assign(info.base, Operand::Inst(narrowed))
            }
        }
    }

    /// Store lanes of `src` into (row, col) elements of a matrix address.
    fn store_matrix_elems(
        &mut self,
        base: Operand,
        coords: &[(u32, u32)],
        src: Operand,
    ) -> Result<(), LowerError> {
        let base_ty = self.operand_ty(base)?;
        let matrix_ty = self
            .ir
            .types
            .pointee(base_ty)
            .ok_or(LowerErrorKind::InvalidValFlavor)?;
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
        let row_ptr_ty = self.ir.types.intern(IrType::Ptr { pointee: row_ty });
        let elem_ptr_ty = self.ir.types.intern(IrType::Ptr { pointee: elem_ty });
        for (i, (row, col)) in coords.iter().enumerate() {
            let lane = if coords.len() == 1 {
                src
            } else {
                let extracted = self.emit(
                    Op::ElemExtract,
                    elem_ty,
                    vec![src, Operand::Const(Const::Int(i as i64))],
                )?;
                Operand::Inst(extracted)
            };
            let row_addr = self.emit(
                Op::ElemAddr,
                row_ptr_ty,
                vec![base, Operand::Const(Const::Int(*row as i64))],
            )?;
            let elem_addr = self.emit(
                Op::ElemAddr,
                elem_ptr_ty,
                vec![
                    Operand::Inst(row_addr),
                    Operand::Const(Const::Int(*col as i64)),
                ],
            )?;
            self.emit_store(Operand::Inst(elem_addr), lane)?;
        }
        Ok(())
    }

    /// Declare a fresh stack slot of `ty` initialized from `init`.
    pub(super) fn emit_local(
        &mut self,
        ty: TyId,
        init: Option<Operand>,
    ) -> Result<Operand, LowerError> {
        let slot = self.emit_var(ty)?;
        if let Some(init) = init {
            self.emit_store(slot, init)?;
        }
        Ok(slot)
    }
}

#[cfg(test)]
#[path = "../tests/t_assign.rs"]
mod tests;
