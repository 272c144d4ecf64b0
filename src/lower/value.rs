//! The result of lowering an expression.
//!
//! The common flavors (`None`, `Simple`, `Ptr`) are inline and `Copy`; the
//! deferred-access flavors index into an arena of extended records owned by
//! the lowering context and freed in bulk when the pass ends. No two values
//! alias the same record.

use crate::ast::{CastKind, DeclRef};
use crate::ir::{Operand, TyId};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ExtRecId(pub u32);

impl ExtRecId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoweredVal {
    /// No value (void expressions, statements).
    None,
    /// A plain r-value.
    Simple(Operand),
    /// An l-value held as an address.
    Ptr(Operand),
    /// A property/subscript access that has not yet committed to a
    /// getter/setter/ref accessor.
    BoundStorage(ExtRecId),
    /// A member access whose base may itself need accessor calls.
    BoundMember(ExtRecId),
    /// A vector swizzle l-value.
    Swizzled(ExtRecId),
    /// A matrix multi-element swizzle l-value.
    SwizzledMatrix(ExtRecId),
    /// A value extracted out of an existential, remembering how to rewrap.
    ExtractedExistential(ExtRecId),
    /// An l-value seen through a checker-inserted implicit cast.
    ImplicitCastedLValue(ExtRecId),
}

#[derive(Debug, Clone)]
pub enum ExtRec {
    BoundStorage(BoundStorageInfo),
    BoundMember(BoundMemberInfo),
    Swizzled(SwizzledLValueInfo),
    SwizzledMatrix(SwizzledMatrixLValueInfo),
    ExtractedExistential(ExtractedExistentialInfo),
    ImplicitCast(ImplicitCastInfo),
}

/// A subscript/property access: enough to later call `get`, `set`, or `ref`.
#[derive(Debug, Clone)]
pub struct BoundStorageInfo {
    pub storage: DeclRef,
    pub base: LoweredVal,
    /// Index arguments for a subscript; empty for a property.
    pub args: Vec<Operand>,
    pub result_ty: TyId,
}

/// A field or method bound to a base value.
#[derive(Debug, Clone)]
pub struct BoundMemberInfo {
    pub base: LoweredVal,
    pub member: DeclRef,
    /// Set for fields; `None` for methods.
    pub field_index: Option<usize>,
    pub result_ty: TyId,
}

#[derive(Debug, Clone)]
pub struct SwizzledLValueInfo {
    pub base: LoweredVal,
    pub indices: Vec<u32>,
    pub result_ty: TyId,
}

#[derive(Debug, Clone)]
pub struct SwizzledMatrixLValueInfo {
    pub base: LoweredVal,
    /// (row, column) per selected element.
    pub coords: Vec<(u32, u32)>,
    pub result_ty: TyId,
}

#[derive(Debug, Clone)]
pub struct ExtractedExistentialInfo {
    /// The already-extracted concrete value.
    pub value: Operand,
    /// The witness table extracted alongside it.
    pub witness: Operand,
    /// The existential location to rewrap into on assignment.
    pub orig: LoweredVal,
    /// Type of the extracted concrete value.
    pub result_ty: TyId,
    /// Type of the original existential location.
    pub existential_ty: TyId,
}

#[derive(Debug, Clone)]
pub struct ImplicitCastInfo {
    pub base: LoweredVal,
    pub kind: CastKind,
    /// Type the cast produces (what readers of this l-value see).
    pub outer_ty: TyId,
    /// Type of the underlying location (what assignment casts back to).
    pub inner_ty: TyId,
}

/// Arena of extended value records; owned by the lowering context.
#[derive(Debug, Default)]
pub struct ExtArena {
    recs: Vec<ExtRec>,
}

impl ExtArena {
    pub fn alloc(&mut self, rec: ExtRec) -> ExtRecId {
        let id = ExtRecId(self.recs.len() as u32);
        self.recs.push(rec);
        id
    }

    pub fn get(&self, id: ExtRecId) -> &ExtRec {
        &self.recs[id.index()]
    }

    pub fn bound_storage(&self, id: ExtRecId) -> &BoundStorageInfo {
        match self.get(id) {
            ExtRec::BoundStorage(info) => info,
            other => panic!("expected BoundStorage record, found {:?}", other),
        }
    }

    pub fn bound_member(&self, id: ExtRecId) -> &BoundMemberInfo {
        match self.get(id) {
            ExtRec::BoundMember(info) => info,
            other => panic!("expected BoundMember record, found {:?}", other),
        }
    }

    pub fn swizzled(&self, id: ExtRecId) -> &SwizzledLValueInfo {
        match self.get(id) {
            ExtRec::Swizzled(info) => info,
            other => panic!("expected Swizzled record, found {:?}", other),
        }
    }

    pub fn swizzled_matrix(&self, id: ExtRecId) -> &SwizzledMatrixLValueInfo {
        match self.get(id) {
            ExtRec::SwizzledMatrix(info) => info,
            other => panic!("expected SwizzledMatrix record, found {:?}", other),
        }
    }

    pub fn extracted_existential(&self, id: ExtRecId) -> &ExtractedExistentialInfo {
        match self.get(id) {
            ExtRec::ExtractedExistential(info) => info,
            other => panic!("expected ExtractedExistential record, found {:?}", other),
        }
    }

    pub fn implicit_cast(&self, id: ExtRecId) -> &ImplicitCastInfo {
        match self.get(id) {
            ExtRec::ImplicitCast(info) => info,
            other => panic!("expected ImplicitCast record, found {:?}", other),
        }
    }
}
