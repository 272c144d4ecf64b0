//! AST-level types, compile-time values, declaration references and witnesses.
//!
//! Everything here is produced by the (out-of-scope) checker and consumed by
//! lowering. All of it is structural: two references to the same declaration
//! under structurally-equal substitutions must compare equal, which is what
//! the lowering memoization keys rely on.

use crate::ast::DeclId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ScalarKind {
    Bool,
    Int,
    UInt,
    Float,
    Half,
}

impl ScalarKind {
    pub fn is_float(self) -> bool {
        matches!(self, ScalarKind::Float | ScalarKind::Half)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    Void,
    Scalar(ScalarKind),
    Vector {
        elem: ScalarKind,
        count: u8,
    },
    Matrix {
        elem: ScalarKind,
        rows: u8,
        cols: u8,
    },
    Array {
        elem: Box<Type>,
        count: Box<Val>,
    },
    /// A nominal struct type, possibly specialized.
    Struct(DeclRef),
    /// An interface used as a type: an existential (value, witness) pair.
    Interface(DeclRef),
    /// A generic type parameter or an associated type, resolved through the
    /// reference's substitutions.
    Param(DeclRef),
    /// The implicit `This` type inside an interface.
    This(DeclId),
    Atomic(Box<Type>),
    Ptr(Box<Type>),
    Func {
        params: Vec<Type>,
        ret: Box<Type>,
    },
    Error,
}

impl Type {
    pub fn float() -> Type {
        Type::Scalar(ScalarKind::Float)
    }

    pub fn int() -> Type {
        Type::Scalar(ScalarKind::Int)
    }

    pub fn bool() -> Type {
        Type::Scalar(ScalarKind::Bool)
    }

    pub fn vector(elem: ScalarKind, count: u8) -> Type {
        Type::Vector { elem, count }
    }

    pub fn array(elem: Type, count: i64) -> Type {
        Type::Array {
            elem: Box::new(elem),
            count: Box::new(Val::Int(count)),
        }
    }

    pub fn is_atomic(&self) -> bool {
        matches!(self, Type::Atomic(_))
    }
}

/// A compile-time value: what generic arguments are made of.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Val {
    Type(Type),
    Int(i64),
    Witness(Witness),
}

/// A reference to a declaration together with the substitutions accumulated
/// on the path that named it. Substitutions are listed outermost-first.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DeclRef {
    pub decl: DeclId,
    pub substs: Vec<Subst>,
}

impl DeclRef {
    pub fn direct(decl: DeclId) -> Self {
        Self {
            decl,
            substs: Vec::new(),
        }
    }

    pub fn generic_app(decl: DeclId, generic: DeclId, args: Vec<Val>) -> Self {
        Self {
            decl,
            substs: vec![Subst::Generic { generic, args }],
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Subst {
    /// Application of an enclosing generic to concrete arguments.
    Generic { generic: DeclId, args: Vec<Val> },
    /// Resolution of an interface member against a concrete `This` type.
    ThisType {
        interface: DeclId,
        sub_ty: Box<Type>,
        witness: Box<Witness>,
    },
}

/// Evidence that a type conforms to an interface.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Witness {
    /// A conformance declaration (`T : I`), or a generic constraint bound in
    /// an enclosing generic's environment.
    Declared(DeclRef),
    /// Conformance reached through an inherited-interface slot of another
    /// witness.
    Transitive {
        base: Box<Witness>,
        requirement: DeclId,
    },
    /// Simultaneous conformance to several interfaces.
    Conjunction(Vec<Witness>),
    /// Projection of one leg out of a conjunction witness.
    Extract { base: Box<Witness>, index: usize },
}
