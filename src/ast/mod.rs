//! The type-checked AST consumed by lowering.
//!
//! This is an input data model, not a syntax tree fresh off a parser: every
//! expression carries its resolved type, every name reference is a `DeclRef`
//! to a concrete declaration, and every break/continue names its target
//! statement. Anything unresolved reaching lowering is a checker bug and is
//! treated as fatal there.

pub mod types;

use std::path::PathBuf;

pub use types::{DeclRef, ScalarKind, Subst, Type, Val, Witness};

use crate::diag::SourceLoc;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct NodeId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct DeclId(pub u32);

impl DeclId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SourceFileId(pub u32);

/// One translation unit: a flat declaration arena plus the roots lowering
/// starts from.
#[derive(Debug, Default)]
pub struct Module {
    pub decls: Vec<Decl>,
    pub top_level: Vec<DeclId>,
    pub files: Vec<PathBuf>,
}

impl Module {
    pub fn decl(&self, id: DeclId) -> &Decl {
        &self.decls[id.index()]
    }

    /// Walk the parent chain from `id` outward (excluding `id` itself).
    pub fn ancestors(&self, id: DeclId) -> impl Iterator<Item = DeclId> + '_ {
        let mut curr = self.decl(id).parent;
        std::iter::from_fn(move || {
            let next = curr?;
            curr = self.decl(next).parent;
            Some(next)
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Vertex,
    Fragment,
    Compute,
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Stage::Vertex => write!(f, "vertex"),
            Stage::Fragment => write!(f, "fragment"),
            Stage::Compute => write!(f, "compute"),
        }
    }
}

/// Enumerable modifiers and attributes attached to a declaration.
#[derive(Debug, Clone, Default)]
pub struct Modifiers {
    pub is_public: bool,
    pub is_imported: bool,
    pub is_mutating: bool,
    pub is_differentiable: bool,
    pub entry_point: Option<Stage>,
    pub intrinsic: Option<String>,
}

#[derive(Debug)]
pub struct Decl {
    pub id: DeclId,
    pub parent: Option<DeclId>,
    pub name: String,
    pub loc: SourceLoc,
    pub modifiers: Modifiers,
    pub kind: DeclKind,
}

#[derive(Debug)]
pub enum DeclKind {
    Func(FuncDecl),
    Struct(StructDecl),
    Field(FieldDecl),
    Interface(InterfaceDecl),
    AssocType(AssocTypeDecl),
    Generic(GenericDecl),
    GenericTypeParam,
    GenericValueParam { ty: Type },
    /// A constraint `P : I` on a generic type parameter. Lowered as an
    /// implicit witness-table parameter of the enclosing generic.
    GenericConstraint { param: DeclId, interface: DeclRef },
    Param(ParamDecl),
    Var(VarDecl),
    Subscript(StorageDecl),
    Property(StorageDecl),
    Accessor(AccessorDecl),
    /// A conformance `T : I` with the values satisfying each requirement.
    Conformance(ConformanceDecl),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParamDir {
    In,
    Out,
    InOut,
    Ref,
    ConstRef,
}

impl ParamDir {
    /// Whether the argument is passed by address rather than by value.
    pub fn is_by_ref(self) -> bool {
        !matches!(self, ParamDir::In)
    }

    /// Whether a synthesized temporary needs its value copied back out after
    /// the call.
    pub fn needs_fixup(self) -> bool {
        matches!(self, ParamDir::Out | ParamDir::InOut)
    }

    /// Whether a synthesized temporary needs the current value copied in
    /// before the call.
    pub fn needs_copy_in(self) -> bool {
        matches!(self, ParamDir::InOut | ParamDir::ConstRef | ParamDir::Ref)
    }
}

#[derive(Debug)]
pub struct FuncDecl {
    pub params: Vec<DeclId>,
    pub ret_ty: Type,
    /// The declared error type for a throwing function.
    pub error_ty: Option<Type>,
    pub body: Option<Stmt>,
}

#[derive(Debug)]
pub struct ParamDecl {
    pub ty: Type,
    pub dir: ParamDir,
    pub default: Option<Expr>,
}

#[derive(Debug)]
pub struct StructDecl {
    pub fields: Vec<DeclId>,
    /// Member functions, subscripts, properties, nested conformances.
    pub members: Vec<DeclId>,
    pub is_non_copyable: bool,
}

#[derive(Debug)]
pub struct FieldDecl {
    pub ty: Type,
    pub index: usize,
}

#[derive(Debug)]
pub struct InterfaceDecl {
    /// Requirement declarations: functions, associated types, subscripts.
    pub requirements: Vec<DeclId>,
    /// Inherited-interface slots; each contributes one requirement entry.
    pub inherited: Vec<DeclRef>,
}

#[derive(Debug)]
pub struct AssocTypeDecl {
    pub constraints: Vec<DeclRef>,
}

#[derive(Debug)]
pub struct GenericDecl {
    /// Type params, value params, and constraints, in declaration order.
    pub params: Vec<DeclId>,
    pub inner: DeclId,
}

#[derive(Debug)]
pub struct VarDecl {
    pub ty: Type,
    pub init: Option<Expr>,
}

#[derive(Debug)]
pub struct StorageDecl {
    pub index_params: Vec<DeclId>,
    pub ty: Type,
    pub accessors: Vec<DeclId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AccessorKind {
    Get,
    Set,
    Ref,
}

#[derive(Debug)]
pub struct AccessorDecl {
    pub kind: AccessorKind,
    pub body: Option<Stmt>,
}

#[derive(Debug)]
pub struct ConformanceDecl {
    pub sub_ty: Type,
    pub interface: DeclRef,
    pub satisfactions: Vec<(DeclId, Satisfaction)>,
}

#[derive(Debug)]
pub enum Satisfaction {
    Value(DeclRef),
    Type(Type),
    SubWitness(Witness),
}

// --- Expressions ---

#[derive(Debug)]
pub struct Expr {
    pub id: NodeId,
    pub ty: Type,
    pub loc: SourceLoc,
    pub kind: ExprKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Add,
    Sub,
    Mul,
    Div,
    Eq,
    Ne,
    Lt,
    Gt,
    LtEq,
    GtEq,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    /// Numeric conversion between scalar/vector element types.
    Numeric,
    /// Reinterpreting bit cast.
    Bit,
    /// Scalar-to-vector broadcast.
    Splat,
}

#[derive(Debug)]
pub enum ExprKind {
    IntLit(i64),
    FloatLit(f64),
    BoolLit(bool),
    StringLit(String),
    /// A resolved reference to a declaration (variable, function, generic
    /// specialization, interface member through a witness, ...).
    DeclRef(DeclRef),
    This,
    Member {
        base: Box<Expr>,
        member: DeclRef,
    },
    Swizzle {
        base: Box<Expr>,
        indices: Vec<u32>,
    },
    MatrixSwizzle {
        base: Box<Expr>,
        coords: Vec<(u32, u32)>,
    },
    /// Array/vector indexing, or a subscript access when the base is a
    /// struct or interface type.
    Index {
        base: Box<Expr>,
        args: Vec<Expr>,
    },
    Call {
        callee: Box<Expr>,
        args: Vec<Expr>,
    },
    /// `try f(...)` around a call to a throwing function.
    TryCall(Box<Expr>),
    Assign {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    /// A checker-materialized cast; `ty` on the node is the target type.
    Cast {
        kind: CastKind,
        inner: Box<Expr>,
    },
    And {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Or {
        left: Box<Expr>,
        right: Box<Expr>,
    },
    Select {
        cond: Box<Expr>,
        then_val: Box<Expr>,
        else_val: Box<Expr>,
    },
    BinOp {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    UnOp {
        op: UnaryOp,
        arg: Box<Expr>,
    },
    /// `{ a, b, c }` initializer list, typed against the node's type.
    InitList(Vec<Expr>),
    /// Checker-inserted coercion of a concrete value to an interface type.
    MakeExistential {
        inner: Box<Expr>,
        witness: Witness,
    },
}

// --- Statements ---

#[derive(Debug)]
pub struct Stmt {
    pub id: NodeId,
    pub loc: SourceLoc,
    pub kind: StmtKind,
}

#[derive(Debug)]
pub enum StmtKind {
    Block(Vec<Stmt>),
    Empty,
    /// A local variable declaration; the decl arena holds the `VarDecl`.
    Local(DeclId),
    Expr(Expr),
    If {
        cond: Expr,
        then_branch: Box<Stmt>,
        else_branch: Option<Box<Stmt>>,
    },
    While {
        cond: Expr,
        body: Box<Stmt>,
    },
    For {
        init: Option<Box<Stmt>>,
        cond: Option<Expr>,
        step: Option<Expr>,
        body: Box<Stmt>,
    },
    Switch {
        scrutinee: Expr,
        body: Box<Stmt>,
    },
    /// A `case` label inside a switch body; the value is a checked constant.
    Case(Expr),
    Default,
    /// `target` is the `NodeId` of the enclosing breakable statement.
    Break {
        target: NodeId,
    },
    Continue {
        target: NodeId,
    },
    Return(Option<Expr>),
    Defer(Box<Stmt>),
    Throw(Expr),
    TryCatch {
        body: Box<Stmt>,
        /// Parameter binding the caught error inside the handler.
        err_param: Option<DeclId>,
        handler: Box<Stmt>,
    },
    Discard,
}
