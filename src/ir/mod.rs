//! The IR produced by lowering.
//!
//! ## Concepts
//!
//! - A module holds a flat arena of global values: functions, generics,
//!   struct/interface types, witness tables, requirement keys, global
//!   variables and specializations.
//! - Functions hold basic blocks; blocks hold ordered instructions and end in
//!   exactly one terminator.
//! - Instructions carry an opcode, a result type, an ordered operand list and
//!   an optional source location. Operands reference instructions, global
//!   values, constants, or types.
//! - IR types are structurally interned in a per-module table, so equal types
//!   share one `TyId`. Downstream passes rely on this identity.
//!
//! The module is append-only during lowering; nothing here is optimized,
//! deduplicated beyond interning, or verified beyond block termination.

pub mod builder;

use std::fmt;
use std::fmt::Write as _;

use indexmap::IndexMap;

use crate::ast::{SourceFileId, Stage};
use crate::diag::SourceLoc;

// --- IR Type System ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TyId(pub u32);

impl TyId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayLen {
    Const(u64),
    /// A generic value parameter standing in for the length.
    Value(ValueId),
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum IrType {
    Void,
    Bool,
    Int { signed: bool, bits: u8 },
    Float { bits: u8 },
    Vector { elem: TyId, count: u8 },
    Matrix { elem: TyId, rows: u8, cols: u8 },
    Array { elem: TyId, count: ArrayLen },
    /// A nominal type declared at module scope.
    Struct { value: ValueId },
    /// Existential: (concrete value, witness table) behind an interface.
    Interface { value: ValueId },
    /// A generic type parameter or an associated-type lookup result.
    Param { value: ValueId },
    /// Witness-table evidence that some type conforms to an interface.
    WitnessTable { interface: ValueId },
    Ptr { pointee: TyId },
    Atomic { inner: TyId },
    Func { params: Vec<TyId>, ret: TyId },
    /// Forward/backward differentiation pair of a primal and its derivative.
    Pair { primal: TyId, diff: TyId },
    /// The type of a generic-wrapped value whose type depends on the
    /// generic's own parameters; resolved at specialization time.
    Dependent { generic: ValueId },
    Error,
}

#[derive(Debug, Default)]
pub struct IrTypeTable {
    kinds: Vec<IrType>,
    dedup: IndexMap<IrType, TyId>,
}

impl IrTypeTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn intern(&mut self, kind: IrType) -> TyId {
        if let Some(id) = self.dedup.get(&kind) {
            return *id;
        }
        let id = TyId(self.kinds.len() as u32);
        self.kinds.push(kind.clone());
        self.dedup.insert(kind, id);
        id
    }

    pub fn kind(&self, id: TyId) -> &IrType {
        &self.kinds[id.index()]
    }

    pub fn pointee(&self, id: TyId) -> Option<TyId> {
        match self.kind(id) {
            IrType::Ptr { pointee } => Some(*pointee),
            _ => None,
        }
    }

    /// The element type of a vector, matrix row, or array.
    pub fn elem_ty(&self, id: TyId) -> Option<TyId> {
        match self.kind(id) {
            IrType::Vector { elem, .. } => Some(*elem),
            IrType::Array { elem, .. } => Some(*elem),
            // Matrix elements along the row axis are row vectors; callers
            // intern those through `row_ty`.
            _ => None,
        }
    }

    /// The row-vector type of a matrix.
    pub fn row_ty(&mut self, id: TyId) -> Option<TyId> {
        match self.kind(id) {
            IrType::Matrix { elem, cols, .. } => {
                let kind = IrType::Vector {
                    elem: *elem,
                    count: *cols,
                };
                Some(self.intern(kind))
            }
            _ => None,
        }
    }
}

// --- Global values ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ValueId(pub u32);

impl ValueId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// A generic argument or witness-table entry: either a value or a type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrArg {
    Value(ValueId),
    Type(TyId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenericParamKind {
    Type,
    Witness { interface: ValueId },
    Value { ty: TyId },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decoration {
    NameHint(String),
    Export,
    Import,
    EntryPoint { stage: Stage, name: String },
    Differentiable,
    Intrinsic(String),
    /// Marks a struct type with its synthesized differential-zero function.
    ZeroMethod(ValueId),
}

#[derive(Debug)]
pub enum IrGlobalKind {
    StructType {
        fields: Vec<TyId>,
    },
    /// Fixed-size requirement-key operand list, one per logical requirement.
    InterfaceType {
        requirements: Vec<ValueId>,
    },
    /// Stable lookup key shared by an interface requirement and every
    /// concrete member satisfying it.
    RequirementKey,
    WitnessTable {
        interface: ValueId,
        entries: Vec<(ValueId, IrArg)>,
    },
    /// Tuple of witnesses for a conjunction conformance.
    WitnessTuple {
        elems: Vec<IrArg>,
    },
    /// Element projection out of a witness tuple.
    TupleExtract {
        base: ValueId,
        index: usize,
    },
    Func(IrFunc),
    Generic(IrGeneric),
    GenericParam {
        index: u32,
        kind: GenericParamKind,
    },
    GlobalVar {
        init: Option<Const>,
    },
    /// A compile-time constant used as a generic argument.
    ConstInt {
        value: i64,
    },
    /// Application of a generic to concrete arguments.
    Specialize {
        base: ValueId,
        args: Vec<IrArg>,
    },
    /// Module-scope witness-method lookup (through a witness value rather
    /// than inside a function body).
    LookupMethod {
        table: IrArg,
        key: ValueId,
    },
    /// Debug-info record for one source file; emitted at most once per file.
    DebugSource {
        file: SourceFileId,
    },
    Undef,
}

#[derive(Debug)]
pub struct IrGlobalValue {
    pub ty: TyId,
    pub kind: IrGlobalKind,
    pub decorations: Vec<Decoration>,
    pub loc: Option<SourceLoc>,
}

#[derive(Debug)]
pub struct IrFunc {
    pub param_tys: Vec<TyId>,
    pub ret_ty: TyId,
    pub body: Option<IrBody>,
}

#[derive(Debug)]
pub struct IrGeneric {
    pub params: Vec<ValueId>,
    pub inner: Option<IrArg>,
}

// --- Function bodies ---

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct BlockId(pub u32);

impl BlockId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct InstId(pub u32);

impl InstId {
    #[inline]
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct StrId(pub u32);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Const {
    Int(i64),
    /// Bit pattern of an `f64`; stored as bits so constants hash and compare
    /// structurally.
    Float(u64),
    Bool(bool),
    Str(StrId),
    Unit,
}

impl Const {
    pub fn float(value: f64) -> Const {
        Const::Float(value.to_bits())
    }

    pub fn as_f64(self) -> Option<f64> {
        match self {
            Const::Float(bits) => Some(f64::from_bits(bits)),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operand {
    Inst(InstId),
    Global(ValueId),
    Const(Const),
    Type(TyId),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinOp {
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
pub enum UnOp {
    Neg,
    Not,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IrCastKind {
    Numeric,
    Bit,
}

/// Which side of a differentiated computation an instruction belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiffMark {
    Primal,
    Differential,
    Mixed,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Op {
    /// Function parameter; operand-less, numbered left to right.
    Param { index: u32 },
    /// Stack slot; the result type is a pointer to the slot type.
    Var,
    Load,
    Store,
    AtomicStore,
    FieldExtract { index: usize },
    FieldAddr { index: usize },
    ElemExtract,
    ElemAddr,
    Swizzle { indices: Vec<u32> },
    /// (base vector, new element(s)) -> base vector with lanes replaced.
    SwizzleSet { indices: Vec<u32> },
    /// Masked store of selected lanes through a vector pointer.
    SwizzledStore { indices: Vec<u32> },
    MakeVector,
    MakeMatrix,
    MakeArray,
    MakeStruct,
    Splat,
    /// (concrete value, witness table) -> existential.
    MakeExistential,
    ExtractExistentialValue,
    ExtractExistentialWitness,
    /// (witness, requirement key) -> satisfying value.
    LookupMethod,
    Call,
    BinOp(BinOp),
    UnOp(UnOp),
    Cast(IrCastKind),
    Select,
    MakePair,
    PairPrimal,
    PairDiff,
    /// Line marker tied to a debug-source global.
    DebugLine { line: u32, col: u32 },
    /// Fragment-stage pixel kill; the block it ends in is unreachable after.
    Discard,
    Undef,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IrInst {
    pub op: Op,
    pub ty: TyId,
    pub operands: Vec<Operand>,
    pub loc: Option<SourceLoc>,
    pub mark: Option<DiffMark>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Terminator {
    Jump(BlockId),
    Branch {
        cond: Operand,
        then_bb: BlockId,
        else_bb: BlockId,
    },
    Switch {
        scrutinee: Operand,
        cases: Vec<(i64, BlockId)>,
        default_bb: BlockId,
    },
    Return(Option<Operand>),
    Unreachable,
    Unterminated,
}

#[derive(Debug, Clone, Default)]
pub struct IrBlock {
    pub insts: Vec<InstId>,
    pub term: Terminator,
}

impl Default for Terminator {
    fn default() -> Self {
        Terminator::Unterminated
    }
}

#[derive(Debug, Clone)]
pub struct IrBody {
    pub insts: Vec<IrInst>,
    pub blocks: Vec<IrBlock>,
    pub entry: BlockId,
}

impl IrBody {
    pub fn new() -> Self {
        Self {
            insts: Vec::new(),
            blocks: vec![IrBlock::default()],
            entry: BlockId(0),
        }
    }

    pub fn inst(&self, id: InstId) -> &IrInst {
        &self.insts[id.index()]
    }

    pub fn block(&self, id: BlockId) -> &IrBlock {
        &self.blocks[id.index()]
    }
}

impl Default for IrBody {
    fn default() -> Self {
        Self::new()
    }
}

// --- Module ---

#[derive(Debug, Default)]
pub struct IrModule {
    pub types: IrTypeTable,
    pub values: Vec<IrGlobalValue>,
    strings: Vec<String>,
}

impl IrModule {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push_value(&mut self, ty: TyId, kind: IrGlobalKind, loc: Option<SourceLoc>) -> ValueId {
        let id = ValueId(self.values.len() as u32);
        self.values.push(IrGlobalValue {
            ty,
            kind,
            decorations: Vec::new(),
            loc,
        });
        id
    }

    pub fn value(&self, id: ValueId) -> &IrGlobalValue {
        &self.values[id.index()]
    }

    pub fn value_mut(&mut self, id: ValueId) -> &mut IrGlobalValue {
        &mut self.values[id.index()]
    }

    pub fn decorate(&mut self, id: ValueId, deco: Decoration) {
        self.value_mut(id).decorations.push(deco);
    }

    pub fn find_decoration<'a, T>(
        &'a self,
        id: ValueId,
        pick: impl Fn(&'a Decoration) -> Option<T>,
    ) -> Option<T> {
        self.value(id).decorations.iter().find_map(pick)
    }

    pub fn func(&self, id: ValueId) -> &IrFunc {
        match &self.value(id).kind {
            IrGlobalKind::Func(f) => f,
            other => panic!("value {:?} is not a function: {:?}", id, other),
        }
    }

    pub fn func_mut(&mut self, id: ValueId) -> &mut IrFunc {
        match &mut self.values[id.index()].kind {
            IrGlobalKind::Func(f) => f,
            _ => panic!("value {:?} is not a function", id),
        }
    }

    pub fn body(&self, func: ValueId) -> &IrBody {
        self.func(func)
            .body
            .as_ref()
            .expect("function has no body")
    }

    pub fn body_mut(&mut self, func: ValueId) -> &mut IrBody {
        self.func_mut(func)
            .body
            .as_mut()
            .expect("function has no body")
    }

    pub fn intern_string(&mut self, text: &str) -> StrId {
        if let Some(pos) = self.strings.iter().position(|s| s == text) {
            return StrId(pos as u32);
        }
        let id = StrId(self.strings.len() as u32);
        self.strings.push(text.to_string());
        id
    }

    pub fn string(&self, id: StrId) -> &str {
        &self.strings[id.0 as usize]
    }

    pub fn type_to_string(&self, id: TyId) -> String {
        let mut out = String::new();
        let _ = self.write_ty(id, &mut out);
        out
    }

    fn write_ty(&self, id: TyId, out: &mut String) -> fmt::Result {
        match self.types.kind(id) {
            IrType::Void => write!(out, "void"),
            IrType::Bool => write!(out, "bool"),
            IrType::Int { signed, bits } => {
                write!(out, "{}{}", if *signed { "i" } else { "u" }, bits)
            }
            IrType::Float { bits } => write!(out, "f{}", bits),
            IrType::Vector { elem, count } => {
                self.write_ty(*elem, out)?;
                write!(out, "x{}", count)
            }
            IrType::Matrix { elem, rows, cols } => {
                self.write_ty(*elem, out)?;
                write!(out, "x{}x{}", rows, cols)
            }
            IrType::Array { elem, count } => {
                self.write_ty(*elem, out)?;
                match count {
                    ArrayLen::Const(n) => write!(out, "[{}]", n),
                    ArrayLen::Value(v) => write!(out, "[%{}]", v.0),
                }
            }
            IrType::Struct { value } => write!(out, "struct.%{}", value.0),
            IrType::Interface { value } => write!(out, "exist.%{}", value.0),
            IrType::Param { value } => write!(out, "param.%{}", value.0),
            IrType::WitnessTable { interface } => write!(out, "witness.%{}", interface.0),
            IrType::Ptr { pointee } => {
                write!(out, "ptr<")?;
                self.write_ty(*pointee, out)?;
                write!(out, ">")
            }
            IrType::Atomic { inner } => {
                write!(out, "atomic<")?;
                self.write_ty(*inner, out)?;
                write!(out, ">")
            }
            IrType::Func { params, ret } => {
                write!(out, "fn(")?;
                for (i, p) in params.iter().enumerate() {
                    if i > 0 {
                        write!(out, ", ")?;
                    }
                    self.write_ty(*p, out)?;
                }
                write!(out, ") -> ")?;
                self.write_ty(*ret, out)
            }
            IrType::Pair { primal, diff } => {
                write!(out, "pair<")?;
                self.write_ty(*primal, out)?;
                write!(out, ", ")?;
                self.write_ty(*diff, out)?;
                write!(out, ">")
            }
            IrType::Dependent { generic } => write!(out, "dep.%{}", generic.0),
            IrType::Error => write!(out, "error"),
        }
    }
}

// --- Dump ---

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(v) => write!(f, "{}", v),
            Const::Float(bits) => write!(f, "{}", f64::from_bits(*bits)),
            Const::Bool(v) => write!(f, "{}", v),
            Const::Str(id) => write!(f, "str#{}", id.0),
            Const::Unit => write!(f, "()"),
        }
    }
}

impl fmt::Display for Operand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Operand::Inst(id) => write!(f, "i{}", id.0),
            Operand::Global(id) => write!(f, "%{}", id.0),
            Operand::Const(c) => write!(f, "{}", c),
            Operand::Type(t) => write!(f, "t{}", t.0),
        }
    }
}

impl fmt::Display for BinOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let text = match self {
            BinOp::Add => "add",
            BinOp::Sub => "sub",
            BinOp::Mul => "mul",
            BinOp::Div => "div",
            BinOp::Eq => "eq",
            BinOp::Ne => "ne",
            BinOp::Lt => "lt",
            BinOp::Gt => "gt",
            BinOp::LtEq => "le",
            BinOp::GtEq => "ge",
        };
        write!(f, "{}", text)
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Op::Param { index } => write!(f, "param #{}", index),
            Op::Var => write!(f, "var"),
            Op::Load => write!(f, "load"),
            Op::Store => write!(f, "store"),
            Op::AtomicStore => write!(f, "atomic.store"),
            Op::FieldExtract { index } => write!(f, "field.extract .{}", index),
            Op::FieldAddr { index } => write!(f, "field.addr .{}", index),
            Op::ElemExtract => write!(f, "elem.extract"),
            Op::ElemAddr => write!(f, "elem.addr"),
            Op::Swizzle { indices } => write!(f, "swizzle {:?}", indices),
            Op::SwizzleSet { indices } => write!(f, "swizzle.set {:?}", indices),
            Op::SwizzledStore { indices } => write!(f, "swizzle.store {:?}", indices),
            Op::MakeVector => write!(f, "make.vector"),
            Op::MakeMatrix => write!(f, "make.matrix"),
            Op::MakeArray => write!(f, "make.array"),
            Op::MakeStruct => write!(f, "make.struct"),
            Op::Splat => write!(f, "splat"),
            Op::MakeExistential => write!(f, "make.existential"),
            Op::ExtractExistentialValue => write!(f, "extract.existential.value"),
            Op::ExtractExistentialWitness => write!(f, "extract.existential.witness"),
            Op::LookupMethod => write!(f, "lookup.method"),
            Op::Call => write!(f, "call"),
            Op::BinOp(op) => write!(f, "{}", op),
            Op::UnOp(UnOp::Neg) => write!(f, "neg"),
            Op::UnOp(UnOp::Not) => write!(f, "not"),
            Op::Cast(IrCastKind::Numeric) => write!(f, "cast.num"),
            Op::Cast(IrCastKind::Bit) => write!(f, "cast.bit"),
            Op::Select => write!(f, "select"),
            Op::MakePair => write!(f, "make.pair"),
            Op::PairPrimal => write!(f, "pair.primal"),
            Op::PairDiff => write!(f, "pair.diff"),
            Op::DebugLine { line, col } => write!(f, "debug.line {}:{}", line, col),
            Op::Discard => write!(f, "discard"),
            Op::Undef => write!(f, "undef"),
        }
    }
}

impl fmt::Display for Terminator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Terminator::Jump(bb) => write!(f, "jump bb{}", bb.0),
            Terminator::Branch {
                cond,
                then_bb,
                else_bb,
            } => write!(f, "branch {} bb{} bb{}", cond, then_bb.0, else_bb.0),
            Terminator::Switch {
                scrutinee,
                cases,
                default_bb,
            } => {
                write!(f, "switch {} [", scrutinee)?;
                for (i, (value, bb)) in cases.iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{} -> bb{}", value, bb.0)?;
                }
                write!(f, "] default bb{}", default_bb.0)
            }
            Terminator::Return(Some(op)) => write!(f, "return {}", op),
            Terminator::Return(None) => write!(f, "return"),
            Terminator::Unreachable => write!(f, "unreachable"),
            Terminator::Unterminated => write!(f, "unterminated"),
        }
    }
}

impl IrModule {
    fn write_body(&self, body: &IrBody, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (bi, block) in body.blocks.iter().enumerate() {
            writeln!(f, "  bb{}:", bi)?;
            for inst_id in &block.insts {
                let inst = body.inst(*inst_id);
                write!(f, "    i{} = {}", inst_id.0, inst.op)?;
                for operand in &inst.operands {
                    write!(f, " {}", operand)?;
                }
                writeln!(f, " : {}", self.type_to_string(inst.ty))?;
            }
            writeln!(f, "    {}", block.term)?;
        }
        Ok(())
    }
}

impl fmt::Display for IrModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {{")?;
        for (vi, value) in self.values.iter().enumerate() {
            let name = value.decorations.iter().find_map(|d| match d {
                Decoration::NameHint(n) => Some(n.as_str()),
                _ => None,
            });
            write!(f, "%{} = ", vi)?;
            match &value.kind {
                IrGlobalKind::StructType { fields } => {
                    write!(f, "struct.type {{")?;
                    for (i, field) in fields.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        write!(f, " {}", self.type_to_string(*field))?;
                    }
                    write!(f, " }}")?;
                }
                IrGlobalKind::InterfaceType { requirements } => {
                    write!(f, "interface.type [")?;
                    for (i, req) in requirements.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "%{}", req.0)?;
                    }
                    write!(f, "]")?;
                }
                IrGlobalKind::RequirementKey => write!(f, "requirement.key")?,
                IrGlobalKind::WitnessTable { interface, entries } => {
                    write!(f, "witness.table %{} {{", interface.0)?;
                    for (i, (key, arg)) in entries.iter().enumerate() {
                        if i > 0 {
                            write!(f, ",")?;
                        }
                        match arg {
                            IrArg::Value(v) => write!(f, " %{} => %{}", key.0, v.0)?,
                            IrArg::Type(t) => {
                                write!(f, " %{} => {}", key.0, self.type_to_string(*t))?
                            }
                        }
                    }
                    write!(f, " }}")?;
                }
                IrGlobalKind::WitnessTuple { elems } => {
                    write!(f, "witness.tuple [")?;
                    for (i, elem) in elems.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        match elem {
                            IrArg::Value(v) => write!(f, "%{}", v.0)?,
                            IrArg::Type(t) => write!(f, "{}", self.type_to_string(*t))?,
                        }
                    }
                    write!(f, "]")?;
                }
                IrGlobalKind::TupleExtract { base, index } => {
                    write!(f, "tuple.extract %{} .{}", base.0, index)?;
                }
                IrGlobalKind::Func(func) => {
                    write!(f, "func(")?;
                    for (i, p) in func.param_tys.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "{}", self.type_to_string(*p))?;
                    }
                    write!(f, ") -> {}", self.type_to_string(func.ret_ty))?;
                }
                IrGlobalKind::Generic(generic) => {
                    write!(f, "generic [")?;
                    for (i, p) in generic.params.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        write!(f, "%{}", p.0)?;
                    }
                    write!(f, "]")?;
                    match generic.inner {
                        Some(IrArg::Value(v)) => write!(f, " = %{}", v.0)?,
                        Some(IrArg::Type(t)) => write!(f, " = {}", self.type_to_string(t))?,
                        None => write!(f, " = <unsealed>")?,
                    }
                }
                IrGlobalKind::GenericParam { index, .. } => {
                    write!(f, "generic.param #{}", index)?;
                }
                IrGlobalKind::GlobalVar { init } => {
                    write!(f, "global.var")?;
                    if let Some(init) = init {
                        write!(f, " = {}", init)?;
                    }
                }
                IrGlobalKind::ConstInt { value } => write!(f, "const.int {}", value)?,
                IrGlobalKind::Specialize { base, args } => {
                    write!(f, "specialize %{} [", base.0)?;
                    for (i, arg) in args.iter().enumerate() {
                        if i > 0 {
                            write!(f, ", ")?;
                        }
                        match arg {
                            IrArg::Value(v) => write!(f, "%{}", v.0)?,
                            IrArg::Type(t) => write!(f, "{}", self.type_to_string(*t))?,
                        }
                    }
                    write!(f, "]")?;
                }
                IrGlobalKind::LookupMethod { table, key } => {
                    match table {
                        IrArg::Value(v) => write!(f, "lookup.method %{}", v.0)?,
                        IrArg::Type(t) => write!(f, "lookup.method {}", self.type_to_string(*t))?,
                    }
                    write!(f, " %{}", key.0)?;
                }
                IrGlobalKind::DebugSource { file } => write!(f, "debug.source file#{}", file.0)?,
                IrGlobalKind::Undef => write!(f, "undef")?,
            }
            if let Some(name) = name {
                write!(f, " @name(\"{}\")", name)?;
            }
            for deco in &value.decorations {
                match deco {
                    Decoration::Export => write!(f, " @export")?,
                    Decoration::Import => write!(f, " @import")?,
                    Decoration::EntryPoint { stage, name } => {
                        write!(f, " @entry({}, \"{}\")", stage, name)?
                    }
                    Decoration::Differentiable => write!(f, " @differentiable")?,
                    Decoration::Intrinsic(op) => write!(f, " @intrinsic(\"{}\")", op)?,
                    Decoration::ZeroMethod(fid) => write!(f, " @zero(%{})", fid.0)?,
                    Decoration::NameHint(_) => {}
                }
            }
            writeln!(f)?;
            if let IrGlobalKind::Func(func) = &value.kind {
                if let Some(body) = &func.body {
                    writeln!(f, "{{")?;
                    self.write_body(body, f)?;
                    writeln!(f, "}}")?;
                }
            }
        }
        write!(f, "}}")
    }
}
