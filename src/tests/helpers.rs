//! Shared test fixtures: programmatic construction of checked-AST modules
//! and small queries over the lowered IR.

use crate::ast::{
    AccessorDecl, AccessorKind, ConformanceDecl, Decl, DeclId, DeclKind, DeclRef, Expr, ExprKind,
    FieldDecl, FuncDecl, GenericDecl, InterfaceDecl, Modifiers, Module, NodeId, ParamDecl,
    ParamDir, Satisfaction, SourceFileId, Stage, Stmt, StmtKind, StorageDecl, StructDecl, Type,
    VarDecl,
};
use crate::diag::{SourceLoc, Span};
use crate::ir::{Decoration, InstId, IrBody, IrInst, IrModule, Op, ValueId};
use crate::lower::{lower_module, LowerOptions, LoweredUnit};

pub(crate) fn loc() -> SourceLoc {
    SourceLoc::new(SourceFileId(0), Span::default())
}

/// Builds a `Module` the way the checker would hand one to lowering: a flat
/// decl arena, resolved references, and a type on every expression.
pub(crate) struct ModuleBuilder {
    pub module: Module,
    next_node: u32,
}

impl ModuleBuilder {
    pub fn new() -> Self {
        Self {
            module: Module::default(),
            next_node: 0,
        }
    }

    /// A fresh node id; exposed so tests can pre-allocate break targets.
    pub fn node(&mut self) -> NodeId {
        let id = NodeId(self.next_node);
        self.next_node += 1;
        id
    }

    // --- Declarations ---

    pub fn decl(
        &mut self,
        parent: Option<DeclId>,
        name: &str,
        modifiers: Modifiers,
        kind: DeclKind,
    ) -> DeclId {
        let id = DeclId(self.module.decls.len() as u32);
        self.module.decls.push(Decl {
            id,
            parent,
            name: name.to_string(),
            loc: loc(),
            modifiers,
            kind,
        });
        id
    }

    pub fn func(
        &mut self,
        name: &str,
        params: Vec<DeclId>,
        ret_ty: Type,
        body: Option<Stmt>,
    ) -> DeclId {
        self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Func(FuncDecl {
                params,
                ret_ty,
                error_ty: None,
                body,
            }),
        )
    }

    pub fn throwing_func(
        &mut self,
        name: &str,
        params: Vec<DeclId>,
        ret_ty: Type,
        error_ty: Type,
        body: Option<Stmt>,
    ) -> DeclId {
        self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Func(FuncDecl {
                params,
                ret_ty,
                error_ty: Some(error_ty),
                body,
            }),
        )
    }

    /// A member function of a struct.
    pub fn method(
        &mut self,
        owner: DeclId,
        name: &str,
        is_mutating: bool,
        params: Vec<DeclId>,
        ret_ty: Type,
        body: Option<Stmt>,
    ) -> DeclId {
        let id = self.decl(
            Some(owner),
            name,
            Modifiers {
                is_mutating,
                ..Modifiers::default()
            },
            DeclKind::Func(FuncDecl {
                params,
                ret_ty,
                error_ty: None,
                body,
            }),
        );
        if let DeclKind::Struct(s) = &mut self.module.decls[owner.index()].kind {
            s.members.push(id);
        }
        id
    }

    /// Mark a declaration public and make it a lowering root.
    pub fn export(&mut self, decl: DeclId) {
        self.module.decls[decl.index()].modifiers.is_public = true;
        self.module.top_level.push(decl);
    }

    pub fn entry(&mut self, decl: DeclId, stage: Stage) {
        self.module.decls[decl.index()].modifiers.entry_point = Some(stage);
        self.module.top_level.push(decl);
    }

    pub fn param(&mut self, name: &str, ty: Type, dir: ParamDir) -> DeclId {
        self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Param(ParamDecl {
                ty,
                dir,
                default: None,
            }),
        )
    }

    pub fn param_with_default(
        &mut self,
        name: &str,
        ty: Type,
        dir: ParamDir,
        default: Expr,
    ) -> DeclId {
        self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Param(ParamDecl {
                ty,
                dir,
                default: Some(default),
            }),
        )
    }

    /// A local variable declaration plus the statement introducing it.
    pub fn local(&mut self, name: &str, ty: Type, init: Option<Expr>) -> (DeclId, Stmt) {
        let id = self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Var(VarDecl { ty, init }),
        );
        let stmt = self.stmt(StmtKind::Local(id));
        (id, stmt)
    }

    pub fn global_var(&mut self, name: &str, ty: Type, init: Option<Expr>) -> DeclId {
        self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Var(VarDecl { ty, init }),
        )
    }

    pub fn struct_decl(&mut self, name: &str, is_non_copyable: bool) -> DeclId {
        self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Struct(StructDecl {
                fields: Vec::new(),
                members: Vec::new(),
                is_non_copyable,
            }),
        )
    }

    pub fn field(&mut self, owner: DeclId, name: &str, ty: Type) -> DeclId {
        let index = match &self.module.decls[owner.index()].kind {
            DeclKind::Struct(s) => s.fields.len(),
            other => panic!("field owner is not a struct: {:?}", other),
        };
        let id = self.decl(
            Some(owner),
            name,
            Modifiers::default(),
            DeclKind::Field(FieldDecl { ty, index }),
        );
        if let DeclKind::Struct(s) = &mut self.module.decls[owner.index()].kind {
            s.fields.push(id);
        }
        id
    }

    /// A property member with the given accessor kinds; accessor bodies are
    /// left empty (declaration-only, like imported accessors).
    pub fn property(
        &mut self,
        owner: DeclId,
        name: &str,
        ty: Type,
        accessors: &[AccessorKind],
    ) -> DeclId {
        let storage = self.decl(
            Some(owner),
            name,
            Modifiers::default(),
            DeclKind::Property(StorageDecl {
                index_params: Vec::new(),
                ty,
                accessors: Vec::new(),
            }),
        );
        let mut acc_ids = Vec::with_capacity(accessors.len());
        for kind in accessors {
            let suffix = match kind {
                AccessorKind::Get => "get",
                AccessorKind::Set => "set",
                AccessorKind::Ref => "ref",
            };
            acc_ids.push(self.decl(
                Some(storage),
                &format!("{}.{}", name, suffix),
                Modifiers::default(),
                DeclKind::Accessor(AccessorDecl {
                    kind: *kind,
                    body: None,
                }),
            ));
        }
        if let DeclKind::Property(s) = &mut self.module.decls[storage.index()].kind {
            s.accessors = acc_ids;
        }
        if let DeclKind::Struct(st) = &mut self.module.decls[owner.index()].kind {
            st.members.push(storage);
        }
        storage
    }

    /// A subscript member; like `property` but with index parameters.
    pub fn subscript(
        &mut self,
        owner: DeclId,
        name: &str,
        index_params: Vec<DeclId>,
        ty: Type,
        accessors: &[AccessorKind],
    ) -> DeclId {
        let storage = self.decl(
            Some(owner),
            name,
            Modifiers::default(),
            DeclKind::Subscript(StorageDecl {
                index_params,
                ty,
                accessors: Vec::new(),
            }),
        );
        let mut acc_ids = Vec::with_capacity(accessors.len());
        for kind in accessors {
            let suffix = match kind {
                AccessorKind::Get => "get",
                AccessorKind::Set => "set",
                AccessorKind::Ref => "ref",
            };
            acc_ids.push(self.decl(
                Some(storage),
                &format!("{}.{}", name, suffix),
                Modifiers::default(),
                DeclKind::Accessor(AccessorDecl {
                    kind: *kind,
                    body: None,
                }),
            ));
        }
        if let DeclKind::Subscript(s) = &mut self.module.decls[storage.index()].kind {
            s.accessors = acc_ids;
        }
        if let DeclKind::Struct(st) = &mut self.module.decls[owner.index()].kind {
            st.members.push(storage);
        }
        storage
    }

    /// An interface declaration; requirement decls are re-parented under it.
    pub fn interface_decl(&mut self, name: &str, requirements: Vec<DeclId>) -> DeclId {
        let id = self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Interface(InterfaceDecl {
                requirements: requirements.clone(),
                inherited: Vec::new(),
            }),
        );
        for req in requirements {
            self.module.decls[req.index()].parent = Some(id);
        }
        id
    }

    pub fn conformance(
        &mut self,
        name: &str,
        sub_ty: Type,
        interface: DeclId,
        satisfactions: Vec<(DeclId, Satisfaction)>,
    ) -> DeclId {
        let id = self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Conformance(ConformanceDecl {
                sub_ty,
                interface: DeclRef::direct(interface),
                satisfactions,
            }),
        );
        self.module.top_level.push(id);
        id
    }

    pub fn type_param(&mut self, name: &str) -> DeclId {
        self.decl(None, name, Modifiers::default(), DeclKind::GenericTypeParam)
    }

    pub fn value_param(&mut self, name: &str, ty: Type) -> DeclId {
        self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::GenericValueParam { ty },
        )
    }

    /// Wrap `inner` in a generic over `params`; re-parents `inner` and the
    /// parameters under the new generic.
    pub fn generic(&mut self, name: &str, params: Vec<DeclId>, inner: DeclId) -> DeclId {
        let id = self.decl(
            None,
            name,
            Modifiers::default(),
            DeclKind::Generic(GenericDecl {
                params: params.clone(),
                inner,
            }),
        );
        self.module.decls[inner.index()].parent = Some(id);
        for p in params {
            self.module.decls[p.index()].parent = Some(id);
        }
        id
    }

    // --- Expressions ---

    pub fn expr(&mut self, ty: Type, kind: ExprKind) -> Expr {
        Expr {
            id: self.node(),
            ty,
            loc: loc(),
            kind,
        }
    }

    pub fn int(&mut self, value: i64) -> Expr {
        self.expr(Type::int(), ExprKind::IntLit(value))
    }

    pub fn float(&mut self, value: f64) -> Expr {
        self.expr(Type::float(), ExprKind::FloatLit(value))
    }

    pub fn boolean(&mut self, value: bool) -> Expr {
        self.expr(Type::bool(), ExprKind::BoolLit(value))
    }

    pub fn var(&mut self, decl: DeclId, ty: Type) -> Expr {
        self.expr(ty, ExprKind::DeclRef(DeclRef::direct(decl)))
    }

    pub fn member(&mut self, base: Expr, member: DeclRef, ty: Type) -> Expr {
        self.expr(
            ty,
            ExprKind::Member {
                base: Box::new(base),
                member,
            },
        )
    }

    pub fn swizzle(&mut self, base: Expr, indices: &[u32], ty: Type) -> Expr {
        self.expr(
            ty,
            ExprKind::Swizzle {
                base: Box::new(base),
                indices: indices.to_vec(),
            },
        )
    }

    pub fn assign(&mut self, left: Expr, right: Expr) -> Expr {
        let ty = left.ty.clone();
        self.expr(
            ty,
            ExprKind::Assign {
                left: Box::new(left),
                right: Box::new(right),
            },
        )
    }

    /// A call whose callee is a direct declaration reference.
    pub fn call_fn(&mut self, callee: DeclId, args: Vec<Expr>, ty: Type) -> Expr {
        let callee = self.var(callee, Type::Void);
        self.call(callee, args, ty)
    }

    pub fn call(&mut self, callee: Expr, args: Vec<Expr>, ty: Type) -> Expr {
        self.expr(
            ty,
            ExprKind::Call {
                callee: Box::new(callee),
                args,
            },
        )
    }

    // --- Statements ---

    pub fn stmt(&mut self, kind: StmtKind) -> Stmt {
        Stmt {
            id: self.node(),
            loc: loc(),
            kind,
        }
    }

    pub fn block(&mut self, stmts: Vec<Stmt>) -> Stmt {
        self.stmt(StmtKind::Block(stmts))
    }

    pub fn expr_stmt(&mut self, expr: Expr) -> Stmt {
        self.stmt(StmtKind::Expr(expr))
    }

    pub fn ret(&mut self, value: Option<Expr>) -> Stmt {
        self.stmt(StmtKind::Return(value))
    }

    /// Lower the finished module with default options.
    pub fn lower(&self) -> LoweredUnit {
        lower_module(&self.module, LowerOptions::default()).expect("lowering failed")
    }
}

// --- IR queries ---

/// The global value carrying `name` as its name hint.
pub(crate) fn find_global(ir: &IrModule, name: &str) -> Option<ValueId> {
    (0..ir.values.len()).map(|i| ValueId(i as u32)).find(|v| {
        ir.find_decoration(*v, |d| match d {
            Decoration::NameHint(n) if n == name => Some(()),
            _ => None,
        })
        .is_some()
    })
}

pub(crate) fn global(ir: &IrModule, name: &str) -> ValueId {
    find_global(ir, name).unwrap_or_else(|| panic!("no global named {:?}\n{}", name, ir))
}

pub(crate) fn func_body<'m>(ir: &'m IrModule, name: &str) -> &'m IrBody {
    ir.body(global(ir, name))
}

/// All instruction ids in block order, instruction order within each block.
pub(crate) fn insts_in_order(body: &IrBody) -> Vec<InstId> {
    body.blocks
        .iter()
        .flat_map(|b| b.insts.iter().copied())
        .collect()
}

pub(crate) fn ops_in_order(body: &IrBody) -> Vec<&Op> {
    insts_in_order(body)
        .into_iter()
        .map(|id| &body.inst(id).op)
        .collect()
}

pub(crate) fn count_insts(body: &IrBody, pred: impl Fn(&IrInst) -> bool) -> usize {
    insts_in_order(body)
        .into_iter()
        .filter(|id| pred(body.inst(*id)))
        .count()
}

pub(crate) fn find_inst(body: &IrBody, pred: impl Fn(&IrInst) -> bool) -> Option<InstId> {
    insts_in_order(body)
        .into_iter()
        .find(|id| pred(body.inst(*id)))
}
