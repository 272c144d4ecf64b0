//! Lowering context: one `Lowerer` per translation unit.
//!
//! All shared per-unit state (memoization maps, the record arena, the string
//! interner, the IR module under construction) lives directly on the
//! `Lowerer`. Per-scope state (builder cursor, environment depth, `this`,
//! return destination, catch handlers) is saved and restored explicitly
//! around any nested sub-lowering; there is no ambient global state.

use indexmap::IndexMap;

use crate::ast::{self, DeclId, NodeId, SourceFileId, Stmt};
use crate::diag::DiagnosticSink;
use crate::ir::builder::IrBuilder;
use crate::ir::{
    BlockId, InstId, IrArg, IrGlobalKind, IrModule, IrType, Op, Operand, Terminator, TyId, ValueId,
};
use crate::lower::errors::{LowerError, LowerErrorKind};
use crate::lower::value::{ExtArena, LoweredVal};

#[derive(Debug, Clone, Copy, Default)]
pub struct LowerOptions {
    pub emit_debug_info: bool,
}

/// Innermost-last stack entry for an active `catch` handler.
#[derive(Debug, Clone, Copy)]
pub(super) struct CatchHandler {
    pub block: BlockId,
    /// Pointer the thrown error value is stored through before branching.
    pub err_var: Operand,
}

/// The implicit error-out slots of a throwing function: where the thrown
/// value goes, and the flag the caller checks after the call returns.
#[derive(Debug, Clone, Copy)]
pub(super) struct ErrorOut {
    pub err_ptr: Operand,
    pub threw_ptr: Operand,
}

/// One lexical scope that may carry deferred statements. Scopes opened by a
/// breakable statement are tagged with that statement's identity so break
/// and continue know how far to unwind.
#[derive(Debug)]
pub(super) struct DeferScope<'a> {
    pub breakable: Option<NodeId>,
    pub defers: Vec<&'a Stmt>,
}

/// Per-scope lowering state captured before a nested sub-lowering and
/// restored afterwards.
pub(super) struct SavedScope {
    builder: Option<IrBuilder>,
    env_depth: usize,
    defer_depth: usize,
    catch_depth: usize,
    this_val: LoweredVal,
    return_dest: Option<Operand>,
    dest_hint: Option<Operand>,
    error_out: Option<ErrorOut>,
    lvalue_ctx: bool,
}

pub struct Lowerer<'a> {
    pub(super) module: &'a ast::Module,
    pub(super) sink: DiagnosticSink,
    pub(super) ir: IrModule,
    pub(super) opts: LowerOptions,

    // Per-translation-unit memoization. All keyed maps are insertion-ordered
    // so IR dumps are reproducible.
    pub(super) globals: IndexMap<DeclId, LoweredVal>,
    pub(super) requirement_keys: IndexMap<DeclId, ValueId>,
    pub(super) constraint_keys: IndexMap<(DeclId, usize), ValueId>,
    pub(super) const_ints: IndexMap<i64, ValueId>,
    pub(super) specialize_cache: IndexMap<(ValueId, Vec<IrArg>), ValueId>,
    pub(super) lookup_cache: IndexMap<(IrArg, ValueId), ValueId>,
    pub(super) tuple_cache: IndexMap<Vec<IrArg>, ValueId>,
    pub(super) tuple_extract_cache: IndexMap<(ValueId, usize), ValueId>,
    pub(super) witness_tables: IndexMap<DeclId, ValueId>,
    pub(super) debug_sources: IndexMap<SourceFileId, ValueId>,
    pub(super) break_labels: IndexMap<NodeId, BlockId>,
    pub(super) continue_labels: IndexMap<NodeId, BlockId>,

    pub(super) ext: ExtArena,

    // Per-scope state.
    pub(super) builder: Option<IrBuilder>,
    pub(super) scopes: Vec<IndexMap<DeclId, LoweredVal>>,
    pub(super) this_val: LoweredVal,
    pub(super) return_dest: Option<Operand>,
    /// A destination slot staged by the enclosing statement for a call whose
    /// result travels through the implicit trailing parameter. Consumed by
    /// the next call lowered; the stager stores through it itself otherwise.
    pub(super) dest_hint: Option<Operand>,
    pub(super) error_out: Option<ErrorOut>,
    pub(super) catch_handlers: Vec<CatchHandler>,
    pub(super) defer_scopes: Vec<DeferScope<'a>>,
    pub(super) lvalue_ctx: bool,
}

impl<'a> Lowerer<'a> {
    pub fn new(module: &'a ast::Module, opts: LowerOptions) -> Self {
        Self {
            module,
            sink: DiagnosticSink::new(),
            ir: IrModule::new(),
            opts,
            globals: IndexMap::new(),
            requirement_keys: IndexMap::new(),
            constraint_keys: IndexMap::new(),
            const_ints: IndexMap::new(),
            specialize_cache: IndexMap::new(),
            lookup_cache: IndexMap::new(),
            tuple_cache: IndexMap::new(),
            tuple_extract_cache: IndexMap::new(),
            witness_tables: IndexMap::new(),
            debug_sources: IndexMap::new(),
            break_labels: IndexMap::new(),
            continue_labels: IndexMap::new(),
            ext: ExtArena::default(),
            builder: None,
            scopes: Vec::new(),
            this_val: LoweredVal::None,
            return_dest: None,
            dest_hint: None,
            error_out: None,
            catch_handlers: Vec::new(),
            defer_scopes: Vec::new(),
            lvalue_ctx: false,
        }
    }

    pub(super) fn into_parts(self) -> (DiagnosticSink, IrModule) {
        (self.sink, self.ir)
    }

    // --- Environment chain ---

    pub(super) fn push_env(&mut self) {
        self.scopes.push(IndexMap::new());
    }

    pub(super) fn pop_env(&mut self) {
        self.scopes.pop();
    }

    pub(super) fn bind(&mut self, decl: DeclId, val: LoweredVal) {
        match self.scopes.last_mut() {
            Some(scope) => {
                scope.insert(decl, val);
            }
            None => {
                self.globals.insert(decl, val);
            }
        }
    }

    /// Walk the environment chain innermost-outward, then the global map.
    pub(super) fn lookup(&self, decl: DeclId) -> Option<LoweredVal> {
        for scope in self.scopes.iter().rev() {
            if let Some(val) = scope.get(&decl) {
                return Some(*val);
            }
        }
        self.globals.get(&decl).copied()
    }

    // --- Scope save/restore ---

    pub(super) fn save_scope(&mut self) -> SavedScope {
        SavedScope {
            builder: self.builder,
            env_depth: self.scopes.len(),
            defer_depth: self.defer_scopes.len(),
            catch_depth: self.catch_handlers.len(),
            this_val: self.this_val,
            return_dest: self.return_dest,
            dest_hint: self.dest_hint,
            error_out: self.error_out,
            lvalue_ctx: self.lvalue_ctx,
        }
    }

    pub(super) fn restore_scope(&mut self, saved: SavedScope) {
        self.builder = saved.builder;
        self.scopes.truncate(saved.env_depth);
        self.defer_scopes.truncate(saved.defer_depth);
        self.catch_handlers.truncate(saved.catch_depth);
        self.this_val = saved.this_val;
        self.return_dest = saved.return_dest;
        self.dest_hint = saved.dest_hint;
        self.error_out = saved.error_out;
        self.lvalue_ctx = saved.lvalue_ctx;
    }

    // --- Builder plumbing ---

    pub(super) fn cursor(&self) -> Result<IrBuilder, LowerError> {
        self.builder
            .ok_or_else(|| LowerError::new(LowerErrorKind::InconsistentMapping))
    }

    pub(super) fn emit(
        &mut self,
        op: Op,
        ty: TyId,
        operands: Vec<Operand>,
    ) -> Result<InstId, LowerError> {
        let mut b = self.cursor()?;
        let id = b.emit(&mut self.ir, op, ty, operands);
        self.builder = Some(b);
        Ok(id)
    }

    pub(super) fn new_block(&mut self) -> Result<BlockId, LowerError> {
        let mut b = self.cursor()?;
        let id = b.new_block(&mut self.ir);
        self.builder = Some(b);
        Ok(id)
    }

    pub(super) fn select_block(&mut self, block: BlockId) -> Result<(), LowerError> {
        let mut b = self.cursor()?;
        b.select_block(block);
        self.builder = Some(b);
        Ok(())
    }

    pub(super) fn terminate(&mut self, term: Terminator) -> Result<(), LowerError> {
        let mut b = self.cursor()?;
        b.terminate(&mut self.ir, term);
        self.builder = Some(b);
        Ok(())
    }

    pub(super) fn block_terminated(&self) -> bool {
        match self.builder {
            Some(b) => b.is_terminated(&self.ir),
            None => false,
        }
    }

    pub(super) fn emit_load(&mut self, ptr: Operand) -> Result<InstId, LowerError> {
        let mut b = self.cursor()?;
        let id = b.emit_load(&mut self.ir, ptr);
        self.builder = Some(b);
        Ok(id)
    }

    pub(super) fn emit_store(&mut self, ptr: Operand, value: Operand) -> Result<(), LowerError> {
        let mut b = self.cursor()?;
        b.emit_store(&mut self.ir, ptr, value);
        self.builder = Some(b);
        Ok(())
    }

    pub(super) fn emit_var(&mut self, slot_ty: TyId) -> Result<Operand, LowerError> {
        let mut b = self.cursor()?;
        let id = b.emit_var(&mut self.ir, slot_ty);
        self.builder = Some(b);
        Ok(Operand::Inst(id))
    }

    pub(super) fn operand_ty(&mut self, operand: Operand) -> Result<TyId, LowerError> {
        let b = self.cursor()?;
        Ok(b.operand_ty(&mut self.ir, operand))
    }

    /// Debug-source record for a file, emitted at most once per distinct file.
    pub(super) fn ensure_debug_source(&mut self, file: SourceFileId) -> ValueId {
        if let Some(v) = self.debug_sources.get(&file) {
            return *v;
        }
        let void = self.ir.types.intern(IrType::Void);
        let v = self
            .ir
            .push_value(void, IrGlobalKind::DebugSource { file }, None);
        self.debug_sources.insert(file, v);
        v
    }

    /// Stamp the builder with a statement/expression location and, when debug
    /// info is requested, emit a line marker.
    pub(super) fn set_debug_loc(&mut self, loc: crate::diag::SourceLoc) -> Result<(), LowerError> {
        let mut b = self.cursor()?;
        let changed = b.debug_loc != Some(loc);
        b.debug_loc = Some(loc);
        self.builder = Some(b);
        if self.opts.emit_debug_info && changed {
            let source = self.ensure_debug_source(loc.file);
            let void = self.ir.types.intern(IrType::Void);
            self.emit(
                Op::DebugLine {
                    line: loc.span.start.line as u32,
                    col: loc.span.start.column as u32,
                },
                void,
                vec![Operand::Global(source)],
            )?;
        }
        Ok(())
    }
}
