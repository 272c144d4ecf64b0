//! Lowering from the checked AST to the IR.
//!
//! The pass walks the module's public declarations, entry points, and
//! conformances; everything else is lowered on demand when referenced.
//! Lowering is single-pass and append-only: it never revisits or rewrites
//! IR it has already produced.

mod assign;
mod context;
mod errors;
mod lower_call;
mod lower_decl;
mod lower_expr;
mod lower_stmt;
mod lower_ty;
mod materialize;
mod value;

pub use context::{LowerOptions, Lowerer};
pub use errors::{LowerError, LowerErrorKind};
pub use value::LoweredVal;

use crate::ast::{DeclKind, Module};
use crate::diag::Diagnostic;
use crate::ir::IrModule;

/// The result of lowering one translation unit.
pub struct LoweredUnit {
    pub ir: IrModule,
    pub diagnostics: Vec<Diagnostic>,
    pub error_count: usize,
}

/// Lower a checked module. Fatal inconsistencies abort with `LowerError`;
/// recoverable findings end up in `diagnostics`.
pub fn lower_module(module: &Module, opts: LowerOptions) -> Result<LoweredUnit, LowerError> {
    let mut lowerer = Lowerer::new(module, opts);
    for decl_id in &module.top_level {
        let decl = module.decl(*decl_id);
        // Visibility of a generic lives on the declaration it wraps.
        let effective = match &decl.kind {
            DeclKind::Generic(g) => module.decl(g.inner),
            _ => decl,
        };
        let is_entry = effective.modifiers.entry_point.is_some();
        let wanted = effective.modifiers.is_public
            || is_entry
            || matches!(effective.kind, DeclKind::Conformance(_));
        if !wanted {
            continue;
        }
        lowerer.ensure_decl(*decl_id)?;
        if is_entry {
            lowerer.check_entry_point(*decl_id);
        }
    }
    Ok(lowerer.finish())
}

impl<'a> Lowerer<'a> {
    /// Consume the lowerer, yielding the built module and diagnostics.
    pub fn finish(self) -> LoweredUnit {
        let (sink, ir) = self.into_parts();
        LoweredUnit {
            error_count: sink.error_count(),
            diagnostics: sink.diagnostics().to_vec(),
            ir,
        }
    }
}
