use thiserror::Error;

use crate::ast::NodeId;
use crate::diag::SourceLoc;

/// Fatal lowering failures. Everything here signals a compiler-internal bug
/// (mismatched invariants in prior passes) or an abort-compilation condition;
/// recoverable findings go to the diagnostic sink instead.
#[derive(Debug, Error)]
pub enum LowerErrorKind {
    #[error("no getter accessor found for storage access")]
    NoGetter,

    #[error("no setter accessor found for storage assignment")]
    NoSetter,

    #[error("inconsistent declaration mapping")]
    InconsistentMapping,

    #[error("unexpected witness shape")]
    UnexpectedWitness,

    #[error("callee is neither a declaration reference nor a function value (node {0:?})")]
    UnresolvedCallee(NodeId),

    #[error("construct should not occur in a checked AST (node {0:?})")]
    UncheckedAst(NodeId),

    #[error("value flavor cannot be used here")]
    InvalidValFlavor,

    #[error("break/continue target was not registered (node {0:?})")]
    MissingLoopTarget(NodeId),
}

/// The abort-compilation sentinel. It is deliberately never re-wrapped with
/// extra context on the way out; statement and declaration boundaries only
/// fill in a last-known source location when none is attached yet.
#[derive(Debug, Error)]
#[error("{kind}")]
pub struct LowerError {
    pub kind: LowerErrorKind,
    pub loc: Option<SourceLoc>,
}

impl LowerError {
    pub fn new(kind: LowerErrorKind) -> Self {
        Self { kind, loc: None }
    }

    /// Attach a location if none is present; keeps the innermost one.
    pub fn or_loc(mut self, loc: SourceLoc) -> Self {
        if self.loc.is_none() {
            self.loc = Some(loc);
        }
        self
    }
}

impl From<LowerErrorKind> for LowerError {
    fn from(kind: LowerErrorKind) -> Self {
        Self::new(kind)
    }
}
