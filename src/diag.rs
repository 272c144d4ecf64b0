use std::fmt::{Display, Formatter, Result};

use crate::ast::SourceFileId;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Position {
    pub line: usize,
    pub column: usize,
}

impl Display for Position {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Span {
    pub start: Position,
    pub end: Position,
}

impl Span {
    pub fn new(start: Position, end: Position) -> Self {
        Self { start, end }
    }

    pub fn point(line: usize, column: usize) -> Self {
        let pos = Position { line, column };
        Self::new(pos, pos)
    }
}

impl Default for Span {
    fn default() -> Self {
        Self::point(1, 1)
    }
}

impl Display for Span {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "{}..{}", self.start, self.end)
    }
}

/// A source location carried on AST nodes and propagated onto emitted
/// instructions for debug-info emission. Never consulted by lowering logic.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SourceLoc {
    pub file: SourceFileId,
    pub span: Span,
}

impl SourceLoc {
    pub fn new(file: SourceFileId, span: Span) -> Self {
        Self { file, span }
    }
}

impl Display for SourceLoc {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        write!(f, "file#{}:{}", self.file.0, self.span)
    }
}

/// Diagnostic codes reported by the lowering core. How these are rendered is
/// the driver's concern; lowering only records kind and location.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagCode {
    /// A recognized AST shape this core cannot lower yet.
    UnimplementedConstruct,
    /// Statements after an unconditional exit in the same block.
    UnreachableCode,
    /// An entry-point input is missing a required decoration.
    MissingInputDecoration,
    /// Differentiation asked for a zero value of a non-differentiable type.
    CouldNotGenerateZero,
    /// Differentiation reached an instruction it cannot transcribe.
    CannotDifferentiate,
}

impl Display for DiagCode {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        let text = match self {
            DiagCode::UnimplementedConstruct => "unimplemented construct",
            DiagCode::UnreachableCode => "unreachable code",
            DiagCode::MissingInputDecoration => "missing input decoration",
            DiagCode::CouldNotGenerateZero => "could not generate zero value for type",
            DiagCode::CannotDifferentiate => "cannot differentiate instruction",
        };
        write!(f, "{}", text)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Warning,
    Error,
    InternalError,
}

#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub code: DiagCode,
    pub message: String,
    pub loc: Option<SourceLoc>,
}

impl Display for Diagnostic {
    fn fmt(&self, f: &mut Formatter<'_>) -> Result {
        match self.loc {
            Some(loc) => write!(f, "({}) {}: {}", loc, self.code, self.message),
            None => write!(f, "{}: {}", self.code, self.message),
        }
    }
}

/// Collects diagnostics reported during one lowering pass. Soft errors and
/// warnings accumulate here while lowering continues; fatal conditions travel
/// separately as `LowerError`.
#[derive(Debug, Default)]
pub struct DiagnosticSink {
    diagnostics: Vec<Diagnostic>,
    error_count: usize,
}

impl DiagnosticSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn report(
        &mut self,
        severity: Severity,
        code: DiagCode,
        loc: Option<SourceLoc>,
        message: impl Into<String>,
    ) {
        if severity != Severity::Warning {
            self.error_count += 1;
        }
        self.diagnostics.push(Diagnostic {
            severity,
            code,
            message: message.into(),
            loc,
        });
    }

    pub fn warn(&mut self, code: DiagCode, loc: Option<SourceLoc>, message: impl Into<String>) {
        self.report(Severity::Warning, code, loc, message);
    }

    pub fn error(&mut self, code: DiagCode, loc: Option<SourceLoc>, message: impl Into<String>) {
        self.report(Severity::Error, code, loc, message);
    }

    pub fn diagnostics(&self) -> &[Diagnostic] {
        &self.diagnostics
    }

    pub fn error_count(&self) -> usize {
        self.error_count
    }

    pub fn has_errors(&self) -> bool {
        self.error_count > 0
    }
}
