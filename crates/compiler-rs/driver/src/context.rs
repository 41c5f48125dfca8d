//! State owned by exactly one compilation

use ast::Program;
use backend_stackvm::ActivatableRegistry;
use errors::{Diagnostic, ErrorSeverity};
use ir::LabelAllocator;
use semantics::Annotations;
use symbols::ScopeManager;

/// Pipeline phase that produced a diagnostic
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Phase {
    Lexical,
    Syntactic,
    Semantic,
    Codegen,
}

impl Phase {
    pub const ALL: [Phase; 4] = [Phase::Lexical, Phase::Syntactic, Phase::Semantic, Phase::Codegen];

    pub fn name(&self) -> &'static str {
        match self {
            Phase::Lexical => "lexing",
            Phase::Syntactic => "parsing",
            Phase::Semantic => "semantic analysis",
            Phase::Codegen => "code generation",
        }
    }

    fn index(&self) -> usize {
        match self {
            Phase::Lexical => 0,
            Phase::Syntactic => 1,
            Phase::Semantic => 2,
            Phase::Codegen => 3,
        }
    }
}

/// Everything one run of the pipeline produces
///
/// A fresh context is built for every compilation, so scopes, labels and
/// the activatable registry never leak from one source into the next.
#[derive(Debug)]
pub struct CompilationContext {
    source: String,
    filename: Option<String>,
    diagnostics: [Vec<Diagnostic>; 4],
    pub(crate) program: Option<Program>,
    pub(crate) scopes: Option<ScopeManager>,
    pub(crate) annotations: Option<Annotations>,
    pub(crate) labels: Option<LabelAllocator>,
    pub(crate) registry: Option<ActivatableRegistry>,
    pub(crate) listing: Option<String>,
}

impl CompilationContext {
    pub fn new(source: &str, filename: Option<String>) -> Self {
        Self {
            source: source.to_string(),
            filename,
            diagnostics: Default::default(),
            program: None,
            scopes: None,
            annotations: None,
            labels: None,
            registry: None,
            listing: None,
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    pub fn filename(&self) -> Option<&str> {
        self.filename.as_deref()
    }

    pub(crate) fn record(&mut self, phase: Phase, diagnostics: impl IntoIterator<Item = Diagnostic>) {
        self.diagnostics[phase.index()].extend(diagnostics);
    }

    /// Diagnostics of one phase, in report order
    pub fn phase_diagnostics(&self, phase: Phase) -> &[Diagnostic] {
        &self.diagnostics[phase.index()]
    }

    /// Diagnostics of every phase, in pipeline order
    pub fn diagnostics(&self) -> impl Iterator<Item = &Diagnostic> {
        self.diagnostics.iter().flatten()
    }

    pub fn error_count(&self) -> usize {
        self.diagnostics().filter(|d| d.is_fatal()).count()
    }

    pub fn warning_count(&self) -> usize {
        self.diagnostics()
            .filter(|d| d.severity == ErrorSeverity::Warning)
            .count()
    }

    /// No error or critical diagnostic; with `warnings_as_errors`, no warning either
    pub fn is_valid(&self, warnings_as_errors: bool) -> bool {
        self.error_count() == 0 && (!warnings_as_errors || self.warning_count() == 0)
    }

    pub fn program(&self) -> Option<&Program> {
        self.program.as_ref()
    }

    pub fn scopes(&self) -> Option<&ScopeManager> {
        self.scopes.as_ref()
    }

    pub fn annotations(&self) -> Option<&Annotations> {
        self.annotations.as_ref()
    }

    pub fn labels(&self) -> Option<&LabelAllocator> {
        self.labels.as_ref()
    }

    pub fn registry(&self) -> Option<&ActivatableRegistry> {
        self.registry.as_ref()
    }

    /// Rendered listing, present once code generation succeeded
    pub fn listing(&self) -> Option<&str> {
        self.listing.as_deref()
    }
}
