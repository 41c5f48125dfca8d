//! Compiler pipeline orchestration

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

use ast::Dump;
use backend_stackvm::CodeGenerator;
use colored::Colorize;
use errors::{Diagnostic, RenderOptions};
use lexer::Lexer;
use parser::Parser;
use semantics::SemanticAnalyzer;
use thiserror::Error;
use tokens::Token;

use crate::context::{CompilationContext, Phase};

/// Failures of a driver command
#[derive(Debug, Error)]
pub enum DriverError {
    #[error("Failed to read file '{path}': {source}")]
    Read { path: String, source: io::Error },
    #[error("Failed to write file '{path}': {source}")]
    Write { path: String, source: io::Error },
    #[error("Failed to serialize AST: {0}")]
    Dump(#[from] serde_json::Error),
    #[error("{action} failed with {errors} error(s)")]
    Invalid { action: &'static str, errors: usize },
}

pub type DriverResult<T> = Result<T, DriverError>;

/// Switches shared by every driver command
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CompilerOptions {
    pub render: RenderOptions,
    /// Report each finished phase on stderr
    pub verbose: bool,
    /// Warnings invalidate the compilation
    pub warnings_as_errors: bool,
}

/// How far the pipeline runs
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
enum Stage {
    Parse,
    Analyze,
    Generate,
}

/// Compiler instance that orchestrates the compilation pipeline
#[derive(Debug, Clone, Default)]
pub struct Compiler {
    options: CompilerOptions,
}

impl Compiler {
    pub fn new(options: CompilerOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &CompilerOptions {
        &self.options
    }

    /// Lex and parse only
    pub fn parse_source(&self, source: &str, filename: Option<String>) -> CompilationContext {
        self.run(source, filename, Stage::Parse)
    }

    /// Everything but code generation
    pub fn check_source(&self, source: &str, filename: Option<String>) -> CompilationContext {
        self.run(source, filename, Stage::Analyze)
    }

    /// Full pipeline; the listing is present only for a valid compilation
    pub fn compile_source(&self, source: &str, filename: Option<String>) -> CompilationContext {
        self.run(source, filename, Stage::Generate)
    }

    fn run(&self, source: &str, filename: Option<String>, stage: Stage) -> CompilationContext {
        let mut context = CompilationContext::new(source, filename);

        let lexer = self.lex_pass(&mut context);
        self.parse_pass(&mut context, lexer);
        if stage >= Stage::Analyze {
            self.analyze_pass(&mut context);
        }
        if stage >= Stage::Generate && context.is_valid(self.options.warnings_as_errors) {
            self.generate_pass(&mut context);
        }
        context
    }

    /// First pass over the source: collect lexical diagnostics, then rewind
    fn lex_pass(&self, context: &mut CompilationContext) -> Lexer {
        let mut lexer = Lexer::new_with_file(context.source(), context.filename().map(str::to_string));
        lexer.tokenize();
        context.record(Phase::Lexical, lexer.take_diagnostics());
        self.log_phase(context, Phase::Lexical);

        lexer.reset();
        lexer
    }

    fn parse_pass(&self, context: &mut CompilationContext, lexer: Lexer) {
        let filename = context.filename().map(str::to_string);
        let mut parser = Parser::from_lexer(lexer, filename.clone());
        let result = parser.parse();

        let mut diagnostics = parser.take_diagnostics();
        match result {
            Ok(program) => context.program = Some(program),
            Err(error) => diagnostics.push(error.to_diagnostic(filename)),
        }
        context.record(Phase::Syntactic, diagnostics);
        self.log_phase(context, Phase::Syntactic);
    }

    fn analyze_pass(&self, context: &mut CompilationContext) {
        let Some(program) = context.program.as_ref() else {
            return;
        };
        let mut analyzer = SemanticAnalyzer::new(context.filename().map(str::to_string));
        analyzer.analyze(program);

        let (scopes, annotations, diagnostics) = analyzer.into_parts();
        context.scopes = Some(scopes);
        context.annotations = Some(annotations);
        context.record(Phase::Semantic, diagnostics);
        self.log_phase(context, Phase::Semantic);
    }

    fn generate_pass(&self, context: &mut CompilationContext) {
        let filename = context.filename().map(str::to_string);
        let (Some(program), Some(scopes), Some(annotations)) = (&context.program, &context.scopes, &context.annotations)
        else {
            return;
        };

        let mut generator = CodeGenerator::new(scopes, annotations);
        let result = generator.generate(program);
        let (labels, registry) = generator.into_state();

        match result {
            Ok(code) => context.listing = Some(code.render()),
            Err(error) => context.record(Phase::Codegen, [error.to_diagnostic(filename)]),
        }
        context.labels = Some(labels);
        context.registry = Some(registry);
        self.log_phase(context, Phase::Codegen);
    }

    fn log_phase(&self, context: &CompilationContext, phase: Phase) {
        if self.options.verbose {
            eprintln!(
                "{} {} ({} diagnostic(s))",
                "finished".green(),
                phase.name(),
                context.phase_diagnostics(phase).len()
            );
        }
    }

    /// Print every token of a file, its line table and its lexical diagnostics
    pub fn lex_file(&self, input: &Path) -> DriverResult<()> {
        let source = read_source(input)?;
        let mut lexer = Lexer::new_with_file(&source, Some(input.display().to_string()));
        for token in lexer.tokenize() {
            println!("{}", format_token(&token));
        }
        println!("line lengths: {:?}", lexer.line_lens());

        let diagnostics = lexer.take_diagnostics();
        self.print_diagnostics(&diagnostics);
        let errors = diagnostics.iter().filter(|d| d.is_fatal()).count();
        if errors > 0 {
            return Err(DriverError::Invalid { action: "Lexing", errors });
        }
        Ok(())
    }

    /// Parse a file, optionally writing the AST dump as pretty JSON
    pub fn parse_file(&self, input: &Path, dump: Option<&Path>) -> DriverResult<()> {
        let source = read_source(input)?;
        let context = self.parse_source(&source, Some(input.display().to_string()));
        self.print_diagnostics(context.diagnostics());

        if let (Some(program), Some(dump)) = (context.program(), dump) {
            let text = serde_json::to_string_pretty(&program.dump())?;
            write_output(dump, &text)?;
            eprintln!("Wrote AST: {}", dump.display());
        }
        self.ensure_valid(&context, "Parsing")
    }

    /// Type check a file without generating code
    pub fn check_file(&self, input: &Path) -> DriverResult<()> {
        let source = read_source(input)?;
        let context = self.check_source(&source, Some(input.display().to_string()));
        self.print_diagnostics(context.diagnostics());
        self.ensure_valid(&context, "Type checking")
    }

    /// Compile a file to a listing; returns the path written
    pub fn compile_file(&self, input: &Path, output: Option<&Path>) -> DriverResult<PathBuf> {
        let source = read_source(input)?;
        let context = self.compile_source(&source, Some(input.display().to_string()));
        self.print_diagnostics(context.diagnostics());
        self.ensure_valid(&context, "Compilation")?;

        let Some(listing) = context.listing() else {
            return Err(DriverError::Invalid {
                action: "Compilation",
                errors: 0,
            });
        };
        let output_path = output
            .map(Path::to_path_buf)
            .unwrap_or_else(|| default_output_file(input));
        write_output(&output_path, listing)?;

        eprintln!("Generated: {}", output_path.display());
        Ok(output_path)
    }

    fn ensure_valid(&self, context: &CompilationContext, action: &'static str) -> DriverResult<()> {
        if context.is_valid(self.options.warnings_as_errors) {
            return Ok(());
        }
        let mut errors = context.error_count();
        if self.options.warnings_as_errors {
            errors += context.warning_count();
        }
        Err(DriverError::Invalid { action, errors })
    }

    /// Print diagnostics to stderr
    pub fn print_diagnostics<'d>(&self, diagnostics: impl IntoIterator<Item = &'d Diagnostic>) {
        for diagnostic in diagnostics {
            match &diagnostic.file {
                Some(file) => eprintln!("{}: {}", file, diagnostic.render(&self.options.render)),
                None => eprintln!("{}", diagnostic.render(&self.options.render)),
            }
        }
    }
}

/// Input path with the listing extension
pub fn default_output_file(input: &Path) -> PathBuf {
    input.with_extension("vm")
}

fn read_source(path: &Path) -> DriverResult<String> {
    fs::read_to_string(path).map_err(|source| DriverError::Read {
        path: path.display().to_string(),
        source,
    })
}

/// Write a file, creating its parent directory when missing
fn write_output(path: &Path, contents: &str) -> DriverResult<()> {
    let write_error = |source| DriverError::Write {
        path: path.display().to_string(),
        source,
    };
    if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
        fs::create_dir_all(parent).map_err(write_error)?;
    }
    fs::write(path, contents).map_err(write_error)
}

fn format_token(token: &Token) -> String {
    let (start, end) = (token.span.start, token.span.end);
    format!(
        "{:<20} {:<16} [{}:{} - {}:{}]",
        token.kind.name(),
        format!("{:?}", token.text),
        start.row,
        start.col,
        end.row,
        end.col
    )
}
