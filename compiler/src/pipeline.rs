// pipeline.rs: Compilation state and phase orchestration
//
// Holds every phase artifact in one struct and runs the phases needed for a
// given terminal phase: parse → resolve → differentiate → emit → render.
//
// Preconditions: the request carries the formula text and alias declarations.
// Postconditions: artifacts for all phases up to `terminal` are populated,
//                 or `has_error` is set.
// Failure modes: any phase emitting error-level diagnostics.
// Side effects: calls `on_phase_complete` after each phase for immediate display.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::ast::{Alias, Expr, Span};
use crate::codegen::CodegenOptions;
use crate::diag::{codes, DiagLevel, Diagnostic};
use crate::emit::{EmitOptions, Slot};
use crate::formula::{Category, DimError, Formula, Var};
use crate::kernel::KernelBody;
use crate::resolve::Bindings;

// ── Request ────────────────────────────────────────────────────────────────

/// Textual inputs of one compilation.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub formula: String,
    /// Alias declarations such as `x = Vi(0, 3)`, one per entry.
    pub aliases: Vec<String>,
    /// Variable to differentiate with respect to (alias name or `Vi(...)`).
    pub grad: Option<String>,
    /// Incoming adjoint; a fresh `Vi` variable when absent.
    pub gradin: Option<String>,
}

/// Which source text a diagnostic points into.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Origin {
    Formula,
    Alias(usize),
    GradTarget,
    Gradin,
}

impl Request {
    pub fn source_of(&self, origin: Origin) -> &str {
        match origin {
            Origin::Formula => &self.formula,
            Origin::Alias(i) => self.aliases.get(i).map_or("", String::as_str),
            Origin::GradTarget => self.grad.as_deref().unwrap_or(""),
            Origin::Gradin => self.gradin.as_deref().unwrap_or(""),
        }
    }

    pub fn origin_name(&self, origin: Origin) -> String {
        match origin {
            Origin::Formula => "formula".to_string(),
            Origin::Alias(i) => format!("alias {}", i + 1),
            Origin::GradTarget => "--grad".to_string(),
            Origin::Gradin => "--gradin".to_string(),
        }
    }

    /// Canonical text hashed for provenance.
    fn canonical_text(&self) -> String {
        let mut text = String::new();
        for alias in &self.aliases {
            text.push_str("alias ");
            text.push_str(alias.trim());
            text.push('\n');
        }
        text.push_str("formula ");
        text.push_str(self.formula.trim());
        text.push('\n');
        if let Some(grad) = &self.grad {
            text.push_str("grad ");
            text.push_str(grad.trim());
            text.push('\n');
        }
        if let Some(gradin) = &self.gradin {
            text.push_str("gradin ");
            text.push_str(gradin.trim());
            text.push('\n');
        }
        text
    }
}

// ── Phases ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Phase {
    Parse,
    Resolve,
    Differentiate,
    Emit,
    Render,
}

impl Phase {
    pub fn name(self) -> &'static str {
        match self {
            Phase::Parse => "parse",
            Phase::Resolve => "resolve",
            Phase::Differentiate => "differentiate",
            Phase::Emit => "emit",
            Phase::Render => "render",
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct PipelineOptions {
    pub emit: EmitOptions,
    pub codegen: CodegenOptions,
    pub verbose: bool,
}

// ── Provenance ─────────────────────────────────────────────────────────────

/// Provenance metadata for reproducible output and cache-key use.
///
/// `source_hash`: SHA-256 of the canonical request text (aliases, formula,
/// gradient target, incoming adjoint).
/// `compiler_version`: crate version from `Cargo.toml`.
#[derive(Debug, Clone)]
pub struct Provenance {
    pub source_hash: [u8; 32],
    pub compiler_version: &'static str,
}

impl Provenance {
    /// Hex string of the source hash (64 characters).
    pub fn source_hash_hex(&self) -> String {
        let mut s = String::with_capacity(64);
        for b in &self.source_hash {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }
}

pub fn compute_provenance(request: &Request) -> Provenance {
    use sha2::{Digest, Sha256};

    let digest = Sha256::digest(request.canonical_text().as_bytes());
    let mut source_hash = [0u8; 32];
    source_hash.copy_from_slice(&digest);
    Provenance {
        source_hash,
        compiler_version: env!("CARGO_PKG_VERSION"),
    }
}

// ── Manifest ───────────────────────────────────────────────────────────────

/// `--emit json` document.
#[derive(Debug, Clone, Serialize)]
pub struct Manifest {
    pub compiler_version: &'static str,
    pub source_hash: String,
    pub cache_key: String,
    pub signature: String,
    pub output: SlotEntry,
    pub inputs: Vec<InputEntry>,
    pub fragments: Vec<FragmentEntry>,
    pub temporaries: Vec<SlotEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SlotEntry {
    pub name: String,
    pub dim: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct InputEntry {
    pub name: String,
    pub category: char,
    pub index: usize,
    pub dim: usize,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alias: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct FragmentEntry {
    pub kind: &'static str,
    pub out: String,
    pub args: Vec<String>,
    pub statements: usize,
}

impl Manifest {
    pub fn new(body: &KernelBody, bindings: &Bindings, provenance: &Provenance) -> Self {
        let inputs = body
            .inputs
            .iter()
            .map(|v| InputEntry {
                name: v.slot_name(),
                category: v.cat.letter(),
                index: v.index,
                dim: v.dim,
                alias: bindings
                    .iter()
                    .find(|b| b.var.same_entity(v))
                    .map(|b| b.name.clone()),
            })
            .collect();
        let fragments = body
            .fragments
            .iter()
            .map(|frag| FragmentEntry {
                kind: frag.kind,
                out: frag.out.name.clone(),
                args: frag.args.clone(),
                statements: frag.stmts.len(),
            })
            .collect();
        let temporaries = body
            .temporaries()
            .into_iter()
            .map(|slot| SlotEntry {
                name: slot.name.clone(),
                dim: slot.dim,
            })
            .collect();
        Manifest {
            compiler_version: provenance.compiler_version,
            source_hash: provenance.source_hash_hex(),
            cache_key: body.cache_key.clone(),
            signature: body.root_signature.clone(),
            output: SlotEntry {
                name: body.output.name.clone(),
                dim: body.output.dim,
            },
            inputs,
            fragments,
            temporaries,
        }
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self).map(|mut s| {
            s.push('\n');
            s
        })
    }
}

// ── Compilation state ──────────────────────────────────────────────────────

/// Holds all compilation artifacts and accumulated diagnostics.
pub struct CompilationState {
    pub request: Request,
    pub alias_asts: Vec<Alias>,
    pub ast: Option<Expr>,
    pub bindings: Bindings,
    /// The formula as written.
    pub formula: Option<Formula>,
    /// What gets emitted: the formula, or its adjoint when `--grad` is set.
    pub target: Option<Formula>,
    pub kernel: Option<KernelBody>,
    pub cpp: Option<String>,
    pub diagnostics: Vec<(Origin, Diagnostic)>,
    pub has_error: bool,
    pub provenance: Option<Provenance>,
}

impl CompilationState {
    pub fn new(request: Request) -> Self {
        Self {
            request,
            alias_asts: Vec::new(),
            ast: None,
            bindings: Bindings::new(),
            formula: None,
            target: None,
            kernel: None,
            cpp: None,
            diagnostics: Vec::new(),
            has_error: false,
            provenance: None,
        }
    }

    /// Render a diagnostic against the source text it points into.
    pub fn render_diagnostic(&self, origin: Origin, diag: &Diagnostic) -> String {
        diag.render(
            &self.request.origin_name(origin),
            self.request.source_of(origin),
        )
    }

    pub fn manifest(&self) -> Option<Manifest> {
        let body = self.kernel.as_ref()?;
        let provenance = self.provenance.as_ref()?;
        Some(Manifest::new(body, &self.bindings, provenance))
    }
}

// ── Error type ─────────────────────────────────────────────────────────────

/// Pipeline execution failed due to error-level diagnostics in a phase.
/// The specific diagnostics are available in `CompilationState.diagnostics`.
#[derive(Debug)]
pub struct PipelineError {
    pub failing_phase: Phase,
}

fn has_error_diags(diags: &[(Origin, Diagnostic)]) -> bool {
    diags.iter().any(|(_, d)| d.level == DiagLevel::Error)
}

/// Per-phase post-processing: callback, accumulate, verbose, error check.
fn finish_phase(
    state: &mut CompilationState,
    phase: Phase,
    diags: Vec<(Origin, Diagnostic)>,
    elapsed: Duration,
    verbose: bool,
    on_phase_complete: &mut impl FnMut(Phase, &[(Origin, Diagnostic)]),
) -> Result<(), PipelineError> {
    on_phase_complete(phase, &diags);
    let is_err = has_error_diags(&diags);
    state.diagnostics.extend(diags);
    if verbose {
        eprintln!(
            "kfc: {} complete, {:.1}ms",
            phase.name(),
            elapsed.as_secs_f64() * 1000.0
        );
    }
    if is_err {
        state.has_error = true;
        return Err(PipelineError {
            failing_phase: phase,
        });
    }
    Ok(())
}

// ── Pipeline runner ────────────────────────────────────────────────────────

/// Run every phase up to and including `terminal`.
///
/// Per-phase sequence: execute → on_phase_complete(callback) → verbose → error check.
pub fn run_pipeline(
    state: &mut CompilationState,
    terminal: Phase,
    options: &PipelineOptions,
    mut on_phase_complete: impl FnMut(Phase, &[(Origin, Diagnostic)]),
) -> Result<(), PipelineError> {
    state.provenance = Some(compute_provenance(&state.request));
    let phases = [
        Phase::Parse,
        Phase::Resolve,
        Phase::Differentiate,
        Phase::Emit,
        Phase::Render,
    ];

    for phase in phases.into_iter().filter(|p| *p <= terminal) {
        let t = Instant::now();
        let diags = match phase {
            Phase::Parse => parse_phase(state),
            Phase::Resolve => resolve_phase(state),
            Phase::Differentiate => differentiate_phase(state),
            Phase::Emit => emit_phase(state, &options.emit),
            Phase::Render => {
                if let Some(body) = &state.kernel {
                    state.cpp = Some(crate::codegen::render_cpp(body, &options.codegen));
                }
                Vec::new()
            }
        };
        let elapsed = t.elapsed();
        finish_phase(
            state,
            phase,
            diags,
            elapsed,
            options.verbose,
            &mut on_phase_complete,
        )?;
    }
    Ok(())
}

fn parse_errors(
    origin: Origin,
    errors: Vec<chumsky::error::Rich<'static, crate::lexer::Token>>,
) -> Vec<(Origin, Diagnostic)> {
    errors
        .into_iter()
        .map(|e| {
            let span = *e.span();
            (origin, Diagnostic::error(codes::E0001, span, e.to_string()))
        })
        .collect()
}

fn parse_phase(state: &mut CompilationState) -> Vec<(Origin, Diagnostic)> {
    let mut diags = Vec::new();
    for (i, text) in state.request.aliases.iter().enumerate() {
        let result = crate::parser::parse_alias(text);
        diags.extend(parse_errors(Origin::Alias(i), result.errors));
        if let Some(alias) = result.output {
            state.alias_asts.push(alias);
        }
    }
    let result = crate::parser::parse(&state.request.formula);
    diags.extend(parse_errors(Origin::Formula, result.errors));
    state.ast = result.output;
    diags
}

fn resolve_phase(state: &mut CompilationState) -> Vec<(Origin, Diagnostic)> {
    let mut diags = Vec::new();
    for (i, alias) in state.alias_asts.iter().enumerate() {
        if let Err(d) = state.bindings.declare(alias) {
            diags.push((Origin::Alias(i), d));
        }
    }
    if let Some(ast) = &state.ast {
        let result = crate::resolve::resolve(ast, &state.bindings);
        diags.extend(result.diagnostics.into_iter().map(|d| (Origin::Formula, d)));
        state.formula = result.formula;
    }
    if let Some(f) = &state.formula {
        log::debug!("resolved formula: {} node(s), dim {}", f.node_count(), f.dim());
    }
    diags
}

fn differentiate_phase(state: &mut CompilationState) -> Vec<(Origin, Diagnostic)> {
    let Some(f) = state.formula.clone() else {
        return Vec::new();
    };
    let Some(target_text) = state.request.grad.clone() else {
        state.target = Some(f);
        return Vec::new();
    };

    let v = match resolve_text(&target_text, &state.bindings) {
        Ok(g) => match g.as_var() {
            Some(v) => *v,
            None => {
                return vec![(
                    Origin::GradTarget,
                    Diagnostic::error(
                        codes::E0104,
                        whole(&target_text),
                        format!("gradient target `{}` is not a variable", target_text.trim()),
                    ),
                )]
            }
        },
        Err(diags) => return tag(Origin::GradTarget, diags),
    };

    let gradin = match &state.request.gradin {
        Some(text) => match resolve_text(text, &state.bindings) {
            Ok(g) => g,
            Err(diags) => return tag(Origin::Gradin, diags),
        },
        None => default_gradin(&f, &v, f.dim()),
    };

    let adjoint = match crate::autodiff::grad(&f, &v, &gradin) {
        Ok(a) => a,
        Err(e) => return vec![(Origin::Formula, dim_diag(e, &state.request.formula))],
    };
    if let Some((a, b)) = conflicting_var(&adjoint) {
        return vec![(
            Origin::Gradin,
            Diagnostic::error(
                codes::E0200,
                whole(state.request.source_of(Origin::Gradin)),
                format!(
                    "{} used with dimension {} and with dimension {}",
                    a, a.dim, b.dim
                ),
            ),
        )];
    }
    log::debug!(
        "adjoint with respect to {}: {} node(s)",
        v,
        adjoint.node_count()
    );
    state.target = Some(adjoint);
    Vec::new()
}

fn emit_phase(state: &mut CompilationState, options: &EmitOptions) -> Vec<(Origin, Diagnostic)> {
    let Some(target) = &state.target else {
        return Vec::new();
    };
    let out = Slot::new("out", target.dim());
    match crate::kernel::compile(target, &out, options) {
        Ok(body) => {
            state.kernel = Some(body);
            Vec::new()
        }
        Err(e) => vec![(Origin::Formula, dim_diag(e, &state.request.formula))],
    }
}

/// Parse and resolve a standalone expression against the alias table.
fn resolve_text(text: &str, bindings: &Bindings) -> Result<Formula, Vec<Diagnostic>> {
    let parsed = crate::parser::parse(text);
    if !parsed.errors.is_empty() {
        return Err(parsed
            .errors
            .into_iter()
            .map(|e| Diagnostic::error(codes::E0001, *e.span(), e.to_string()))
            .collect());
    }
    let Some(ast) = parsed.output else {
        return Err(vec![Diagnostic::error(
            codes::E0001,
            whole(text),
            "empty expression",
        )]);
    };
    let result = crate::resolve::resolve(&ast, bindings);
    match result.formula {
        Some(f) => Ok(f),
        None => Err(result.diagnostics),
    }
}

/// A `Vi` variable with an index no other variable of `f` uses.
fn default_gradin(f: &Formula, v: &Var, dim: usize) -> Formula {
    let next = f
        .vars()
        .iter()
        .chain(std::iter::once(v))
        .map(|w| w.index + 1)
        .max()
        .unwrap_or(0);
    crate::simplify::var(Var {
        cat: Category::I,
        index: next,
        dim,
    })
}

/// Two occurrences of one variable identity with different dimensions.
fn conflicting_var(f: &Formula) -> Option<(Var, Var)> {
    let mut seen: HashMap<(Category, usize), Var> = HashMap::new();
    for node in f.post_order() {
        if let Some(v) = node.as_var() {
            match seen.get(&(v.cat, v.index)) {
                Some(prev) if prev.dim != v.dim => return Some((*prev, *v)),
                Some(_) => {}
                None => {
                    seen.insert((v.cat, v.index), *v);
                }
            }
        }
    }
    None
}

fn whole(text: &str) -> Span {
    (0..text.len()).into()
}

fn dim_diag(e: DimError, source: &str) -> Diagnostic {
    Diagnostic::error(codes::E0200, whole(source), format!("dimension error in {}", e))
}

fn tag(origin: Origin, diags: Vec<Diagnostic>) -> Vec<(Origin, Diagnostic)> {
    diags.into_iter().map(|d| (origin, d)).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(formula: &str, aliases: &[&str]) -> Request {
        Request {
            formula: formula.to_string(),
            aliases: aliases.iter().map(|a| a.to_string()).collect(),
            ..Request::default()
        }
    }

    fn run(req: Request, terminal: Phase) -> CompilationState {
        let mut state = CompilationState::new(req);
        let _ = run_pipeline(&mut state, terminal, &PipelineOptions::default(), |_, _| {});
        state
    }

    #[test]
    fn gaussian_kernel_renders() {
        let state = run(
            request("Exp(-SqDist(x, y)) * b", &["x = Vi(0, 3)", "y = Vj(1, 3)", "b = Vj(2, 1)"]),
            Phase::Render,
        );
        assert!(!state.has_error, "{:?}", state.diagnostics);
        let cpp = state.cpp.unwrap();
        assert!(cpp.contains("arg_i0"));
        assert!(cpp.contains("exp("));
    }

    #[test]
    fn terminal_phase_stops_early() {
        let state = run(request("x + x", &["x = Vi(0, 2)"]), Phase::Resolve);
        assert!(state.formula.is_some());
        assert!(state.kernel.is_none());
        assert!(state.cpp.is_none());
    }

    #[test]
    fn parse_errors_stop_the_pipeline() {
        let mut state = CompilationState::new(request("x +", &["x = Vi(0, 2)"]));
        let err = run_pipeline(&mut state, Phase::Render, &PipelineOptions::default(), |_, _| {})
            .unwrap_err();
        assert_eq!(err.failing_phase, Phase::Parse);
        assert_eq!(state.diagnostics[0].1.code, Some(codes::E0001));
    }

    #[test]
    fn diagnostics_carry_their_origin() {
        let state = run(request("x", &["x = Vi(0, 2)", "x = Vj(1, 2)"]), Phase::Render);
        let (origin, diag) = &state.diagnostics[0];
        assert_eq!(*origin, Origin::Alias(1));
        assert_eq!(diag.code, Some(codes::E0101));
        assert!(state
            .render_diagnostic(*origin, diag)
            .starts_with("alias 2:1:1: error[E0101]"));
    }

    #[test]
    fn gradient_uses_a_fresh_adjoint_variable() {
        let mut req = request("SqNorm2(x)", &["x = Vi(0, 3)", "p = Pm(4, 1)"]);
        req.grad = Some("x".to_string());
        let state = run(req, Phase::Emit);
        assert!(!state.has_error, "{:?}", state.diagnostics);
        let body = state.kernel.unwrap();
        assert_eq!(body.output.dim, 3);
        let names: Vec<String> = body.inputs.iter().map(Var::slot_name).collect();
        assert_eq!(names, vec!["arg_i0".to_string(), "arg_i1".to_string()]);
    }

    #[test]
    fn gradient_target_must_be_a_variable() {
        let mut req = request("SqNorm2(x)", &["x = Vi(0, 3)"]);
        req.grad = Some("Exp(x)".to_string());
        let state = run(req, Phase::Emit);
        assert!(state.has_error);
        assert_eq!(state.diagnostics[0].0, Origin::GradTarget);
    }

    #[test]
    fn adjoint_dimension_mismatch_is_reported() {
        let mut req = request("SqNorm2(x)", &["x = Vi(0, 3)", "g = Vi(1, 2)"]);
        req.grad = Some("x".to_string());
        req.gradin = Some("g".to_string());
        let state = run(req, Phase::Emit);
        assert_eq!(state.diagnostics[0].1.code, Some(codes::E0200));
    }

    #[test]
    fn provenance_is_stable_and_input_sensitive() {
        let a = compute_provenance(&request("x", &["x = Vi(0, 2)"]));
        let b = compute_provenance(&request(" x ", &["x = Vi(0, 2)"]));
        let c = compute_provenance(&request("x", &["x = Vi(0, 3)"]));
        assert_eq!(a.source_hash, b.source_hash);
        assert_ne!(a.source_hash, c.source_hash);
        assert_eq!(a.source_hash_hex().len(), 64);
    }

    #[test]
    fn manifest_lists_inputs_with_aliases() {
        let state = run(request("(x | y)", &["x = Vi(0, 2)", "y = Vj(1, 2)"]), Phase::Emit);
        let manifest = state.manifest().unwrap();
        assert_eq!(manifest.inputs.len(), 2);
        assert_eq!(manifest.inputs[1].alias.as_deref(), Some("y"));
        let json = manifest.to_json().unwrap();
        assert!(json.contains("\"cache_key\""));
        assert!(json.contains("\"name\": \"arg_j1\""));
    }
}
