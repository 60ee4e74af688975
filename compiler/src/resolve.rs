// resolve.rs: Name resolution and formula construction
//
// Binds alias declarations (`x = Vi(0, 3)`) to variables, then walks a
// parsed expression and builds the formula DAG through the simplifying
// constructors. Every function of the textual notation is listed here with
// its operand and integer-parameter counts.
//
// Preconditions: `expr` is a well-formed AST from the parser.
// Postconditions: on success the formula satisfies every dimension contract
//                 and each variable identity has a single dimension.
// Failure modes: unknown names or functions, duplicate or malformed aliases,
//                wrong arguments, dimension-contract violations produce
//                `Diagnostic` entries. Resolution continues past errors.
// Side effects: none.

use std::collections::HashMap;

use crate::ast::{Alias, BinaryOp, Expr, ExprKind, Ident, Span};
use crate::autodiff;
use crate::diag::{codes, Diagnostic};
use crate::formula::{Category, DimError, Formula, Var};
use crate::simplify as s;

// ── Aliases ─────────────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct Binding {
    pub name: String,
    pub var: Var,
    pub span: Span,
}

/// Alias table, in declaration order.
#[derive(Debug, Clone, Default)]
pub struct Bindings {
    entries: Vec<Binding>,
}

impl Bindings {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, name: &str) -> Option<&Binding> {
        self.entries.iter().find(|b| b.name == name)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Binding> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Declare `alias`. `Vi(dim)` without an index takes the alias's
    /// position in the table as its index.
    pub fn declare(&mut self, alias: &Alias) -> Result<&Binding, Diagnostic> {
        if let Some(prev) = self.get(&alias.name.name) {
            return Err(Diagnostic::error(
                codes::E0101,
                alias.name.span,
                format!("alias `{}` declared twice", alias.name.name),
            )
            .with_related(prev.span, "first declared here"));
        }
        let var = self.variable_decl(&alias.value)?;
        self.entries.push(Binding {
            name: alias.name.name.clone(),
            var,
            span: alias.name.span,
        });
        Ok(&self.entries[self.entries.len() - 1])
    }

    fn variable_decl(&self, value: &Expr) -> Result<Var, Diagnostic> {
        let invalid = || {
            Diagnostic::error(
                codes::E0102,
                value.span,
                "alias value must be a variable declaration",
            )
            .with_hint("use `Vi(index, dim)`, `Vj(dim)`, `Pm(index, dim)` or `Var(index, dim, cat)`")
        };
        let ExprKind::Call { name, args } = &value.kind else {
            return Err(invalid());
        };
        if !matches!(name.name.as_str(), "Vi" | "Vj" | "Pm" | "Var") {
            return Err(invalid());
        }
        let ints = int_args(name, args, args.len())?;
        let (cat, index, dim) = match (name.name.as_str(), ints.as_slice()) {
            ("Vi" | "Vj" | "Pm", [dim]) => (category_of(&name.name), self.entries.len() as i64, *dim),
            ("Vi" | "Vj" | "Pm", [index, dim]) => (category_of(&name.name), *index, *dim),
            ("Var", [index, dim, cat]) => {
                let cat = Category::from_code(*cat).ok_or_else(|| {
                    Diagnostic::error(
                        codes::E0104,
                        value.span,
                        format!("variable category must be 0, 1 or 2, found {}", cat),
                    )
                })?;
                (Some(cat), *index, *dim)
            }
            ("Vi" | "Vj" | "Pm" | "Var", _) => {
                return Err(Diagnostic::error(
                    codes::E0104,
                    value.span,
                    format!("wrong number of arguments to `{}`", name.name),
                ))
            }
            _ => return Err(invalid()),
        };
        let cat = cat.ok_or_else(invalid)?;
        make_var(cat, index, dim, value.span)
    }
}

fn category_of(constructor: &str) -> Option<Category> {
    match constructor {
        "Vi" => Some(Category::I),
        "Vj" => Some(Category::J),
        "Pm" => Some(Category::P),
        _ => None,
    }
}

fn make_var(cat: Category, index: i64, dim: i64, span: Span) -> Result<Var, Diagnostic> {
    let index = usize::try_from(index).map_err(|_| {
        Diagnostic::error(codes::E0104, span, "variable index must be non-negative")
    })?;
    let dim = usize::try_from(dim).unwrap_or(0);
    Var::new(cat, index, dim).map_err(|e| dim_error(e, span))
}

fn dim_error(err: DimError, span: Span) -> Diagnostic {
    Diagnostic::error(codes::E0200, span, format!("dimension error in {}", err))
}

/// Integer literal arguments, expecting exactly `n` of them.
fn int_args(name: &Ident, args: &[Expr], n: usize) -> Result<Vec<i64>, Diagnostic> {
    if args.len() != n {
        return Err(Diagnostic::error(
            codes::E0104,
            name.span,
            format!("`{}` expects {} argument(s), found {}", name.name, n, args.len()),
        ));
    }
    args.iter()
        .map(|a| {
            a.as_int().ok_or_else(|| {
                Diagnostic::error(codes::E0104, a.span, "expected an integer literal")
            })
        })
        .collect()
}

// ── Function table ──────────────────────────────────────────────────────────

type Unary = fn(&Formula) -> Result<Formula, DimError>;
type Binary = fn(&Formula, &Formula) -> Result<Formula, DimError>;

const UNARY: &[(&str, Unary)] = &[
    ("Minus", s::minus),
    ("Exp", s::exp),
    ("Log", s::log),
    ("Sin", s::sin),
    ("Cos", s::cos),
    ("Sqrt", s::sqrt),
    ("Rsqrt", s::rsqrt),
    ("Square", s::square),
    ("Inv", s::inv),
    ("Abs", s::abs),
    ("Sign", s::sign),
    ("Step", s::step),
    ("ReLU", s::relu),
    ("Sum", s::sum),
    ("Max", s::max),
    ("Min", s::min),
    ("ArgMax", s::arg_max),
    ("ArgMin", s::arg_min),
    ("SqNorm2", s::sq_norm2),
    ("Norm2", s::norm2),
    ("Normalize", s::normalize),
    ("ComplexSum", s::complex_sum),
    ("ComplexReal", s::complex_real),
    ("ComplexImag", s::complex_imag),
    ("Real2Complex", s::real2complex),
    ("Imag2Complex", s::imag2complex),
    ("Conj", s::conj),
];

const BINARY: &[(&str, Binary)] = &[
    ("Add", s::add),
    ("Subtract", s::sub),
    ("Mult", s::mult),
    ("Divide", s::divide),
    ("Scalprod", s::scalprod),
    ("SqDist", s::sq_dist),
    ("Concat", s::concat),
    ("MatVecMult", s::mat_vec_mult),
    ("VecMatMult", s::vec_mat_mult),
    ("TensorProd", s::tensor_prod),
    ("ComplexMult", s::complex_mult),
    ("SqNormIso", s::sq_norm_iso),
    ("SqNormDiag", s::sq_norm_diag),
    ("SymSqNorm", s::sym_sq_norm),
    ("WeightedSqNorm", s::weighted_sq_norm),
];

type Ternary = fn(&Formula, &Formula, &Formula) -> Result<Formula, DimError>;

const TERNARY: &[(&str, Ternary)] = &[("WeightedSqDist", s::weighted_sq_dist)];

/// Functions taking one formula followed by integer parameters.
const PARAMETERIZED: &[(&str, usize)] = &[
    ("Pow", 1),
    ("SumT", 1),
    ("OneHot", 1),
    ("ComplexSumT", 1),
    ("Elem", 1),
    ("ClampInt", 2),
    ("DiffClampInt", 2),
    ("Extract", 2),
    ("ExtractT", 2),
    ("ElemT", 2),
];

/// Every function name the notation accepts.
pub fn function_names() -> Vec<&'static str> {
    let mut names: Vec<&'static str> = UNARY
        .iter()
        .map(|(n, _)| *n)
        .chain(BINARY.iter().map(|(n, _)| *n))
        .chain(TERNARY.iter().map(|(n, _)| *n))
        .chain(PARAMETERIZED.iter().map(|(n, _)| *n))
        .chain([
            "Vi", "Vj", "Pm", "Var", "Zero", "IntCst", "RatCst", "IntInv", "Grad",
        ])
        .collect();
    names.sort_unstable();
    names
}

// ── Resolution ──────────────────────────────────────────────────────────────

/// Result of resolution: the formula (when error-free) plus diagnostics.
#[derive(Debug)]
pub struct ResolveResult {
    pub formula: Option<Formula>,
    pub diagnostics: Vec<Diagnostic>,
}

pub fn resolve(expr: &Expr, bindings: &Bindings) -> ResolveResult {
    let mut resolver = Resolver {
        bindings,
        seen: HashMap::new(),
        diagnostics: Vec::new(),
    };
    for binding in bindings.iter() {
        resolver
            .seen
            .insert((binding.var.cat, binding.var.index), (binding.var.dim, binding.span));
    }
    let formula = resolver.expr(expr);
    let formula = if resolver.diagnostics.iter().any(Diagnostic::is_error) {
        None
    } else {
        formula
    };
    ResolveResult {
        formula,
        diagnostics: resolver.diagnostics,
    }
}

struct Resolver<'a> {
    bindings: &'a Bindings,
    /// Dimension and first occurrence of each variable identity.
    seen: HashMap<(Category, usize), (usize, Span)>,
    diagnostics: Vec<Diagnostic>,
}

impl Resolver<'_> {
    fn report(&mut self, diag: Diagnostic) -> Option<Formula> {
        self.diagnostics.push(diag);
        None
    }

    fn built(&mut self, result: Result<Formula, DimError>, span: Span) -> Option<Formula> {
        match result {
            Ok(f) => Some(f),
            Err(e) => self.report(dim_error(e, span)),
        }
    }

    fn use_var(&mut self, var: Var, span: Span) -> Option<Formula> {
        match self.seen.get(&(var.cat, var.index)) {
            Some(&(dim, first)) if dim != var.dim => self.report(
                Diagnostic::error(
                    codes::E0200,
                    span,
                    format!(
                        "{} used with dimension {} but previously with dimension {}",
                        var, var.dim, dim
                    ),
                )
                .with_related(first, "previous use here"),
            ),
            Some(_) => Some(s::var(var)),
            None => {
                self.seen.insert((var.cat, var.index), (var.dim, span));
                Some(s::var(var))
            }
        }
    }

    fn expr(&mut self, e: &Expr) -> Option<Formula> {
        match &e.kind {
            ExprKind::Int(n) => Some(s::int_cst(*n)),
            ExprKind::Ident(name) => match self.bindings.get(name) {
                Some(binding) => {
                    let var = binding.var;
                    self.use_var(var, e.span)
                }
                None => {
                    let mut diag = Diagnostic::error(
                        codes::E0100,
                        e.span,
                        format!("unknown name `{}`", name),
                    );
                    diag = if function_names().contains(&name.as_str()) {
                        diag.with_hint(format!("`{}` is a function and needs arguments", name))
                    } else {
                        diag.with_hint(format!("declare it with an alias such as `{}=Vi(0,3)`", name))
                    };
                    self.report(diag)
                }
            },
            ExprKind::Neg(inner) => {
                if let Some(n) = e.as_int() {
                    return Some(s::int_cst(n));
                }
                let f = self.expr(inner)?;
                self.built(s::minus(&f), e.span)
            }
            ExprKind::Binary { op, lhs, rhs } => {
                let (a, b) = (self.expr(lhs), self.expr(rhs));
                let (a, b) = (a?, b?);
                let result = match op {
                    BinaryOp::Add => s::add(&a, &b),
                    BinaryOp::Sub => s::sub(&a, &b),
                    BinaryOp::Mul => s::mult(&a, &b),
                    BinaryOp::Div => s::divide(&a, &b),
                };
                self.built(result, e.span)
            }
            ExprKind::Power(base, m) => {
                let f = self.expr(base)?;
                self.built(s::pow(&f, *m), e.span)
            }
            ExprKind::Scalprod(a, b) => {
                let (a, b) = (self.expr(a), self.expr(b));
                let (a, b) = (a?, b?);
                self.built(s::scalprod(&a, &b), e.span)
            }
            ExprKind::Call { name, args } => self.call(name, args, e.span),
        }
    }

    /// Resolve every argument, so diagnostics from all of them are reported.
    fn formulas(&mut self, args: &[Expr]) -> Option<Vec<Formula>> {
        let resolved: Vec<Option<Formula>> = args.iter().map(|a| self.expr(a)).collect();
        resolved.into_iter().collect()
    }

    fn arity(&mut self, name: &Ident, args: &[Expr], n: usize) -> Option<()> {
        if args.len() == n {
            return Some(());
        }
        self.report(Diagnostic::error(
            codes::E0104,
            name.span,
            format!("`{}` expects {} argument(s), found {}", name.name, n, args.len()),
        ))
        .map(|_| ())
    }

    fn ints(&mut self, name: &Ident, args: &[Expr], n: usize) -> Option<Vec<i64>> {
        match int_args(name, args, n) {
            Ok(v) => Some(v),
            Err(d) => self.report(d).map(|_| Vec::new()),
        }
    }

    fn sizes(&mut self, values: &[i64], span: Span) -> Option<Vec<usize>> {
        let converted: Result<Vec<usize>, _> = values.iter().map(|v| usize::try_from(*v)).collect();
        match converted {
            Ok(v) => Some(v),
            Err(_) => self
                .report(Diagnostic::error(
                    codes::E0104,
                    span,
                    "size parameters must be non-negative",
                ))
                .map(|_| Vec::new()),
        }
    }

    fn call(&mut self, name: &Ident, args: &[Expr], span: Span) -> Option<Formula> {
        let fname = name.name.as_str();

        if let Some((_, ctor)) = UNARY.iter().find(|(n, _)| *n == fname) {
            self.arity(name, args, 1)?;
            let f = self.formulas(args)?;
            return self.built(ctor(&f[0]), span);
        }
        if let Some((_, ctor)) = BINARY.iter().find(|(n, _)| *n == fname) {
            self.arity(name, args, 2)?;
            let f = self.formulas(args)?;
            return self.built(ctor(&f[0], &f[1]), span);
        }
        if let Some((_, ctor)) = TERNARY.iter().find(|(n, _)| *n == fname) {
            self.arity(name, args, 3)?;
            let f = self.formulas(args)?;
            return self.built(ctor(&f[0], &f[1], &f[2]), span);
        }
        if let Some(&(_, n_params)) = PARAMETERIZED.iter().find(|(n, _)| *n == fname) {
            self.arity(name, args, 1 + n_params)?;
            let f = self.formulas(&args[..1])?;
            let p = self.ints(name, &args[1..], n_params)?;
            let f = &f[0];
            let result = match fname {
                "Pow" => s::pow(f, p[0]),
                "ClampInt" => s::clamp_int(f, p[0], p[1]),
                "DiffClampInt" => s::diff_clamp_int(f, p[0], p[1]),
                _ => {
                    let p = self.sizes(&p, span)?;
                    match fname {
                        "SumT" => s::sum_t(f, p[0]),
                        "OneHot" => s::one_hot(f, p[0]),
                        "ComplexSumT" => s::complex_sum_t(f, p[0]),
                        "Elem" => s::elem(f, p[0]),
                        "Extract" => s::extract(f, p[0], p[1]),
                        "ExtractT" => s::extract_t(f, p[0], p[1]),
                        _ => s::elem_t(f, p[0], p[1]),
                    }
                }
            };
            return self.built(result, span);
        }

        match fname {
            "Vi" | "Vj" | "Pm" => {
                let p = self.ints(name, args, 2)?;
                let cat = category_of(fname)?;
                match make_var(cat, p[0], p[1], span) {
                    Ok(var) => self.use_var(var, span),
                    Err(d) => self.report(d),
                }
            }
            "Var" => {
                let p = self.ints(name, args, 3)?;
                let Some(cat) = Category::from_code(p[2]) else {
                    return self.report(Diagnostic::error(
                        codes::E0104,
                        span,
                        format!("variable category must be 0, 1 or 2, found {}", p[2]),
                    ));
                };
                match make_var(cat, p[0], p[1], span) {
                    Ok(var) => self.use_var(var, span),
                    Err(d) => self.report(d),
                }
            }
            "Zero" => {
                let p = self.ints(name, args, 1)?;
                let p = self.sizes(&p, span)?;
                self.built(s::zero(p[0]), span)
            }
            "IntCst" => {
                let p = self.ints(name, args, 1)?;
                Some(s::int_cst(p[0]))
            }
            "RatCst" => {
                let p = self.ints(name, args, 2)?;
                self.built(s::rat_cst(p[0], p[1]), span)
            }
            "IntInv" => {
                let p = self.ints(name, args, 1)?;
                self.built(s::rat_cst(1, p[0]), span)
            }
            "Grad" => self.grad(name, args, span),
            _ => self.report(
                Diagnostic::error(codes::E0103, name.span, format!("unknown function `{}`", fname))
                    .with_hint("run `kfc --list-functions` for the available functions"),
            ),
        }
    }

    /// `Grad(f, X, G)`: adjoint of `f` with respect to variable `X`, seeded
    /// with `G`.
    fn grad(&mut self, name: &Ident, args: &[Expr], span: Span) -> Option<Formula> {
        self.arity(name, args, 3)?;
        let f = self.expr(&args[0]);
        let x = self.expr(&args[1]);
        let g = self.expr(&args[2]);
        let (f, x, g) = (f?, x?, g?);
        let Some(v) = x.as_var().copied() else {
            return self.report(Diagnostic::error(
                codes::E0104,
                args[1].span,
                "second argument of `Grad` must be a variable",
            ));
        };
        self.built(autodiff::grad(&f, &v, &g), span)
    }
}
