// emit.rs: Code-emission primitives shared by every node kind
//
// Slots (named, sized storage), linear index expressions, scalar
// expressions, statements, and the scoped `ForLoop` builder. Node kinds
// describe their value with these pieces; `codegen` renders them as C++ and
// `interp` executes them.
//
// Preconditions: none (constructors only).
// Postconditions: loop variables never appear outside the statement that
//                 declares them; expanded loops contain only constant indices.
// Failure modes: none.
// Side effects: none.

use std::fmt;
use std::ops::{Add, Div, Mul, Neg, Sub};

// ── Slots ───────────────────────────────────────────────────────────────────

/// A named storage location holding `dim` scalars.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Slot {
    pub name: String,
    pub dim: usize,
}

impl Slot {
    pub fn new(name: impl Into<String>, dim: usize) -> Self {
        Slot {
            name: name.into(),
            dim,
        }
    }

    /// Index into this slot. Scalars ignore the index so that a dimension-1
    /// operand broadcasts across any loop.
    pub fn at(&self, idx: &Idx) -> Expr {
        if self.dim == 1 {
            Expr::Load(self.name.clone(), Idx::lit(0))
        } else {
            Expr::Load(self.name.clone(), idx.clone())
        }
    }

    /// Load a fixed component.
    pub fn get(&self, k: usize) -> Expr {
        Expr::Load(self.name.clone(), Idx::lit(k))
    }

    pub fn assign(&self, idx: Idx, value: Expr) -> Stmt {
        Stmt::Assign {
            slot: self.name.clone(),
            idx,
            value,
        }
    }

    pub fn accumulate(&self, idx: Idx, value: Expr) -> Stmt {
        Stmt::AddAssign {
            slot: self.name.clone(),
            idx,
            value,
        }
    }
}

impl fmt::Display for Slot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}[{}]", self.name, self.dim)
    }
}

/// Deterministic allocator for temporary and loop-variable names.
///
/// Produces `{prefix}_{n}` with a single counter shared by all prefixes, so
/// names are unique within one emission and identical across runs.
#[derive(Debug, Default)]
pub struct NameGen {
    next: u32,
}

impl NameGen {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fresh(&mut self, prefix: &str) -> String {
        let name = format!("{}_{}", prefix, self.next);
        self.next += 1;
        name
    }

    pub fn slot(&mut self, prefix: &str, dim: usize) -> Slot {
        Slot::new(self.fresh(prefix), dim)
    }
}

// ── Index expressions ───────────────────────────────────────────────────────

/// A linear index: `Σ scale·var + offset`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Idx {
    terms: Vec<(String, usize)>,
    offset: usize,
}

impl Idx {
    pub fn lit(offset: usize) -> Self {
        Idx {
            terms: Vec::new(),
            offset,
        }
    }

    pub fn var(name: &str) -> Self {
        Idx {
            terms: vec![(name.to_string(), 1)],
            offset: 0,
        }
    }

    pub fn as_const(&self) -> Option<usize> {
        self.terms.is_empty().then_some(self.offset)
    }

    pub fn terms(&self) -> &[(String, usize)] {
        &self.terms
    }

    pub fn offset(&self) -> usize {
        self.offset
    }

    /// Evaluate with loop-variable values supplied by `lookup`.
    pub fn eval(&self, lookup: impl Fn(&str) -> Option<usize>) -> Option<usize> {
        let mut total = self.offset;
        for (name, scale) in &self.terms {
            total += lookup(name)? * scale;
        }
        Some(total)
    }
}

impl Add<usize> for Idx {
    type Output = Idx;
    fn add(mut self, rhs: usize) -> Idx {
        self.offset += rhs;
        self
    }
}

impl Add<Idx> for Idx {
    type Output = Idx;
    fn add(mut self, rhs: Idx) -> Idx {
        for (name, scale) in rhs.terms {
            match self.terms.iter_mut().find(|(n, _)| *n == name) {
                Some(term) => term.1 += scale,
                None => self.terms.push((name, scale)),
            }
        }
        self.offset += rhs.offset;
        self
    }
}

impl Mul<usize> for Idx {
    type Output = Idx;
    fn mul(self, rhs: usize) -> Idx {
        if rhs == 0 {
            return Idx::lit(0);
        }
        Idx {
            terms: self
                .terms
                .into_iter()
                .map(|(name, scale)| (name, scale * rhs))
                .collect(),
            offset: self.offset * rhs,
        }
    }
}

impl fmt::Display for Idx {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        for (name, scale) in &self.terms {
            if !first {
                write!(f, "+")?;
            }
            first = false;
            if *scale == 1 {
                write!(f, "{}", name)?;
            } else {
                write!(f, "{}*{}", name, scale)?;
            }
        }
        if first {
            write!(f, "{}", self.offset)
        } else if self.offset > 0 {
            write!(f, "+{}", self.offset)
        } else {
            Ok(())
        }
    }
}

// ── Scalar expressions ──────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinOp {
    Add,
    Sub,
    Mul,
    Div,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CmpOp {
    Lt,
    Gt,
    Eq,
}

/// Math functions available to emitted code.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Func {
    Exp,
    Log,
    Sin,
    Cos,
    Sqrt,
    Rsqrt,
    Abs,
    Round,
    Max,
    Min,
    Pow,
}

#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    Int(i64),
    /// Exact rational constant `p/q`.
    Ratio(i64, i64),
    Load(String, Idx),
    /// The value of an index expression.
    Index(Idx),
    Neg(Box<Expr>),
    Bin(BinOp, Box<Expr>, Box<Expr>),
    Call(Func, Vec<Expr>),
    /// 1 when the comparison holds, 0 otherwise.
    Cmp(CmpOp, Box<Expr>, Box<Expr>),
    Select(Box<Expr>, Box<Expr>, Box<Expr>),
}

impl Expr {
    pub fn call(func: Func, arg: Expr) -> Expr {
        Expr::Call(func, vec![arg])
    }

    pub fn call2(func: Func, a: Expr, b: Expr) -> Expr {
        Expr::Call(func, vec![a, b])
    }

    pub fn lt(self, rhs: Expr) -> Expr {
        Expr::Cmp(CmpOp::Lt, Box::new(self), Box::new(rhs))
    }

    pub fn gt(self, rhs: Expr) -> Expr {
        Expr::Cmp(CmpOp::Gt, Box::new(self), Box::new(rhs))
    }

    pub fn eq(self, rhs: Expr) -> Expr {
        Expr::Cmp(CmpOp::Eq, Box::new(self), Box::new(rhs))
    }

    pub fn select(cond: Expr, then: Expr, otherwise: Expr) -> Expr {
        Expr::Select(Box::new(cond), Box::new(then), Box::new(otherwise))
    }
}

macro_rules! expr_binop {
    ($trait:ident, $method:ident, $op:expr) => {
        impl $trait for Expr {
            type Output = Expr;
            fn $method(self, rhs: Expr) -> Expr {
                Expr::Bin($op, Box::new(self), Box::new(rhs))
            }
        }
    };
}

expr_binop!(Add, add, BinOp::Add);
expr_binop!(Sub, sub, BinOp::Sub);
expr_binop!(Mul, mul, BinOp::Mul);
expr_binop!(Div, div, BinOp::Div);

impl Neg for Expr {
    type Output = Expr;
    fn neg(self) -> Expr {
        Expr::Neg(Box::new(self))
    }
}

// ── Statements ──────────────────────────────────────────────────────────────

#[derive(Debug, Clone, PartialEq)]
pub enum Stmt {
    /// Declare a local array.
    Decl(Slot),
    Assign {
        slot: String,
        idx: Idx,
        value: Expr,
    },
    AddAssign {
        slot: String,
        idx: Idx,
        value: Expr,
    },
    For {
        var: String,
        start: usize,
        end: usize,
        step: usize,
        pragma_unroll: bool,
        body: Vec<Stmt>,
    },
    If {
        cond: Expr,
        then: Vec<Stmt>,
    },
}

// ── Loops ───────────────────────────────────────────────────────────────────

/// How a `ForLoop` is materialized.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Unroll {
    /// Repeat the body once per index with constant indices.
    Expand,
    /// Runtime loop annotated `#pragma unroll`.
    Pragma,
    /// Plain runtime loop.
    Never,
}

/// `for (var = start; var < end; var += step)`, built around a body closure
/// parameterized by the loop index.
#[derive(Debug, Clone)]
pub struct ForLoop {
    var: String,
    start: usize,
    end: usize,
    step: usize,
    unroll: Unroll,
}

impl ForLoop {
    /// `step` must be positive; a zero step is treated as 1.
    pub fn new(var: impl Into<String>, start: usize, end: usize, step: usize) -> Self {
        ForLoop {
            var: var.into(),
            start,
            end,
            step: step.max(1),
            unroll: Unroll::Pragma,
        }
    }

    pub fn unroll(mut self, unroll: Unroll) -> Self {
        self.unroll = unroll;
        self
    }

    pub fn trip_count(&self) -> usize {
        if self.end <= self.start {
            0
        } else {
            (self.end - self.start).div_ceil(self.step)
        }
    }

    /// Wrap `body` in the loop. An empty range produces no statements.
    pub fn build(self, mut body: impl FnMut(Idx) -> Vec<Stmt>) -> Vec<Stmt> {
        if self.trip_count() == 0 {
            return Vec::new();
        }
        match self.unroll {
            Unroll::Expand => (self.start..self.end)
                .step_by(self.step)
                .flat_map(|k| body(Idx::lit(k)))
                .collect(),
            Unroll::Pragma | Unroll::Never => {
                let stmts = body(Idx::var(&self.var));
                vec![Stmt::For {
                    var: self.var,
                    start: self.start,
                    end: self.end,
                    step: self.step,
                    pragma_unroll: self.unroll == Unroll::Pragma,
                    body: stmts,
                }]
            }
        }
    }
}

// ── Emission context ────────────────────────────────────────────────────────

#[derive(Debug, Clone)]
pub struct EmitOptions {
    /// Loops with at most this many iterations are expanded inline.
    pub unroll_limit: usize,
}

impl Default for EmitOptions {
    fn default() -> Self {
        EmitOptions { unroll_limit: 4 }
    }
}

/// Naming state and options threaded through one emission.
#[derive(Debug)]
pub struct EmitCtx {
    pub names: NameGen,
    pub options: EmitOptions,
}

impl EmitCtx {
    pub fn new(options: EmitOptions) -> Self {
        EmitCtx {
            names: NameGen::new(),
            options,
        }
    }

    /// A loop with a fresh variable, expanded when short enough.
    pub fn for_loop(&mut self, start: usize, end: usize, step: usize) -> ForLoop {
        let lp = ForLoop::new(self.names.fresh("k"), start, end, step);
        let unroll = if lp.trip_count() <= self.options.unroll_limit {
            Unroll::Expand
        } else {
            Unroll::Pragma
        };
        lp.unroll(unroll)
    }

    pub fn temp(&mut self, prefix: &str, dim: usize) -> Slot {
        self.names.slot(prefix, dim)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn copy_body(out: &Slot, src: &Slot) -> impl FnMut(Idx) -> Vec<Stmt> {
        let out = out.clone();
        let src = src.clone();
        move |k| vec![out.assign(k.clone(), src.at(&k))]
    }

    #[test]
    fn names_are_sequential_across_prefixes() {
        let mut names = NameGen::new();
        assert_eq!(names.fresh("k"), "k_0");
        assert_eq!(names.fresh("out_exp"), "out_exp_1");
        assert_eq!(names.slot("t", 3), Slot::new("t_2", 3));
    }

    #[test]
    fn expanded_loop_has_constant_indices() {
        let out = Slot::new("out", 4);
        let src = Slot::new("src", 4);
        let stmts = ForLoop::new("k", 0, 4, 2)
            .unroll(Unroll::Expand)
            .build(copy_body(&out, &src));
        assert_eq!(stmts.len(), 2);
        assert_eq!(
            stmts[1],
            Stmt::Assign {
                slot: "out".into(),
                idx: Idx::lit(2),
                value: Expr::Load("src".into(), Idx::lit(2)),
            }
        );
    }

    #[test]
    fn runtime_loop_scopes_its_variable() {
        let out = Slot::new("out", 8);
        let src = Slot::new("src", 8);
        let stmts = ForLoop::new("k_7", 0, 8, 1).build(copy_body(&out, &src));
        assert_eq!(stmts.len(), 1);
        let Stmt::For {
            var,
            pragma_unroll,
            body,
            ..
        } = &stmts[0]
        else {
            panic!("expected a loop")
        };
        assert_eq!(var, "k_7");
        assert!(pragma_unroll);
        assert_eq!(body.len(), 1);
    }

    #[test]
    fn empty_range_emits_nothing() {
        let out = Slot::new("out", 1);
        let stmts = ForLoop::new("k", 3, 3, 1).build(|k| vec![out.assign(k, Expr::Int(0))]);
        assert!(stmts.is_empty());
    }

    #[test]
    fn trip_count_rounds_up() {
        assert_eq!(ForLoop::new("k", 0, 5, 2).trip_count(), 3);
        assert_eq!(ForLoop::new("k", 4, 2, 1).trip_count(), 0);
    }

    #[test]
    fn ctx_expands_short_loops_only() {
        let mut ctx = EmitCtx::new(EmitOptions { unroll_limit: 2 });
        let out = Slot::new("out", 3);
        let short = ctx.for_loop(0, 2, 1).build(|k| vec![out.assign(k, Expr::Int(1))]);
        assert_eq!(short.len(), 2);
        let long = ctx.for_loop(0, 3, 1).build(|k| vec![out.assign(k, Expr::Int(1))]);
        assert!(matches!(long[0], Stmt::For { .. }));
    }

    #[test]
    fn index_arithmetic() {
        let i = Idx::var("i");
        let k = Idx::var("k");
        let idx = i.clone() * 3 + k + 1;
        assert_eq!(idx.to_string(), "i*3+k+1");
        let value = idx.eval(|name| match name {
            "i" => Some(2),
            "k" => Some(1),
            _ => None,
        });
        assert_eq!(value, Some(8));
        assert_eq!((Idx::lit(2) * 2 + 1).as_const(), Some(5));
        assert_eq!((i.clone() + i).to_string(), "i*2");
    }

    #[test]
    fn scalar_slot_broadcasts() {
        let s = Slot::new("s", 1);
        assert_eq!(s.at(&Idx::var("k")), Expr::Load("s".into(), Idx::lit(0)));
    }
}
