// simplify.rs: Simplifying constructors for every catalog kind
//
// All formula construction goes through these factories. Each one first
// checks the kind's dimension rule, then tries its algebraic rewrites
// (zero absorption, constant folding, canonical constant-first ordering)
// and only materializes a node when no rewrite applies.
//
// Preconditions: operands were themselves built by this module.
// Postconditions: the result has the dimension the requested kind would
//                 have; `rebuild` is the identity on results of this module.
// Failure modes: dimension-contract violations → `DimError`, also when a
//                rewrite would have removed the offending node.
// Side effects: `log::trace!` records for each rewrite that fires.

use log::trace;

use crate::catalog::Kind;
use crate::formula::{DimError, Formula, Var};

type Built = Result<Formula, DimError>;

fn check(kind: &Kind, operands: &[&Formula]) -> Result<usize, DimError> {
    let dims: Vec<usize> = operands.iter().map(|f| f.dim()).collect();
    kind.infer_dim(&dims)
}

fn node(kind: Kind, operands: &[&Formula]) -> Built {
    Formula::build(kind, operands.iter().map(|f| (*f).clone()).collect())
}

fn rewrite(rule: &str, result: Built) -> Built {
    if let Ok(f) = &result {
        trace!("simplify: {} -> {}", rule, f.signature());
    }
    result
}

fn gcd(a: i64, b: i64) -> i64 {
    let (mut a, mut b) = (a.unsigned_abs(), b.unsigned_abs());
    while b != 0 {
        (a, b) = (b, a % b);
    }
    a as i64
}

// ── Leaves ──────────────────────────────────────────────────────────────────

pub fn var(v: Var) -> Formula {
    // `Var::new` already rejected dimension 0.
    Formula::leaf(Kind::Var(v), v.dim)
}

pub fn zero(dim: usize) -> Built {
    node(Kind::Zero(dim), &[])
}

pub fn int_cst(n: i64) -> Formula {
    if n == 0 {
        return Formula::leaf(Kind::Zero(1), 1);
    }
    Formula::leaf(Kind::IntCst(n), 1)
}

/// `p/q` in lowest terms; integral values become `IntCst`.
pub fn rat_cst(p: i64, q: i64) -> Built {
    if q == 0 {
        return node(Kind::RatCst(p, q), &[]);
    }
    let g = gcd(p, q).max(1);
    let (mut p, mut q) = (p / g, q / g);
    if q < 0 {
        p = -p;
        q = -q;
    }
    if q == 1 {
        return Ok(int_cst(p));
    }
    node(Kind::RatCst(p, q), &[])
}

/// Reshape `f` to dimension `dim`: identity when the sizes agree, `SumT`
/// replication for a scalar.
pub fn broadcast(f: &Formula, dim: usize) -> Built {
    if f.dim() == dim {
        Ok(f.clone())
    } else if f.is_zero() {
        zero(dim)
    } else if f.dim() == 1 {
        sum_t(f, dim)
    } else {
        Err(DimError::new(
            "Broadcast",
            format!("cannot broadcast dimension {} to {}", f.dim(), dim),
        ))
    }
}

// ── Elementwise unary ───────────────────────────────────────────────────────

fn unary(kind: Kind, f: &Formula, zero_preserving: bool) -> Built {
    let dim = check(&kind, &[f])?;
    if zero_preserving && f.is_zero() {
        return rewrite("f(0) = 0", zero(dim));
    }
    node(kind, &[f])
}

pub fn minus(f: &Formula) -> Built {
    let dim = check(&Kind::Minus, &[f])?;
    if f.is_zero() {
        return rewrite("-0", zero(dim));
    }
    if let Some(n) = f.as_int() {
        if let Some(neg) = n.checked_neg() {
            return rewrite("-IntCst", Ok(int_cst(neg)));
        }
    }
    if let Kind::RatCst(p, q) = f.kind() {
        if let Some(neg) = p.checked_neg() {
            return rewrite("-RatCst", rat_cst(neg, *q));
        }
    }
    if let Kind::Minus = f.kind() {
        return rewrite("--x", Ok(f.child(0).clone()));
    }
    node(Kind::Minus, &[f])
}

pub fn exp(f: &Formula) -> Built {
    unary(Kind::Exp, f, false)
}

pub fn log(f: &Formula) -> Built {
    unary(Kind::Log, f, false)
}

pub fn sin(f: &Formula) -> Built {
    unary(Kind::Sin, f, true)
}

pub fn cos(f: &Formula) -> Built {
    unary(Kind::Cos, f, false)
}

pub fn sqrt(f: &Formula) -> Built {
    unary(Kind::Sqrt, f, true)
}

pub fn rsqrt(f: &Formula) -> Built {
    unary(Kind::Rsqrt, f, false)
}

pub fn square(f: &Formula) -> Built {
    unary(Kind::Square, f, true)
}

pub fn inv(f: &Formula) -> Built {
    unary(Kind::Inv, f, false)
}

pub fn abs(f: &Formula) -> Built {
    unary(Kind::Abs, f, true)
}

pub fn sign(f: &Formula) -> Built {
    unary(Kind::Sign, f, true)
}

pub fn step(f: &Formula) -> Built {
    unary(Kind::Step, f, false)
}

pub fn relu(f: &Formula) -> Built {
    unary(Kind::ReLU, f, true)
}

pub fn pow(f: &Formula, m: i64) -> Built {
    check(&Kind::Pow(m), &[f])?;
    match m {
        1 => rewrite("x^1", Ok(f.clone())),
        2 => rewrite("x^2", square(f)),
        _ => unary(Kind::Pow(m), f, m > 0),
    }
}

pub fn clamp_int(f: &Formula, a: i64, b: i64) -> Built {
    unary(Kind::ClampInt(a, b), f, false)
}

pub fn diff_clamp_int(f: &Formula, a: i64, b: i64) -> Built {
    unary(Kind::DiffClampInt(a, b), f, false)
}

// ── Elementwise binary ──────────────────────────────────────────────────────

pub fn add(a: &Formula, b: &Formula) -> Built {
    let dim = check(&Kind::Add, &[a, b])?;
    if a.is_zero() {
        return rewrite("0 + x", broadcast(b, dim));
    }
    if b.is_zero() {
        return rewrite("x + 0", broadcast(a, dim));
    }
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if let Some(sum) = x.checked_add(y) {
            return rewrite("IntCst + IntCst", Ok(int_cst(sum)));
        }
    }
    if a == b {
        return rewrite("x + x", mult(&int_cst(2), a));
    }
    node(Kind::Add, &[a, b])
}

pub fn sub(a: &Formula, b: &Formula) -> Built {
    let dim = check(&Kind::Subtract, &[a, b])?;
    if b.is_zero() {
        return rewrite("x - 0", broadcast(a, dim));
    }
    if a.is_zero() {
        return rewrite("0 - x", broadcast(&minus(b)?, dim));
    }
    if a == b {
        return rewrite("x - x", zero(dim));
    }
    if let (Some(x), Some(y)) = (a.as_int(), b.as_int()) {
        if let Some(diff) = x.checked_sub(y) {
            return rewrite("IntCst - IntCst", Ok(int_cst(diff)));
        }
    }
    node(Kind::Subtract, &[a, b])
}

pub fn mult(a: &Formula, b: &Formula) -> Built {
    let dim = check(&Kind::Mult, &[a, b])?;
    if a.is_zero() || b.is_zero() {
        return rewrite("0 * x", zero(dim));
    }
    match (a.as_int(), b.as_int()) {
        (Some(x), Some(y)) => {
            if let Some(prod) = x.checked_mul(y) {
                return rewrite("IntCst * IntCst", Ok(int_cst(prod)));
            }
        }
        (None, Some(_)) => return rewrite("x * IntCst", mult(b, a)),
        (Some(1), None) => return rewrite("1 * x", Ok(b.clone())),
        (Some(x), None) => {
            if let Kind::Mult = b.kind() {
                if let Some(y) = b.child(0).as_int() {
                    if let Some(prod) = x.checked_mul(y) {
                        return rewrite("IntCst * (IntCst * x)", mult(&int_cst(prod), b.child(1)));
                    }
                }
            }
        }
        (None, None) => {}
    }
    node(Kind::Mult, &[a, b])
}

pub fn divide(a: &Formula, b: &Formula) -> Built {
    let dim = check(&Kind::Divide, &[a, b])?;
    if a.is_zero() {
        return rewrite("0 / x", zero(dim));
    }
    if b.as_int() == Some(1) {
        return rewrite("x / 1", broadcast(a, dim));
    }
    node(Kind::Divide, &[a, b])
}

// ── Reductions and vector operations ────────────────────────────────────────

pub fn sum(f: &Formula) -> Built {
    check(&Kind::Sum, &[f])?;
    if f.is_zero() {
        return rewrite("Sum(0)", zero(1));
    }
    if f.dim() == 1 {
        return rewrite("Sum(scalar)", Ok(f.clone()));
    }
    node(Kind::Sum, &[f])
}

/// Adjoint of `Sum`: replicate a scalar `dim` times.
pub fn sum_t(f: &Formula, dim: usize) -> Built {
    check(&Kind::SumT(dim), &[f])?;
    if f.is_zero() {
        return rewrite("SumT(0)", zero(dim));
    }
    if dim == 1 {
        return rewrite("SumT(x, 1)", Ok(f.clone()));
    }
    node(Kind::SumT(dim), &[f])
}

fn extremum(kind: Kind, f: &Formula) -> Built {
    check(&kind, &[f])?;
    let is_arg = matches!(kind, Kind::ArgMax | Kind::ArgMin);
    if f.dim() == 1 {
        return if is_arg {
            rewrite("Arg*(scalar)", zero(1))
        } else {
            rewrite("Max/Min(scalar)", Ok(f.clone()))
        };
    }
    if f.is_zero() {
        return rewrite("Max/Min(0)", zero(1));
    }
    node(kind, &[f])
}

pub fn max(f: &Formula) -> Built {
    extremum(Kind::Max, f)
}

pub fn min(f: &Formula) -> Built {
    extremum(Kind::Min, f)
}

pub fn arg_max(f: &Formula) -> Built {
    extremum(Kind::ArgMax, f)
}

pub fn arg_min(f: &Formula) -> Built {
    extremum(Kind::ArgMin, f)
}

/// Indicator vector of dimension `dim` with a 1 at position `round(f)`.
pub fn one_hot(f: &Formula, dim: usize) -> Built {
    check(&Kind::OneHot(dim), &[f])?;
    node(Kind::OneHot(dim), &[f])
}

pub fn sq_norm2(f: &Formula) -> Built {
    unary_to_scalar(Kind::SqNorm2, f)
}

fn unary_to_scalar(kind: Kind, f: &Formula) -> Built {
    check(&kind, &[f])?;
    if f.is_zero() {
        return rewrite("reduce(0)", zero(1));
    }
    node(kind, &[f])
}

pub fn scalprod(a: &Formula, b: &Formula) -> Built {
    binary_absorbing(Kind::Scalprod, a, b)
}

/// A binary kind whose value vanishes when either operand is zero.
fn binary_absorbing(kind: Kind, a: &Formula, b: &Formula) -> Built {
    let dim = check(&kind, &[a, b])?;
    if a.is_zero() || b.is_zero() {
        return rewrite("bilinear(0)", zero(dim));
    }
    node(kind, &[a, b])
}

pub fn norm2(f: &Formula) -> Built {
    sqrt(&sq_norm2(f)?)
}

pub fn normalize(f: &Formula) -> Built {
    mult(&rsqrt(&sq_norm2(f)?)?, f)
}

pub fn sq_dist(a: &Formula, b: &Formula) -> Built {
    sq_norm2(&sub(a, b)?)
}

// ── Weighted squared norms ──────────────────────────────────────────────────
//
// The weight `w` is a scalar, a diagonal, or a full `n × n` matrix stored
// row-major for an operand of dimension `n`.

/// `w · |f|²`
pub fn sq_norm_iso(w: &Formula, f: &Formula) -> Built {
    if w.dim() != 1 {
        return Err(DimError::new(
            "SqNormIso",
            format!("weight must have dimension 1, found {}", w.dim()),
        ));
    }
    mult(w, &sq_norm2(f)?)
}

/// `Σ w_k · f_k²`
pub fn sq_norm_diag(w: &Formula, f: &Formula) -> Built {
    if w.dim() != f.dim() {
        return Err(DimError::new(
            "SqNormDiag",
            format!(
                "weight dimension {} must match operand dimension {}",
                w.dim(),
                f.dim()
            ),
        ));
    }
    sum(&mult(w, &square(f)?)?)
}

/// `<f, W f>`
pub fn sym_sq_norm(w: &Formula, f: &Formula) -> Built {
    if f.dim().checked_mul(f.dim()) != Some(w.dim()) {
        return Err(DimError::new(
            "SymSqNorm",
            format!(
                "weight dimension {} is not the square of operand dimension {}",
                w.dim(),
                f.dim()
            ),
        ));
    }
    scalprod(f, &mat_vec_mult(w, f)?)
}

/// Picks the isotropic, diagonal, or full form from the weight's dimension.
pub fn weighted_sq_norm(w: &Formula, f: &Formula) -> Built {
    match w.dim() {
        1 => sq_norm_iso(w, f),
        d if d == f.dim() => sq_norm_diag(w, f),
        _ => sym_sq_norm(w, f),
    }
}

pub fn weighted_sq_dist(w: &Formula, a: &Formula, b: &Formula) -> Built {
    weighted_sq_norm(w, &sub(a, b)?)
}

// ── Extraction and concatenation ────────────────────────────────────────────

pub fn extract(f: &Formula, start: usize, dim: usize) -> Built {
    let kind = Kind::Extract { start, dim };
    check(&kind, &[f])?;
    if f.is_zero() {
        return rewrite("Extract(0)", zero(dim));
    }
    if start == 0 && dim == f.dim() {
        return rewrite("Extract(all)", Ok(f.clone()));
    }
    node(kind, &[f])
}

/// Adjoint of `Extract`: embed `f` at `start` in a zero vector of `dim`.
pub fn extract_t(f: &Formula, start: usize, dim: usize) -> Built {
    let kind = Kind::ExtractT { start, dim };
    check(&kind, &[f])?;
    if f.is_zero() {
        return rewrite("ExtractT(0)", zero(dim));
    }
    if start == 0 && dim == f.dim() {
        return rewrite("ExtractT(all)", Ok(f.clone()));
    }
    node(kind, &[f])
}

pub fn elem(f: &Formula, m: usize) -> Built {
    extract(f, m, 1)
}

pub fn elem_t(f: &Formula, n: usize, m: usize) -> Built {
    extract_t(f, m, n)
}

pub fn concat(a: &Formula, b: &Formula) -> Built {
    let dim = check(&Kind::Concat, &[a, b])?;
    if a.is_zero() && b.is_zero() {
        return rewrite("Concat(0, 0)", zero(dim));
    }
    node(Kind::Concat, &[a, b])
}

// ── Tensor products ─────────────────────────────────────────────────────────

pub fn mat_vec_mult(a: &Formula, v: &Formula) -> Built {
    binary_absorbing(Kind::MatVecMult, a, v)
}

pub fn vec_mat_mult(v: &Formula, a: &Formula) -> Built {
    binary_absorbing(Kind::VecMatMult, v, a)
}

pub fn tensor_prod(a: &Formula, b: &Formula) -> Built {
    binary_absorbing(Kind::TensorProd, a, b)
}

// ── Complex numbers ─────────────────────────────────────────────────────────

/// Sum the (re, im) pairs of `f` into one complex number.
pub fn complex_sum(f: &Formula) -> Built {
    check(&Kind::ComplexSum, &[f])?;
    if f.is_zero() {
        return rewrite("ComplexSum(0)", zero(2));
    }
    if f.dim() == 2 {
        return rewrite("ComplexSum(pair)", Ok(f.clone()));
    }
    node(Kind::ComplexSum, &[f])
}

/// Adjoint of `ComplexSum`: replicate a complex number `dim / 2` times.
pub fn complex_sum_t(f: &Formula, dim: usize) -> Built {
    check(&Kind::ComplexSumT(dim), &[f])?;
    if f.is_zero() {
        return rewrite("ComplexSumT(0)", zero(dim));
    }
    if dim == 2 {
        return rewrite("ComplexSumT(x, 2)", Ok(f.clone()));
    }
    node(Kind::ComplexSumT(dim), &[f])
}

fn complex_unary(kind: Kind, f: &Formula) -> Built {
    let dim = check(&kind, &[f])?;
    if f.is_zero() {
        return rewrite("complex(0)", zero(dim));
    }
    node(kind, &[f])
}

pub fn complex_real(f: &Formula) -> Built {
    complex_unary(Kind::ComplexReal, f)
}

pub fn complex_imag(f: &Formula) -> Built {
    complex_unary(Kind::ComplexImag, f)
}

pub fn real2complex(f: &Formula) -> Built {
    complex_unary(Kind::Real2Complex, f)
}

pub fn imag2complex(f: &Formula) -> Built {
    complex_unary(Kind::Imag2Complex, f)
}

pub fn conj(f: &Formula) -> Built {
    check(&Kind::Conj, &[f])?;
    if let Kind::Conj = f.kind() {
        return rewrite("Conj(Conj(x))", Ok(f.child(0).clone()));
    }
    complex_unary(Kind::Conj, f)
}

pub fn complex_mult(a: &Formula, b: &Formula) -> Built {
    binary_absorbing(Kind::ComplexMult, a, b)
}

// ── Generic entry points ────────────────────────────────────────────────────

/// Build `kind` over `children` through its simplifying constructor.
pub fn make(kind: &Kind, children: &[Formula]) -> Built {
    if children.len() != kind.arity() {
        return Err(DimError::new(
            kind.name(),
            format!(
                "expected {} operand(s), found {}",
                kind.arity(),
                children.len()
            ),
        ));
    }
    let a = || &children[0];
    let b = || &children[1];
    match kind {
        Kind::Var(v) => Ok(var(*v)),
        Kind::Zero(d) => zero(*d),
        Kind::IntCst(n) => Ok(int_cst(*n)),
        Kind::RatCst(p, q) => rat_cst(*p, *q),
        Kind::Minus => minus(a()),
        Kind::Exp => exp(a()),
        Kind::Log => log(a()),
        Kind::Sin => sin(a()),
        Kind::Cos => cos(a()),
        Kind::Sqrt => sqrt(a()),
        Kind::Rsqrt => rsqrt(a()),
        Kind::Square => square(a()),
        Kind::Inv => inv(a()),
        Kind::Abs => abs(a()),
        Kind::Sign => sign(a()),
        Kind::Step => step(a()),
        Kind::ReLU => relu(a()),
        Kind::Pow(m) => pow(a(), *m),
        Kind::ClampInt(lo, hi) => clamp_int(a(), *lo, *hi),
        Kind::DiffClampInt(lo, hi) => diff_clamp_int(a(), *lo, *hi),
        Kind::Add => add(a(), b()),
        Kind::Subtract => sub(a(), b()),
        Kind::Mult => mult(a(), b()),
        Kind::Divide => divide(a(), b()),
        Kind::Sum => sum(a()),
        Kind::SumT(d) => sum_t(a(), *d),
        Kind::Max => max(a()),
        Kind::Min => min(a()),
        Kind::ArgMax => arg_max(a()),
        Kind::ArgMin => arg_min(a()),
        Kind::OneHot(d) => one_hot(a(), *d),
        Kind::SqNorm2 => sq_norm2(a()),
        Kind::Scalprod => scalprod(a(), b()),
        Kind::Extract { start, dim } => extract(a(), *start, *dim),
        Kind::ExtractT { start, dim } => extract_t(a(), *start, *dim),
        Kind::Concat => concat(a(), b()),
        Kind::MatVecMult => mat_vec_mult(a(), b()),
        Kind::VecMatMult => vec_mat_mult(a(), b()),
        Kind::TensorProd => tensor_prod(a(), b()),
        Kind::ComplexSum => complex_sum(a()),
        Kind::ComplexSumT(d) => complex_sum_t(a(), *d),
        Kind::ComplexReal => complex_real(a()),
        Kind::ComplexImag => complex_imag(a()),
        Kind::Real2Complex => real2complex(a()),
        Kind::Imag2Complex => imag2complex(a()),
        Kind::Conj => conj(a()),
        Kind::ComplexMult => complex_mult(a(), b()),
    }
}

/// Re-apply the simplifying constructors bottom-up.
pub fn rebuild(f: &Formula) -> Built {
    let children = f
        .children()
        .iter()
        .map(rebuild)
        .collect::<Result<Vec<_>, _>>()?;
    make(f.kind(), &children)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Category;

    fn vi(index: usize, dim: usize) -> Formula {
        var(Var::new(Category::I, index, dim).unwrap())
    }

    #[test]
    fn weighted_norm_dispatches_on_weight_dimension() {
        let x = vi(0, 3);
        let (w1, w3, w9) = (vi(1, 1), vi(2, 3), vi(3, 9));
        assert_eq!(weighted_sq_norm(&w1, &x).unwrap(), sq_norm_iso(&w1, &x).unwrap());
        assert_eq!(weighted_sq_norm(&w3, &x).unwrap(), sq_norm_diag(&w3, &x).unwrap());
        assert_eq!(weighted_sq_norm(&w9, &x).unwrap(), sym_sq_norm(&w9, &x).unwrap());
        assert!(weighted_sq_norm(&vi(4, 4), &x).is_err());
        assert!(sq_norm_iso(&w3, &x).is_err());
        assert!(sq_norm_diag(&w9, &x).is_err());

        let d = weighted_sq_dist(&w1, &x, &vi(5, 3)).unwrap();
        assert_eq!(d.dim(), 1);
        assert!(weighted_sq_dist(&w1, &x, &x).unwrap().is_zero());
    }

    #[test]
    fn zero_absorbs_multiplication_with_broadcast() {
        let x = vi(0, 3);
        let f = mult(&zero(1).unwrap(), &x).unwrap();
        assert_eq!(f, zero(3).unwrap());
        let g = mult(&x, &zero(3).unwrap()).unwrap();
        assert_eq!(g, zero(3).unwrap());
    }

    #[test]
    fn zero_absorption_still_checks_dimensions() {
        let x = vi(0, 3);
        assert!(mult(&zero(2).unwrap(), &x).is_err());
    }

    #[test]
    fn integer_constant_moves_first() {
        let x = vi(0, 3);
        let f = mult(&x, &int_cst(5)).unwrap();
        assert_eq!(f.signature(), "Mult<3>(IntCst<1>[5],Var<3>[i,0])");
    }

    #[test]
    fn integer_constants_fold() {
        let x = vi(0, 2);
        assert_eq!(mult(&int_cst(3), &int_cst(4)).unwrap(), int_cst(12));
        let nested = mult(&int_cst(2), &mult(&int_cst(3), &x).unwrap()).unwrap();
        assert_eq!(nested, mult(&int_cst(6), &x).unwrap());
        assert_eq!(mult(&int_cst(1), &x).unwrap(), x);
    }

    #[test]
    fn int_zero_is_zero() {
        assert!(int_cst(0).is_zero());
        assert_eq!(rat_cst(0, 5).unwrap(), zero(1).unwrap());
    }

    #[test]
    fn rationals_normalize() {
        assert_eq!(rat_cst(2, -4).unwrap().signature(), "RatCst<1>[-1,2]");
        assert_eq!(rat_cst(6, 3).unwrap(), int_cst(2));
        assert!(rat_cst(1, 0).is_err());
    }

    #[test]
    fn add_rules() {
        let x = vi(0, 3);
        assert_eq!(add(&zero(3).unwrap(), &x).unwrap(), x);
        assert_eq!(add(&x, &x).unwrap(), mult(&int_cst(2), &x).unwrap());
        let s = vi(1, 1);
        assert_eq!(
            add(&zero(3).unwrap(), &s).unwrap(),
            sum_t(&s, 3).unwrap()
        );
        assert_eq!(add(&int_cst(2), &int_cst(3)).unwrap(), int_cst(5));
    }

    #[test]
    fn subtract_and_minus_rules() {
        let x = vi(0, 3);
        assert!(sub(&x, &x).unwrap().is_zero());
        assert_eq!(sub(&zero(3).unwrap(), &x).unwrap(), minus(&x).unwrap());
        assert_eq!(minus(&minus(&x).unwrap()).unwrap(), x);
        assert_eq!(minus(&int_cst(4)).unwrap(), int_cst(-4));
    }

    #[test]
    fn reductions_of_zero_and_scalars() {
        let s = vi(0, 1);
        assert_eq!(sum(&s).unwrap(), s);
        assert_eq!(sum(&zero(4).unwrap()).unwrap(), zero(1).unwrap());
        assert_eq!(max(&s).unwrap(), s);
        assert!(arg_max(&s).unwrap().is_zero());
        assert_eq!(sum_t(&s, 1).unwrap(), s);
    }

    #[test]
    fn extraction_identity() {
        let x = vi(0, 3);
        assert_eq!(extract(&x, 0, 3).unwrap(), x);
        assert_eq!(extract(&zero(3).unwrap(), 1, 2).unwrap(), zero(2).unwrap());
        assert_eq!(elem(&x, 2).unwrap().dim(), 1);
    }

    #[test]
    fn complex_sum_t_rejects_non_pair_before_zero_rewrite() {
        let err = complex_sum_t(&zero(3).unwrap(), 4).unwrap_err();
        assert_eq!(err.kind, "ComplexSumT");
    }

    #[test]
    fn pow_rewrites() {
        let x = vi(0, 2);
        assert_eq!(pow(&x, 1).unwrap(), x);
        assert_eq!(pow(&x, 2).unwrap(), square(&x).unwrap());
        assert_eq!(pow(&x, 3).unwrap().kind(), &Kind::Pow(3));
    }

    #[test]
    fn conj_is_an_involution() {
        let z = vi(0, 4);
        assert_eq!(conj(&conj(&z).unwrap()).unwrap(), z);
    }

    #[test]
    fn rebuild_is_identity_on_simplified_graphs() {
        let x = vi(0, 3);
        let y = var(Var::new(Category::J, 1, 3).unwrap());
        let f = mult(
            &exp(&minus(&sq_dist(&x, &y).unwrap()).unwrap()).unwrap(),
            &mult(&x, &int_cst(2)).unwrap(),
        )
        .unwrap();
        assert_eq!(rebuild(&f).unwrap().signature(), f.signature());
    }

    #[test]
    fn make_checks_arity() {
        let x = vi(0, 3);
        assert!(make(&Kind::Add, &[x]).is_err());
    }
}
