// autodiff.rs: Reverse-mode symbolic differentiation
//
// `grad(f, v, gradin)` builds the adjoint graph of `f` with respect to the
// variable `v`, given the incoming adjoint `gradin` (same dimension as `f`).
// The result is an ordinary formula of dimension `v.dim`, so it can be
// differentiated again. Contributions reaching `v` along several paths are
// summed through the simplifying `add` constructor.
//
// Preconditions: `gradin.dim() == f.dim()`.
// Postconditions: result dimension == `v.dim`; `Zero(v.dim)` when `f` does
//                 not depend on `v`.
// Failure modes: mismatched adjoint dimension, or a variable occurring with
//                the identity of `v` but another dimension → `DimError`.
// Side effects: none.

use crate::catalog::Kind;
use crate::formula::{DimError, Formula, Var};
use crate::simplify as s;

/// Adjoint of `f` with respect to `v`, seeded with `gradin`.
pub fn grad(f: &Formula, v: &Var, gradin: &Formula) -> Result<Formula, DimError> {
    if gradin.dim() != f.dim() {
        return Err(DimError::new(
            "Grad",
            format!(
                "incoming adjoint has dimension {}, formula has dimension {}",
                gradin.dim(),
                f.dim()
            ),
        ));
    }
    if !f.depends_on(v) {
        return s::zero(v.dim);
    }
    local(f, v, gradin)
}

/// Sum a full-size adjoint down to an operand that was broadcast.
fn reduce_to(g: &Formula, dim: usize) -> Result<Formula, DimError> {
    if g.dim() == dim {
        Ok(g.clone())
    } else {
        s::sum(g)
    }
}

fn local(f: &Formula, v: &Var, g: &Formula) -> Result<Formula, DimError> {
    let c = |i: usize| f.child(i);
    match f.kind() {
        Kind::Var(w) => {
            if w.dim != v.dim {
                return Err(DimError::new(
                    "Grad",
                    format!(
                        "{} occurs with dimension {}, differentiated with dimension {}",
                        w, w.dim, v.dim
                    ),
                ));
            }
            Ok(g.clone())
        }

        Kind::Zero(_)
        | Kind::IntCst(_)
        | Kind::RatCst(..)
        | Kind::Sign
        | Kind::Step
        | Kind::DiffClampInt(..)
        | Kind::ArgMax
        | Kind::ArgMin
        | Kind::OneHot(_) => s::zero(v.dim),

        // ── Elementwise unary: grad(x, f'(x) * g) ──
        Kind::Minus => grad(c(0), v, &s::minus(g)?),
        Kind::Exp => grad(c(0), v, &s::mult(f, g)?),
        Kind::Log => grad(c(0), v, &s::divide(g, c(0))?),
        Kind::Sin => grad(c(0), v, &s::mult(&s::cos(c(0))?, g)?),
        Kind::Cos => grad(c(0), v, &s::minus(&s::mult(&s::sin(c(0))?, g)?)?),
        Kind::Sqrt => grad(c(0), v, &s::divide(g, &s::mult(&s::int_cst(2), f)?)?),
        Kind::Rsqrt => {
            let dx = s::mult(&s::rat_cst(-1, 2)?, &s::mult(&s::pow(f, 3)?, g)?)?;
            grad(c(0), v, &dx)
        }
        Kind::Square => s::mult(&s::int_cst(2), &grad(c(0), v, &s::mult(c(0), g)?)?),
        Kind::Inv => grad(c(0), v, &s::minus(&s::mult(&s::square(f)?, g)?)?),
        Kind::Abs => grad(c(0), v, &s::mult(&s::sign(c(0))?, g)?),
        Kind::ReLU => grad(c(0), v, &s::mult(&s::step(c(0))?, g)?),
        Kind::Pow(m) => {
            if *m == 0 {
                return s::zero(v.dim);
            }
            let lowered = m.checked_sub(1).ok_or_else(|| {
                DimError::new("Pow", format!("exponent {} has no derivative exponent", m))
            })?;
            let dx = s::mult(&s::int_cst(*m), &s::mult(&s::pow(c(0), lowered)?, g)?)?;
            grad(c(0), v, &dx)
        }
        Kind::ClampInt(a, b) => {
            grad(c(0), v, &s::mult(&s::diff_clamp_int(c(0), *a, *b)?, g)?)
        }

        // ── Elementwise binary ──
        Kind::Add => {
            let ga = grad(c(0), v, &reduce_to(g, c(0).dim())?)?;
            let gb = grad(c(1), v, &reduce_to(g, c(1).dim())?)?;
            s::add(&ga, &gb)
        }
        Kind::Subtract => {
            let ga = grad(c(0), v, &reduce_to(g, c(0).dim())?)?;
            let gb = grad(c(1), v, &reduce_to(g, c(1).dim())?)?;
            s::sub(&ga, &gb)
        }
        Kind::Mult => {
            let (a, b) = (c(0), c(1));
            let (da, db) = if a.dim() == 1 && b.dim() > 1 {
                (s::scalprod(g, b)?, s::mult(a, g)?)
            } else if b.dim() == 1 && a.dim() > 1 {
                (s::mult(b, g)?, s::scalprod(g, a)?)
            } else {
                (s::mult(b, g)?, s::mult(a, g)?)
            };
            s::add(&grad(a, v, &da)?, &grad(b, v, &db)?)
        }
        Kind::Divide => {
            let (a, b) = (c(0), c(1));
            let da = reduce_to(&s::divide(g, b)?, a.dim())?;
            let db = s::minus(&s::divide(&s::mult(a, g)?, &s::square(b)?)?)?;
            let db = reduce_to(&db, b.dim())?;
            s::add(&grad(a, v, &da)?, &grad(b, v, &db)?)
        }

        // ── Reductions ──
        Kind::Sum => grad(c(0), v, &s::sum_t(g, c(0).dim())?),
        Kind::SumT(_) => grad(c(0), v, &s::sum(g)?),
        Kind::Max => {
            let hot = s::one_hot(&s::arg_max(c(0))?, c(0).dim())?;
            grad(c(0), v, &s::mult(&hot, g)?)
        }
        Kind::Min => {
            let hot = s::one_hot(&s::arg_min(c(0))?, c(0).dim())?;
            grad(c(0), v, &s::mult(&hot, g)?)
        }
        Kind::SqNorm2 => s::mult(&s::int_cst(2), &grad(c(0), v, &s::mult(g, c(0))?)?),
        Kind::Scalprod => {
            let ga = grad(c(0), v, &s::mult(g, c(1))?)?;
            let gb = grad(c(1), v, &s::mult(g, c(0))?)?;
            s::add(&ga, &gb)
        }

        // ── Extraction ──
        Kind::Extract { start, .. } => grad(c(0), v, &s::extract_t(g, *start, c(0).dim())?),
        Kind::ExtractT { start, .. } => grad(c(0), v, &s::extract(g, *start, c(0).dim())?),
        Kind::Concat => {
            let (a, b) = (c(0), c(1));
            let ga = grad(a, v, &s::extract(g, 0, a.dim())?)?;
            let gb = grad(b, v, &s::extract(g, a.dim(), b.dim())?)?;
            s::add(&ga, &gb)
        }

        // ── Tensor products ──
        Kind::MatVecMult => {
            let (m, x) = (c(0), c(1));
            let gm = grad(m, v, &s::tensor_prod(g, x)?)?;
            let gx = grad(x, v, &s::vec_mat_mult(g, m)?)?;
            s::add(&gm, &gx)
        }
        Kind::VecMatMult => {
            let (x, m) = (c(0), c(1));
            let gx = grad(x, v, &s::mat_vec_mult(m, g)?)?;
            let gm = grad(m, v, &s::tensor_prod(x, g)?)?;
            s::add(&gx, &gm)
        }
        Kind::TensorProd => {
            let (a, b) = (c(0), c(1));
            let ga = grad(a, v, &s::mat_vec_mult(g, b)?)?;
            let gb = grad(b, v, &s::vec_mat_mult(a, g)?)?;
            s::add(&ga, &gb)
        }

        // ── Complex ──
        Kind::ComplexSum => grad(c(0), v, &s::complex_sum_t(g, c(0).dim())?),
        Kind::ComplexSumT(_) => grad(c(0), v, &s::complex_sum(g)?),
        Kind::ComplexReal => grad(c(0), v, &s::real2complex(g)?),
        Kind::ComplexImag => grad(c(0), v, &s::imag2complex(g)?),
        Kind::Real2Complex => grad(c(0), v, &s::complex_real(g)?),
        Kind::Imag2Complex => grad(c(0), v, &s::complex_imag(g)?),
        Kind::Conj => grad(c(0), v, &s::conj(g)?),
        Kind::ComplexMult => {
            let (a, b) = (c(0), c(1));
            let ga = grad(a, v, &s::complex_mult(g, &s::conj(b)?)?)?;
            let gb = grad(b, v, &s::complex_mult(g, &s::conj(a)?)?)?;
            s::add(&ga, &gb)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::Category;

    fn var(cat: Category, index: usize, dim: usize) -> (Var, Formula) {
        let v = Var::new(cat, index, dim).unwrap();
        (v, s::var(v))
    }

    #[test]
    fn independent_formula_has_zero_gradient() {
        let (_, x) = var(Category::I, 0, 3);
        let (y, _) = var(Category::J, 1, 2);
        let (_, g) = var(Category::I, 5, 1);
        let f = s::sq_norm2(&x).unwrap();
        let d = grad(&f, &y, &g).unwrap();
        assert!(d.is_zero());
        assert_eq!(d.dim(), 2);
    }

    #[test]
    fn product_of_variable_with_itself_sums_paths() {
        let (xv, x) = var(Category::I, 0, 3);
        let (_, g) = var(Category::I, 5, 3);
        let f = s::mult(&x, &x).unwrap();
        let d = grad(&f, &xv, &g).unwrap();
        let expected = s::mult(&s::int_cst(2), &s::mult(&x, &g).unwrap()).unwrap();
        assert_eq!(d, expected);
    }

    #[test]
    fn gradient_dimension_is_variable_dimension() {
        let (xv, x) = var(Category::I, 0, 3);
        let (_, y) = var(Category::J, 1, 3);
        let (_, g) = var(Category::I, 5, 1);
        let f = s::exp(&s::minus(&s::sq_dist(&x, &y).unwrap()).unwrap()).unwrap();
        assert_eq!(grad(&f, &xv, &g).unwrap().dim(), 3);
    }

    #[test]
    fn pow_at_minimum_exponent_is_an_error() {
        let (xv, x) = var(Category::I, 0, 2);
        let (_, g) = var(Category::I, 5, 2);
        let f = s::pow(&x, i64::MIN).unwrap();
        let err = grad(&f, &xv, &g).unwrap_err();
        assert_eq!(err.kind, "Pow");
        assert!(grad(&s::pow(&x, -3).unwrap(), &xv, &g).is_ok());
    }

    #[test]
    fn broadcast_operand_receives_summed_adjoint() {
        let (sv, sc) = var(Category::P, 0, 1);
        let (_, x) = var(Category::I, 0, 3);
        let (_, g) = var(Category::I, 5, 3);
        let f = s::add(&sc, &x).unwrap();
        let d = grad(&f, &sv, &g).unwrap();
        assert_eq!(d, s::sum(&g).unwrap());
    }

    #[test]
    fn scalar_factor_receives_scalar_product() {
        let (sv, sc) = var(Category::P, 0, 1);
        let (_, x) = var(Category::I, 0, 3);
        let (_, g) = var(Category::I, 5, 3);
        let f = s::mult(&sc, &x).unwrap();
        let d = grad(&f, &sv, &g).unwrap();
        assert_eq!(d, s::scalprod(&g, &x).unwrap());
    }

    #[test]
    fn complex_sum_t_backpropagates_through_complex_sum() {
        let (zv, z) = var(Category::I, 0, 2);
        let (_, g) = var(Category::I, 5, 4);
        let f = s::complex_sum_t(&z, 4).unwrap();
        let d = grad(&f, &zv, &g).unwrap();
        assert_eq!(d, s::complex_sum(&g).unwrap());
    }

    #[test]
    fn mismatched_adjoint_dimension_is_rejected() {
        let (xv, x) = var(Category::I, 0, 3);
        let (_, g) = var(Category::I, 5, 2);
        assert!(grad(&x, &xv, &g).is_err());
    }

    #[test]
    fn conflicting_variable_dimension_is_rejected() {
        let (_, x) = var(Category::I, 0, 3);
        let (_, g) = var(Category::I, 5, 3);
        let wrong = Var::new(Category::I, 0, 2).unwrap();
        assert!(grad(&x, &wrong, &g).is_err());
    }

    #[test]
    fn second_derivative_is_available() {
        let (xv, x) = var(Category::P, 0, 1);
        let one = s::int_cst(1);
        let f = s::pow(&x, 3).unwrap();
        let d1 = grad(&f, &xv, &one).unwrap();
        let d2 = grad(&d1, &xv, &one).unwrap();
        assert_eq!(d2.dim(), 1);
        assert!(d2.depends_on(&xv));
    }
}
