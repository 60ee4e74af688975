// Property-based tests for compiler invariants.
//
// Three categories:
// 1. Notation roundtrip: a resolved formula prints in call notation that
//    parses and resolves back to the same formula
// 2. Simplifier idempotence: rebuilding a simplified graph changes nothing
// 3. Emission: deterministic output, one fragment per distinct non-leaf node
//
// Uses proptest with explicit configuration to prevent CI flakiness.

use kfc::emit::{EmitOptions, Slot};
use kfc::formula::Formula;
use kfc::resolve::Bindings;
use proptest::prelude::*;

// ── Test helpers ────────────────────────────────────────────────────────────

fn bindings() -> Bindings {
    let mut b = Bindings::new();
    for decl in ["x = Vi(0, 3)", "y = Vj(1, 3)", "s = Pm(2, 1)"] {
        let alias = kfc::parser::parse_alias(decl).output.unwrap();
        b.declare(&alias).unwrap();
    }
    b
}

fn resolve(source: &str, bindings: &Bindings) -> Result<Formula, String> {
    let parsed = kfc::parser::parse(source);
    if !parsed.errors.is_empty() {
        return Err(format!("parse errors: {:?}", parsed.errors));
    }
    let ast = parsed.output.ok_or("no output")?;
    let result = kfc::resolve::resolve(&ast, bindings);
    result
        .formula
        .ok_or_else(|| format!("diagnostics: {:?}", result.diagnostics))
}

// ── Formula generator ───────────────────────────────────────────────────────

/// Infix formulas over `x`, `y` (dim 3), `s` (dim 1) and small integers.
/// Every operand pair has equal dimensions or a dimension-1 side, so all
/// generated formulas are well-formed.
fn arb_formula() -> impl Strategy<Value = String> {
    let leaf = prop_oneof![
        Just("x".to_string()),
        Just("y".to_string()),
        Just("s".to_string()),
        (1i64..4).prop_map(|n| n.to_string()),
    ];
    leaf.prop_recursive(4, 32, 2, |inner| {
        prop_oneof![
            (
                prop::sample::select(vec!["Exp", "Sin", "Cos", "Square", "Abs", "Minus", "ReLU"]),
                inner.clone()
            )
                .prop_map(|(f, a)| format!("{}({})", f, a)),
            (inner.clone(), prop::sample::select(vec!["+", "-", "*"]), inner.clone())
                .prop_map(|(a, op, b)| format!("({} {} {})", a, op, b)),
            inner.clone().prop_map(|a| format!("Sum({}) * x", a)),
            (inner.clone(), inner).prop_map(|(a, b)| format!("(Sum({}) | Sum({}))", a, b)),
        ]
    })
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    #[test]
    fn call_notation_roundtrips(source in arb_formula()) {
        let b = bindings();
        let f = resolve(&source, &b).map_err(TestCaseError::fail)?;
        let printed = f.to_string();
        let back = resolve(&printed, &Bindings::new()).map_err(TestCaseError::fail)?;
        prop_assert_eq!(back.signature(), f.signature(), "printed as {}", printed);
    }

    #[test]
    fn rebuild_is_idempotent(source in arb_formula()) {
        let f = resolve(&source, &bindings()).map_err(TestCaseError::fail)?;
        let once = kfc::simplify::rebuild(&f).unwrap();
        prop_assert_eq!(&once, &f);
        prop_assert_eq!(kfc::simplify::rebuild(&once).unwrap(), once);
    }

    #[test]
    fn emission_is_deterministic_and_shares_subgraphs(source in arb_formula()) {
        let f = resolve(&source, &bindings()).map_err(TestCaseError::fail)?;
        let out = Slot::new("out", f.dim());
        let a = kfc::kernel::compile(&f, &out, &EmitOptions::default()).unwrap();
        let b = kfc::kernel::compile(&f, &out, &EmitOptions::default()).unwrap();
        let opts = kfc::codegen::CodegenOptions::default();
        prop_assert_eq!(
            kfc::codegen::render_cpp(&a, &opts),
            kfc::codegen::render_cpp(&b, &opts)
        );

        let order = f.post_order();
        let leaves = order.iter().filter(|n| n.as_var().is_some()).count();
        let expected = if f.as_var().is_some() { 1 } else { order.len() - leaves };
        prop_assert_eq!(a.fragments.len(), expected);
        prop_assert_eq!(a.fragments.last().map(|frag| frag.out.name.as_str()), Some("out"));
    }

    #[test]
    fn gradients_have_variable_dimension(source in arb_formula()) {
        let f = resolve(&source, &bindings()).map_err(TestCaseError::fail)?;
        let g = kfc::simplify::var(
            kfc::formula::Var::new(kfc::formula::Category::I, 7, f.dim()).unwrap(),
        );
        for binding in bindings().iter() {
            let d = kfc::autodiff::grad(&f, &binding.var, &g).unwrap();
            prop_assert_eq!(d.dim(), binding.var.dim);
        }
    }
}

// ── Dimension contracts ─────────────────────────────────────────────────────

#[test]
fn dimension_contracts_are_enforced() {
    use kfc::formula::{Category, Var};
    use kfc::simplify as s;

    let v = |i: usize, d: usize| s::var(Var::new(Category::I, i, d).unwrap());
    let (a2, a3, a4, a5, a6) = (v(0, 2), v(1, 3), v(2, 4), v(3, 5), v(4, 6));

    assert!(s::add(&a2, &a3).is_err());
    assert!(s::mult(&a3, &a4).is_err());
    assert!(s::scalprod(&a2, &a4).is_err());
    assert!(s::sq_dist(&a3, &a4).is_err());
    assert!(s::extract(&a3, 2, 2).is_err());
    assert!(s::extract_t(&a3, 1, 3).is_err());
    assert!(s::mat_vec_mult(&a5, &a2).is_err());
    assert!(s::vec_mat_mult(&a4, &a6).is_err());
    assert!(s::complex_sum(&a3).is_err());
    assert!(s::complex_sum_t(&a4, 4).is_err());
    assert!(s::complex_sum_t(&a2, 5).is_err());
    assert!(s::complex_real(&a5).is_err());
    assert!(s::complex_mult(&a2, &a4).is_err());
    assert!(s::conj(&a3).is_err());
    assert!(s::zero(0).is_err());
    assert!(s::rat_cst(1, 0).is_err());
    assert!(Var::new(Category::J, 0, 0).is_err());
    assert!(s::sub(&a2, &a4).is_err());
    assert!(s::divide(&a3, &a2).is_err());
    assert!(s::sum_t(&a2, 4).is_err());
    assert!(s::one_hot(&a3, 3).is_err());
    assert!(s::clamp_int(&a3, 2, 1).is_err());
    assert!(s::diff_clamp_int(&a3, 5, -5).is_err());
    assert!(s::extract_t(&a3, 2, 4).is_err());
    assert!(s::sq_norm_iso(&a2, &a3).is_err());
    assert!(s::sq_norm_diag(&a2, &a3).is_err());
    assert!(s::sym_sq_norm(&a6, &a3).is_err());

    // Output dimensions that do not fit in a `usize`.
    let wide = v(7, 1 << (usize::BITS / 2));
    let half = v(8, usize::MAX / 2 + 1);
    assert!(s::tensor_prod(&wide, &wide).is_err());
    assert!(s::concat(&half, &half).is_err());
    assert!(s::real2complex(&half).is_err());
    assert!(s::imag2complex(&half).is_err());

    assert_eq!(s::add(&a3, &s::int_cst(2)).unwrap().dim(), 3);
    assert_eq!(s::mat_vec_mult(&a6, &a2).unwrap().dim(), 3);
    assert_eq!(s::tensor_prod(&a2, &a3).unwrap().dim(), 6);
    assert_eq!(s::complex_sum_t(&a2, 6).unwrap().dim(), 6);
    assert_eq!(s::concat(&a2, &a3).unwrap().dim(), 5);
    assert_eq!(s::extract_t(&a3, 1, 4).unwrap().dim(), 4);
    assert_eq!(s::sym_sq_norm(&s::tensor_prod(&a3, &a3).unwrap(), &a3).unwrap().dim(), 1);
}
