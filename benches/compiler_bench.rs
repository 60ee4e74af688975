use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use kfc::*;

// Benchmark scenarios. Every formula resolves against `ALIASES`.

const ALIASES: &[&str] = &[
    "x = Vi(0, 3)",
    "y = Vj(1, 3)",
    "b = Vj(2, 3)",
    "z = Vi(3, 8)",
    "w = Vj(4, 8)",
    "s = Pm(5, 1)",
];

const GAUSSIAN: &str = "Exp(-SqDist(x, y) * s) * b";
const LAPLACE: &str = "Exp(-Sqrt(SqDist(x, y) + IntInv(100))) * b";
const COMPLEX: &str = "ComplexReal(ComplexSum(ComplexMult(z, Conj(w)))) * s";
const TENSOR: &str = "MatVecMult(TensorProd(x, y), b) + VecMatMult(b, TensorProd(y, x))";

fn scenarios() -> [(&'static str, &'static str); 4] {
    [
        ("gaussian", GAUSSIAN),
        ("laplace", LAPLACE),
        ("complex", COMPLEX),
        ("tensor", TENSOR),
    ]
}

fn bindings() -> resolve::Bindings {
    let mut b = resolve::Bindings::new();
    for decl in ALIASES {
        let alias = parser::parse_alias(decl).output.unwrap();
        b.declare(&alias).unwrap();
    }
    b
}

fn build(source: &str, bindings: &resolve::Bindings) -> formula::Formula {
    let ast = parser::parse(source).output.unwrap();
    resolve::resolve(&ast, bindings).formula.unwrap()
}

/// A sum of `n` gaussian terms over distinct variable pairs.
fn generate_sum(n: usize) -> (Vec<String>, String) {
    let mut aliases = Vec::new();
    let mut terms = Vec::new();
    for t in 0..n {
        aliases.push(format!("x{} = Vi({}, 3)", t, 2 * t));
        aliases.push(format!("y{} = Vj({}, 3)", t, 2 * t + 1));
        terms.push(format!("Exp(-SqDist(x{t}, y{t}))"));
    }
    (aliases, terms.join(" + "))
}

fn bench_parse(c: &mut Criterion) {
    let mut group = c.benchmark_group("parse");
    for (name, source) in scenarios() {
        group.bench_function(name, |b| {
            b.iter(|| {
                let r = parser::parse(black_box(source));
                black_box(&r.output);
            });
        });
    }
    group.finish();
}

fn bench_resolve(c: &mut Criterion) {
    let bindings = bindings();
    let mut group = c.benchmark_group("resolve");
    for (name, source) in scenarios() {
        let ast = parser::parse(source).output.unwrap();
        group.bench_function(name, |b| {
            b.iter(|| {
                let r = resolve::resolve(black_box(&ast), &bindings);
                black_box(&r.formula);
            });
        });
    }
    group.finish();
}

fn bench_grad(c: &mut Criterion) {
    let bindings = bindings();
    let mut group = c.benchmark_group("grad");
    for (name, source) in scenarios() {
        let f = build(source, &bindings);
        let v = f.vars()[0];
        let g = simplify::var(formula::Var::new(formula::Category::I, 99, f.dim()).unwrap());
        group.bench_function(name, |b| {
            b.iter(|| black_box(autodiff::grad(black_box(&f), &v, &g).unwrap()));
        });
    }
    group.finish();
}

fn bench_emit(c: &mut Criterion) {
    let bindings = bindings();
    let opts = codegen::CodegenOptions::default();
    let mut group = c.benchmark_group("emit_and_render");
    for (name, source) in scenarios() {
        group.bench_function(name, |b| {
            b.iter_batched(
                || build(source, &bindings),
                |f| {
                    let out = emit::Slot::new("out", f.dim());
                    let body = kernel::compile(&f, &out, &emit::EmitOptions::default()).unwrap();
                    black_box(codegen::render_cpp(&body, &opts));
                },
                BatchSize::SmallInput,
            );
        });
    }
    group.finish();
}

fn bench_full_pipeline(c: &mut Criterion) {
    let options = pipeline::PipelineOptions::default();
    let mut group = c.benchmark_group("full_pipeline");
    for n in [1_usize, 4, 16, 64] {
        let (aliases, formula) = generate_sum(n);
        group.bench_with_input(BenchmarkId::from_parameter(format!("{}terms", n)), &n, |b, _| {
            b.iter(|| {
                let request = pipeline::Request {
                    formula: formula.clone(),
                    aliases: aliases.clone(),
                    grad: Some("x0".to_string()),
                    gradin: None,
                };
                let mut state = pipeline::CompilationState::new(request);
                let r = pipeline::run_pipeline(&mut state, pipeline::Phase::Render, &options, |_, _| {});
                assert!(r.is_ok());
                black_box(&state.cpp);
            });
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    bench_parse,
    bench_resolve,
    bench_grad,
    bench_emit,
    bench_full_pipeline
);
criterion_main!(benches);
