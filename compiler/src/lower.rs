// lower.rs: Per-kind emission of statement IR
//
// `Kind::emit` writes the value of one node into `out`, reading only the
// already-emitted operand slots in `args`. It never recurses into operands;
// ordering and slot sharing belong to the driver in `kernel`.
//
// Preconditions: `args` holds one slot per operand with the operand's
//                dimension; `out.dim` is the node's dimension.
// Postconditions: every component of `out` is written.
// Failure modes: none (dimensions were checked at construction).
// Side effects: allocates loop variables and temporaries from `ctx`.

use crate::catalog::Kind;
use crate::emit::{EmitCtx, Expr, Func, Idx, Slot, Stmt};

/// `out[k] = value(k)` for every component of `out`.
fn elementwise(ctx: &mut EmitCtx, out: &Slot, value: impl Fn(&Idx) -> Expr) -> Vec<Stmt> {
    ctx.for_loop(0, out.dim, 1)
        .build(|k| vec![out.assign(k.clone(), value(&k))])
}

/// `out[0] = 0; out[0] += term(k)` for `k` in `0..n`.
fn reduce_sum(ctx: &mut EmitCtx, out: &Slot, n: usize, term: impl Fn(&Idx) -> Expr) -> Vec<Stmt> {
    let mut stmts = vec![out.assign(Idx::lit(0), Expr::Int(0))];
    stmts.extend(
        ctx.for_loop(0, n, 1)
            .build(|k| vec![out.accumulate(Idx::lit(0), term(&k))]),
    );
    stmts
}

fn unary(ctx: &mut EmitCtx, out: &Slot, a: &Slot, f: impl Fn(Expr) -> Expr) -> Vec<Stmt> {
    elementwise(ctx, out, |k| f(a.at(k)))
}

impl Kind {
    /// Statements computing this node into `out` from operand slots `args`.
    pub fn emit(&self, out: &Slot, args: &[Slot], ctx: &mut EmitCtx) -> Vec<Stmt> {
        let a = || &args[0];
        let b = || &args[1];
        match self {
            // ── Leaves ──
            Kind::Var(v) => {
                let src = Slot::new(v.slot_name(), v.dim);
                elementwise(ctx, out, |k| src.at(k))
            }
            Kind::Zero(_) => elementwise(ctx, out, |_| Expr::Int(0)),
            Kind::IntCst(n) => vec![out.assign(Idx::lit(0), Expr::Int(*n))],
            Kind::RatCst(p, q) => vec![out.assign(Idx::lit(0), Expr::Ratio(*p, *q))],

            // ── Elementwise unary ──
            Kind::Minus => unary(ctx, out, a(), |x| -x),
            Kind::Exp => unary(ctx, out, a(), |x| Expr::call(Func::Exp, x)),
            Kind::Log => unary(ctx, out, a(), |x| Expr::call(Func::Log, x)),
            Kind::Sin => unary(ctx, out, a(), |x| Expr::call(Func::Sin, x)),
            Kind::Cos => unary(ctx, out, a(), |x| Expr::call(Func::Cos, x)),
            Kind::Sqrt => unary(ctx, out, a(), |x| Expr::call(Func::Sqrt, x)),
            Kind::Rsqrt => unary(ctx, out, a(), |x| Expr::call(Func::Rsqrt, x)),
            Kind::Square => unary(ctx, out, a(), |x| x.clone() * x),
            Kind::Inv => unary(ctx, out, a(), |x| Expr::Int(1) / x),
            Kind::Abs => unary(ctx, out, a(), |x| Expr::call(Func::Abs, x)),
            Kind::Sign => unary(ctx, out, a(), |x| {
                Expr::select(
                    x.clone().gt(Expr::Int(0)),
                    Expr::Int(1),
                    Expr::select(x.lt(Expr::Int(0)), Expr::Int(-1), Expr::Int(0)),
                )
            }),
            Kind::Step => unary(ctx, out, a(), |x| {
                Expr::select(x.lt(Expr::Int(0)), Expr::Int(0), Expr::Int(1))
            }),
            Kind::ReLU => unary(ctx, out, a(), |x| {
                Expr::select(x.clone().lt(Expr::Int(0)), Expr::Int(0), x)
            }),
            Kind::Pow(m) => unary(ctx, out, a(), |x| Expr::call2(Func::Pow, x, Expr::Int(*m))),
            Kind::ClampInt(lo, hi) => unary(ctx, out, a(), |x| {
                Expr::select(
                    x.clone().lt(Expr::Int(*lo)),
                    Expr::Int(*lo),
                    Expr::select(x.clone().gt(Expr::Int(*hi)), Expr::Int(*hi), x),
                )
            }),
            Kind::DiffClampInt(lo, hi) => unary(ctx, out, a(), |x| {
                Expr::select(
                    x.clone().lt(Expr::Int(*lo)),
                    Expr::Int(0),
                    Expr::select(x.gt(Expr::Int(*hi)), Expr::Int(0), Expr::Int(1)),
                )
            }),

            // ── Elementwise binary, dimension-1 operands broadcast ──
            Kind::Add => elementwise(ctx, out, |k| a().at(k) + b().at(k)),
            Kind::Subtract => elementwise(ctx, out, |k| a().at(k) - b().at(k)),
            Kind::Mult => elementwise(ctx, out, |k| a().at(k) * b().at(k)),
            Kind::Divide => elementwise(ctx, out, |k| a().at(k) / b().at(k)),

            // ── Reductions ──
            Kind::Sum => reduce_sum(ctx, out, a().dim, |k| a().at(k)),
            Kind::SumT(_) => elementwise(ctx, out, |_| a().get(0)),
            Kind::Max | Kind::Min => {
                let func = if matches!(self, Kind::Max) { Func::Max } else { Func::Min };
                let mut stmts = vec![out.assign(Idx::lit(0), a().get(0))];
                stmts.extend(ctx.for_loop(1, a().dim, 1).build(|k| {
                    vec![out.assign(Idx::lit(0), Expr::call2(func, out.get(0), a().at(&k)))]
                }));
                stmts
            }
            Kind::ArgMax | Kind::ArgMin => {
                let best = ctx.temp("best", 1);
                let better = |x: Expr, y: Expr| {
                    if matches!(self, Kind::ArgMax) {
                        x.gt(y)
                    } else {
                        x.lt(y)
                    }
                };
                let mut stmts = vec![
                    Stmt::Decl(best.clone()),
                    best.assign(Idx::lit(0), a().get(0)),
                    out.assign(Idx::lit(0), Expr::Int(0)),
                ];
                stmts.extend(ctx.for_loop(1, a().dim, 1).build(|k| {
                    vec![Stmt::If {
                        cond: better(a().at(&k), best.get(0)),
                        then: vec![
                            best.assign(Idx::lit(0), a().at(&k)),
                            out.assign(Idx::lit(0), Expr::Index(k.clone())),
                        ],
                    }]
                }));
                stmts
            }
            Kind::OneHot(_) => elementwise(ctx, out, |k| {
                Expr::eq(Expr::call(Func::Round, a().get(0)), Expr::Index(k.clone()))
            }),
            Kind::SqNorm2 => reduce_sum(ctx, out, a().dim, |k| a().at(k) * a().at(k)),
            Kind::Scalprod => reduce_sum(ctx, out, a().dim, |k| a().at(k) * b().at(k)),

            // ── Extraction ──
            Kind::Extract { start, .. } => {
                elementwise(ctx, out, |k| a().at(&(k.clone() + *start)))
            }
            Kind::ExtractT { start, dim } => {
                let end = start + a().dim;
                let mut stmts = ctx
                    .for_loop(0, *start, 1)
                    .build(|k| vec![out.assign(k, Expr::Int(0))]);
                stmts.extend(
                    ctx.for_loop(0, a().dim, 1)
                        .build(|k| vec![out.assign(k.clone() + *start, a().at(&k))]),
                );
                stmts.extend(
                    ctx.for_loop(end, *dim, 1)
                        .build(|k| vec![out.assign(k, Expr::Int(0))]),
                );
                stmts
            }
            Kind::Concat => {
                let offset = a().dim;
                let mut stmts = ctx
                    .for_loop(0, a().dim, 1)
                    .build(|k| vec![out.assign(k.clone(), a().at(&k))]);
                stmts.extend(
                    ctx.for_loop(0, b().dim, 1)
                        .build(|k| vec![out.assign(k.clone() + offset, b().at(&k))]),
                );
                stmts
            }

            // ── Tensor products (row-major) ──
            Kind::MatVecMult => {
                let m = b().dim;
                let inner = ctx.for_loop(0, m, 1);
                ctx.for_loop(0, out.dim, 1).build(|i| {
                    let mut body = vec![out.assign(i.clone(), Expr::Int(0))];
                    body.extend(inner.clone().build(|k| {
                        let entry = a().at(&(i.clone() * m + k.clone()));
                        vec![out.accumulate(i.clone(), entry * b().at(&k))]
                    }));
                    body
                })
            }
            Kind::VecMatMult => {
                let (n, m) = (a().dim, out.dim);
                let inner = ctx.for_loop(0, n, 1);
                ctx.for_loop(0, m, 1).build(|j| {
                    let mut body = vec![out.assign(j.clone(), Expr::Int(0))];
                    body.extend(inner.clone().build(|i| {
                        let entry = b().at(&(i.clone() * m + j.clone()));
                        vec![out.accumulate(j.clone(), a().at(&i) * entry)]
                    }));
                    body
                })
            }
            Kind::TensorProd => {
                let m = b().dim;
                let inner = ctx.for_loop(0, m, 1);
                ctx.for_loop(0, a().dim, 1).build(|i| {
                    inner.clone().build(|j| {
                        vec![out.assign(i.clone() * m + j.clone(), a().at(&i) * b().at(&j))]
                    })
                })
            }

            // ── Complex (re, im) pairs ──
            Kind::ComplexSum => {
                let mut stmts = vec![
                    out.assign(Idx::lit(0), Expr::Int(0)),
                    out.assign(Idx::lit(1), Expr::Int(0)),
                ];
                stmts.extend(ctx.for_loop(0, a().dim, 2).build(|k| {
                    vec![
                        out.accumulate(Idx::lit(0), a().at(&k)),
                        out.accumulate(Idx::lit(1), a().at(&(k.clone() + 1))),
                    ]
                }));
                stmts
            }
            Kind::ComplexSumT(_) => ctx.for_loop(0, out.dim, 2).build(|k| {
                vec![
                    out.assign(k.clone(), a().get(0)),
                    out.assign(k + 1, a().get(1)),
                ]
            }),
            Kind::ComplexReal => elementwise(ctx, out, |k| a().at(&(k.clone() * 2))),
            Kind::ComplexImag => elementwise(ctx, out, |k| a().at(&(k.clone() * 2 + 1))),
            Kind::Real2Complex | Kind::Imag2Complex => {
                let real = matches!(self, Kind::Real2Complex);
                ctx.for_loop(0, a().dim, 1).build(|k| {
                    let (re, im) = if real {
                        (a().at(&k), Expr::Int(0))
                    } else {
                        (Expr::Int(0), a().at(&k))
                    };
                    vec![out.assign(k.clone() * 2, re), out.assign(k * 2 + 1, im)]
                })
            }
            Kind::Conj => ctx.for_loop(0, out.dim, 2).build(|k| {
                vec![
                    out.assign(k.clone(), a().at(&k)),
                    out.assign(k.clone() + 1, -a().at(&(k.clone() + 1))),
                ]
            }),
            Kind::ComplexMult => ctx.for_loop(0, out.dim, 2).build(|k| {
                let (ar, ai) = (a().at(&k), a().at(&(k.clone() + 1)));
                let (br, bi) = (b().at(&k), b().at(&(k.clone() + 1)));
                vec![
                    out.assign(k.clone(), ar.clone() * br.clone() - ai.clone() * bi.clone()),
                    out.assign(k.clone() + 1, ar * bi + ai * br),
                ]
            }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::emit::EmitOptions;

    fn ctx() -> EmitCtx {
        EmitCtx::new(EmitOptions::default())
    }

    #[test]
    fn short_elementwise_loop_is_expanded() {
        let out = Slot::new("out", 3);
        let stmts = Kind::Exp.emit(&out, &[Slot::new("a", 3)], &mut ctx());
        assert_eq!(stmts.len(), 3);
        assert_eq!(
            stmts[2],
            out.assign(
                Idx::lit(2),
                Expr::call(Func::Exp, Expr::Load("a".into(), Idx::lit(2)))
            )
        );
    }

    #[test]
    fn long_loop_stays_a_loop() {
        let out = Slot::new("out", 16);
        let stmts = Kind::Add.emit(&out, &[Slot::new("a", 16), Slot::new("s", 1)], &mut ctx());
        assert_eq!(stmts.len(), 1);
        let Stmt::For { body, var, .. } = &stmts[0] else {
            panic!("expected a loop")
        };
        let Stmt::Assign { value, .. } = &body[0] else {
            panic!("expected an assignment")
        };
        assert_eq!(
            *value,
            Expr::Load("a".into(), Idx::var(var)) + Expr::Load("s".into(), Idx::lit(0))
        );
    }

    #[test]
    fn complex_sum_t_copies_pairs() {
        let out = Slot::new("out", 4);
        let stmts = Kind::ComplexSumT(4).emit(&out, &[Slot::new("z", 2)], &mut ctx());
        assert_eq!(stmts.len(), 4);
        assert_eq!(stmts[3], out.assign(Idx::lit(3), Expr::Load("z".into(), Idx::lit(1))));
    }

    #[test]
    fn sum_initializes_then_accumulates() {
        let out = Slot::new("out", 1);
        let stmts = Kind::Sum.emit(&out, &[Slot::new("a", 2)], &mut ctx());
        assert_eq!(stmts[0], out.assign(Idx::lit(0), Expr::Int(0)));
        assert!(matches!(stmts[1], Stmt::AddAssign { .. }));
        assert_eq!(stmts.len(), 3);
    }

    #[test]
    fn arg_max_declares_its_temporary() {
        let out = Slot::new("out", 1);
        let stmts = Kind::ArgMax.emit(&out, &[Slot::new("a", 3)], &mut ctx());
        assert!(matches!(&stmts[0], Stmt::Decl(s) if s.dim == 1));
        assert!(stmts.iter().any(|s| matches!(s, Stmt::If { .. })));
    }
}
