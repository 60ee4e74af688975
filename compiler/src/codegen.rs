// codegen.rs: C++ rendering of emitted kernel bodies
//
// Turns a `KernelBody` into the text of a C++ function body: a short header
// naming inputs and output, then one commented block per fragment.
// Temporaries are fixed-size local arrays of the configured scalar type.
//
// Preconditions: the body came from `kernel::compile`.
// Postconditions: output is deterministic for a given body and options.
// Failure modes: none.
// Side effects: none.

use std::fmt::Write as _;

use crate::emit::{BinOp, CmpOp, Expr, Func, Stmt};
use crate::kernel::KernelBody;

#[derive(Debug, Clone)]
pub struct CodegenOptions {
    /// Scalar type name used for temporaries and rational constants.
    pub dtype: String,
}

impl Default for CodegenOptions {
    fn default() -> Self {
        CodegenOptions {
            dtype: "float".to_string(),
        }
    }
}

pub fn render_cpp(body: &KernelBody, options: &CodegenOptions) -> String {
    let mut ctx = CodegenCtx {
        options,
        out: String::with_capacity(1024),
    };
    ctx.emit_header(body);
    for frag in &body.fragments {
        let _ = writeln!(
            ctx.out,
            "// {}({}) -> {}",
            frag.kind,
            frag.args.join(", "),
            frag.out.name
        );
        ctx.emit_block(&frag.stmts, "");
    }
    ctx.out
}

/// Compact fragment listing: one line per fragment, in emission order.
pub fn render_ir(body: &KernelBody) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "; {}", body.root_signature);
    for frag in &body.fragments {
        let _ = writeln!(
            out,
            "{} <- {}({})  ; {} stmt(s)",
            frag.out,
            frag.kind,
            frag.args.join(", "),
            frag.stmts.len()
        );
    }
    out
}

struct CodegenCtx<'a> {
    options: &'a CodegenOptions,
    out: String,
}

impl CodegenCtx<'_> {
    fn emit_header(&mut self, body: &KernelBody) {
        let short = body.cache_key.get(..16).unwrap_or(&body.cache_key);
        let _ = writeln!(self.out, "// kfc kernel {}", short);
        let inputs: Vec<String> = body
            .inputs
            .iter()
            .map(|v| format!("{}[{}]", v.slot_name(), v.dim))
            .collect();
        let _ = writeln!(self.out, "// inputs: {}", inputs.join(", "));
        let _ = writeln!(self.out, "// output: {}", body.output);
    }

    fn emit_block(&mut self, stmts: &[Stmt], indent: &str) {
        for stmt in stmts {
            self.emit_stmt(stmt, indent);
        }
    }

    fn emit_stmt(&mut self, stmt: &Stmt, indent: &str) {
        match stmt {
            Stmt::Decl(slot) => {
                let _ = writeln!(
                    self.out,
                    "{}{} {}[{}];",
                    indent, self.options.dtype, slot.name, slot.dim
                );
            }
            Stmt::Assign { slot, idx, value } => {
                let _ = writeln!(self.out, "{}{}[{}] = {};", indent, slot, idx, self.expr(value));
            }
            Stmt::AddAssign { slot, idx, value } => {
                let _ = writeln!(self.out, "{}{}[{}] += {};", indent, slot, idx, self.expr(value));
            }
            Stmt::For {
                var,
                start,
                end,
                step,
                pragma_unroll,
                body,
            } => {
                if *pragma_unroll {
                    let _ = writeln!(self.out, "{}#pragma unroll", indent);
                }
                let incr = if *step == 1 {
                    format!("{}++", var)
                } else {
                    format!("{} += {}", var, step)
                };
                let _ = writeln!(
                    self.out,
                    "{}for (int {} = {}; {} < {}; {}) {{",
                    indent, var, start, var, end, incr
                );
                self.emit_block(body, &format!("{}    ", indent));
                let _ = writeln!(self.out, "{}}}", indent);
            }
            Stmt::If { cond, then } => {
                let _ = writeln!(self.out, "{}if {} {{", indent, self.paren(cond));
                self.emit_block(then, &format!("{}    ", indent));
                let _ = writeln!(self.out, "{}}}", indent);
            }
        }
    }

    /// Comparisons and selects already render parenthesized.
    fn paren(&self, e: &Expr) -> String {
        match e {
            Expr::Cmp(..) | Expr::Select(..) => self.expr(e),
            _ => format!("({})", self.expr(e)),
        }
    }

    fn expr(&self, e: &Expr) -> String {
        match e {
            Expr::Int(n) if *n < 0 => format!("({})", n),
            Expr::Int(n) => n.to_string(),
            Expr::Ratio(p, q) => format!("(({}){} / {})", self.options.dtype, p, q),
            Expr::Load(name, idx) => format!("{}[{}]", name, idx),
            Expr::Index(idx) => {
                let s = idx.to_string();
                if s.contains('+') {
                    format!("({})", s)
                } else {
                    s
                }
            }
            Expr::Neg(x) => format!("-{}", self.operand(x, 3)),
            Expr::Bin(op, a, b) => {
                let prec = precedence(*op);
                let lhs = self.operand(a, prec);
                // Right operands of equal precedence need parentheses.
                let rhs = self.operand(b, prec + 1);
                format!("{} {} {}", lhs, bin_symbol(*op), rhs)
            }
            Expr::Call(Func::Rsqrt, args) => {
                format!("(1 / sqrt({}))", self.args(args))
            }
            Expr::Call(func, args) => format!("{}({})", func_name(*func), self.args(args)),
            Expr::Cmp(op, a, b) => {
                format!("({} {} {})", self.expr(a), cmp_symbol(*op), self.expr(b))
            }
            Expr::Select(c, t, f) => format!(
                "({} ? {} : {})",
                self.expr(c),
                self.expr(t),
                self.expr(f)
            ),
        }
    }

    fn args(&self, args: &[Expr]) -> String {
        args.iter()
            .map(|a| self.expr(a))
            .collect::<Vec<_>>()
            .join(", ")
    }

    /// Render an operand of a context with precedence `min_prec`.
    fn operand(&self, e: &Expr, min_prec: u8) -> String {
        match e {
            Expr::Bin(op, ..) if precedence(*op) < min_prec => format!("({})", self.expr(e)),
            Expr::Neg(_) if min_prec > 1 => format!("({})", self.expr(e)),
            _ => self.expr(e),
        }
    }
}

fn precedence(op: BinOp) -> u8 {
    match op {
        BinOp::Add | BinOp::Sub => 1,
        BinOp::Mul | BinOp::Div => 2,
    }
}

fn bin_symbol(op: BinOp) -> &'static str {
    match op {
        BinOp::Add => "+",
        BinOp::Sub => "-",
        BinOp::Mul => "*",
        BinOp::Div => "/",
    }
}

fn cmp_symbol(op: CmpOp) -> &'static str {
    match op {
        CmpOp::Lt => "<",
        CmpOp::Gt => ">",
        CmpOp::Eq => "==",
    }
}

fn func_name(func: Func) -> &'static str {
    match func {
        Func::Exp => "exp",
        Func::Log => "log",
        Func::Sin => "sin",
        Func::Cos => "cos",
        Func::Sqrt => "sqrt",
        Func::Rsqrt => "rsqrt",
        Func::Abs => "fabs",
        Func::Round => "round",
        Func::Max => "fmax",
        Func::Min => "fmin",
        Func::Pow => "pow",
    }
}
