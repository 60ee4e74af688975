// interp.rs: Reference evaluator for emitted statement IR
//
// Executes a `KernelBody` on `f64` values. It gives the emitted code a
// meaning independent of any native toolchain: numerical checks and
// `--emit eval` run kernels through here.
//
// Preconditions: one input array per kernel input, keyed by slot name
//                (`arg_i0`, `arg_p1`, ...).
// Postconditions: returns the output slot's contents.
// Failure modes: missing or mis-sized inputs, reads of undeclared slots,
//                out-of-range indices, slots too large to allocate
//                → `EvalError`.
// Side effects: none.

use std::collections::HashMap;
use std::fmt;

use crate::emit::{BinOp, CmpOp, EmitOptions, Expr, Func, Idx, Slot, Stmt};
use crate::formula::{DimError, Formula};
use crate::kernel::{self, KernelBody};

#[derive(Debug, Clone, PartialEq)]
pub enum EvalError {
    MissingInput(String),
    InputLength {
        name: String,
        expected: usize,
        found: usize,
    },
    UnknownSlot(String),
    OutOfBounds {
        slot: String,
        index: usize,
        len: usize,
    },
    UnboundLoopVar(String),
    Allocation {
        slot: String,
        len: usize,
    },
    Dim(DimError),
}

impl fmt::Display for EvalError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            EvalError::MissingInput(name) => write!(f, "missing input `{}`", name),
            EvalError::InputLength {
                name,
                expected,
                found,
            } => write!(
                f,
                "input `{}` has {} value(s), expected {}",
                name, found, expected
            ),
            EvalError::UnknownSlot(name) => write!(f, "read of undeclared slot `{}`", name),
            EvalError::OutOfBounds { slot, index, len } => {
                write!(f, "index {} out of bounds for `{}` of length {}", index, slot, len)
            }
            EvalError::UnboundLoopVar(name) => write!(f, "loop variable `{}` is not in scope", name),
            EvalError::Allocation { slot, len } => {
                write!(f, "cannot allocate {} value(s) for `{}`", len, slot)
            }
            EvalError::Dim(err) => write!(f, "{}", err),
        }
    }
}

impl std::error::Error for EvalError {}

impl From<DimError> for EvalError {
    fn from(err: DimError) -> Self {
        EvalError::Dim(err)
    }
}

/// Run `body` and return the contents of its output slot.
pub fn run(body: &KernelBody, inputs: &HashMap<String, Vec<f64>>) -> Result<Vec<f64>, EvalError> {
    let mut machine = Machine::default();
    for v in &body.inputs {
        let name = v.slot_name();
        let values = inputs
            .get(&name)
            .ok_or_else(|| EvalError::MissingInput(name.clone()))?;
        if values.len() != v.dim {
            return Err(EvalError::InputLength {
                name,
                expected: v.dim,
                found: values.len(),
            });
        }
        machine.memory.insert(name, values.clone());
    }
    let out = zeroed(&body.output)?;
    machine.memory.insert(body.output.name.clone(), out);

    for stmt in body.statements() {
        machine.exec(stmt)?;
    }
    machine
        .memory
        .remove(&body.output.name)
        .ok_or_else(|| EvalError::UnknownSlot(body.output.name.clone()))
}

/// Compile `f` with default options and evaluate it.
pub fn eval_formula(f: &Formula, inputs: &HashMap<String, Vec<f64>>) -> Result<Vec<f64>, EvalError> {
    let body = kernel::compile(f, &Slot::new("out", f.dim()), &EmitOptions::default())?;
    run(&body, inputs)
}

fn zeroed(slot: &Slot) -> Result<Vec<f64>, EvalError> {
    let mut cells = Vec::new();
    cells
        .try_reserve_exact(slot.dim)
        .map_err(|_| EvalError::Allocation {
            slot: slot.name.clone(),
            len: slot.dim,
        })?;
    cells.resize(slot.dim, 0.0);
    Ok(cells)
}

#[derive(Default)]
struct Machine {
    memory: HashMap<String, Vec<f64>>,
    loop_vars: Vec<(String, usize)>,
}

impl Machine {
    fn exec(&mut self, stmt: &Stmt) -> Result<(), EvalError> {
        match stmt {
            Stmt::Decl(slot) => {
                let cells = zeroed(slot)?;
                self.memory.insert(slot.name.clone(), cells);
            }
            Stmt::Assign { slot, idx, value } => {
                let v = self.eval(value)?;
                *self.cell(slot, idx)? = v;
            }
            Stmt::AddAssign { slot, idx, value } => {
                let v = self.eval(value)?;
                *self.cell(slot, idx)? += v;
            }
            Stmt::For {
                var,
                start,
                end,
                step,
                body,
                ..
            } => {
                for k in (*start..*end).step_by((*step).max(1)) {
                    self.loop_vars.push((var.clone(), k));
                    let result = body.iter().try_for_each(|s| self.exec(s));
                    self.loop_vars.pop();
                    result?;
                }
            }
            Stmt::If { cond, then } => {
                if self.eval(cond)? != 0.0 {
                    for s in then {
                        self.exec(s)?;
                    }
                }
            }
        }
        Ok(())
    }

    fn index(&self, idx: &Idx) -> Result<usize, EvalError> {
        let mut total = idx.offset();
        for (name, scale) in idx.terms() {
            let value = self
                .loop_vars
                .iter()
                .rev()
                .find(|(n, _)| n == name)
                .map(|(_, v)| *v)
                .ok_or_else(|| EvalError::UnboundLoopVar(name.clone()))?;
            total += value * scale;
        }
        Ok(total)
    }

    fn cell(&mut self, slot: &str, idx: &Idx) -> Result<&mut f64, EvalError> {
        let index = self.index(idx)?;
        let data = self
            .memory
            .get_mut(slot)
            .ok_or_else(|| EvalError::UnknownSlot(slot.to_string()))?;
        let len = data.len();
        data.get_mut(index).ok_or(EvalError::OutOfBounds {
            slot: slot.to_string(),
            index,
            len,
        })
    }

    fn load(&self, slot: &str, idx: &Idx) -> Result<f64, EvalError> {
        let index = self.index(idx)?;
        let data = self
            .memory
            .get(slot)
            .ok_or_else(|| EvalError::UnknownSlot(slot.to_string()))?;
        data.get(index).copied().ok_or(EvalError::OutOfBounds {
            slot: slot.to_string(),
            index,
            len: data.len(),
        })
    }

    fn eval(&self, e: &Expr) -> Result<f64, EvalError> {
        Ok(match e {
            Expr::Int(n) => *n as f64,
            Expr::Ratio(p, q) => *p as f64 / *q as f64,
            Expr::Load(slot, idx) => self.load(slot, idx)?,
            Expr::Index(idx) => self.index(idx)? as f64,
            Expr::Neg(x) => -self.eval(x)?,
            Expr::Bin(op, a, b) => {
                let (a, b) = (self.eval(a)?, self.eval(b)?);
                match op {
                    BinOp::Add => a + b,
                    BinOp::Sub => a - b,
                    BinOp::Mul => a * b,
                    BinOp::Div => a / b,
                }
            }
            Expr::Call(func, args) => {
                let values = args
                    .iter()
                    .map(|a| self.eval(a))
                    .collect::<Result<Vec<_>, _>>()?;
                call(*func, &values)
            }
            Expr::Cmp(op, a, b) => {
                let (a, b) = (self.eval(a)?, self.eval(b)?);
                let holds = match op {
                    CmpOp::Lt => a < b,
                    CmpOp::Gt => a > b,
                    CmpOp::Eq => a == b,
                };
                if holds {
                    1.0
                } else {
                    0.0
                }
            }
            Expr::Select(c, t, f) => {
                if self.eval(c)? != 0.0 {
                    self.eval(t)?
                } else {
                    self.eval(f)?
                }
            }
        })
    }
}

fn call(func: Func, args: &[f64]) -> f64 {
    let x = args.first().copied().unwrap_or(f64::NAN);
    let y = args.get(1).copied().unwrap_or(f64::NAN);
    match func {
        Func::Exp => x.exp(),
        Func::Log => x.ln(),
        Func::Sin => x.sin(),
        Func::Cos => x.cos(),
        Func::Sqrt => x.sqrt(),
        Func::Rsqrt => 1.0 / x.sqrt(),
        Func::Abs => x.abs(),
        Func::Round => x.round(),
        Func::Max => x.max(y),
        Func::Min => x.min(y),
        Func::Pow => x.powf(y),
    }
}
