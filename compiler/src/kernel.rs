// kernel.rs: Post-order emission driver
//
// Walks a formula DAG children-first, left to right, and asks each node kind
// to emit its fragment. Structurally identical sub-graphs share one slot and
// are emitted once. Variables are read in place from their input arrays; the
// root writes directly into the caller's output slot.
//
// Preconditions: `out.dim == f.dim()`.
// Postconditions: fragments appear in dependency order; every temporary is
//                 declared before its first use.
// Failure modes: output-slot dimension mismatch, or a gradient request that
//                violates a dimension contract → `DimError`.
// Side effects: `log::debug!` summary per compiled kernel.

use std::collections::HashMap;

use log::debug;

use crate::autodiff;
use crate::emit::{EmitCtx, EmitOptions, Slot, Stmt};
use crate::formula::{DimError, Formula, Var};

/// The statements emitted for one node.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub signature: String,
    pub kind: &'static str,
    pub out: Slot,
    /// Operand slot names, in operand order.
    pub args: Vec<String>,
    pub stmts: Vec<Stmt>,
}

/// A complete kernel body: inputs, output, and ordered fragments.
#[derive(Debug, Clone, PartialEq)]
pub struct KernelBody {
    pub root_signature: String,
    pub cache_key: String,
    pub inputs: Vec<Var>,
    pub output: Slot,
    pub fragments: Vec<Fragment>,
}

impl KernelBody {
    pub fn statements(&self) -> impl Iterator<Item = &Stmt> {
        self.fragments.iter().flat_map(|frag| frag.stmts.iter())
    }

    /// Slots declared locally by the body.
    pub fn temporaries(&self) -> Vec<&Slot> {
        self.statements()
            .filter_map(|stmt| match stmt {
                Stmt::Decl(slot) => Some(slot),
                _ => None,
            })
            .collect()
    }
}

/// Emit `f` into `out`.
pub fn compile(f: &Formula, out: &Slot, options: &EmitOptions) -> Result<KernelBody, DimError> {
    if out.dim != f.dim() {
        return Err(DimError::new(
            "Kernel",
            format!(
                "output slot `{}` has dimension {}, formula has dimension {}",
                out.name,
                out.dim,
                f.dim()
            ),
        ));
    }

    let mut ctx = EmitCtx::new(options.clone());
    let mut slots: HashMap<String, Slot> = HashMap::new();
    let mut fragments = Vec::new();
    let order = f.post_order();
    let root = order.len() - 1;

    for (pos, node) in order.iter().enumerate() {
        let is_root = pos == root;
        if let (Some(v), false) = (node.as_var(), is_root) {
            slots.insert(
                node.signature().to_string(),
                Slot::new(v.slot_name(), v.dim),
            );
            continue;
        }

        let mut args = Vec::with_capacity(node.children().len());
        for child in node.children() {
            let slot = slots.get(child.signature()).cloned().ok_or_else(|| {
                DimError::new("Kernel", format!("operand {} not emitted", child.signature()))
            })?;
            args.push(slot);
        }

        let mut stmts = Vec::new();
        let slot = if is_root {
            out.clone()
        } else {
            let prefix = format!("out_{}", node.kind().name().to_lowercase());
            let slot = ctx.temp(&prefix, node.dim());
            stmts.push(Stmt::Decl(slot.clone()));
            slot
        };
        stmts.extend(node.kind().emit(&slot, &args, &mut ctx));

        fragments.push(Fragment {
            signature: node.signature().to_string(),
            kind: node.kind().name(),
            out: slot.clone(),
            args: args.into_iter().map(|a| a.name).collect(),
            stmts,
        });
        slots.insert(node.signature().to_string(), slot);
    }

    let body = KernelBody {
        root_signature: f.signature().to_string(),
        cache_key: f.cache_key(),
        inputs: f.vars(),
        output: out.clone(),
        fragments,
    };
    debug!(
        "kernel: {} fragment(s), {} temporary slot(s), {} input(s)",
        body.fragments.len(),
        body.temporaries().len(),
        body.inputs.len()
    );
    Ok(body)
}

/// Emit the adjoint of `f` with respect to `v`, seeded with `gradin`.
pub fn compile_grad(
    f: &Formula,
    v: &Var,
    gradin: &Formula,
    out: &Slot,
    options: &EmitOptions,
) -> Result<KernelBody, DimError> {
    let adjoint = autodiff::grad(f, v, gradin)?;
    compile(&adjoint, out, options)
}
