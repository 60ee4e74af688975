// dot.rs: Graphviz DOT output for formula DAGs
//
// One node per distinct sub-graph (shared children appear once), edges from
// operand to consumer. Suitable for rendering with `dot`.
//
// Preconditions: none.
// Postconditions: returns a valid DOT string; node ids follow post-order.
// Failure modes: none (pure string formatting).
// Side effects: none.

use std::collections::HashMap;
use std::fmt::Write;

use crate::catalog::Kind;
use crate::formula::Formula;

/// Emit the formula DAG as a Graphviz DOT string.
pub fn emit_dot(f: &Formula) -> String {
    let mut buf = String::new();
    let _ = writeln!(buf, "digraph formula {{");
    let _ = writeln!(buf, "    rankdir=BT;");
    let _ = writeln!(buf, "    node [fontname=\"Helvetica\", fontsize=10];");

    let order = f.post_order();
    let ids: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, node)| (node.signature(), i))
        .collect();

    for (i, node) in order.iter().enumerate() {
        let _ = writeln!(buf, "    n{} [label=\"{}\"{}];", i, escape(&label(node)), style(node.kind()));
    }
    for (i, node) in order.iter().enumerate() {
        let binary = node.children().len() > 1;
        for (pos, child) in node.children().iter().enumerate() {
            let Some(src) = ids.get(child.signature()) else {
                continue;
            };
            if binary {
                let _ = writeln!(buf, "    n{} -> n{} [label=\"{}\"];", src, i, pos);
            } else {
                let _ = writeln!(buf, "    n{} -> n{};", src, i);
            }
        }
    }
    let _ = writeln!(buf, "}}");
    buf
}

fn label(node: &Formula) -> String {
    match node.kind() {
        Kind::Var(v) => format!("{}", v),
        kind => {
            let params = kind.params();
            if params.is_empty() {
                format!("{}\\n[{}]", kind.name(), node.dim())
            } else {
                format!("{}({})\\n[{}]", kind.name(), params.join(","), node.dim())
            }
        }
    }
}

fn style(kind: &Kind) -> &'static str {
    match kind {
        Kind::Var(_) => ", shape=box, style=filled, fillcolor=lightblue",
        Kind::Zero(_) | Kind::IntCst(_) | Kind::RatCst(..) => ", shape=ellipse, style=dashed",
        _ => "",
    }
}

/// Escape double quotes; `\n` sequences in labels are kept for Graphviz.
fn escape(s: &str) -> String {
    s.replace('"', "\\\"")
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::formula::{Category, Var};
    use crate::simplify as s;

    #[test]
    fn shared_subgraph_is_one_node() {
        let x = s::var(Var::new(Category::I, 0, 3).unwrap());
        let y = s::var(Var::new(Category::J, 1, 3).unwrap());
        let d = s::sub(&x, &y).unwrap();
        let f = s::scalprod(&d, &d).unwrap();
        let dot = emit_dot(&f);
        assert!(dot.starts_with("digraph formula {"));
        assert_eq!(dot.matches("[label=\"Subtract").count(), 1);
        assert!(dot.contains("n2 -> n3 [label=\"0\"];"));
        assert!(dot.contains("n2 -> n3 [label=\"1\"];"));
        assert!(dot.contains("n0 [label=\"Vi(0,3)\", shape=box"));
    }

    #[test]
    fn parameters_appear_in_labels() {
        let x = s::var(Var::new(Category::I, 0, 4).unwrap());
        let f = s::extract(&x, 1, 2).unwrap();
        assert!(emit_dot(&f).contains("Extract(1,2)\\n[2]"));
    }
}
