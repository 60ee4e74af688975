// formula.rs: Immutable formula nodes and variables
//
// A `Formula` is a shared handle to an immutable `Node`: a catalog kind, its
// ordered children, its output dimension, and a canonical structural
// signature. Graphs are DAGs built bottom-up; children are shared through
// `Arc`, so a graph can be read from several threads at once.
//
// Preconditions: nodes are created through `simplify` constructors (or
//                `Formula::build` inside the crate).
// Postconditions: every node satisfies its kind's dimension rule.
// Failure modes: dimension-contract violations → `DimError`.
// Side effects: none.

use std::collections::{BTreeSet, HashSet};
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use crate::catalog::Kind;

// ── Errors ──────────────────────────────────────────────────────────────────

/// A node's dimension (or parameter) contract was violated at construction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DimError {
    pub kind: &'static str,
    pub message: String,
}

impl DimError {
    pub fn new(kind: &'static str, message: impl Into<String>) -> Self {
        DimError {
            kind,
            message: message.into(),
        }
    }
}

impl fmt::Display for DimError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.kind, self.message)
    }
}

impl std::error::Error for DimError {}

// ── Variables ───────────────────────────────────────────────────────────────

/// Which kernel axis a variable is indexed by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum Category {
    /// Varies with the first (output) axis: `Vi`.
    I,
    /// Varies with the second (reduction) axis: `Vj`.
    J,
    /// Non-indexed parameter: `Pm`.
    P,
}

impl Category {
    /// Numeric code used by the `Var(index, dim, cat)` notation.
    pub fn from_code(code: i64) -> Option<Category> {
        match code {
            0 => Some(Category::I),
            1 => Some(Category::J),
            2 => Some(Category::P),
            _ => None,
        }
    }

    pub fn code(self) -> i64 {
        match self {
            Category::I => 0,
            Category::J => 1,
            Category::P => 2,
        }
    }

    pub fn letter(self) -> char {
        match self {
            Category::I => 'i',
            Category::J => 'j',
            Category::P => 'p',
        }
    }

    /// Constructor name in the textual notation.
    pub fn constructor(self) -> &'static str {
        match self {
            Category::I => "Vi",
            Category::J => "Vj",
            Category::P => "Pm",
        }
    }
}

/// A named input. Identity is (category, index); `dim` is carried along so
/// leaves know their size.
#[derive(Debug, Clone, Copy)]
pub struct Var {
    pub cat: Category,
    pub index: usize,
    pub dim: usize,
}

impl Var {
    pub fn new(cat: Category, index: usize, dim: usize) -> Result<Var, DimError> {
        if dim == 0 {
            return Err(DimError::new("Var", "variable dimension must be positive"));
        }
        Ok(Var { cat, index, dim })
    }

    pub fn same_entity(&self, other: &Var) -> bool {
        self.cat == other.cat && self.index == other.index
    }

    /// Name of the input array holding this variable in emitted code.
    pub fn slot_name(&self) -> String {
        format!("arg_{}{}", self.cat.letter(), self.index)
    }
}

impl PartialEq for Var {
    fn eq(&self, other: &Var) -> bool {
        self.same_entity(other)
    }
}

impl Eq for Var {}

impl Hash for Var {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.cat.hash(state);
        self.index.hash(state);
    }
}

impl PartialOrd for Var {
    fn partial_cmp(&self, other: &Var) -> Option<std::cmp::Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for Var {
    fn cmp(&self, other: &Var) -> std::cmp::Ordering {
        (self.cat, self.index).cmp(&(other.cat, other.index))
    }
}

impl fmt::Display for Var {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}({},{})", self.cat.constructor(), self.index, self.dim)
    }
}

// ── Nodes ───────────────────────────────────────────────────────────────────

#[derive(Debug)]
pub struct Node {
    kind: Kind,
    children: Vec<Formula>,
    dim: usize,
    signature: String,
}

/// Shared handle to an immutable node. Equality and hashing use the
/// structural signature.
#[derive(Clone)]
pub struct Formula(Arc<Node>);

impl Formula {
    /// Validate and materialize a node without simplification.
    pub(crate) fn build(kind: Kind, children: Vec<Formula>) -> Result<Formula, DimError> {
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
        let dims: Vec<usize> = children.iter().map(|c| c.dim()).collect();
        let dim = kind.infer_dim(&dims)?;
        let signature = signature_of(&kind, dim, &children);
        Ok(Formula(Arc::new(Node {
            kind,
            children,
            dim,
            signature,
        })))
    }

    /// Leaf whose dimension is already known to be valid.
    pub(crate) fn leaf(kind: Kind, dim: usize) -> Formula {
        let signature = signature_of(&kind, dim, &[]);
        Formula(Arc::new(Node {
            kind,
            children: Vec::new(),
            dim,
            signature,
        }))
    }

    pub fn kind(&self) -> &Kind {
        &self.0.kind
    }

    pub fn children(&self) -> &[Formula] {
        &self.0.children
    }

    /// Operand `i`; callers match on a kind of known arity first.
    pub(crate) fn child(&self, i: usize) -> &Formula {
        &self.0.children[i]
    }

    pub fn dim(&self) -> usize {
        self.0.dim
    }

    /// Canonical structural identifier: `Name<dim>[params](children)`.
    pub fn signature(&self) -> &str {
        &self.0.signature
    }

    /// SHA-256 (hex) of the signature, for use as an external cache key.
    pub fn cache_key(&self) -> String {
        use sha2::{Digest, Sha256};

        let digest = Sha256::digest(self.signature().as_bytes());
        let mut s = String::with_capacity(64);
        for b in digest.iter() {
            use std::fmt::Write;
            let _ = write!(s, "{:02x}", b);
        }
        s
    }

    pub fn as_var(&self) -> Option<&Var> {
        match self.kind() {
            Kind::Var(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_int(&self) -> Option<i64> {
        match self.kind() {
            Kind::IntCst(n) => Some(*n),
            _ => None,
        }
    }

    pub fn is_zero(&self) -> bool {
        matches!(self.kind(), Kind::Zero(_))
    }

    /// Does this graph reference `v` (by identity)?
    pub fn depends_on(&self, v: &Var) -> bool {
        let mut seen = HashSet::new();
        self.depends_on_inner(v, &mut seen)
    }

    fn depends_on_inner<'a>(&'a self, v: &Var, seen: &mut HashSet<&'a str>) -> bool {
        if !seen.insert(self.signature()) {
            return false;
        }
        match self.kind() {
            Kind::Var(w) => w.same_entity(v),
            _ => self
                .children()
                .iter()
                .any(|c| c.depends_on_inner(v, seen)),
        }
    }

    /// All variables referenced, ordered by (category, index).
    pub fn vars(&self) -> Vec<Var> {
        let mut out = BTreeSet::new();
        for node in self.post_order() {
            if let Some(v) = node.as_var() {
                out.insert(*v);
            }
        }
        out.into_iter().collect()
    }

    /// Distinct nodes in post-order (children left to right, then parent).
    /// Structurally identical sub-graphs appear once.
    pub fn post_order(&self) -> Vec<Formula> {
        let mut seen = HashSet::new();
        let mut order = Vec::new();
        self.post_order_inner(&mut seen, &mut order);
        order
    }

    fn post_order_inner(&self, seen: &mut HashSet<String>, order: &mut Vec<Formula>) {
        if seen.contains(self.signature()) {
            return;
        }
        for c in self.children() {
            c.post_order_inner(seen, order);
        }
        seen.insert(self.signature().to_string());
        order.push(self.clone());
    }

    /// Number of distinct nodes.
    pub fn node_count(&self) -> usize {
        self.post_order().len()
    }
}

fn signature_of(kind: &Kind, dim: usize, children: &[Formula]) -> String {
    let mut s = format!("{}<{}>", kind.name(), dim);
    let params = kind.params();
    if !params.is_empty() {
        s.push('[');
        s.push_str(&params.join(","));
        s.push(']');
    }
    if !children.is_empty() {
        s.push('(');
        for (i, c) in children.iter().enumerate() {
            if i > 0 {
                s.push(',');
            }
            s.push_str(c.signature());
        }
        s.push(')');
    }
    s
}

impl PartialEq for Formula {
    fn eq(&self, other: &Formula) -> bool {
        Arc::ptr_eq(&self.0, &other.0) || self.signature() == other.signature()
    }
}

impl Eq for Formula {}

impl Hash for Formula {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.signature().hash(state);
    }
}

impl fmt::Debug for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.signature())
    }
}

/// Renders the function-call notation accepted by the parser, e.g.
/// `Exp(Minus(SqNorm2(Subtract(Vi(0,3),Vj(1,3)))))`.
impl fmt::Display for Formula {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.kind() {
            Kind::Var(v) => return write!(f, "{}", v),
            Kind::Zero(d) => return write!(f, "Zero({})", d),
            _ => {}
        }
        write!(f, "{}(", self.kind().name())?;
        let mut first = true;
        for c in self.children() {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{}", c)?;
        }
        for p in self.kind().params() {
            if !first {
                write!(f, ",")?;
            }
            first = false;
            write!(f, "{}", p)?;
        }
        write!(f, ")")
    }
}
