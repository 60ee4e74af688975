// catalog.rs: The closed set of formula node kinds
//
// Each kind declares its name, parameters, operand count, and dimension
// rule. Emission lives in `lower`, differentiation in `autodiff`; both match
// exhaustively on `Kind`, so adding a kind fails to compile until every
// consumer handles it.
//
// Preconditions: none.
// Postconditions: `infer_dim` accepts exactly the operand dimensions the kind
//                 can compute with.
// Failure modes: incompatible dimensions or parameters → `DimError`.
// Side effects: none.

use crate::formula::{DimError, Var};

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Kind {
    // ── Leaves ──
    Var(Var),
    Zero(usize),
    IntCst(i64),
    /// Rational constant `p/q`, kept in lowest terms with `q > 1`.
    RatCst(i64, i64),

    // ── Elementwise unary ──
    Minus,
    Exp,
    Log,
    Sin,
    Cos,
    Sqrt,
    Rsqrt,
    Square,
    Inv,
    Abs,
    Sign,
    Step,
    ReLU,
    Pow(i64),
    ClampInt(i64, i64),
    DiffClampInt(i64, i64),

    // ── Elementwise binary (dimension-1 operands broadcast) ──
    Add,
    Subtract,
    Mult,
    Divide,

    // ── Reductions and vector operations ──
    Sum,
    SumT(usize),
    Max,
    Min,
    ArgMax,
    ArgMin,
    OneHot(usize),
    SqNorm2,
    Scalprod,

    // ── Extraction and concatenation ──
    Extract { start: usize, dim: usize },
    ExtractT { start: usize, dim: usize },
    Concat,

    // ── Tensor products (row-major) ──
    MatVecMult,
    VecMatMult,
    TensorProd,

    // ── Complex numbers (interleaved re/im pairs) ──
    ComplexSum,
    ComplexSumT(usize),
    ComplexReal,
    ComplexImag,
    Real2Complex,
    Imag2Complex,
    Conj,
    ComplexMult,
}

impl Kind {
    pub fn name(&self) -> &'static str {
        match self {
            Kind::Var(_) => "Var",
            Kind::Zero(_) => "Zero",
            Kind::IntCst(_) => "IntCst",
            Kind::RatCst(..) => "RatCst",
            Kind::Minus => "Minus",
            Kind::Exp => "Exp",
            Kind::Log => "Log",
            Kind::Sin => "Sin",
            Kind::Cos => "Cos",
            Kind::Sqrt => "Sqrt",
            Kind::Rsqrt => "Rsqrt",
            Kind::Square => "Square",
            Kind::Inv => "Inv",
            Kind::Abs => "Abs",
            Kind::Sign => "Sign",
            Kind::Step => "Step",
            Kind::ReLU => "ReLU",
            Kind::Pow(_) => "Pow",
            Kind::ClampInt(..) => "ClampInt",
            Kind::DiffClampInt(..) => "DiffClampInt",
            Kind::Add => "Add",
            Kind::Subtract => "Subtract",
            Kind::Mult => "Mult",
            Kind::Divide => "Divide",
            Kind::Sum => "Sum",
            Kind::SumT(_) => "SumT",
            Kind::Max => "Max",
            Kind::Min => "Min",
            Kind::ArgMax => "ArgMax",
            Kind::ArgMin => "ArgMin",
            Kind::OneHot(_) => "OneHot",
            Kind::SqNorm2 => "SqNorm2",
            Kind::Scalprod => "Scalprod",
            Kind::Extract { .. } => "Extract",
            Kind::ExtractT { .. } => "ExtractT",
            Kind::Concat => "Concat",
            Kind::MatVecMult => "MatVecMult",
            Kind::VecMatMult => "VecMatMult",
            Kind::TensorProd => "TensorProd",
            Kind::ComplexSum => "ComplexSum",
            Kind::ComplexSumT(_) => "ComplexSumT",
            Kind::ComplexReal => "ComplexReal",
            Kind::ComplexImag => "ComplexImag",
            Kind::Real2Complex => "Real2Complex",
            Kind::Imag2Complex => "Imag2Complex",
            Kind::Conj => "Conj",
            Kind::ComplexMult => "ComplexMult",
        }
    }

    /// Kind-specific parameters, rendered for signatures and display.
    pub fn params(&self) -> Vec<String> {
        match self {
            Kind::Var(v) => vec![v.cat.letter().to_string(), v.index.to_string()],
            Kind::Zero(d) | Kind::SumT(d) | Kind::OneHot(d) | Kind::ComplexSumT(d) => {
                vec![d.to_string()]
            }
            Kind::IntCst(n) | Kind::Pow(n) => vec![n.to_string()],
            Kind::RatCst(p, q) | Kind::ClampInt(p, q) | Kind::DiffClampInt(p, q) => {
                vec![p.to_string(), q.to_string()]
            }
            Kind::Extract { start, dim } | Kind::ExtractT { start, dim } => {
                vec![start.to_string(), dim.to_string()]
            }
            _ => Vec::new(),
        }
    }

    pub fn arity(&self) -> usize {
        match self {
            Kind::Var(_) | Kind::Zero(_) | Kind::IntCst(_) | Kind::RatCst(..) => 0,
            Kind::Add
            | Kind::Subtract
            | Kind::Mult
            | Kind::Divide
            | Kind::Scalprod
            | Kind::Concat
            | Kind::MatVecMult
            | Kind::VecMatMult
            | Kind::TensorProd
            | Kind::ComplexMult => 2,
            _ => 1,
        }
    }

    /// Is this an elementwise binary operation with scalar broadcast?
    pub fn is_broadcast_binary(&self) -> bool {
        matches!(self, Kind::Add | Kind::Subtract | Kind::Mult | Kind::Divide)
    }

    /// Output dimension for the given operand dimensions.
    pub fn infer_dim(&self, dims: &[usize]) -> Result<usize, DimError> {
        let name = self.name();
        let fail = |msg: String| Err(DimError::new(name, msg));
        match self {
            Kind::Var(v) => Ok(v.dim),
            Kind::Zero(d) => {
                if *d == 0 {
                    fail("dimension must be positive".into())
                } else {
                    Ok(*d)
                }
            }
            Kind::IntCst(_) => Ok(1),
            Kind::RatCst(_, q) => {
                if *q == 0 {
                    fail("denominator must be nonzero".into())
                } else {
                    Ok(1)
                }
            }
            Kind::Minus
            | Kind::Exp
            | Kind::Log
            | Kind::Sin
            | Kind::Cos
            | Kind::Sqrt
            | Kind::Rsqrt
            | Kind::Square
            | Kind::Inv
            | Kind::Abs
            | Kind::Sign
            | Kind::Step
            | Kind::ReLU
            | Kind::Pow(_) => Ok(dims[0]),
            Kind::ClampInt(a, b) | Kind::DiffClampInt(a, b) => {
                if a > b {
                    fail(format!("empty interval [{}, {}]", a, b))
                } else {
                    Ok(dims[0])
                }
            }
            Kind::Add | Kind::Subtract | Kind::Mult | Kind::Divide => {
                let (a, b) = (dims[0], dims[1]);
                if a == b || a == 1 || b == 1 {
                    Ok(a.max(b))
                } else {
                    fail(format!(
                        "operand dimensions {} and {} are incompatible (must match or be 1)",
                        a, b
                    ))
                }
            }
            Kind::Sum | Kind::Max | Kind::Min | Kind::ArgMax | Kind::ArgMin | Kind::SqNorm2 => {
                Ok(1)
            }
            Kind::SumT(d) | Kind::OneHot(d) => {
                if dims[0] != 1 {
                    fail(format!("operand must have dimension 1, found {}", dims[0]))
                } else if *d == 0 {
                    fail("output dimension must be positive".into())
                } else {
                    Ok(*d)
                }
            }
            Kind::Scalprod => {
                if dims[0] != dims[1] {
                    fail(format!(
                        "operand dimensions {} and {} must match",
                        dims[0], dims[1]
                    ))
                } else {
                    Ok(1)
                }
            }
            Kind::Extract { start, dim } => {
                if *dim == 0 {
                    fail("extracted dimension must be positive".into())
                } else if start.checked_add(*dim).map_or(true, |end| end > dims[0]) {
                    fail(format!(
                        "range {}+{} exceeds operand dimension {}",
                        start, dim, dims[0]
                    ))
                } else {
                    Ok(*dim)
                }
            }
            Kind::ExtractT { start, dim } => {
                if start.checked_add(dims[0]).map_or(true, |end| end > *dim) {
                    fail(format!(
                        "operand of dimension {} at offset {} does not fit in {}",
                        dims[0], start, dim
                    ))
                } else {
                    Ok(*dim)
                }
            }
            Kind::Concat => dims[0]
                .checked_add(dims[1])
                .map_or_else(|| fail(overflow(dims)), Ok),
            Kind::MatVecMult => {
                let (mat, vec) = (dims[0], dims[1]);
                if mat % vec != 0 {
                    fail(format!(
                        "matrix dimension {} is not a multiple of vector dimension {}",
                        mat, vec
                    ))
                } else {
                    Ok(mat / vec)
                }
            }
            Kind::VecMatMult => {
                let (vec, mat) = (dims[0], dims[1]);
                if mat % vec != 0 {
                    fail(format!(
                        "matrix dimension {} is not a multiple of vector dimension {}",
                        mat, vec
                    ))
                } else {
                    Ok(mat / vec)
                }
            }
            Kind::TensorProd => dims[0]
                .checked_mul(dims[1])
                .map_or_else(|| fail(overflow(dims)), Ok),
            Kind::ComplexSum | Kind::ComplexReal | Kind::ComplexImag | Kind::Conj => {
                if dims[0] % 2 != 0 {
                    return fail(format!(
                        "complex operand must have even dimension, found {}",
                        dims[0]
                    ));
                }
                Ok(match self {
                    Kind::ComplexSum => 2,
                    Kind::Conj => dims[0],
                    _ => dims[0] / 2,
                })
            }
            Kind::ComplexSumT(m) => {
                if dims[0] != 2 {
                    fail(format!("dimension of F must be 2, found {}", dims[0]))
                } else if *m == 0 || m % 2 != 0 {
                    fail(format!(
                        "output dimension must be a positive even number, found {}",
                        m
                    ))
                } else {
                    Ok(*m)
                }
            }
            Kind::Real2Complex | Kind::Imag2Complex => dims[0]
                .checked_mul(2)
                .map_or_else(|| fail(overflow(dims)), Ok),
            Kind::ComplexMult => {
                if dims[0] != dims[1] || dims[0] % 2 != 0 {
                    fail(format!(
                        "complex operands must share an even dimension, found {} and {}",
                        dims[0], dims[1]
                    ))
                } else {
                    Ok(dims[0])
                }
            }
        }
    }
}

fn overflow(dims: &[usize]) -> String {
    format!("output dimension of operands {:?} overflows", dims)
}
