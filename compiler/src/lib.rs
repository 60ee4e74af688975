// kfc: Kernel Formula Compiler
//
// Library root. Engine modules (formula, catalog, simplify, autodiff, emit,
// lower, kernel) come first; the textual front end and the pipeline sit on top.

pub mod ast;
pub mod autodiff;
pub mod catalog;
pub mod codegen;
pub mod diag;
pub mod dot;
pub mod emit;
pub mod formula;
pub mod interp;
pub mod kernel;
pub mod lexer;
pub mod lower;
pub mod parser;
pub mod pipeline;
pub mod resolve;
pub mod simplify;
