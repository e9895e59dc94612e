//! Types are checked here and the AST is lowered to IR (three-address code).
//! Nested function declarations get their own frames, and the outer variables
//! each function reaches are collected for the static link.

pub mod closure;
pub mod env;
pub mod frame;
pub mod ir;
pub mod semant;
pub mod ty;
