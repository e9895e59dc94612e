//! Internal compiler errors
//!
//! These can never be caused by the program being compiled. Semantic errors in
//! user code are recorded in [`crate::diagnostics::Diagnostics`] instead; once
//! any of those exist, no IR is emitted and nothing downstream runs. Reaching
//! one of the errors below means an earlier phase broke its contract with a
//! later one, so they are propagated straight out of the compiler.

use thiserror::Error;

use crate::{frontend::intern::Symbol, middle::ir::Label};

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InternalError {
    /// A symbolic constant (a string literal address) reached a position that
    /// needs a concrete integer value
    #[error("unresolved symbolic constant {0} used where a concrete value is required")]
    UnresolvedConstant(String),

    /// A `CallExtern` names a function that has no inline expansion
    #[error("unknown extern call \"{0}\"")]
    UnknownIntrinsic(Symbol),

    /// An intrinsic was called with fewer arguments than its expansion reads
    #[error("extern call \"{intrinsic}\" has no argument {index}")]
    MissingArgument { intrinsic: Symbol, index: usize },

    /// A jump or call names a label that was never placed
    #[error("label {0} is referenced but never defined")]
    UndefinedLabel(Label),

    /// A constant was used as the destination of a move or operation
    #[error("invalid destination {0} for a three-address operation")]
    InvalidDestination(String),
}
