//! The backend lowers IR to MIPS32 instructions and analyzes the result.
//!
//! Instructions still name temps instead of machine registers. What comes out
//! is meant for a register allocator:
//! 1. [`mips32::codegen`] expands every IR operation, the calling convention
//!    and the runtime intrinsics into instructions.
//! 2. [`flow`] splits the instructions into basic blocks and connects them.
//! 3. [`flow::liveness`] computes the temps live into and out of each block.

pub mod flow;
pub mod mips32;
