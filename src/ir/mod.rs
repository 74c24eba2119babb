// src/ir/mod.rs
mod basic_block;
mod cfg;
mod dominance;
mod function;
mod instruction;
mod module;
mod terminator;
mod types;
mod validator;
mod value;

pub use basic_block::BasicBlock;
pub use cfg::ControlFlowGraph;
pub use dominance::DominanceInfo;
pub use function::Function;
pub use instruction::{CastKind, DebugInfo, FcmpPredicate, IcmpPredicate, Instruction, InstructionKind, IrBinaryOp, IrUnaryOp};
pub use module::{GlobalVariable, Linkage, Module};
pub use terminator::{Terminator, TerminatorKind};
pub use types::IrType;
pub use validator::{validate_function, validate_module, ValidationError};
pub use value::{ImmediateValue, Value, ValueKind};
