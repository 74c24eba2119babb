// src/passes/mod.rs
pub mod bogus_control_flow;
pub mod flatten;
pub mod junk;
pub mod phase;
pub mod stack_legalize;
pub mod switch_lower;

pub use bogus_control_flow::{BogusControlFlow, FinalizeBogusPredicates};
pub use flatten::Flatten;
pub use phase::{run_pipeline, Phase};
