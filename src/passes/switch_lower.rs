// src/passes/switch_lower.rs
use crate::ir::{BasicBlock, Function, IcmpPredicate, Instruction, InstructionKind, Terminator, TerminatorKind, Value};
use crate::location::source_span::SourceSpan;
use std::sync::Arc;

/// Rewrites every `Switch` terminator in `function` into a chain of
/// `ConditionalBranch`es comparing the switch value against each case
/// constant in order, falling through to the default label (spec.md §6
/// "switch lowerer"). Required before flattening, which only understands
/// 0/1/2-successor terminators.
///
/// Returns the number of switches lowered.
pub fn lower_switches(function: &mut Function) -> usize {
    let switch_blocks: Vec<Arc<str>> = function
        .cfg
        .blocks()
        .filter(|b| matches!(b.terminator().kind, TerminatorKind::Switch { .. }))
        .map(|b| b.label.clone())
        .collect();

    for label in &switch_blocks {
        lower_one_switch(function, label);
    }

    switch_blocks.len()
}

fn lower_one_switch(function: &mut Function, label: &str) {
    let Some(block) = function.cfg.get_block(label) else { return };
    let TerminatorKind::Switch { value, ty: _, default_label, cases } = block.terminator().kind.clone() else {
        return;
    };
    let span = block.source_span.clone();

    if cases.is_empty() {
        function.cfg.set_block_terminator(label, Terminator::new(TerminatorKind::Branch { label: default_label.into() }, span));
        return;
    }

    // Build one comparison block per case after the first; the first
    // comparison replaces the original block's terminator in place.
    let mut chain_labels: Vec<Arc<str>> = Vec::with_capacity(cases.len());
    chain_labels.push(Arc::from(label));
    for i in 1..cases.len() {
        chain_labels.push(Arc::from(format!("{label}.switchcmp{i}")));
    }

    for (i, (case_value, target_label)) in cases.iter().enumerate() {
        let this_label = chain_labels[i].clone();
        let next_label: Arc<str> = if i + 1 < cases.len() { chain_labels[i + 1].clone() } else { Arc::from(default_label.clone()) };

        let cmp_result_name: Arc<str> = Arc::from(format!("{label}.swcmp{i}"));
        let cmp_inst = Instruction::new(
            InstructionKind::Icmp { predicate: IcmpPredicate::Eq, left: value.clone(), right: case_value.clone() },
            span.clone(),
        )
        .with_result(Value::new_temporary(cmp_result_name.clone(), crate::ir::IrType::Bool));

        if i == 0 {
            if let Some(b) = function.cfg.get_block_mut(label) {
                b.push(cmp_inst);
            }
        } else {
            let mut new_block = BasicBlock::new(&this_label, span.clone());
            new_block.push(cmp_inst);
            function.cfg.add_block(new_block);
            function.cfg.connect_blocks(&chain_labels[i - 1], &this_label);
        }

        let condition = Value::new_temporary(cmp_result_name, crate::ir::IrType::Bool);
        function.cfg.set_block_terminator(
            &this_label,
            Terminator::new(
                TerminatorKind::ConditionalBranch {
                    condition,
                    true_label: Arc::from(target_label.clone()),
                    false_label: next_label,
                },
                span.clone(),
            ),
        );
        function.cfg.connect_blocks(&this_label, target_label);
        if i + 1 < cases.len() {
            function.cfg.connect_blocks(&this_label, &chain_labels[i + 1]);
        } else {
            function.cfg.connect_blocks(&this_label, &default_label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::IrType;

    fn function_with_switch() -> Function {
        let mut function = Function::new("f", vec![], IrType::I32, "entry");
        let span = SourceSpan::default();
        let mut entry = BasicBlock::new("entry", span.clone());
        entry.set_terminator(Terminator::new(
            TerminatorKind::Switch {
                value: Value::i32(1),
                ty: IrType::I32,
                default_label: "default".to_string(),
                cases: vec![(Value::i32(0), "case0".to_string()), (Value::i32(1), "case1".to_string())],
            },
            span.clone(),
        ));
        function.cfg.add_block(entry);

        for label in ["case0", "case1", "default"] {
            let mut b = BasicBlock::new(label, span.clone());
            b.set_terminator(Terminator::new(
                TerminatorKind::Return { value: Value::i32(0), ty: IrType::I32 },
                span.clone(),
            ));
            function.cfg.add_block(b);
        }
        function.cfg.connect_blocks("entry", "case0");
        function.cfg.connect_blocks("entry", "case1");
        function.cfg.connect_blocks("entry", "default");
        function
    }

    #[test]
    fn lowers_switch_into_conditional_branch_chain() {
        let mut function = function_with_switch();
        let lowered = lower_switches(&mut function);
        assert_eq!(lowered, 1);
        assert!(!function.cfg.blocks().any(|b| matches!(b.terminator().kind, TerminatorKind::Switch { .. })));
        // entry now ends in a conditional branch, and a new chain block was added for case1.
        assert!(function.cfg.get_block("entry.switchcmp1").is_some());
    }
}
