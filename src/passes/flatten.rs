// src/passes/flatten.rs
use super::phase::Phase;
use super::stack_legalize;
use super::switch_lower;
use crate::config::ObfConfig;
use crate::ir::{BasicBlock, Function, Instruction, InstructionKind, IrType, Module, Terminator, TerminatorKind, Value};
use crate::location::source_span::SourceSpan;
use crate::prng::CryptoUtils;
use crate::stats::ObfuscationStats;
use std::sync::Arc;

/// Dissolves a function's natural CFG into a dispatcher loop driven by a
/// scrambled state variable (spec.md §4.3). Functions with fewer than two
/// blocks, or whose entry terminates in `Invoke`, are left untouched.
pub struct Flatten {
    prng: CryptoUtils,
    stats: ObfuscationStats,
}

impl Flatten {
    pub fn new(config: &ObfConfig) -> Self {
        let prng = match config.seed {
            Some(seed) => CryptoUtils::new(seed.wrapping_add(2)),
            None => CryptoUtils::from_entropy(),
        };
        Self { prng, stats: ObfuscationStats::new() }
    }

    pub fn stats(&self) -> &ObfuscationStats {
        &self.stats
    }
}

impl Phase for Flatten {
    fn name(&self) -> &'static str {
        "flatten"
    }

    fn run_on_function(&mut self, module: &mut Module, function_name: &str) {
        let Some(function) = module.get_function_mut(function_name) else { return };
        self.stats.initial_block_count += function.block_count() as u64;
        if flatten_function(function, &mut self.prng) {
            self.stats.functions_flattened += 1;
        }
        self.stats.final_block_count += function.block_count() as u64;
    }
}

/// Returns `true` if the function was flattened.
fn flatten_function(function: &mut Function, prng: &mut CryptoUtils) -> bool {
    switch_lower::lower_switches(function);

    if function.block_count() <= 1 {
        return false;
    }
    if function.cfg.blocks().any(|b| matches!(b.terminator().kind, TerminatorKind::Invoke { .. })) {
        return false;
    }

    let entry_label = function.cfg.entry_label().to_string();
    let span = function.cfg.get_block(&entry_label).unwrap().source_span.clone();

    // Step 5: an entry terminator with more than one successor is split off
    // into its own `first` block so the prologue ends in a straight
    // fall-through.
    let entry_successor_count = function.cfg.get_block(&entry_label).unwrap().terminator().get_targets().len();
    let prologue_label: Arc<str> = Arc::from(entry_label.clone());
    let mut first_label: Option<Arc<str>> = None;
    if entry_successor_count > 1 {
        let new_first_label: Arc<str> = Arc::from(format!("{entry_label}.first"));
        let mut first_block = BasicBlock::new(&new_first_label, span.clone());
        let moved_terminator = {
            let entry = function.cfg.get_block_mut(&entry_label).unwrap();
            std::mem::replace(entry.terminator_mut(), Terminator::new(TerminatorKind::Unreachable, span.clone()))
        };
        let targets = moved_terminator.get_targets();
        first_block.set_terminator(moved_terminator);
        function.cfg.add_block(first_block);
        for target in &targets {
            function.cfg.connect_blocks(&new_first_label, target);
        }
        // The prologue's own terminator is erased outright (step 6) — it
        // will end in a branch straight to `loopEntry`, whose initial state
        // is `scramble32(0, key)`. That state must resolve to `first`, the
        // block holding the real (moved) entry terminator, or the original
        // conditional entry is never evaluated. `first` is pushed to the
        // head of `orig` below so it always lands at case index 0.
        first_label = Some(new_first_label);
    }

    // `orig` is every block except the prologue; `first` (if any) leads so
    // the prologue's `scramble32(0, key)` initial state dispatches to it.
    let mut orig: Vec<Arc<str>> = Vec::new();
    if let Some(first) = &first_label {
        orig.push(first.clone());
    }
    orig.extend(function.cfg.blocks().map(|b| b.label.clone()).filter(|l| {
        l.as_ref() != prologue_label.as_ref() && first_label.as_deref() != Some(l.as_ref())
    }));

    function.cfg.disconnect_outgoing(&prologue_label);

    let mut key = [0u8; 16];
    prng.get_bytes(&mut key);

    let switch_var: Arc<str> = Arc::from(format!("{prologue_label}.switchVar"));
    {
        let prologue = function.cfg.get_block_mut(&prologue_label).unwrap();
        prologue.push(Instruction::new(InstructionKind::Alloca { ty: IrType::I32 }, span.clone()).with_result(
            Value::new_local(switch_var.clone(), IrType::I32.pointer_to()),
        ));
        let initial = prng.scramble32(0, key);
        prologue.push(Instruction::new(
            InstructionKind::Store { value: Value::new_immediate(crate::ir::ImmediateValue::U32(initial)), dest: Value::new_local(switch_var.clone(), IrType::I32.pointer_to()) },
            span.clone(),
        ));
    }

    let loop_entry_label: Arc<str> = Arc::from(format!("{prologue_label}.loopEntry"));
    let loop_end_label: Arc<str> = Arc::from(format!("{prologue_label}.loopEnd"));
    let switch_default_label: Arc<str> = Arc::from(format!("{prologue_label}.switchDefault"));

    let sw_name: Arc<str> = Arc::from(format!("{prologue_label}.sw"));
    let mut loop_entry = BasicBlock::new(&loop_entry_label, span.clone());
    loop_entry.push(
        Instruction::new(
            InstructionKind::Load { src: Value::new_local(switch_var.clone(), IrType::I32.pointer_to()), ty: IrType::I32 },
            span.clone(),
        )
        .with_result(Value::new_temporary(sw_name.clone(), IrType::I32)),
    );
    function.cfg.add_block(loop_entry);

    let mut loop_end = BasicBlock::new(&loop_end_label, span.clone());
    loop_end.set_terminator(Terminator::new(TerminatorKind::Branch { label: loop_entry_label.clone() }, span.clone()));
    function.cfg.add_block(loop_end);

    let mut switch_default = BasicBlock::new(&switch_default_label, span.clone());
    switch_default.set_terminator(Terminator::new(TerminatorKind::Branch { label: loop_end_label.clone() }, span.clone()));
    function.cfg.add_block(switch_default);
    function.cfg.connect_blocks(&switch_default_label, &loop_end_label);
    function.cfg.connect_blocks(&loop_end_label, &loop_entry_label);

    function.cfg.set_block_terminator(
        &prologue_label,
        Terminator::new(TerminatorKind::Branch { label: loop_entry_label.clone() }, span.clone()),
    );
    function.cfg.connect_blocks(&prologue_label, &loop_entry_label);

    let case_labels: Vec<(u32, Arc<str>)> =
        orig.iter().enumerate().map(|(i, label)| (prng.scramble32(i as u32, key), label.clone())).collect();
    let fallback_label = prng.scramble32(orig.len().saturating_sub(1) as u32, key);

    let cases: Vec<(Value, String)> = case_labels
        .iter()
        .map(|(scrambled, label)| (Value::new_immediate(crate::ir::ImmediateValue::U32(*scrambled)), label.to_string()))
        .collect();

    function.cfg.set_block_terminator(
        &loop_entry_label,
        Terminator::new(
            TerminatorKind::Switch {
                value: Value::new_temporary(sw_name, IrType::I32),
                ty: IrType::I32,
                default_label: switch_default_label.to_string(),
                cases,
            },
            span.clone(),
        ),
    );
    function.cfg.connect_blocks(&loop_entry_label, &switch_default_label);
    for (_, label) in &case_labels {
        function.cfg.connect_blocks(&loop_entry_label, label);
    }

    let label_of = |target: &str| -> u32 {
        case_labels.iter().find(|(_, l)| l.as_ref() == target).map(|(s, _)| *s).unwrap_or(fallback_label)
    };

    for block_label in &orig {
        rewrite_block_successors(function, block_label, &loop_end_label, &switch_var, &label_of, &span);
    }

    stack_legalize::fix_stack(function);
    true
}

fn rewrite_block_successors(
    function: &mut Function, block_label: &str, loop_end_label: &str, switch_var: &str,
    label_of: &impl Fn(&str) -> u32, span: &SourceSpan,
) {
    let Some(block) = function.cfg.get_block(block_label) else { return };
    let targets = block.terminator().get_targets();

    match targets.len() {
        0 => {}
        1 => {
            let successor = targets[0].clone();
            let scrambled = label_of(&successor);
            function.cfg.disconnect_outgoing(block_label);
            let block = function.cfg.get_block_mut(block_label).unwrap();
            block.push(Instruction::new(
                InstructionKind::Store {
                    value: Value::new_immediate(crate::ir::ImmediateValue::U32(scrambled)),
                    dest: Value::new_local(switch_var, IrType::I32.pointer_to()),
                },
                span.clone(),
            ));
            block.set_terminator(Terminator::new(TerminatorKind::Branch { label: Arc::from(loop_end_label) }, span.clone()));
            function.cfg.connect_blocks(block_label, loop_end_label);
        }
        2 => {
            let TerminatorKind::ConditionalBranch { condition, true_label, false_label } = block.terminator().kind.clone() else {
                return;
            };
            let l_true = label_of(&true_label);
            let l_false = label_of(&false_label);
            function.cfg.disconnect_outgoing(block_label);

            let select_name: Arc<str> = Arc::from(format!("{block_label}.flatsel"));
            let block = function.cfg.get_block_mut(block_label).unwrap();
            block.push(
                Instruction::new(
                    InstructionKind::Select {
                        condition,
                        true_value: Value::new_immediate(crate::ir::ImmediateValue::U32(l_true)),
                        false_value: Value::new_immediate(crate::ir::ImmediateValue::U32(l_false)),
                        ty: IrType::I32,
                    },
                    span.clone(),
                )
                .with_result(Value::new_temporary(select_name.clone(), IrType::I32)),
            );
            block.push(Instruction::new(
                InstructionKind::Store {
                    value: Value::new_temporary(select_name, IrType::I32),
                    dest: Value::new_local(switch_var, IrType::I32.pointer_to()),
                },
                span.clone(),
            ));
            block.set_terminator(Terminator::new(TerminatorKind::Branch { label: Arc::from(loop_end_label) }, span.clone()));
            function.cfg.connect_blocks(block_label, loop_end_label);
        }
        _ => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{IcmpPredicate, InstructionKind};

    fn straight_line_function() -> Function {
        let mut function = Function::new("f", vec![], IrType::I32, "a");
        let span = SourceSpan::default();
        let mut a = BasicBlock::new("a", span.clone());
        a.set_terminator(Terminator::new(TerminatorKind::Branch { label: "b".into() }, span.clone()));
        let mut b = BasicBlock::new("b", span.clone());
        b.set_terminator(Terminator::new(TerminatorKind::Branch { label: "c".into() }, span.clone()));
        let mut c = BasicBlock::new("c", span.clone());
        c.set_terminator(Terminator::new(TerminatorKind::Return { value: Value::i32(0), ty: IrType::I32 }, span));
        function.cfg.add_block(a);
        function.cfg.add_block(b);
        function.cfg.add_block(c);
        function.cfg.connect_blocks("a", "b");
        function.cfg.connect_blocks("b", "c");
        function
    }

    #[test]
    fn flattens_a_straight_line_function_into_six_blocks() {
        let mut function = straight_line_function();
        let mut prng = CryptoUtils::new(3);
        let flattened = flatten_function(&mut function, &mut prng);
        assert!(flattened);
        assert_eq!(function.block_count(), 6);
        assert!(function.cfg.get_block("a.loopEntry").is_some());
        assert!(function.cfg.get_block("a.loopEnd").is_some());
        assert!(function.cfg.get_block("a.switchDefault").is_some());
        let b_block = function.cfg.get_block("b").unwrap();
        assert!(b_block.instructions.iter().any(|i| matches!(i.kind, InstructionKind::Store { .. })));
    }

    #[test]
    fn invoke_terminated_entry_is_left_unflattened() {
        let mut function = Function::new("f", vec![], IrType::I32, "entry");
        let span = SourceSpan::default();
        let mut entry = BasicBlock::new("entry", span.clone());
        entry.set_terminator(Terminator::new(
            TerminatorKind::Invoke {
                func: Value::new_global("g", IrType::I32),
                args: vec![],
                ty: IrType::I32,
                normal_label: Arc::from("ok"),
                unwind_label: Arc::from("lpad"),
            },
            span.clone(),
        ));
        let mut ok = BasicBlock::new("ok", span.clone());
        ok.set_terminator(Terminator::new(TerminatorKind::Return { value: Value::i32(0), ty: IrType::I32 }, span.clone()));
        let mut lpad = BasicBlock::new("lpad", span.clone());
        lpad.set_terminator(Terminator::new(TerminatorKind::Return { value: Value::i32(1), ty: IrType::I32 }, span));
        function.cfg.add_block(entry);
        function.cfg.add_block(ok);
        function.cfg.add_block(lpad);
        function.cfg.connect_blocks("entry", "ok");
        function.cfg.connect_blocks("entry", "lpad");

        let mut prng = CryptoUtils::new(5);
        let before = function.block_count();
        let flattened = flatten_function(&mut function, &mut prng);
        assert!(!flattened);
        assert_eq!(function.block_count(), before);
    }

    #[test]
    fn conditional_entry_emits_a_select() {
        let mut function = Function::new("f", vec![], IrType::I32, "a");
        let span = SourceSpan::default();
        let mut a = BasicBlock::new("a", span.clone());
        a.push(
            Instruction::new(
                InstructionKind::Icmp { predicate: IcmpPredicate::Eq, left: Value::i32(1), right: Value::i32(1) },
                span.clone(),
            )
            .with_result(Value::new_temporary("cond", IrType::Bool)),
        );
        a.set_terminator(Terminator::new(
            TerminatorKind::ConditionalBranch {
                condition: Value::new_temporary("cond", IrType::Bool),
                true_label: "b".into(),
                false_label: "c".into(),
            },
            span.clone(),
        ));
        let mut b = BasicBlock::new("b", span.clone());
        b.set_terminator(Terminator::new(TerminatorKind::Return { value: Value::i32(1), ty: IrType::I32 }, span.clone()));
        let mut c = BasicBlock::new("c", span.clone());
        c.set_terminator(Terminator::new(TerminatorKind::Return { value: Value::i32(2), ty: IrType::I32 }, span));
        function.cfg.add_block(a);
        function.cfg.add_block(b);
        function.cfg.add_block(c);
        function.cfg.connect_blocks("a", "b");
        function.cfg.connect_blocks("a", "c");

        let mut prng = CryptoUtils::new(11);
        assert!(flatten_function(&mut function, &mut prng));
        assert!(function.cfg.get_block("a.first").is_some());

        // The prologue's initial dispatch state must land on `a.first` — the
        // block holding the real conditional branch — or the original
        // condition is never evaluated.
        let initial_state = {
            let prologue = function.cfg.get_block("a").unwrap();
            prologue
                .instructions
                .iter()
                .find_map(|i| match &i.kind {
                    InstructionKind::Store { value: Value { kind: crate::ir::ValueKind::Immediate(crate::ir::ImmediateValue::U32(v)), .. }, .. } => Some(*v),
                    _ => None,
                })
                .expect("prologue stores an initial dispatch state")
        };
        let loop_entry = function.cfg.get_block("a.loopEntry").unwrap();
        let TerminatorKind::Switch { cases, .. } = &loop_entry.terminator().kind else {
            panic!("expected a switch terminator on the dispatcher loop entry");
        };
        let first_case_state = cases
            .iter()
            .find_map(|(value, label)| match &value.kind {
                crate::ir::ValueKind::Immediate(crate::ir::ImmediateValue::U32(v)) if label == "a.first" => Some(*v),
                _ => None,
            })
            .expect("a.first has a dispatch case");
        assert_eq!(initial_state, first_case_state, "the prologue must dispatch straight into a.first");
    }
}
