// src/passes/bogus_control_flow.rs
use super::junk;
use super::phase::Phase;
use crate::config::ObfConfig;
use crate::ir::{
    BasicBlock, Function, GlobalVariable, IcmpPredicate, Instruction, InstructionKind, IrBinaryOp, IrType, Linkage,
    Module, Terminator, TerminatorKind, Value, ValueKind,
};
use crate::location::source_span::SourceSpan;
use crate::prng::CryptoUtils;
use crate::stats::ObfuscationStats;
use std::sync::Arc;

/// Per-function opaque-predicate diamond insertion (spec.md §4.2, steps
/// 1-8). Each selected block is split, cloned through the Junk Synthesizer,
/// and stitched back together through two trivially-true predicates.
pub struct BogusControlFlow {
    bcf_prob: u8,
    bcf_loop: u32,
    prng: CryptoUtils,
    stats: ObfuscationStats,
}

impl BogusControlFlow {
    pub fn new(config: &ObfConfig) -> Self {
        let prng = match config.seed {
            Some(seed) => CryptoUtils::new(seed),
            None => CryptoUtils::from_entropy(),
        };
        Self { bcf_prob: config.bcf_prob, bcf_loop: config.bcf_loop, prng, stats: ObfuscationStats::new() }
    }

    pub fn stats(&self) -> &ObfuscationStats {
        &self.stats
    }
}

impl Phase for BogusControlFlow {
    fn name(&self) -> &'static str {
        "bogus-control-flow"
    }

    fn run_on_function(&mut self, module: &mut Module, function_name: &str) {
        let Some(function) = module.get_function_mut(function_name) else { return };
        self.stats.functions_seen += 1;
        self.stats.iterations_last_run = u64::from(self.bcf_loop);

        for _ in 0..self.bcf_loop {
            let snapshot: Vec<Arc<str>> = function.cfg.blocks().map(|b| b.label.clone()).collect();
            for label in snapshot {
                let r = self.prng.get_range(100);
                if r <= u32::from(self.bcf_prob) {
                    transform_block(function, &label, &mut self.prng);
                    self.stats.modified_blocks += 1;
                    self.stats.added_blocks += 3;
                }
            }
        }
    }
}

/// Finds the first instruction past any leading PHI/debug/lifetime markers
/// (spec.md §4.2 step 1).
fn split_point(block: &BasicBlock) -> usize {
    block.instructions.iter().position(|i| !i.is_phi() && !i.is_lifetime_or_debug()).unwrap_or(block.instructions.len())
}

fn transform_block(function: &mut Function, label: &str, prng: &mut CryptoUtils) {
    let Some(block) = function.cfg.get_block(label) else { return };
    let span = block.source_span.clone();
    let sp = split_point(block);

    let suffix = {
        let block = function.cfg.get_block_mut(label).unwrap();
        block.instructions.split_off(sp)
    };
    let original_terminator = {
        let block = function.cfg.get_block_mut(label).unwrap();
        std::mem::replace(block.terminator_mut(), Terminator::new(TerminatorKind::Unreachable, span.clone()))
    };
    let original_targets = original_terminator.get_targets();
    function.cfg.disconnect_outgoing(label);

    // Step 2/3: O holds the original suffix and (temporarily) the original
    // terminator; A is the Junk Synthesizer's decorated clone of O.
    let o_label: Arc<str> = Arc::from(format!("{label}.originalBB"));
    let mut o_block = BasicBlock::new(&o_label, span.clone());
    o_block.instructions = suffix;
    o_block.set_terminator(original_terminator);
    function.cfg.add_block(o_block);

    let a_block = {
        let o_ref = function.cfg.get_block(&o_label).unwrap();
        junk::synthesize_junk_block(o_ref, "alteredBB", prng)
    };
    let a_label = a_block.label.clone();
    function.cfg.add_block(a_block);

    // Step 5: B ends in a trivial opaque predicate, entering O at runtime.
    let cond1_name: Arc<str> = Arc::from(format!("{label}.bcfcond1"));
    {
        let b_block = function.cfg.get_block_mut(label).unwrap();
        b_block.push(
            Instruction::new(InstructionKind::FcmpTrue { left: Value::f32(1.0), right: Value::f32(1.0) }, span.clone())
                .with_result(Value::new_temporary(cond1_name.clone(), IrType::Bool)),
        );
        b_block.set_terminator(Terminator::new(
            TerminatorKind::ConditionalBranch {
                condition: Value::new_temporary(cond1_name, IrType::Bool),
                true_label: o_label.clone(),
                false_label: a_label.clone(),
            },
            span.clone(),
        ));
    }
    function.cfg.connect_blocks(label, &o_label);
    function.cfg.connect_blocks(label, &a_label);

    // Step 6: A unconditionally (and unreachably) rejoins O.
    function.cfg.set_block_terminator(&a_label, Terminator::new(TerminatorKind::Branch { label: o_label.clone() }, span.clone()));
    function.cfg.connect_blocks(&a_label, &o_label);

    // Step 7: split O just before its terminator into O (body) and O2 (the
    // terminator alone), so O can end in its own opaque predicate.
    let o2_label: Arc<str> = Arc::from(format!("{label}.originalBBpart2"));
    let mut o2_block = BasicBlock::new(&o2_label, span.clone());
    let final_terminator = {
        let o_ref = function.cfg.get_block_mut(&o_label).unwrap();
        std::mem::replace(o_ref.terminator_mut(), Terminator::new(TerminatorKind::Unreachable, span.clone()))
    };
    o2_block.set_terminator(final_terminator);
    function.cfg.add_block(o2_block);
    for target in &original_targets {
        function.cfg.connect_blocks(&o2_label, target);
    }

    // Step 8: O ends in a second trivial opaque predicate, entering O2 at
    // runtime; the false edge back to A is a bogus loop.
    let cond2_name: Arc<str> = Arc::from(format!("{label}.bcfcond2"));
    {
        let o_block = function.cfg.get_block_mut(&o_label).unwrap();
        o_block.push(
            Instruction::new(InstructionKind::FcmpTrue { left: Value::f32(1.0), right: Value::f32(1.0) }, span.clone())
                .with_result(Value::new_temporary(cond2_name.clone(), IrType::Bool)),
        );
        o_block.set_terminator(Terminator::new(
            TerminatorKind::ConditionalBranch {
                condition: Value::new_temporary(cond2_name, IrType::Bool),
                true_label: o2_label.clone(),
                false_label: a_label.clone(),
            },
            span,
        ));
    }
    function.cfg.connect_blocks(&o_label, &o2_label);
    function.cfg.connect_blocks(&o_label, &a_label);
}

/// Module-level predicate rewrite: replaces every `fcmp_true`-keyed
/// conditional branch installed above with an arithmetic opaque predicate
/// over module globals `x`/`y` (spec.md §4.2 "module-level predicate
/// rewrite").
pub struct FinalizeBogusPredicates {
    prng: CryptoUtils,
    counter: u64,
}

impl FinalizeBogusPredicates {
    pub fn new(config: &ObfConfig) -> Self {
        let prng = match config.seed {
            Some(seed) => CryptoUtils::new(seed.wrapping_add(1)),
            None => CryptoUtils::from_entropy(),
        };
        Self { prng, counter: 0 }
    }

    fn fresh_name(&mut self, hint: &str) -> Arc<str> {
        self.counter += 1;
        Arc::from(format!("bcf.{hint}.{}", self.counter))
    }
}

const OPAQUE_KEYS: [i32; 4] = [1, 3, 5, 7];

impl Phase for FinalizeBogusPredicates {
    fn name(&self) -> &'static str {
        "bogus-predicate-finalize"
    }

    fn run_on_module(&mut self, module: &mut Module) {
        ensure_global(module, "x");
        ensure_global(module, "y");

        for function in &mut module.functions {
            let sites: Vec<(Arc<str>, Arc<str>)> = function
                .cfg
                .blocks()
                .filter_map(|block| {
                    let TerminatorKind::ConditionalBranch { condition, .. } = &block.terminator().kind else {
                        return None;
                    };
                    let ValueKind::Temporary(name) = &condition.kind else { return None };
                    let is_fcmp_true = block.instructions.iter().any(|inst| {
                        matches!(&inst.result, Some(Value { kind: ValueKind::Temporary(n), .. }) if n == name)
                            && matches!(inst.kind, InstructionKind::FcmpTrue { .. })
                    });
                    is_fcmp_true.then(|| (block.label.clone(), name.clone()))
                })
                .collect();

            for (block_label, old_cond_name) in sites {
                self.rewrite_site(function, &block_label, &old_cond_name);
            }
        }
    }
}

impl FinalizeBogusPredicates {
    fn rewrite_site(&mut self, function: &mut Function, block_label: &str, old_cond_name: &str) {
        let Some(block) = function.cfg.get_block_mut(block_label) else { return };
        let span = block.source_span.clone();

        let vx_name = self.fresh_name("vx");
        let vy_name = self.fresh_name("vy");
        block.push(
            Instruction::new(InstructionKind::Load { src: Value::new_global("x", IrType::I32), ty: IrType::I32 }, span.clone())
                .with_result(Value::new_temporary(vx_name.clone(), IrType::I32)),
        );
        block.push(
            Instruction::new(InstructionKind::Load { src: Value::new_global("y", IrType::I32), ty: IrType::I32 }, span.clone())
                .with_result(Value::new_temporary(vy_name.clone(), IrType::I32)),
        );

        let r = self.prng.get_range(125);
        let k = OPAQUE_KEYS[(r % 4) as usize];

        let sum_name = self.fresh_name("sum");
        block.push(
            Instruction::new(
                InstructionKind::Binary {
                    op: IrBinaryOp::Add,
                    left: Value::new_temporary(vx_name.clone(), IrType::I32),
                    right: Value::i32(k),
                    ty: IrType::I32,
                },
                span.clone(),
            )
            .with_result(Value::new_temporary(sum_name.clone(), IrType::I32)),
        );
        let prod_name = self.fresh_name("prod");
        block.push(
            Instruction::new(
                InstructionKind::Binary {
                    op: IrBinaryOp::Mul,
                    left: Value::new_temporary(sum_name, IrType::I32),
                    right: Value::new_temporary(vx_name, IrType::I32),
                    ty: IrType::I32,
                },
                span.clone(),
            )
            .with_result(Value::new_temporary(prod_name.clone(), IrType::I32)),
        );
        let rem_name = self.fresh_name("rem");
        block.push(
            Instruction::new(
                InstructionKind::Binary {
                    op: IrBinaryOp::SRem,
                    left: Value::new_temporary(prod_name, IrType::I32),
                    right: Value::i32(2),
                    ty: IrType::I32,
                },
                span.clone(),
            )
            .with_result(Value::new_temporary(rem_name.clone(), IrType::I32)),
        );
        let cond1_name = self.fresh_name("parity");
        block.push(
            Instruction::new(
                InstructionKind::Icmp { predicate: IcmpPredicate::Eq, left: Value::new_temporary(rem_name, IrType::I32), right: Value::i32(0) },
                span.clone(),
            )
            .with_result(Value::new_temporary(cond1_name.clone(), IrType::Bool)),
        );

        let c = 1 + self.prng.get_range(125) as i32;
        let cond2_name = self.fresh_name("bound");
        block.push(
            Instruction::new(
                InstructionKind::Icmp { predicate: IcmpPredicate::Slt, left: Value::new_temporary(vy_name, IrType::I32), right: Value::i32(c) },
                span.clone(),
            )
            .with_result(Value::new_temporary(cond2_name.clone(), IrType::Bool)),
        );

        let (left_operand, right_operand) =
            if r % 4 < 2 { (cond1_name, cond2_name) } else { (cond2_name, cond1_name) };
        let combined_name = self.fresh_name("combined");
        block.push(
            Instruction::new(
                InstructionKind::Binary {
                    op: IrBinaryOp::Or,
                    left: Value::new_temporary(left_operand, IrType::Bool),
                    right: Value::new_temporary(right_operand, IrType::Bool),
                    ty: IrType::Bool,
                },
                span,
            )
            .with_result(Value::new_temporary(combined_name.clone(), IrType::Bool)),
        );

        if let TerminatorKind::ConditionalBranch { condition, .. } = &mut block.terminator_mut().kind {
            *condition = Value::new_temporary(combined_name, IrType::Bool);
        }

        block.instructions.retain(|inst| {
            !(matches!(&inst.result, Some(Value { kind: ValueKind::Temporary(n), .. }) if n.as_ref() == old_cond_name)
                && matches!(inst.kind, InstructionKind::FcmpTrue { .. }))
        });
    }
}

fn ensure_global(module: &mut Module, name: &str) {
    if module.get_global(name).is_none() {
        module.add_global(GlobalVariable {
            name: Arc::from(name),
            ty: IrType::I32,
            linkage: Linkage::Common,
            initializer: Some(Value::i32(0)),
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{TerminatorKind, Value};

    fn single_block_function() -> Function {
        let mut function = Function::new("f", vec![], IrType::I32, "entry");
        let span = SourceSpan::default();
        let mut entry = BasicBlock::new("entry", span.clone());
        entry.set_terminator(Terminator::new(TerminatorKind::Return { value: Value::i32(42), ty: IrType::I32 }, span));
        function.cfg.add_block(entry);
        function
    }

    #[test]
    fn selection_never_drops_below_the_original_block_count() {
        let config = ObfConfig::new(1, 1, false, Some(1)).unwrap();
        let mut bcf = BogusControlFlow::new(&config);
        let mut module = Module::new("m");
        module.add_function(single_block_function());
        bcf.run_on_function(&mut module, "f");
        let count = module.get_function("f").unwrap().block_count();
        assert!(count == 1 || count == 4);
    }

    #[test]
    fn forced_selection_adds_three_blocks() {
        let config = ObfConfig::new(100, 1, false, Some(7)).unwrap();
        let mut bcf = BogusControlFlow::new(&config);
        let mut module = Module::new("m");
        module.add_function(single_block_function());
        bcf.run_on_function(&mut module, "f");
        let function = module.get_function("f").unwrap();
        assert_eq!(function.block_count(), 4);
        assert_eq!(bcf.stats().modified_blocks, 1);
        assert_eq!(bcf.stats().added_blocks, 3);
    }

    #[test]
    fn finalize_replaces_fcmp_true_with_arithmetic_predicate() {
        let config = ObfConfig::new(100, 1, false, Some(7)).unwrap();
        let mut bcf = BogusControlFlow::new(&config);
        let mut module = Module::new("m");
        module.add_function(single_block_function());
        bcf.run_on_function(&mut module, "f");

        let mut finalize = FinalizeBogusPredicates::new(&config);
        finalize.run_on_module(&mut module);

        assert!(module.get_global("x").is_some());
        assert!(module.get_global("y").is_some());
        let function = module.get_function("f").unwrap();
        for block in function.cfg.blocks() {
            assert!(!block.instructions.iter().any(|inst| matches!(inst.kind, InstructionKind::FcmpTrue { .. })));
        }
    }
}
