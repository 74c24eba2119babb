// src/passes/junk.rs
use crate::ir::{
    BasicBlock, FcmpPredicate, IcmpPredicate, Instruction, InstructionKind, IrBinaryOp, IrType, IrUnaryOp, Value,
    ValueKind,
};
use crate::location::source_span::SourceSpan;
use crate::prng::CryptoUtils;
use std::collections::HashMap;
use std::sync::Arc;

/// Clones a basic block and decorates the clone with plausible dead
/// instructions and randomized comparison predicates (spec.md §4.1). The
/// returned block carries no terminator — the caller installs one.
pub fn synthesize_junk_block(source: &BasicBlock, name_hint: &str, prng: &mut CryptoUtils) -> BasicBlock {
    let new_label: Arc<str> = Arc::from(format!("{}.{name_hint}", source.label));
    let mut clone = BasicBlock::new(&new_label, source.source_span.clone());

    // Step 1+2: deep-clone with a value-to-value map from every temporary
    // this block defines to a freshly renamed clone of that temporary.
    let mut value_map: HashMap<Arc<str>, Arc<str>> = HashMap::new();
    for inst in &source.instructions {
        if let Some(Value { kind: ValueKind::Temporary(name), .. }) = &inst.result {
            value_map.insert(name.clone(), Arc::from(format!("{name}.{name_hint}")));
        }
    }

    // Step 3: walk the remapped clone, inserting dead junk immediately
    // before each binary op and rewriting comparison predicates in place.
    for inst in &source.instructions {
        let cloned = remap_instruction(inst, &value_map);
        for junk in dead_junk_for(&cloned, prng) {
            clone.push(junk);
        }
        clone.push(mutate_comparison(cloned, prng));
    }

    clone
}

fn remap_value(value: &Value, map: &HashMap<Arc<str>, Arc<str>>) -> Value {
    match &value.kind {
        ValueKind::Temporary(name) => match map.get(name) {
            Some(renamed) => Value { kind: ValueKind::Temporary(renamed.clone()), ty: value.ty.clone() },
            None => value.clone(),
        },
        _ => value.clone(),
    }
}

/// Rewrites every operand through `map` (function arguments, other-block
/// values, and constants map identically). Debug locations carry over
/// verbatim since `Instruction::clone` copies `debug_info` as-is.
fn remap_instruction(inst: &Instruction, map: &HashMap<Arc<str>, Arc<str>>) -> Instruction {
    let mut cloned = inst.clone();
    if let Some(result) = &inst.result {
        cloned.result = Some(remap_value(result, map));
    }
    for operand in cloned.operands_mut() {
        *operand = remap_value(operand, map);
    }
    cloned
}

/// Step 3's comparison-predicate rewrite: 1/3 no-op, 1/3 operand swap, 1/3
/// uniform predicate reassignment. Only ever called on instructions inside
/// an already-unreachable block (the BCF rewriter's guarantee).
fn mutate_comparison(mut inst: Instruction, prng: &mut CryptoUtils) -> Instruction {
    match &inst.kind {
        InstructionKind::Icmp { predicate, left, right } => {
            let (p, l, r) = mutate_icmp(*predicate, left.clone(), right.clone(), prng);
            inst.kind = InstructionKind::Icmp { predicate: p, left: l, right: r };
        }
        InstructionKind::Fcmp { predicate, left, right } => {
            let (p, l, r) = mutate_fcmp(*predicate, left.clone(), right.clone(), prng);
            inst.kind = InstructionKind::Fcmp { predicate: p, left: l, right: r };
        }
        _ => {}
    }
    inst
}

fn mutate_icmp(
    predicate: IcmpPredicate, left: Value, right: Value, prng: &mut CryptoUtils,
) -> (IcmpPredicate, Value, Value) {
    match prng.get_range(3) {
        0 => (predicate, left, right),
        1 => (predicate, right, left),
        _ => (IcmpPredicate::from_index(prng.get_range(10) as usize), left, right),
    }
}

fn mutate_fcmp(
    predicate: FcmpPredicate, left: Value, right: Value, prng: &mut CryptoUtils,
) -> (FcmpPredicate, Value, Value) {
    match prng.get_range(3) {
        0 => (predicate, left, right),
        1 => (predicate, right, left),
        _ => (FcmpPredicate::from_index(prng.get_range(10) as usize), left, right),
    }
}

/// Produces the dead junk instructions step 3 inserts immediately before a
/// binary-op instruction: an independent per-instruction round count drawn
/// from `[r, 10)` with `r` itself random in `[0,10)`, each round choosing one
/// of the documented no-op/neg-add/sub-mul/shift (or float analogue) shapes.
/// Lifetime markers, debug intrinsics, and non-binary instructions produce
/// no junk.
fn dead_junk_for(inst: &Instruction, prng: &mut CryptoUtils) -> Vec<Instruction> {
    let InstructionKind::Binary { op, left, right, ty } = &inst.kind else {
        return Vec::new();
    };
    if inst.is_lifetime_or_debug() {
        return Vec::new();
    }

    let op = *op;
    let left = left.clone();
    let right = right.clone();
    let ty = ty.clone();

    let r = prng.get_range(10);
    let rounds = 10 - r;
    let mut junk = Vec::new();
    for _ in 0..rounds {
        junk.extend(one_junk_round(op, &left, &right, &ty, prng));
    }
    junk
}

fn one_junk_round(op: IrBinaryOp, left: &Value, right: &Value, ty: &IrType, prng: &mut CryptoUtils) -> Vec<Instruction> {
    let span = SourceSpan::default();
    if op.is_float() {
        match prng.get_range(3) {
            1 => {
                let neg = Instruction::new(
                    InstructionKind::Unary { op: IrUnaryOp::FNeg, operand: left.clone(), ty: ty.clone() },
                    span.clone(),
                );
                let add = Instruction::new(
                    InstructionKind::Binary { op: IrBinaryOp::FAdd, left: left.clone(), right: right.clone(), ty: ty.clone() },
                    span,
                );
                vec![neg, add]
            }
            2 => {
                let sub = Instruction::new(
                    InstructionKind::Binary { op: IrBinaryOp::FSub, left: left.clone(), right: right.clone(), ty: ty.clone() },
                    span.clone(),
                );
                let mul = Instruction::new(
                    InstructionKind::Binary { op: IrBinaryOp::FMul, left: left.clone(), right: right.clone(), ty: ty.clone() },
                    span,
                );
                vec![sub, mul]
            }
            _ => Vec::new(),
        }
    } else {
        match prng.get_range(4) {
            1 => {
                let neg = Instruction::new(
                    InstructionKind::Unary { op: IrUnaryOp::Neg, operand: left.clone(), ty: ty.clone() },
                    span.clone(),
                );
                let add = Instruction::new(
                    InstructionKind::Binary { op: IrBinaryOp::Add, left: left.clone(), right: right.clone(), ty: ty.clone() },
                    span,
                );
                vec![neg, add]
            }
            2 => {
                let sub = Instruction::new(
                    InstructionKind::Binary { op: IrBinaryOp::Sub, left: left.clone(), right: right.clone(), ty: ty.clone() },
                    span.clone(),
                );
                let mul = Instruction::new(
                    InstructionKind::Binary { op: IrBinaryOp::Mul, left: left.clone(), right: right.clone(), ty: ty.clone() },
                    span,
                );
                vec![sub, mul]
            }
            3 => {
                let shl = Instruction::new(
                    InstructionKind::Binary { op: IrBinaryOp::Shl, left: left.clone(), right: right.clone(), ty: ty.clone() },
                    span,
                );
                vec![shl]
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ir::{Terminator, TerminatorKind};

    fn sample_block() -> BasicBlock {
        let mut block = BasicBlock::new("bb0", SourceSpan::default());
        block.push(
            Instruction::new(
                InstructionKind::Binary { op: IrBinaryOp::Add, left: Value::i32(1), right: Value::i32(2), ty: IrType::I32 },
                SourceSpan::default(),
            )
            .with_result(Value::new_temporary("t0", IrType::I32)),
        );
        block.set_terminator(Terminator::new(
            TerminatorKind::Return { value: Value::new_temporary("t0", IrType::I32), ty: IrType::I32 },
            SourceSpan::default(),
        ));
        block
    }

    #[test]
    fn synthesized_block_has_no_terminator_and_renamed_result() {
        let mut prng = CryptoUtils::new(1);
        let source = sample_block();
        let clone = synthesize_junk_block(&source, "alt", &mut prng);
        assert!(!clone.instructions.is_empty());
        let original_binary = clone.instructions.last().unwrap();
        let result = original_binary.result.as_ref().unwrap();
        assert_eq!(result.to_string(), "%t0.alt");
        assert!(matches!(clone.terminator().kind, TerminatorKind::Unreachable));
    }

    #[test]
    fn junk_results_are_never_referenced_by_the_original_result() {
        let mut prng = CryptoUtils::new(7);
        let source = sample_block();
        let clone = synthesize_junk_block(&source, "alt", &mut prng);
        // The last instruction is always the (possibly predicate-mutated)
        // clone of the sole original instruction.
        let original_binary = clone.instructions.last().unwrap();
        assert!(matches!(original_binary.kind, InstructionKind::Binary { .. }));
    }

    #[test]
    fn icmp_mutation_preserves_operand_pair_or_swaps_it() {
        let mut prng = CryptoUtils::new(9);
        let (_, l, r) = mutate_icmp(IcmpPredicate::Eq, Value::i32(1), Value::i32(2), &mut prng);
        assert!((l == Value::i32(1) && r == Value::i32(2)) || (l == Value::i32(2) && r == Value::i32(1)));
    }
}
