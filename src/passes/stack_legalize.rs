// src/passes/stack_legalize.rs
use crate::ir::{Function, Instruction, InstructionKind, IrType, Value, ValueKind};
use crate::location::source_span::SourceSpan;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;

/// Demotes every SSA temporary that is defined in one block and used outside
/// it through an `alloca`/`store`-at-def/`load`-at-use triple, restoring the
/// dominance invariant after a rewrite (like flattening) has scattered a
/// block's former successors across a dispatcher loop (spec.md §6 "stack
/// legalizer"). Returns the number of values demoted.
pub fn fix_stack(function: &mut Function) -> usize {
    let def_block = collect_definitions(function);
    let escaping = find_escaping_values(function, &def_block);

    if escaping.is_empty() {
        return 0;
    }

    let entry_label: Arc<str> = Arc::from(function.cfg.entry_label());
    let mut addr_of: HashMap<Arc<str>, Arc<str>> = HashMap::new();

    for name in &escaping {
        let (def_label, ty) = def_block[name].clone();
        let addr_name: Arc<str> = Arc::from(format!("{name}.addr"));
        addr_of.insert(name.clone(), addr_name.clone());

        insert_alloca(function, &entry_label, &addr_name, &ty);
        insert_store_after_def(function, &def_label, name, &addr_name, &ty);
    }

    replace_cross_block_uses(function, &escaping, &def_block, &addr_of);

    escaping.len()
}

fn collect_definitions(function: &Function) -> HashMap<Arc<str>, (Arc<str>, IrType)> {
    let mut def_block = HashMap::new();
    for block in function.cfg.blocks() {
        for inst in &block.instructions {
            if let Some(Value { kind: ValueKind::Temporary(name), ty }) = &inst.result {
                def_block.insert(name.clone(), (block.label.clone(), ty.clone()));
            }
        }
    }
    def_block
}

fn find_escaping_values(function: &Function, def_block: &HashMap<Arc<str>, (Arc<str>, IrType)>) -> HashSet<Arc<str>> {
    let mut escaping = HashSet::new();
    for block in function.cfg.blocks() {
        let mut check = |maybe_temp: &ValueKind| {
            if let ValueKind::Temporary(name) = maybe_temp
                && let Some((def_label, _)) = def_block.get(name)
                && def_label.as_ref() != block.label.as_ref()
            {
                escaping.insert(name.clone());
            }
        };
        for inst in &block.instructions {
            for operand in inst.operands() {
                check(&operand.kind);
            }
        }
        for used in block.terminator().get_used_values() {
            check(&used.kind);
        }
    }
    escaping
}

fn insert_alloca(function: &mut Function, entry_label: &str, addr_name: &str, ty: &IrType) {
    if let Some(entry) = function.cfg.get_block_mut(entry_label) {
        let already_present = entry.instructions.iter().any(
            |i| matches!(&i.result, Some(Value { kind: ValueKind::Local(n), .. }) if n.as_ref() == addr_name),
        );
        if !already_present {
            let alloca = Instruction::new(InstructionKind::Alloca { ty: ty.clone() }, SourceSpan::default())
                .with_result(Value::new_local(addr_name, ty.clone().pointer_to()));
            entry.instructions.insert(0, alloca);
        }
    }
}

fn insert_store_after_def(function: &mut Function, def_label: &str, name: &str, addr_name: &str, ty: &IrType) {
    let Some(block) = function.cfg.get_block_mut(def_label) else { return };
    let Some(pos) = block.instructions.iter().position(
        |i| matches!(&i.result, Some(Value { kind: ValueKind::Temporary(n), .. }) if n.as_ref() == name),
    ) else {
        return;
    };
    let store = Instruction::new(
        InstructionKind::Store {
            value: Value::new_temporary(name, ty.clone()),
            dest: Value::new_local(addr_name, ty.clone().pointer_to()),
        },
        SourceSpan::default(),
    );
    block.instructions.insert(pos + 1, store);
}

fn replace_cross_block_uses(
    function: &mut Function, escaping: &HashSet<Arc<str>>, def_block: &HashMap<Arc<str>, (Arc<str>, IrType)>,
    addr_of: &HashMap<Arc<str>, Arc<str>>,
) {
    let labels: Vec<Arc<str>> = function.cfg.blocks().map(|b| b.label.clone()).collect();

    for label in labels {
        let Some(block) = function.cfg.get_block_mut(&label) else { continue };

        let mut needed: HashMap<Arc<str>, Arc<str>> = HashMap::new();
        let is_used_here = |value: &Value, needed: &mut HashMap<Arc<str>, Arc<str>>| {
            if let ValueKind::Temporary(name) = &value.kind
                && escaping.contains(name)
                && def_block[name].0.as_ref() != label.as_ref()
                && !needed.contains_key(name)
            {
                needed.insert(name.clone(), Arc::from(format!("{name}.ld.{label}")));
            }
        };

        for inst in &block.instructions {
            for operand in inst.operands() {
                is_used_here(operand, &mut needed);
            }
        }
        for used in block.terminator().get_used_values() {
            is_used_here(used, &mut needed);
        }

        if needed.is_empty() {
            continue;
        }

        let insert_at = block.first_non_phi_index();
        for (name, load_name) in needed.iter().rev() {
            let (_, ty) = &def_block[name];
            let addr_name = &addr_of[name];
            let load = Instruction::new(
                InstructionKind::Load { src: Value::new_local(addr_name.clone(), ty.clone().pointer_to()), ty: ty.clone() },
                SourceSpan::default(),
            )
            .with_result(Value::new_temporary(load_name.clone(), ty.clone()));
            block.instructions.insert(insert_at, load);
        }

        for operand in block.instructions[insert_at + needed.len()..].iter_mut().flat_map(Instruction::operands_mut) {
            if let ValueKind::Temporary(name) = &operand.kind
                && let Some(load_name) = needed.get(name)
            {
                operand.kind = ValueKind::Temporary(load_name.clone());
            }
        }

        let terminator = block.terminator_mut();
        for value in terminator_operands_mut(terminator) {
            if let ValueKind::Temporary(name) = &value.kind
                && let Some(load_name) = needed.get(name)
            {
                value.kind = ValueKind::Temporary(load_name.clone());
            }
        }
    }
}

fn terminator_operands_mut(terminator: &mut crate::ir::Terminator) -> Vec<&mut Value> {
    use crate::ir::TerminatorKind;
    match &mut terminator.kind {
        TerminatorKind::Return { value, .. } => vec![value],
        TerminatorKind::ConditionalBranch { condition, .. } => vec![condition],
        TerminatorKind::Switch { value, .. } => vec![value],
        TerminatorKind::IndirectBranch { address, .. } => vec![address],
        TerminatorKind::Invoke { func, args, .. } => {
            let mut v = vec![func];
            v.extend(args.iter_mut());
            v
        }
        _ => Vec::new(),
    }
}
