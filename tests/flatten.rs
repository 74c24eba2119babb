// tests/flatten.rs
mod common;

use opaqueflow::config::ObfConfig;
use opaqueflow::ir::{validate_module, ImmediateValue, InstructionKind, TerminatorKind, Value, ValueKind};
use opaqueflow::passes::{Flatten, Phase};

#[test]
fn straight_line_function_gains_a_dispatcher_loop() {
    let config = ObfConfig::new(30, 1, true, Some(5)).unwrap();
    let mut module = common::straight_line_module("f");

    let mut flatten = Flatten::new(&config);
    flatten.run_on_module(&mut module);

    let function = module.get_function("f").unwrap();
    assert!(function.cfg.get_block("entry.loopEntry").is_some());
    assert!(function.cfg.get_block("entry.loopEnd").is_some());
    assert!(function.cfg.get_block("entry.switchDefault").is_some());
    assert_eq!(flatten.stats().functions_flattened, 1);
    validate_module(&module).expect("flattening keeps the CFG well-formed");
}

#[test]
fn conditional_entry_is_split_before_flattening() {
    let config = ObfConfig::new(30, 1, true, Some(13)).unwrap();
    let mut module = common::conditional_module("f");

    let mut flatten = Flatten::new(&config);
    flatten.run_on_module(&mut module);

    let function = module.get_function("f").unwrap();
    assert!(function.cfg.get_block("entry.first").is_some());
    let first = function.cfg.get_block("entry.first").unwrap();
    assert!(first.instructions.iter().any(|i| matches!(i.kind, InstructionKind::Select { .. })));
    validate_module(&module).expect("split-entry flattening keeps the CFG well-formed");

    // The prologue must dispatch straight into `entry.first`, or the
    // original conditional entry never gets evaluated.
    let prologue = function.cfg.get_block("entry").unwrap();
    let initial_state = prologue
        .instructions
        .iter()
        .find_map(|i| match &i.kind {
            InstructionKind::Store { value: Value { kind: ValueKind::Immediate(ImmediateValue::U32(v)), .. }, .. } => {
                Some(*v)
            }
            _ => None,
        })
        .expect("prologue stores an initial dispatch state");
    let loop_entry = function.cfg.get_block("entry.loopEntry").unwrap();
    let TerminatorKind::Switch { cases, .. } = &loop_entry.terminator().kind else {
        panic!("expected a switch terminator on the dispatcher loop entry");
    };
    let first_case_state = cases
        .iter()
        .find_map(|(value, label)| match &value.kind {
            ValueKind::Immediate(ImmediateValue::U32(v)) if label == "entry.first" => Some(*v),
            _ => None,
        })
        .expect("entry.first has a dispatch case");
    assert_eq!(initial_state, first_case_state, "the prologue must dispatch straight into entry.first");
}

#[test]
fn invoke_terminated_entries_are_left_unflattened() {
    let config = ObfConfig::new(30, 1, true, Some(21)).unwrap();
    let mut module = common::invoke_module("f");
    let before = module.get_function("f").unwrap().block_count();

    let mut flatten = Flatten::new(&config);
    flatten.run_on_module(&mut module);

    let function = module.get_function("f").unwrap();
    assert_eq!(function.block_count(), before);
    assert_eq!(flatten.stats().functions_flattened, 0);
    validate_module(&module).expect("an unflattened invoke-entry function is still well-formed");
}

#[test]
fn switch_variable_survives_stack_legalization_across_the_dispatcher_blocks() {
    let config = ObfConfig::new(30, 1, true, Some(99)).unwrap();
    let mut module = common::straight_line_module("f");

    let mut flatten = Flatten::new(&config);
    flatten.run_on_module(&mut module);

    let function = module.get_function("f").unwrap();
    let stores: usize = function
        .cfg
        .blocks()
        .map(|b| b.instructions.iter().filter(|i| matches!(i.kind, InstructionKind::Store { .. })).count())
        .sum();
    // the prologue's initial store, plus one per original block rejoining the loop
    assert!(stores >= 2);
}
