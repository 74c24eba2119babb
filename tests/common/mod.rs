// tests/common/mod.rs
//! Small IR builders shared across the integration tests, standing in for a
//! front end: every test starts from a hand-assembled `Module` rather than
//! parsing source text.

use opaqueflow::ir::{BasicBlock, Function, IrType, Module, Terminator, TerminatorKind, Value};
use opaqueflow::location::source_span::SourceSpan;

/// `fn straight(n: i32) -> i32 { entry -> mid -> exit }`, three blocks
/// chained by unconditional branches, each ending with a `ret`.
pub fn straight_line_module(function_name: &str) -> Module {
    let mut module = Module::new("m");
    let mut function = Function::new(function_name, vec![(std::sync::Arc::from("n"), IrType::I32)], IrType::I32, "entry");

    let mut entry = BasicBlock::new("entry", SourceSpan::default());
    entry.set_terminator(Terminator::new(TerminatorKind::Branch { label: "mid".into() }, SourceSpan::default()));
    function.cfg.add_block(entry);

    let mut mid = BasicBlock::new("mid", SourceSpan::default());
    mid.set_terminator(Terminator::new(TerminatorKind::Branch { label: "exit".into() }, SourceSpan::default()));
    function.cfg.add_block(mid);
    function.cfg.connect_blocks("entry", "mid");

    let mut exit = BasicBlock::new("exit", SourceSpan::default());
    exit.set_terminator(Terminator::new(
        TerminatorKind::Return { value: Value::new_local("n", IrType::I32), ty: IrType::I32 },
        SourceSpan::default(),
    ));
    function.cfg.add_block(exit);
    function.cfg.connect_blocks("mid", "exit");

    module.add_function(function);
    module
}

/// `fn branchy(n: i32) -> i32 { entry: br n ? then : other }`, a
/// conditional-entry function with two single-block arms.
pub fn conditional_module(function_name: &str) -> Module {
    let mut module = Module::new("m");
    let mut function = Function::new(function_name, vec![(std::sync::Arc::from("n"), IrType::I32)], IrType::I32, "entry");

    let mut entry = BasicBlock::new("entry", SourceSpan::default());
    entry.set_terminator(Terminator::new(
        TerminatorKind::ConditionalBranch {
            condition: Value::new_local("n", IrType::I32),
            true_label: "then".into(),
            false_label: "other".into(),
        },
        SourceSpan::default(),
    ));
    function.cfg.add_block(entry);

    let mut then_block = BasicBlock::new("then", SourceSpan::default());
    then_block.set_terminator(Terminator::new(
        TerminatorKind::Return { value: Value::i32(1), ty: IrType::I32 },
        SourceSpan::default(),
    ));
    function.cfg.add_block(then_block);
    function.cfg.connect_blocks("entry", "then");

    let mut other_block = BasicBlock::new("other", SourceSpan::default());
    other_block.set_terminator(Terminator::new(
        TerminatorKind::Return { value: Value::i32(0), ty: IrType::I32 },
        SourceSpan::default(),
    ));
    function.cfg.add_block(other_block);
    function.cfg.connect_blocks("entry", "other");

    module.add_function(function);
    module
}

/// A single-block function whose entry immediately `invoke`s a callee,
/// normal/unwind arms both returning.
pub fn invoke_module(function_name: &str) -> Module {
    let mut module = Module::new("m");
    let mut function = Function::new(function_name, vec![], IrType::I32, "entry");

    let mut entry = BasicBlock::new("entry", SourceSpan::default());
    entry.set_terminator(Terminator::new(
        TerminatorKind::Invoke {
            func: Value::new_global("callee", IrType::I32),
            args: vec![],
            ty: IrType::I32,
            normal_label: "ok".into(),
            unwind_label: "lpad".into(),
        },
        SourceSpan::default(),
    ));
    function.cfg.add_block(entry);

    let mut ok = BasicBlock::new("ok", SourceSpan::default());
    ok.set_terminator(Terminator::new(
        TerminatorKind::Return { value: Value::i32(0), ty: IrType::I32 },
        SourceSpan::default(),
    ));
    function.cfg.add_block(ok);
    function.cfg.connect_blocks("entry", "ok");

    let mut lpad = BasicBlock::new("lpad", SourceSpan::default());
    lpad.set_terminator(Terminator::new(
        TerminatorKind::Return { value: Value::i32(-1), ty: IrType::I32 },
        SourceSpan::default(),
    ));
    function.cfg.add_block(lpad);
    function.cfg.connect_blocks("entry", "lpad");

    module.add_function(function);
    module
}
