use std::process::ExitCode;

use clap::Parser;
use console::style;
use opaqueflow::config::ObfConfig;
use opaqueflow::ir::{
    validate_module, BasicBlock, Function, Instruction, InstructionKind, IrBinaryOp, IrType, Module, Terminator,
    TerminatorKind, Value,
};
use opaqueflow::location::source_span::SourceSpan;
use opaqueflow::passes::{BogusControlFlow, Flatten, FinalizeBogusPredicates, Phase};
use opaqueflow::stats::ObfuscationStats;

/// Obfuscates a small hand-built demonstration module and prints the result.
#[derive(Parser, Debug)]
#[command(name = "opaqueflow", version, about = "IR-to-IR obfuscation pass suite")]
struct Cli {
    /// Per-block probability (1-100) that bogus control-flow is inserted.
    #[arg(long, default_value_t = 30)]
    bcf_prob: u8,

    /// Number of bogus-control-flow sweeps per function.
    #[arg(long, default_value_t = 1)]
    bcf_loop: u32,

    /// Also run control-flow flattening after bogus control-flow.
    #[arg(long)]
    flatten: bool,

    /// Fixes the PRNG seed for reproducible output.
    #[arg(long)]
    seed: Option<u64>,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    let config = match ObfConfig::new(cli.bcf_prob, cli.bcf_loop, cli.flatten, cli.seed) {
        Ok(config) => config,
        Err(err) => {
            eprintln!("{} {err}", style("error:").red().bold());
            return ExitCode::FAILURE;
        }
    };

    let mut module = build_demo_module();
    let mut totals = ObfuscationStats::new();

    let mut bcf = BogusControlFlow::new(&config);
    println!("{} {}", style("Running phase:").cyan().bold(), bcf.name());
    bcf.run_on_module(&mut module);
    totals.merge(bcf.stats());

    if config.flatten {
        let mut flat = Flatten::new(&config);
        println!("{} {}", style("Running phase:").cyan().bold(), flat.name());
        flat.run_on_module(&mut module);
        totals.merge(flat.stats());
    }

    let mut finalize = FinalizeBogusPredicates::new(&config);
    println!("{} {}", style("Running phase:").cyan().bold(), finalize.name());
    finalize.run_on_module(&mut module);

    if let Err(err) = validate_module(&module) {
        eprintln!("{} {err}", style("invariant violated:").red().bold());
        return ExitCode::FAILURE;
    }

    println!();
    println!("{module}");
    println!();
    println!("{totals}");

    ExitCode::SUCCESS
}

fn build_demo_module() -> Module {
    let mut module = Module::new("demo");
    let span = SourceSpan::default();

    let mut function =
        Function::new("compute", vec![(std::sync::Arc::from("n"), IrType::I32)], IrType::I32, "entry");

    let mut entry = BasicBlock::new("entry", span.clone());
    entry.push(
        Instruction::new(
            InstructionKind::Binary {
                op: IrBinaryOp::Add,
                left: Value::new_local("n", IrType::I32),
                right: Value::i32(1),
                ty: IrType::I32,
            },
            span.clone(),
        )
        .with_result(Value::new_temporary("t0", IrType::I32)),
    );
    entry.set_terminator(Terminator::new(
        TerminatorKind::Return { value: Value::new_temporary("t0", IrType::I32), ty: IrType::I32 },
        span,
    ));
    function.cfg.add_block(entry);

    module.add_function(function);
    module
}
