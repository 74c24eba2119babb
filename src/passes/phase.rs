// src/passes/phase.rs
use crate::ir::Module;
use console::style;

/// A single obfuscation pass. Function passes override `run_on_function`;
/// module-wide passes (the BCF predicate finalization) override
/// `run_on_module` instead and leave the default no-op for the other.
pub trait Phase {
    fn name(&self) -> &'static str;

    fn run_on_function(&mut self, _module: &mut Module, _function_name: &str) {}

    fn run_on_module(&mut self, module: &mut Module) {
        let names: Vec<String> = module.functions().iter().map(|f| f.name.to_string()).collect();
        for name in names {
            self.run_on_function(module, &name);
        }
    }
}

/// Runs each phase over the module in order, printing a colored status line
/// per phase in the teacher's ambient-logging idiom.
pub fn run_pipeline(module: &mut Module, phases: Vec<Box<dyn Phase>>) {
    for mut phase in phases {
        println!("{} {}", style("Running phase:").cyan().bold(), phase.name());
        phase.run_on_module(module);
    }
}
