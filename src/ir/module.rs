// src/ir/module.rs
use super::{Function, IrType, Value};
use std::fmt;
use std::sync::Arc;

/// Describes the data layout for different targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DataLayout {
    LinuxX86_64,
    LinuxAArch64,
    WindowsX86_64,
    MacOSX86_64,
    FreeBSDX86_64,
    NetBSDX86_64,
    OpenBSDX86_64,
    DragonFlyX86_64,
}

impl fmt::Display for DataLayout {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let layout = match self {
            DataLayout::LinuxX86_64 => "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128",
            DataLayout::LinuxAArch64 => "e-m:e-i8:8:32-i16:16:32-i64:64-i128:128-n32:64-S128",
            DataLayout::WindowsX86_64 => "e-m:w-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128",
            DataLayout::MacOSX86_64 => "e-m:o-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128",
            DataLayout::FreeBSDX86_64 => "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128",
            DataLayout::NetBSDX86_64 => "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128",
            DataLayout::OpenBSDX86_64 => "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128",
            DataLayout::DragonFlyX86_64 => "e-m:e-p270:32:32-p271:32:32-p272:64:64-i64:64-f80:128-n8:16:32:64-S128",
        };
        f.write_str(layout)
    }
}

/// Identifies the target triple (arch-os-environment).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TargetTriple {
    X86_64UnknownLinuxGnu,
    X86_64PcWindowsGnu,
    X86_64AppleDarwin,
    AArch64UnknownLinuxGnu,
    AArch64AppleDarwin,
    AArch64PcWindowsGnu,
    I686PcWindowsGnu,
    I686UnknownLinuxGnu,
    Wasm32UnknownEmscripten,
}

impl fmt::Display for TargetTriple {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let triple = match self {
            TargetTriple::X86_64UnknownLinuxGnu => "x86_64-unknown-linux-gnu",
            TargetTriple::X86_64PcWindowsGnu => "x86_64-pc-windows-gnu",
            TargetTriple::X86_64AppleDarwin => "x86_64-apple-darwin",
            TargetTriple::AArch64UnknownLinuxGnu => "aarch64-unknown-linux-gnu",
            TargetTriple::AArch64AppleDarwin => "aarch64-apple-darwin",
            TargetTriple::AArch64PcWindowsGnu => "aarch64-pc-windows-gnu",
            TargetTriple::I686PcWindowsGnu => "i686-pc-windows-gnu",
            TargetTriple::I686UnknownLinuxGnu => "i686-unknown-linux-gnu",
            TargetTriple::Wasm32UnknownEmscripten => "wasm32-unknown-emscripten",
        };
        f.write_str(triple)
    }
}

/// Visibility/linkage of a module-level global, mirroring the subset of LLVM
/// linkage kinds relevant to obfuscation: whether a global can be folded
/// away, and whether its initializer is externally observable.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Linkage {
    Private,
    Internal,
    /// Mergeable across translation units with a zero-equivalent tentative
    /// initializer; an optimizer may not constant-fold a `common` global's
    /// reads the way it could a known-internal zero.
    Common,
    External,
}

impl fmt::Display for Linkage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Linkage::Private => "private",
            Linkage::Internal => "internal",
            Linkage::Common => "common",
            Linkage::External => "external",
        };
        f.write_str(s)
    }
}

/// A module-level global variable. The Bogus Control-Flow pass relies on two
/// such globals (conventionally named `x` and `y`) to key its opaque integer
/// predicate; any global works as long as its initializer is an immediate.
#[derive(Debug, Clone, PartialEq)]
pub struct GlobalVariable {
    pub name: Arc<str>,
    pub ty: IrType,
    pub linkage: Linkage,
    pub initializer: Option<Value>,
}

impl fmt::Display for GlobalVariable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.initializer {
            Some(init) => write!(f, "@{} = {} global {} {}", self.name, self.linkage, self.ty, init),
            None => write!(f, "@{} = {} global {}", self.name, self.linkage, self.ty),
        }
    }
}

/// A compilation unit: a set of functions plus the globals they reference.
#[derive(Debug, Clone)]
pub struct Module {
    pub name: Arc<str>,
    pub functions: Vec<Function>,
    pub globals: Vec<GlobalVariable>,
    pub data_layout: DataLayout,
    pub target_triple: TargetTriple,
}

impl Module {
    pub fn new(name: impl Into<Arc<str>>) -> Self {
        Self {
            name: name.into(),
            functions: Vec::new(),
            globals: Vec::new(),
            data_layout: DataLayout::LinuxX86_64,
            target_triple: TargetTriple::X86_64UnknownLinuxGnu,
        }
    }

    pub fn add_function(&mut self, function: Function) {
        self.functions.push(function);
    }

    pub fn add_global(&mut self, global: GlobalVariable) {
        self.globals.push(global);
    }

    pub fn set_data_layout(&mut self, layout: DataLayout) {
        self.data_layout = layout;
    }

    pub fn set_target_triple(&mut self, triple: TargetTriple) {
        self.target_triple = triple;
    }

    pub fn get_function(&self, name: &str) -> Option<&Function> {
        self.functions.iter().find(|f| &*f.name == name)
    }

    pub fn get_function_mut(&mut self, name: &str) -> Option<&mut Function> {
        self.functions.iter_mut().find(|f| &*f.name == name)
    }

    pub fn get_global(&self, name: &str) -> Option<&GlobalVariable> {
        self.globals.iter().find(|g| &*g.name == name)
    }

    pub fn functions(&self) -> &[Function] {
        &self.functions
    }

    pub fn data_layout(&self) -> &DataLayout {
        &self.data_layout
    }

    pub fn target_triple(&self) -> &TargetTriple {
        &self.target_triple
    }

    pub fn name(&self) -> &str {
        &self.name
    }
}

impl fmt::Display for Module {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "module {} {{", self.name)?;
        writeln!(f, "  data_layout = \"{}\";", self.data_layout)?;
        writeln!(f, "  target_triple = \"{}\";", self.target_triple)?;

        for global in &self.globals {
            writeln!(f, "  {global}")?;
        }

        if self.functions.is_empty() {
            writeln!(f, "  // No functions")?;
        } else {
            for function in &self.functions {
                let s = function.to_string();
                for line in s.trim_end_matches('\n').lines() {
                    writeln!(f, "  {line}")?;
                }
            }
        }

        write!(f, "}}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn find_global_by_name() {
        let mut module = Module::new("m");
        module.add_global(GlobalVariable {
            name: Arc::from("x"),
            ty: IrType::I32,
            linkage: Linkage::Internal,
            initializer: Some(Value::i32(7)),
        });
        assert!(module.get_global("x").is_some());
        assert!(module.get_global("y").is_none());
    }
}
