// src/ir/basic_block.rs
use super::{instruction::*, terminator::*};
use crate::location::source_span::SourceSpan;
use std::fmt;
use std::sync::Arc;

/// A single-entry, single-exit straight-line run of instructions ending in a
/// [`Terminator`]. Blocks are addressed by `label` rather than index so that
/// passes can insert and rename blocks freely (bogus predicates and the
/// flattening dispatcher both synthesize fresh blocks at arbitrary points in
/// the function).
#[derive(Debug, Clone, PartialEq)]
pub struct BasicBlock {
    pub label: Arc<str>,
    pub source_span: SourceSpan,
    pub instructions: Vec<Instruction>,
    pub(crate) terminator: Terminator,
}

impl BasicBlock {
    pub fn new(label: &str, span: SourceSpan) -> Self {
        Self {
            label: label.into(),
            source_span: span.clone(),
            instructions: Vec::new(),
            terminator: Terminator::new(TerminatorKind::Unreachable, span),
        }
    }

    #[inline]
    pub fn push(&mut self, inst: Instruction) {
        self.instructions.push(inst);
    }

    #[inline]
    pub fn terminator(&self) -> &Terminator {
        &self.terminator
    }

    #[inline]
    pub fn terminator_mut(&mut self) -> &mut Terminator {
        &mut self.terminator
    }

    #[inline]
    pub fn set_terminator(&mut self, t: Terminator) {
        self.terminator = t;
    }

    /// The index of the first non-PHI instruction, i.e. the split point a
    /// bogus-control-flow insertion or a junk-synthesis pass must respect
    /// (PHI nodes stay pinned to the block head).
    pub fn first_non_phi_index(&self) -> usize {
        self.instructions.iter().position(|inst| !inst.is_phi()).unwrap_or(self.instructions.len())
    }

    pub fn phis(&self) -> impl Iterator<Item = &Instruction> {
        self.instructions.iter().take_while(|inst| inst.is_phi())
    }
}

impl fmt::Display for BasicBlock {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{}:", self.label)?;
        for inst in &self.instructions {
            writeln!(f, "  {inst}")?;
        }
        writeln!(f, "  {}", self.terminator)
    }
}
