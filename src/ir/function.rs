// src/ir/function.rs
use super::{basic_block::BasicBlock, cfg::ControlFlowGraph, types::IrType};
use petgraph::Direction;
use std::{collections::HashMap, fmt, sync::Arc};

/// A single function body: a name, a typed parameter/return signature, a
/// control-flow graph of blocks, and the set of stack-allocated locals that
/// survive SSA construction (the stack-legalizer collaborator's `alloca`
/// cells among them).
#[derive(Debug, Clone, PartialEq)]
pub struct Function {
    pub name: Arc<str>,
    pub parameters: Vec<(Arc<str>, IrType)>,
    pub return_type: IrType,
    pub cfg: ControlFlowGraph,
    pub local_vars: HashMap<Arc<str>, IrType>,
}

impl Function {
    pub fn new(name: &str, params: Vec<(Arc<str>, IrType)>, return_type: IrType, entry_label: &str) -> Self {
        Self {
            name: name.into(),
            parameters: params,
            return_type,
            cfg: ControlFlowGraph::new(entry_label.into()),
            local_vars: HashMap::new(),
        }
    }

    pub fn add_local(&mut self, name: impl Into<Arc<str>>, ty: IrType) {
        self.local_vars.insert(name.into(), ty);
    }

    /// Blocks in reverse-post-order, the traversal every pass in this crate
    /// uses so that predecessors are always visited before successors
    /// (barring back-edges).
    pub fn blocks_rpo(&mut self) -> Vec<&BasicBlock> {
        let order = self.cfg.reverse_post_order().to_vec();
        order.iter().map(|&idx| &self.cfg.graph()[idx]).collect()
    }

    pub fn block_count(&self) -> usize {
        self.cfg.blocks().count()
    }

    /// Number of direct predecessors of the block with the given label.
    pub fn predecessor_count(&self, label: &str) -> usize {
        match self.cfg.find_block_by_label(label) {
            Some(idx) => self.cfg.graph().neighbors_directed(idx, Direction::Incoming).count(),
            None => 0,
        }
    }
}

impl fmt::Display for Function {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let params_str =
            self.parameters.iter().map(|(name, ty)| format!("{name}: {ty}")).collect::<Vec<_>>().join(", ");

        writeln!(f, "function {} ({}) -> {}:", self.name, params_str, self.return_type)?;

        for idx in self.cfg.reverse_post_order() {
            writeln!(f, "{}", self.cfg.graph()[*idx])?;
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::location::source_span::SourceSpan;

    #[test]
    fn new_function_has_single_entry_block_count() {
        let mut func = Function::new("main", vec![], IrType::I32, "entry");
        func.cfg.add_block(BasicBlock::new("entry", SourceSpan::default()));
        assert_eq!(func.block_count(), 1);
        assert_eq!(func.predecessor_count("entry"), 0);
    }
}
