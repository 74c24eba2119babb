// src/ir/instruction.rs
use super::{IrType, Value};
use crate::location::source_span::SourceSpan;
use std::fmt;

/// Arithmetic/bitwise binary opcodes. Integer and float variants are kept in
/// one enum (rather than split like the original LLVM opcode list) since the
/// instruction's `ty` already disambiguates — the Junk Synthesizer dispatches
/// on `op.is_float()` rather than on the instruction's type tag.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrBinaryOp {
    Add,
    Sub,
    Mul,
    UDiv,
    SDiv,
    URem,
    SRem,
    Shl,
    LShr,
    AShr,
    And,
    Or,
    Xor,
    FAdd,
    FSub,
    FMul,
    FDiv,
    FRem,
}

impl IrBinaryOp {
    pub fn is_float(self) -> bool {
        matches!(self, IrBinaryOp::FAdd | IrBinaryOp::FSub | IrBinaryOp::FMul | IrBinaryOp::FDiv | IrBinaryOp::FRem)
    }

    pub fn is_integer(self) -> bool {
        !self.is_float()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IrUnaryOp {
    Neg,
    FNeg,
    Not,
}

/// The ten LLVM integer-comparison predicates (`ICmpInst::Predicate`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum IcmpPredicate {
    Eq,
    Ne,
    Ugt,
    Uge,
    Ult,
    Ule,
    Sgt,
    Sge,
    Slt,
    Sle,
}

impl IcmpPredicate {
    pub const ALL: [IcmpPredicate; 10] = [
        IcmpPredicate::Eq,
        IcmpPredicate::Ne,
        IcmpPredicate::Ugt,
        IcmpPredicate::Uge,
        IcmpPredicate::Ult,
        IcmpPredicate::Ule,
        IcmpPredicate::Sgt,
        IcmpPredicate::Sge,
        IcmpPredicate::Slt,
        IcmpPredicate::Sle,
    ];

    pub fn from_index(i: usize) -> IcmpPredicate {
        Self::ALL[i % Self::ALL.len()]
    }
}

/// The ten LLVM ordered/unordered float-comparison predicates, excluding the
/// always-true/always-false predicates which only the BCF rewriter itself
/// ever materializes (spec §4.2, `fcmp_true`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FcmpPredicate {
    Oeq,
    One,
    Ugt,
    Uge,
    Ult,
    Ule,
    Ogt,
    Oge,
    Olt,
    Ole,
}

impl FcmpPredicate {
    pub const ALL: [FcmpPredicate; 10] = [
        FcmpPredicate::Oeq,
        FcmpPredicate::One,
        FcmpPredicate::Ugt,
        FcmpPredicate::Uge,
        FcmpPredicate::Ult,
        FcmpPredicate::Ule,
        FcmpPredicate::Ogt,
        FcmpPredicate::Oge,
        FcmpPredicate::Olt,
        FcmpPredicate::Ole,
    ];

    pub fn from_index(i: usize) -> FcmpPredicate {
        Self::ALL[i % Self::ALL.len()]
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CastKind {
    IntToFloat,
    FloatToInt,
    IntTruncate,
    IntSignExtend,
    IntZeroExtend,
    Bitcast,
}

#[derive(Debug, Clone, PartialEq)]
pub struct DebugInfo {
    pub source_span: SourceSpan,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Instruction {
    pub kind: InstructionKind,
    pub result: Option<Value>,
    pub debug_info: DebugInfo,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InstructionKind {
    Alloca { ty: IrType },
    Store { value: Value, dest: Value },
    Load { src: Value, ty: IrType },
    Binary { op: IrBinaryOp, left: Value, right: Value, ty: IrType },
    Unary { op: IrUnaryOp, operand: Value, ty: IrType },
    Icmp { predicate: IcmpPredicate, left: Value, right: Value },
    Fcmp { predicate: FcmpPredicate, left: Value, right: Value },
    /// The BCF-specific always-true float comparison (spec §4.2 step 5/8).
    /// Kept distinct from `Fcmp` so the module finalization pass can find
    /// every occurrence without risking a false match on a user `Fcmp::Oeq`
    /// of two equal constants.
    FcmpTrue { left: Value, right: Value },
    Select { condition: Value, true_value: Value, false_value: Value, ty: IrType },
    Call { func: Value, args: Vec<Value>, ty: IrType },
    Cast { kind: CastKind, value: Value, from_ty: IrType, to_ty: IrType },
    Phi { ty: IrType, incoming: Vec<(Value, std::sync::Arc<str>)> },
    /// `llvm.lifetime.start`/`end`-style marker. Cloned verbatim by the Junk
    /// Synthesizer, never mutated (spec §4.1 edge cases).
    LifetimeMarker { ptr: Value },
    /// Debug-location-only intrinsic (e.g. `llvm.dbg.value`). Same treatment
    /// as `LifetimeMarker`.
    DebugIntrinsic { value: Value },
}

impl Instruction {
    pub fn new(kind: InstructionKind, span: SourceSpan) -> Self {
        Instruction { kind, result: None, debug_info: DebugInfo { source_span: span } }
    }

    pub fn with_result(mut self, result: Value) -> Self {
        self.result = Some(result);
        self
    }

    /// Whether this instruction must stay at the head of its block
    /// (PHI nodes only — spec §3 "PHI node occurs only at block start").
    pub fn is_phi(&self) -> bool {
        matches!(self.kind, InstructionKind::Phi { .. })
    }

    /// Lifetime markers and debug intrinsics are skipped when locating the
    /// split point for bogus control-flow (spec §4.2 step 1).
    pub fn is_lifetime_or_debug(&self) -> bool {
        matches!(self.kind, InstructionKind::LifetimeMarker { .. } | InstructionKind::DebugIntrinsic { .. })
    }

    /// Binary/comparison operands this instruction reads, for the Junk
    /// Synthesizer's operand-remapping walk and for liveness-style queries.
    pub fn operands(&self) -> Vec<&Value> {
        match &self.kind {
            InstructionKind::Alloca { .. } => vec![],
            InstructionKind::Store { value, dest } => vec![value, dest],
            InstructionKind::Load { src, .. } => vec![src],
            InstructionKind::Binary { left, right, .. } => vec![left, right],
            InstructionKind::Unary { operand, .. } => vec![operand],
            InstructionKind::Icmp { left, right, .. } => vec![left, right],
            InstructionKind::Fcmp { left, right, .. } => vec![left, right],
            InstructionKind::FcmpTrue { left, right } => vec![left, right],
            InstructionKind::Select { condition, true_value, false_value, .. } => {
                vec![condition, true_value, false_value]
            }
            InstructionKind::Call { func, args, .. } => {
                let mut v = vec![func];
                v.extend(args.iter());
                v
            }
            InstructionKind::Cast { value, .. } => vec![value],
            InstructionKind::Phi { incoming, .. } => incoming.iter().map(|(v, _)| v).collect(),
            InstructionKind::LifetimeMarker { ptr } => vec![ptr],
            InstructionKind::DebugIntrinsic { value } => vec![value],
        }
    }

    /// Mutable access to operands, for the Junk Synthesizer's remapping pass
    /// and for comparison-predicate/operand-swap mutation.
    pub fn operands_mut(&mut self) -> Vec<&mut Value> {
        match &mut self.kind {
            InstructionKind::Alloca { .. } => vec![],
            InstructionKind::Store { value, dest } => vec![value, dest],
            InstructionKind::Load { src, .. } => vec![src],
            InstructionKind::Binary { left, right, .. } => vec![left, right],
            InstructionKind::Unary { operand, .. } => vec![operand],
            InstructionKind::Icmp { left, right, .. } => vec![left, right],
            InstructionKind::Fcmp { left, right, .. } => vec![left, right],
            InstructionKind::FcmpTrue { left, right } => vec![left, right],
            InstructionKind::Select { condition, true_value, false_value, .. } => {
                vec![condition, true_value, false_value]
            }
            InstructionKind::Call { func, args, .. } => {
                let mut v = vec![func];
                v.extend(args.iter_mut());
                v
            }
            InstructionKind::Cast { value, .. } => vec![value],
            InstructionKind::Phi { incoming, .. } => incoming.iter_mut().map(|(v, _)| v).collect(),
            InstructionKind::LifetimeMarker { ptr } => vec![ptr],
            InstructionKind::DebugIntrinsic { value } => vec![value],
        }
    }
}

impl fmt::Display for Instruction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let result_str = if let Some(result) = &self.result { format!("{result} = ") } else { String::new() };

        match &self.kind {
            InstructionKind::Alloca { ty } => write!(f, "{result_str}alloca {ty}"),
            InstructionKind::Store { value, dest } => write!(f, "store {value} to {dest}"),
            InstructionKind::Load { src, ty } => write!(f, "{result_str}load {ty} from {src}"),
            InstructionKind::Binary { op, left, right, ty } => write!(f, "{result_str}{op} {left}, {right} : {ty}"),
            InstructionKind::Unary { op, operand, ty } => write!(f, "{result_str}{op} {operand} : {ty}"),
            InstructionKind::Icmp { predicate, left, right } => {
                write!(f, "{result_str}icmp {predicate} {left}, {right}")
            }
            InstructionKind::Fcmp { predicate, left, right } => {
                write!(f, "{result_str}fcmp {predicate} {left}, {right}")
            }
            InstructionKind::FcmpTrue { left, right } => write!(f, "{result_str}fcmp true {left}, {right}"),
            InstructionKind::Select { condition, true_value, false_value, ty } => {
                write!(f, "{result_str}select {condition}, {true_value}, {false_value} : {ty}")
            }
            InstructionKind::Call { func, args, ty } => {
                let args_str = args.iter().map(|arg| arg.to_string()).collect::<Vec<_>>().join(", ");
                write!(f, "{result_str}call {func}({args_str}) : {ty}")
            }
            InstructionKind::Cast { kind: _, value, from_ty, to_ty } => {
                write!(f, "{result_str}cast {value} from {from_ty} to {to_ty}")
            }
            InstructionKind::Phi { ty, incoming } => {
                let incoming_str =
                    incoming.iter().map(|(val, block)| format!("[ {val}, {block} ]")).collect::<Vec<_>>().join(", ");
                write!(f, "{result_str}phi {ty} [ {incoming_str} ]")
            }
            InstructionKind::LifetimeMarker { ptr } => write!(f, "lifetime_marker {ptr}"),
            InstructionKind::DebugIntrinsic { value } => write!(f, "dbg.value {value}"),
        }
    }
}

impl fmt::Display for IrBinaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IrBinaryOp::Add => "add",
            IrBinaryOp::Sub => "sub",
            IrBinaryOp::Mul => "mul",
            IrBinaryOp::UDiv => "udiv",
            IrBinaryOp::SDiv => "sdiv",
            IrBinaryOp::URem => "urem",
            IrBinaryOp::SRem => "srem",
            IrBinaryOp::Shl => "shl",
            IrBinaryOp::LShr => "lshr",
            IrBinaryOp::AShr => "ashr",
            IrBinaryOp::And => "and",
            IrBinaryOp::Or => "or",
            IrBinaryOp::Xor => "xor",
            IrBinaryOp::FAdd => "fadd",
            IrBinaryOp::FSub => "fsub",
            IrBinaryOp::FMul => "fmul",
            IrBinaryOp::FDiv => "fdiv",
            IrBinaryOp::FRem => "frem",
        };
        f.write_str(s)
    }
}

impl fmt::Display for IrUnaryOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IrUnaryOp::Neg => f.write_str("neg"),
            IrUnaryOp::FNeg => f.write_str("fneg"),
            IrUnaryOp::Not => f.write_str("not"),
        }
    }
}

impl fmt::Display for IcmpPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            IcmpPredicate::Eq => "eq",
            IcmpPredicate::Ne => "ne",
            IcmpPredicate::Ugt => "ugt",
            IcmpPredicate::Uge => "uge",
            IcmpPredicate::Ult => "ult",
            IcmpPredicate::Ule => "ule",
            IcmpPredicate::Sgt => "sgt",
            IcmpPredicate::Sge => "sge",
            IcmpPredicate::Slt => "slt",
            IcmpPredicate::Sle => "sle",
        };
        f.write_str(s)
    }
}

impl fmt::Display for FcmpPredicate {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            FcmpPredicate::Oeq => "oeq",
            FcmpPredicate::One => "one",
            FcmpPredicate::Ugt => "ugt",
            FcmpPredicate::Uge => "uge",
            FcmpPredicate::Ult => "ult",
            FcmpPredicate::Ule => "ule",
            FcmpPredicate::Ogt => "ogt",
            FcmpPredicate::Oge => "oge",
            FcmpPredicate::Olt => "olt",
            FcmpPredicate::Ole => "ole",
        };
        f.write_str(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn predicate_cycling_is_total() {
        for i in 0..20 {
            let _ = IcmpPredicate::from_index(i);
            let _ = FcmpPredicate::from_index(i);
        }
    }

    #[test]
    fn binary_op_float_classification() {
        assert!(IrBinaryOp::FAdd.is_float());
        assert!(!IrBinaryOp::Add.is_float());
        assert!(IrBinaryOp::Add.is_integer());
    }
}
