// src/lib.rs
/// # opaqueflow
///
/// An IR-to-IR obfuscation pass suite operating on a small typed, SSA
/// basic-block intermediate representation this crate owns end to end: no
/// host compiler, no external pass manager.
///
/// ## Important modules:
/// * `ir` - the IR data model: module/function/block/instruction/terminator,
///   CFG storage, dominance analysis, well-formedness validation
/// * `passes` - the obfuscation passes themselves (Bogus Control-Flow,
///   Control-Flow Flattening, the Junk Synthesizer, and their collaborators)
/// * `prng` - the seedable randomness source every pass draws from
/// * `config` - validated pass configuration
/// * `error` - the crate's error taxonomy
/// * `stats` - write-only counters accumulated across a pipeline run
pub mod config;
pub mod error;
pub mod ir;
pub mod location;
pub mod passes;
pub mod prng;
pub mod stats;
