//! PatchPlan IR & Applier.

pub mod anchor;
pub mod applier;
pub mod ir;

pub use anchor::{hash_fragment, AnchorHash};
pub use applier::{apply, parse, validate_structural, ApplyResult, StructuralReason};
pub use ir::{Op, PatchPlan, Risk};
