//! Window evaluators
//!
//! - Certainty: fraction of recent events satisfying a rule's comparison

pub mod certainty;

pub use certainty::{format_certainty, Assessment, CertaintyEvaluator, CertaintyReport};
