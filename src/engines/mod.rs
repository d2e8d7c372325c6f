//! Speech synthesis engines.
//!
//! Concrete providers behind [`crate::SynthesisEngine`]. Each engine maps
//! its own failures onto [`crate::SynthesisError`]; retry and fallback are
//! handled by [`crate::synthesis::Orchestrator`].
//!
//! # Available Engines
//!
//! - `espeak` - espeak-ng command-line synthesis (espeak-ng required)

pub mod espeak;
