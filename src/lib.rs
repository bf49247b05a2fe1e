//! # Measurement Model Compiler
//!
//! Compiles a construct, its facets and items, per-facet measurement modes
//! and identification choices into lavaan syntax, and validates the model
//! for completeness.
//!
//! ## Pipeline
//!
//! `parse` (load + upgrade) → `scaling` (identification rules) →
//! `indicators` (measurement relations) → `renamer` (variable names) →
//! `codegen` (statements) → `finalize` (syntax + mapping block).
//! `validate` runs alongside and never blocks compilation.
//!
//! ## Invariants
//!
//! 1. **Determinism**: the same model always compiles to the same syntax.
//!    Only `generatedAt` differs between runs.
//! 2. **Unique Names**: every variable in the output has exactly one name,
//!    matching `^[A-Za-z_][A-Za-z0-9_]*$`, and no two symbols share a name.
//! 3. **Identification**: `fix_loading` needs two eligible indicators and a
//!    reference from the eligible set. Otherwise the variance is fixed.
//! 4. **Unidimensional Shortcut**: with no facets, or an explicitly
//!    unidimensional construct, the output holds exactly one measurement
//!    block and nothing about a higher-order construct.
//! 5. **Never Blank**: an internal failure produces a
//!    `# Generation failed: ...` comment, never an error to the caller.
//! 6. **Skipped Facets**: facets without a measurement mode are left out of
//!    the output entirely.

mod autosave;
mod cache;
mod codegen;
mod document;
mod error;
mod finalize;
mod indicators;
mod parse;
mod renamer;
mod scaling;
mod session;
mod validate;

#[cfg(test)]
mod test_fixtures;

#[cfg(test)]
mod sanitize_props;
#[cfg(test)]
mod validate_tests;

pub use autosave::{AutoSave, MemoryStore, ModelStore, DEFAULT_AUTOSAVE_DELAY_MS};
pub use cache::CompileCache;
pub use codegen::{generate_statements, measurement_block, render, Statement};
pub use document::{
    ConstructInfo, Direction, Facet, GlobalItem, Indicator, IndicatorRef, Item, LatentId,
    LavaanSpec, MeasurementMode, MeasurementModel, ScalingMethod, ScalingRule, SecondOrder,
    Step4Document, StepInputs, SECOND_ORDER_ID, UNIDIM_ID,
};
pub use error::{CompileError, SessionError, StoreError};
pub use finalize::{compile, compile_with_options, generate_syntax, CompileOptions};
pub use indicators::{build_indicators, eligible_indicators, emitted_facets, Candidate};
pub use parse::{load_model, parse_document, parse_inputs, upgrade, STEP4_STORAGE_KEY};
pub use renamer::{derive_short_code, sanitize, VariableNames};
pub use scaling::{
    effective_scaling, ensure_all, ensure_scaling, resolve_scaling_defaults, revalidate,
    revalidate_rule, MIN_REFERENCE_INDICATORS,
};
pub use session::{SessionOptions, Step4Session};
pub use validate::{validate, Diagnostic, Severity, ValidationReport};

#[cfg(feature = "napi")]
pub use finalize::compile_model_native;
#[cfg(feature = "napi")]
pub use renamer::sanitize_native;
#[cfg(feature = "napi")]
pub use validate::validate_model_native;
