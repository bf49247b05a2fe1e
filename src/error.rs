//! Error types for the measurement-model compiler.
//!
//! Validation findings are not errors; they live in [`crate::validate`] as
//! diagnostics. The enums here cover real failures only: an assembly step
//! that could not complete, a persistence collaborator that refused a
//! read/write, and an edit the session cannot apply.

/// Failure while assembling the lavaan syntax.
///
/// Never escapes [`crate::compile`]; it is downgraded to a
/// `# Generation failed: ...` comment there.
#[derive(Debug, thiserror::Error)]
pub enum CompileError {
    #[error("could not allocate a unique variable name for {role} \"{raw}\"")]
    NameExhausted { role: &'static str, raw: String },

    #[error("\"{0}\" has no variable name")]
    Unnamed(String),

    #[error("formatting failed: {0}")]
    Format(#[from] std::fmt::Error),
}

/// Failure reported by a [`crate::ModelStore`] implementation.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("stored document is not valid JSON: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("storage backend rejected key \"{key}\": {reason}")]
    Backend { key: String, reason: String },
}

/// An edit that cannot be applied to the current model.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("unknown facet \"{0}\"")]
    UnknownFacet(String),

    #[error("unknown item {0}")]
    UnknownItem(i64),

    #[error("\"{reference}\" is not an eligible reference indicator for latent \"{latent}\"")]
    IneligibleReference { latent: String, reference: String },

    #[error("latent \"{latent}\" needs at least two eligible indicators to fix a loading (has {available})")]
    TooFewIndicators { latent: String, available: usize },

    #[error("global reflective slot {index} does not exist for latent \"{latent}\"")]
    NoSuchGlobalSlot { latent: String, index: usize },

    #[error("latent \"{0}\" is not part of the current model")]
    InactiveLatent(String),

    #[error(transparent)]
    Store(#[from] StoreError),
}
