//! Finalization: the top-level compile entry point.
//!
//! Combines name assignment, statement generation and the mapping block into
//! the persisted [`LavaanSpec`]. Compilation never fails from the caller's
//! point of view: any internal error becomes a `# Generation failed: ...`
//! comment in the syntax so the workflow keeps a well-formed document.

use chrono::Utc;
use serde::{Deserialize, Serialize};
use std::fmt::Write as _;
use tracing::{debug, warn};

use crate::codegen::{generate_statements, one_line, render};
use crate::document::{LatentId, LavaanSpec, MeasurementModel};
use crate::error::CompileError;
use crate::renamer::VariableNames;

pub const MAPPING_HEADER: &str = "## Mapping";
pub const GENERATION_FAILED: &str = "# Generation failed:";
pub const DEFAULT_MAPPING_TEXT_WIDTH: usize = 70;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct CompileOptions {
    /// Append the `## Mapping` comment block.
    pub include_mapping: bool,
    /// Item and global texts are cut to this many characters in the mapping.
    pub mapping_text_width: usize,
    /// Emit `#` comment lines between measurement blocks.
    pub include_comments: bool,
}

impl Default for CompileOptions {
    fn default() -> Self {
        Self {
            include_mapping: true,
            mapping_text_width: DEFAULT_MAPPING_TEXT_WIDTH,
            include_comments: true,
        }
    }
}

/// Compiles the model with default options.
pub fn compile(model: &MeasurementModel) -> LavaanSpec {
    compile_with_options(model, &CompileOptions::default())
}

pub fn compile_with_options(model: &MeasurementModel, options: &CompileOptions) -> LavaanSpec {
    let syntax = match generate_syntax(model, options) {
        Ok(syntax) => syntax,
        Err(e) => {
            warn!(error = %e, "lavaan generation failed");
            format!("{} {}\n", GENERATION_FAILED, one_line(&e.to_string()))
        }
    };
    LavaanSpec {
        syntax,
        generated_at: Utc::now(),
    }
}

/// The fallible core of [`compile_with_options`].
pub fn generate_syntax(
    model: &MeasurementModel,
    options: &CompileOptions,
) -> Result<String, CompileError> {
    let names = VariableNames::assign(model)?;
    let statements = generate_statements(model, &names, options.include_comments)?;
    debug!(statements = statements.len(), "lavaan statements generated");

    let mut syntax = render(&statements);
    if options.include_mapping {
        if !syntax.is_empty() {
            syntax.push_str("\n\n");
        }
        syntax.push_str(&mapping_block(model, &names, options.mapping_text_width)?);
    }
    if !syntax.is_empty() && !syntax.ends_with('\n') {
        syntax.push('\n');
    }
    Ok(syntax)
}

// ═══════════════════════════════════════════════════════════════════════════════
// MAPPING BLOCK
// ═══════════════════════════════════════════════════════════════════════════════

fn clip(text: &str, width: usize) -> String {
    one_line(text).chars().take(width).collect()
}

/// Human-readable legend from variable names back to the source texts.
pub fn mapping_block(
    model: &MeasurementModel,
    names: &VariableNames,
    width: usize,
) -> Result<String, CompileError> {
    let mut out = String::new();
    writeln!(out, "{}", MAPPING_HEADER)?;

    let unidim = model.is_unidimensional();
    for item in model.all_items() {
        let Some(name) = names.item(item.id) else {
            continue;
        };
        let latent_key = if unidim {
            LatentId::Unidim.key().to_string()
        } else {
            item.subdimension_id.clone().unwrap_or_default()
        };
        let marker = if model.is_excluded(&latent_key, item.id) {
            " (excluded)"
        } else {
            ""
        };
        writeln!(
            out,
            "# {} = item {}{}: {}",
            name,
            item.id,
            marker,
            clip(&item.text, width)
        )?;
    }

    if !unidim {
        let latents = model
            .inputs
            .facets
            .iter()
            .map(|f| LatentId::facet(f.id.clone()))
            .chain(std::iter::once(LatentId::SecondOrder));
        for latent in latents {
            let owner = match &latent {
                LatentId::Facet(id) => model
                    .facet(id)
                    .map(|f| one_line(f.label()))
                    .unwrap_or_else(|| id.clone()),
                _ => "higher-order construct".to_string(),
            };
            for global in model.present_globals(&latent) {
                let Some(name) = names.global(&latent, &global.id) else {
                    continue;
                };
                writeln!(
                    out,
                    "# {} = global reflective item of {}: {}",
                    name,
                    owner,
                    clip(&global.text, width)
                )?;
            }
        }

        for facet in &model.inputs.facets {
            if facet.short_code().is_none() {
                continue;
            }
            if let Some(name) = names.facet(&facet.id) {
                writeln!(out, "# {} = facet {}", name, one_line(facet.label()))?;
            }
        }
    }

    let construct = one_line(&model.inputs.construct.name);
    if construct.is_empty() {
        writeln!(out, "# {} = overall construct", names.overall)?;
    } else {
        writeln!(out, "# {} = overall construct {}", names.overall, construct)?;
    }

    Ok(out)
}

// ═══════════════════════════════════════════════════════════════════════════════
// NAPI EXPORTS
// ═══════════════════════════════════════════════════════════════════════════════

#[cfg(feature = "napi")]
use napi_derive::napi;

/// Compiles a serialized [`MeasurementModel`] and returns the [`LavaanSpec`]
/// as JSON. `options_json` may be omitted for defaults.
#[cfg(feature = "napi")]
#[napi]
pub fn compile_model_native(
    model_json: String,
    options_json: Option<String>,
) -> napi::Result<serde_json::Value> {
    let model: MeasurementModel = serde_json::from_str(&model_json)
        .map_err(|e| napi::Error::from_reason(format!("Invalid model: {}", e)))?;
    let options = match options_json {
        Some(raw) => serde_json::from_str(&raw)
            .map_err(|e| napi::Error::from_reason(format!("Invalid options: {}", e)))?,
        None => CompileOptions::default(),
    };
    let spec = compile_with_options(&model, &options);
    serde_json::to_value(spec)
        .map_err(|e| napi::Error::from_reason(format!("Serialization failed: {}", e)))
}
