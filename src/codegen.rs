//! Codegen module for the measurement-model compiler
//!
//! Turns the model into ordered lavaan statements, one block per latent:
//! first-order facets in declaration order, then the higher-order construct.
//! The unidimensional case short-circuits into a single block.
//!
//! Output conventions:
//! - `=~` reflective measurement, `<~` formative (causal) definition
//! - the reference indicator of a `fix_loading` rule is listed first with a
//!   `1*` prefix and no space (`F =~ 1*i2 + i1 + i3`)
//! - `fix_variance` adds a companion `F ~~ 1*F` statement
//! - indicators are joined with `" + "`

use std::fmt;

use crate::document::{
    Direction, Indicator, IndicatorRef, LatentId, MeasurementMode, MeasurementModel,
    ScalingRule,
};
use crate::error::CompileError;
use crate::indicators::{build_indicators, emitted_facets};
use crate::renamer::VariableNames;
use crate::scaling::effective_scaling;

pub const LOADING_FIX: &str = "1*";
pub const JOIN: &str = " + ";

// ═══════════════════════════════════════════════════════════════════════════════
// STATEMENTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Statement {
    Comment(String),
    /// `latent =~ a + b`; with `fixed_first` the first indicator carries `1*`.
    Reflective {
        latent: String,
        indicators: Vec<String>,
        fixed_first: bool,
    },
    /// `latent <~ a + b`
    Formative { latent: String, causes: Vec<String> },
    /// `latent ~~ 1*latent`
    FixVariance { latent: String },
    Blank,
}

impl fmt::Display for Statement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Statement::Comment(text) => write!(f, "# {}", text),
            Statement::Reflective {
                latent,
                indicators,
                fixed_first,
            } => {
                write!(f, "{} =~ ", latent)?;
                for (i, name) in indicators.iter().enumerate() {
                    if i > 0 {
                        f.write_str(JOIN)?;
                    }
                    if i == 0 && *fixed_first {
                        f.write_str(LOADING_FIX)?;
                    }
                    f.write_str(name)?;
                }
                Ok(())
            }
            Statement::Formative { latent, causes } => {
                write!(f, "{} <~ {}", latent, causes.join(JOIN))
            }
            Statement::FixVariance { latent } => {
                write!(f, "{} ~~ {}{}", latent, LOADING_FIX, latent)
            }
            Statement::Blank => Ok(()),
        }
    }
}

/// Collapses whitespace so free text is safe inside a `#` comment line.
pub fn one_line(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEASUREMENT BLOCKS
// ═══════════════════════════════════════════════════════════════════════════════

/// A reflective block for `latent` over `(id, name)` indicators.
///
/// With a `fix_loading` rule whose reference is listed, that indicator moves
/// to the front and gets the `1*` prefix. Anything else fixes the variance.
/// Empty indicator lists emit nothing.
pub fn measurement_block(
    latent: &str,
    indicators: &[(String, String)],
    rule: &ScalingRule,
) -> Vec<Statement> {
    if indicators.is_empty() {
        return Vec::new();
    }

    let reference = rule
        .reference()
        .and_then(|r| indicators.iter().position(|(id, _)| id == r));

    match reference {
        Some(pos) => {
            let mut names = Vec::with_capacity(indicators.len());
            names.push(indicators[pos].1.clone());
            names.extend(
                indicators
                    .iter()
                    .enumerate()
                    .filter(|(i, _)| *i != pos)
                    .map(|(_, (_, name))| name.clone()),
            );
            vec![Statement::Reflective {
                latent: latent.to_string(),
                indicators: names,
                fixed_first: true,
            }]
        }
        None => vec![
            Statement::Reflective {
                latent: latent.to_string(),
                indicators: indicators.iter().map(|(_, n)| n.clone()).collect(),
                fixed_first: false,
            },
            Statement::FixVariance {
                latent: latent.to_string(),
            },
        ],
    }
}

/// Fallback for a formative latent without any present global reflective
/// indicator. Keeps the latent in the output with its variance fixed.
fn unanchored_variance_fix(latent: &str) -> Vec<Statement> {
    vec![
        Statement::Comment(format!(
            "{} has no global reflective indicators; variance fixed to keep it identified",
            latent
        )),
        Statement::FixVariance {
            latent: latent.to_string(),
        },
    ]
}

// ═══════════════════════════════════════════════════════════════════════════════
// GENERATION
// ═══════════════════════════════════════════════════════════════════════════════

/// Emits every statement of the model, without the mapping block.
pub fn generate_statements(
    model: &MeasurementModel,
    names: &VariableNames,
    include_comments: bool,
) -> Result<Vec<Statement>, CompileError> {
    let mut out = Vec::new();
    // Each commented block after the first is set off by a blank line.
    let comment = |out: &mut Vec<Statement>, text: String| {
        if include_comments {
            if !out.is_empty() {
                out.push(Statement::Blank);
            }
            out.push(Statement::Comment(text));
        }
    };

    let construct = one_line(&model.inputs.construct.name);
    if !construct.is_empty() {
        comment(&mut out, format!("Measurement model: {}", construct));
    }

    if model.is_unidimensional() {
        let latent = LatentId::Unidim;
        let indicators = item_indicators(
            names,
            model.active_items(&latent).iter().map(|it| it.id),
        )?;
        out.extend(measurement_block(
            &names.overall,
            &indicators,
            &effective_scaling(model, &latent),
        ));
        return Ok(out);
    }

    let relations = build_indicators(model);
    for facet in &model.inputs.facets {
        let Some(mode) = model.facet_mode(&facet.id) else {
            continue;
        };
        let latent = LatentId::facet(facet.id.clone());
        let latent_name = names
            .latent(&latent)
            .ok_or_else(|| CompileError::Unnamed(facet.id.clone()))?;
        let own = relations.iter().filter(|r| r.facet_id == facet.id);

        match mode {
            MeasurementMode::Reflective => {
                let items = own
                    .filter(|r| r.direction == Direction::Out && !r.global)
                    .filter_map(item_ref);
                let indicators = item_indicators(names, items)?;
                if indicators.is_empty() {
                    continue;
                }
                comment(&mut out, format!("{} (reflective)", one_line(facet.label())));
                out.extend(measurement_block(
                    latent_name,
                    &indicators,
                    &effective_scaling(model, &latent),
                ));
            }
            MeasurementMode::Formative => {
                let own: Vec<_> = own.collect();
                let causes = item_indicators(
                    names,
                    own.iter()
                        .filter(|r| r.direction == Direction::In)
                        .filter_map(|r| item_ref(r)),
                )?;
                let globals = global_indicators(
                    names,
                    &latent,
                    own.iter()
                        .filter(|r| r.global)
                        .map(|r| r.item_id.to_string()),
                )?;

                comment(&mut out, format!("{} (formative)", one_line(facet.label())));
                if !causes.is_empty() {
                    out.push(Statement::Formative {
                        latent: latent_name.to_string(),
                        causes: causes.into_iter().map(|(_, n)| n).collect(),
                    });
                }
                if globals.is_empty() {
                    out.extend(unanchored_variance_fix(latent_name));
                } else {
                    out.extend(measurement_block(
                        latent_name,
                        &globals,
                        &effective_scaling(model, &latent),
                    ));
                }
            }
        }
    }

    if let Some(kind) = model.document.second_order.kind {
        let latent = LatentId::SecondOrder;
        let facets = emitted_facets(model)
            .into_iter()
            .map(|f| {
                names
                    .facet(&f.id)
                    .map(|n| (f.id.clone(), n.to_string()))
                    .ok_or_else(|| CompileError::Unnamed(f.id.clone()))
            })
            .collect::<Result<Vec<_>, _>>()?;
        if facets.is_empty() {
            return Ok(out);
        }

        comment(&mut out, format!("Higher-order construct ({})", kind));
        match kind {
            MeasurementMode::Reflective => {
                out.extend(measurement_block(
                    &names.overall,
                    &facets,
                    &effective_scaling(model, &latent),
                ));
            }
            MeasurementMode::Formative => {
                out.push(Statement::Formative {
                    latent: names.overall.clone(),
                    causes: facets.into_iter().map(|(_, n)| n).collect(),
                });
                let globals = global_indicators(
                    names,
                    &latent,
                    relations
                        .iter()
                        .filter(|r| r.second_order && r.global)
                        .map(|r| r.item_id.to_string()),
                )?;
                if globals.is_empty() {
                    out.extend(unanchored_variance_fix(&names.overall));
                } else {
                    out.extend(measurement_block(
                        &names.overall,
                        &globals,
                        &effective_scaling(model, &latent),
                    ));
                }
            }
        }
    }

    Ok(out)
}

fn item_ref(relation: &Indicator) -> Option<i64> {
    match relation.item_id {
        IndicatorRef::Item(id) => Some(id),
        IndicatorRef::Named(_) => None,
    }
}

fn item_indicators(
    names: &VariableNames,
    item_ids: impl Iterator<Item = i64>,
) -> Result<Vec<(String, String)>, CompileError> {
    item_ids
        .map(|id| {
            names
                .item(id)
                .map(|n| (id.to_string(), n.to_string()))
                .ok_or_else(|| CompileError::Unnamed(format!("item {}", id)))
        })
        .collect()
}

fn global_indicators(
    names: &VariableNames,
    latent: &LatentId,
    global_ids: impl Iterator<Item = String>,
) -> Result<Vec<(String, String)>, CompileError> {
    global_ids
        .map(|id| {
            let name = names
                .global(latent, &id)
                .map(str::to_string)
                .ok_or_else(|| CompileError::Unnamed(format!("global {}", id)))?;
            Ok((id, name))
        })
        .collect()
}

/// Renders statements one per line.
pub fn render(statements: &[Statement]) -> String {
    statements
        .iter()
        .map(Statement::to_string)
        .collect::<Vec<_>>()
        .join("\n")
}
