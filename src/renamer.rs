//! Identifier sanitizing for the generated model syntax.
//!
//! Every symbol in the output comes from one of four roles, each with a fixed
//! textual shape:
//!
//! | role    | shape                          |
//! |---------|--------------------------------|
//! | item    | `i<id>`                        |
//! | global  | `g_<sanitized id>`             |
//! | overall | sanitized short code (`[A-Z0-9_]`) |
//! | facet   | sanitized code or name, `F_` prefixed on collision |
//!
//! Items, globals and the overall construct can never collide with each other
//! because of their shapes. Facet names are free text, so [`NameTable`] claims
//! them last and prefixes them deterministically when they would clash.

use lazy_static::lazy_static;
use regex::Regex;
use std::collections::{HashMap, HashSet};

use crate::document::{LatentId, MeasurementModel};
use crate::error::CompileError;

pub const DEFAULT_OVERALL_CODE: &str = "OVERALL";
pub const ITEM_PREFIX: &str = "i";
pub const GLOBAL_PREFIX: &str = "g_";
pub const FACET_PREFIX: &str = "F_";
pub const OVERALL_PREFIX: &str = "O_";

const MAX_SUFFIX: usize = 1000;

lazy_static! {
    static ref NON_IDENT_CHAR: Regex = Regex::new(r"[^A-Za-z0-9_]").unwrap();
    static ref NON_CODE_CHAR: Regex = Regex::new(r"[^A-Z0-9]").unwrap();
}

/// Normalizes free text into a symbolic name.
///
/// Every character outside `[A-Za-z0-9_]` becomes `_`, and a leading digit
/// gets a `_` prefix. Empty input yields `fallback_prefix`.
pub fn sanitize(raw: &str, fallback_prefix: &str) -> String {
    let replaced = NON_IDENT_CHAR.replace_all(raw, "_");
    if replaced.is_empty() {
        return fallback_prefix.to_string();
    }
    if replaced.starts_with(|c: char| c.is_ascii_digit()) {
        format!("_{}", replaced)
    } else {
        replaced.into_owned()
    }
}

/// Uppercases and strips everything outside `[A-Z0-9]`.
pub fn normalize_short_code(raw: &str) -> String {
    NON_CODE_CHAR
        .replace_all(&raw.trim().to_uppercase(), "")
        .into_owned()
}

/// First letters of the first two words, or the first two characters of a
/// single word, uppercased.
pub fn derive_short_code(name: &str) -> String {
    let words: Vec<&str> = name.split_whitespace().collect();
    let raw: String = match words.as_slice() {
        [] => String::new(),
        [single] => single.chars().take(2).collect(),
        [first, second, ..] => first.chars().take(1).chain(second.chars().take(1)).collect(),
    };
    normalize_short_code(&raw)
}

pub fn item_name(item_id: i64) -> String {
    sanitize(&format!("{}{}", ITEM_PREFIX, item_id), ITEM_PREFIX)
}

pub fn global_name(global_id: &str) -> String {
    let base = sanitize(global_id, "g");
    if base.starts_with(GLOBAL_PREFIX) {
        base
    } else {
        format!("{}{}", GLOBAL_PREFIX, base)
    }
}

fn facet_candidate(code: Option<&str>, name: &str, facet_id: &str) -> String {
    let fallback = format!(
        "{}{}",
        FACET_PREFIX,
        NON_IDENT_CHAR.replace_all(facet_id, "_")
    );
    sanitize(code.unwrap_or(name).trim(), &fallback)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Item,
    Global,
    Facet,
    Overall,
}

impl Role {
    fn prefix(self) -> &'static str {
        match self {
            Role::Item => ITEM_PREFIX,
            Role::Global => GLOBAL_PREFIX,
            Role::Facet => FACET_PREFIX,
            Role::Overall => OVERALL_PREFIX,
        }
    }

    fn label(self) -> &'static str {
        match self {
            Role::Item => "item",
            Role::Global => "global indicator",
            Role::Facet => "facet",
            Role::Overall => "overall construct",
        }
    }
}

/// Set of names already handed out during one compilation.
#[derive(Debug, Default)]
pub struct NameTable {
    taken: HashSet<String>,
}

impl NameTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Claims `candidate`, or the role-prefixed form of it, or the prefixed
    /// form with the smallest free numeric suffix.
    pub fn claim(&mut self, candidate: String, role: Role) -> Result<String, CompileError> {
        if self.taken.insert(candidate.clone()) {
            return Ok(candidate);
        }
        let prefixed = if candidate.starts_with(role.prefix()) {
            candidate.clone()
        } else {
            format!("{}{}", role.prefix(), candidate)
        };
        if self.taken.insert(prefixed.clone()) {
            return Ok(prefixed);
        }
        for n in 2..=MAX_SUFFIX {
            let suffixed = format!("{}_{}", prefixed, n);
            if self.taken.insert(suffixed.clone()) {
                return Ok(suffixed);
            }
        }
        Err(CompileError::NameExhausted {
            role: role.label(),
            raw: candidate,
        })
    }

    pub fn contains(&self, name: &str) -> bool {
        self.taken.contains(name)
    }
}

/// Variable names of every symbol a model can mention.
#[derive(Debug, Clone, Default)]
pub struct VariableNames {
    pub overall: String,
    items: HashMap<i64, String>,
    globals: HashMap<(String, String), String>,
    facets: HashMap<String, String>,
}

impl VariableNames {
    /// Assigns names in a fixed order (overall, items by id, globals in facet
    /// order then higher-order, facets in declaration order) so the result
    /// only depends on the model.
    pub fn assign(model: &MeasurementModel) -> Result<Self, CompileError> {
        let mut table = NameTable::new();
        let mut names = VariableNames {
            overall: table.claim(
                sanitize(&model.overall_short_code(), DEFAULT_OVERALL_CODE),
                Role::Overall,
            )?,
            ..Default::default()
        };

        for item in model.all_items() {
            if names.items.contains_key(&item.id) {
                continue;
            }
            let name = table.claim(item_name(item.id), Role::Item)?;
            names.items.insert(item.id, name);
        }

        let latents = model
            .inputs
            .facets
            .iter()
            .map(|f| LatentId::facet(f.id.clone()))
            .chain(std::iter::once(LatentId::SecondOrder));
        for latent in latents {
            for global in model.globals(&latent) {
                let key = (latent.key().to_string(), global.id.clone());
                if names.globals.contains_key(&key) {
                    continue;
                }
                let name = table.claim(global_name(&global.id), Role::Global)?;
                names.globals.insert(key, name);
            }
        }

        for facet in &model.inputs.facets {
            if names.facets.contains_key(&facet.id) {
                continue;
            }
            let candidate = facet_candidate(facet.short_code(), &facet.name, &facet.id);
            let name = table.claim(candidate, Role::Facet)?;
            names.facets.insert(facet.id.clone(), name);
        }

        Ok(names)
    }

    pub fn item(&self, item_id: i64) -> Option<&str> {
        self.items.get(&item_id).map(String::as_str)
    }

    pub fn global(&self, latent: &LatentId, global_id: &str) -> Option<&str> {
        self.globals
            .get(&(latent.key().to_string(), global_id.to_string()))
            .map(String::as_str)
    }

    pub fn facet(&self, facet_id: &str) -> Option<&str> {
        self.facets.get(facet_id).map(String::as_str)
    }

    /// Name of a latent variable.
    pub fn latent(&self, latent: &LatentId) -> Option<&str> {
        match latent {
            LatentId::Unidim | LatentId::SecondOrder => Some(self.overall.as_str()),
            LatentId::Facet(id) => self.facet(id),
        }
    }
}

#[cfg(feature = "napi")]
#[napi_derive::napi]
pub fn sanitize_native(raw: String, fallback_prefix: String) -> String {
    sanitize(&raw, &fallback_prefix)
}
