//! # Step-4 Model Document
//!
//! The in-memory model the compiler works on. It is split in two halves:
//!
//! - [`StepInputs`]: read-only outputs of earlier workflow steps (construct,
//!   facets, items). The compiler never writes these.
//! - [`Step4Document`]: the measurement configuration the user edits in this
//!   step. It is persisted verbatim under one storage key and re-loaded by
//!   later steps, together with the compiled [`LavaanSpec`].
//!
//! ## Key Invariants
//!
//! 1. **Declaration Order**: facets keep the order of [`StepInputs::facets`].
//!    All maps are keyed by facet id and never define output order.
//! 2. **Pseudo Latents**: the literal ids [`UNIDIM_ID`] and [`SECOND_ORDER_ID`]
//!    name the implicit unidimensional latent and the higher-order construct.
//! 3. **Reversible Exclusion**: excluding an item only records its id in
//!    `facet_disabled_items`; items are never deleted.
//! 4. **Presence**: a global reflective slot counts only when its trimmed text
//!    is non-empty.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Deserializer, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;

use crate::renamer::{derive_short_code, normalize_short_code, DEFAULT_OVERALL_CODE};

pub const UNIDIM_ID: &str = "unidim";
pub const SECOND_ORDER_ID: &str = "secondOrder";
pub const UNIDIMENSIONAL: &str = "Unidimensional";
pub const GLOBAL_SLOTS: usize = 2;
const SECOND_ORDER_GLOBAL_STEM: &str = "second";

// ═══════════════════════════════════════════════════════════════════════════════
// PRIOR-STEP INPUTS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConstructInfo {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub saved_definition: String,
}

/// A first-order facet (subdimension).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Facet {
    pub id: String,
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub code: Option<String>,
    #[serde(default)]
    pub definition: Option<String>,
}

impl Facet {
    /// Human label used in diagnostics and comments.
    pub fn label(&self) -> &str {
        if self.name.trim().is_empty() {
            &self.id
        } else {
            &self.name
        }
    }

    /// The user-assigned short code, if any.
    pub fn short_code(&self) -> Option<&str> {
        self.code.as_deref().map(str::trim).filter(|c| !c.is_empty())
    }
}

/// An observed questionnaire item.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Item {
    pub id: i64,
    #[serde(default)]
    pub text: String,
    #[serde(default)]
    pub subdimension_id: Option<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StepInputs {
    #[serde(default)]
    pub construct: ConstructInfo,
    /// `"Unidimensional"`, `"Multidimensional"`, or absent.
    #[serde(default)]
    pub dimensionality: Option<String>,
    #[serde(default, alias = "subdimensions")]
    pub facets: Vec<Facet>,
    #[serde(default)]
    pub items: Vec<Item>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// MEASUREMENT CONFIGURATION
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MeasurementMode {
    Reflective,
    Formative,
}

impl fmt::Display for MeasurementMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MeasurementMode::Reflective => f.write_str("reflective"),
            MeasurementMode::Formative => f.write_str("formative"),
        }
    }
}

/// A user-authored reflective indicator attached to a formative latent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalItem {
    pub id: String,
    #[serde(default)]
    pub text: String,
}

impl GlobalItem {
    pub fn empty(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: String::new(),
        }
    }

    pub fn is_present(&self) -> bool {
        !self.text.trim().is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingMethod {
    FixLoading,
    FixVariance,
}

/// Identification constraint of one latent variable.
///
/// The reference of `FixLoading` is an item id (reflective facets and the
/// unidimensional latent), a global item id (formative latents), or a facet
/// id (reflective higher-order construct).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(from = "ScalingRecord", into = "ScalingRecord")]
pub enum ScalingRule {
    FixLoading { reference: Option<String> },
    FixVariance,
}

impl ScalingRule {
    pub fn fix_loading(reference: impl Into<String>) -> Self {
        ScalingRule::FixLoading {
            reference: Some(reference.into()),
        }
    }

    pub fn method(&self) -> ScalingMethod {
        match self {
            ScalingRule::FixLoading { .. } => ScalingMethod::FixLoading,
            ScalingRule::FixVariance => ScalingMethod::FixVariance,
        }
    }

    /// The reference indicator, ignoring blank ids.
    pub fn reference(&self) -> Option<&str> {
        match self {
            ScalingRule::FixLoading { reference } => {
                reference.as_deref().filter(|r| !r.trim().is_empty())
            }
            ScalingRule::FixVariance => None,
        }
    }

    pub fn is_fix_loading(&self) -> bool {
        matches!(self, ScalingRule::FixLoading { .. })
    }
}

/// Wire shape of a scaling rule. Older documents stored the higher-order
/// reference under `refFacetId` and item references as numbers.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ScalingRecord {
    method: ScalingMethod,
    #[serde(
        default,
        deserialize_with = "deserialize_opt_id",
        skip_serializing_if = "Option::is_none"
    )]
    ref_item_id: Option<String>,
    #[serde(default, deserialize_with = "deserialize_opt_id", skip_serializing)]
    ref_facet_id: Option<String>,
}

impl From<ScalingRecord> for ScalingRule {
    fn from(record: ScalingRecord) -> Self {
        match record.method {
            ScalingMethod::FixVariance => ScalingRule::FixVariance,
            ScalingMethod::FixLoading => {
                let non_blank = |r: Option<String>| r.filter(|s| !s.trim().is_empty());
                ScalingRule::FixLoading {
                    reference: non_blank(record.ref_item_id)
                        .or_else(|| non_blank(record.ref_facet_id)),
                }
            }
        }
    }
}

impl From<ScalingRule> for ScalingRecord {
    fn from(rule: ScalingRule) -> Self {
        match rule {
            ScalingRule::FixVariance => ScalingRecord {
                method: ScalingMethod::FixVariance,
                ref_item_id: None,
                ref_facet_id: None,
            },
            ScalingRule::FixLoading { reference } => ScalingRecord {
                method: ScalingMethod::FixLoading,
                ref_item_id: reference,
                ref_facet_id: None,
            },
        }
    }
}

/// Configuration of the optional higher-order construct.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SecondOrder {
    /// `None` is a valid terminal state: no higher-order construct.
    #[serde(rename = "type", default, deserialize_with = "deserialize_second_order_type")]
    pub kind: Option<MeasurementMode>,
    #[serde(default)]
    pub scaling: Option<ScalingRule>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_reflective: Option<Vec<GlobalItem>>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    /// The indicator reflects the latent.
    Out,
    /// The indicator causes the latent.
    In,
}

/// Item ids are integers; global items and facets (as second-order causes)
/// use string ids.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum IndicatorRef {
    Item(i64),
    Named(String),
}

impl fmt::Display for IndicatorRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            IndicatorRef::Item(id) => write!(f, "{}", id),
            IndicatorRef::Named(id) => f.write_str(id),
        }
    }
}

/// One measurement relation between an indicator and a latent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Indicator {
    pub facet_id: String,
    pub item_id: IndicatorRef,
    pub direction: Direction,
    #[serde(default, skip_serializing_if = "is_false")]
    pub global: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub second_order: bool,
}

fn is_false(value: &bool) -> bool {
    !*value
}

/// Compiled output persisted alongside the configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LavaanSpec {
    pub syntax: String,
    pub generated_at: DateTime<Utc>,
}

/// The persisted Step-4 document.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Step4Document {
    #[serde(default)]
    pub facet_modes: BTreeMap<String, MeasurementMode>,
    /// Scaling per facet id and for [`UNIDIM_ID`]. The higher-order rule lives
    /// in [`SecondOrder::scaling`].
    #[serde(default)]
    pub facet_scaling: BTreeMap<String, ScalingRule>,
    #[serde(default)]
    pub facet_disabled_items: BTreeMap<String, BTreeSet<i64>>,
    #[serde(default)]
    pub global_reflective: BTreeMap<String, Vec<GlobalItem>>,
    #[serde(default)]
    pub second_order: SecondOrder,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub overall_short_code: Option<String>,
    #[serde(default)]
    pub indicators: Vec<Indicator>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub lavaan_spec: Option<LavaanSpec>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// LATENT IDENTITY
// ═══════════════════════════════════════════════════════════════════════════════

/// A latent variable that can carry a scaling rule.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum LatentId {
    Unidim,
    Facet(String),
    SecondOrder,
}

impl LatentId {
    pub fn facet(id: impl Into<String>) -> Self {
        LatentId::Facet(id.into())
    }

    pub fn from_key(key: &str) -> Self {
        match key {
            UNIDIM_ID => LatentId::Unidim,
            SECOND_ORDER_ID => LatentId::SecondOrder,
            other => LatentId::Facet(other.to_string()),
        }
    }

    /// Storage key of this latent.
    pub fn key(&self) -> &str {
        match self {
            LatentId::Unidim => UNIDIM_ID,
            LatentId::Facet(id) => id,
            LatentId::SecondOrder => SECOND_ORDER_ID,
        }
    }
}

impl fmt::Display for LatentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// MODEL
// ═══════════════════════════════════════════════════════════════════════════════

/// The explicit model object owned by the caller. Every compiler, resolver,
/// and validator operation takes it as an argument.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MeasurementModel {
    #[serde(default)]
    pub inputs: StepInputs,
    #[serde(default)]
    pub document: Step4Document,
}

impl MeasurementModel {
    pub fn new(inputs: StepInputs, document: Step4Document) -> Self {
        Self { inputs, document }
    }

    /// True when the unidimensional shortcut applies: no facets at all, or
    /// the construct was explicitly declared unidimensional.
    pub fn is_unidimensional(&self) -> bool {
        self.inputs.facets.is_empty()
            || self.inputs.dimensionality.as_deref() == Some(UNIDIMENSIONAL)
    }

    pub fn facet(&self, facet_id: &str) -> Option<&Facet> {
        self.inputs.facets.iter().find(|f| f.id == facet_id)
    }

    pub fn item(&self, item_id: i64) -> Option<&Item> {
        self.inputs.items.iter().find(|it| it.id == item_id)
    }

    pub fn facet_mode(&self, facet_id: &str) -> Option<MeasurementMode> {
        self.document.facet_modes.get(facet_id).copied()
    }

    /// Measurement mode of any latent. The unidimensional latent is always
    /// reflective.
    pub fn latent_mode(&self, latent: &LatentId) -> Option<MeasurementMode> {
        match latent {
            LatentId::Unidim => Some(MeasurementMode::Reflective),
            LatentId::Facet(id) => self.facet_mode(id),
            LatentId::SecondOrder => self.document.second_order.kind,
        }
    }

    /// Every item of a facet, excluded ones included, ordered by id.
    pub fn facet_items(&self, facet_id: &str) -> Vec<&Item> {
        let mut items: Vec<&Item> = self
            .inputs
            .items
            .iter()
            .filter(|it| it.subdimension_id.as_deref() == Some(facet_id))
            .collect();
        items.sort_by_key(|it| it.id);
        items
    }

    /// Every item of the construct, ordered by id.
    pub fn all_items(&self) -> Vec<&Item> {
        let mut items: Vec<&Item> = self.inputs.items.iter().collect();
        items.sort_by_key(|it| it.id);
        items
    }

    pub fn is_excluded(&self, latent_key: &str, item_id: i64) -> bool {
        self.document
            .facet_disabled_items
            .get(latent_key)
            .map_or(false, |set| set.contains(&item_id))
    }

    /// Non-excluded items of a first-order latent (facet or `unidim`).
    pub fn active_items(&self, latent: &LatentId) -> Vec<&Item> {
        let candidates = match latent {
            LatentId::Unidim => self.all_items(),
            LatentId::Facet(id) => self.facet_items(id),
            LatentId::SecondOrder => Vec::new(),
        };
        candidates
            .into_iter()
            .filter(|it| !self.is_excluded(latent.key(), it.id))
            .collect()
    }

    /// All global reflective slots of a latent, blank ones included.
    pub fn globals(&self, latent: &LatentId) -> &[GlobalItem] {
        match latent {
            LatentId::Unidim => &[],
            LatentId::Facet(id) => self
                .document
                .global_reflective
                .get(id)
                .map(Vec::as_slice)
                .unwrap_or(&[]),
            LatentId::SecondOrder => self
                .document
                .second_order
                .global_reflective
                .as_deref()
                .unwrap_or(&[]),
        }
    }

    pub fn present_globals(&self, latent: &LatentId) -> Vec<&GlobalItem> {
        self.globals(latent)
            .iter()
            .filter(|g| g.is_present())
            .collect()
    }

    pub fn globals_mut(&mut self, latent: &LatentId) -> Option<&mut Vec<GlobalItem>> {
        match latent {
            LatentId::Unidim => None,
            LatentId::Facet(id) => self.document.global_reflective.get_mut(id),
            LatentId::SecondOrder => self.document.second_order.global_reflective.as_mut(),
        }
    }

    /// Creates the two empty global reflective slots of a formative latent if
    /// it has none yet. Returns whether slots were created.
    pub fn ensure_global_slots(&mut self, latent: &LatentId) -> bool {
        let slots = global_slot_ids(latent)
            .into_iter()
            .map(GlobalItem::empty)
            .collect::<Vec<_>>();
        match latent {
            LatentId::Unidim => false,
            LatentId::Facet(id) => {
                if self.document.global_reflective.contains_key(id) {
                    return false;
                }
                self.document.global_reflective.insert(id.clone(), slots);
                true
            }
            LatentId::SecondOrder => {
                if self.document.second_order.global_reflective.is_some() {
                    return false;
                }
                self.document.second_order.global_reflective = Some(slots);
                true
            }
        }
    }

    pub fn scaling_rule(&self, latent: &LatentId) -> Option<&ScalingRule> {
        match latent {
            LatentId::SecondOrder => self.document.second_order.scaling.as_ref(),
            other => self.document.facet_scaling.get(other.key()),
        }
    }

    pub fn set_scaling_rule(&mut self, latent: &LatentId, rule: ScalingRule) {
        match latent {
            LatentId::SecondOrder => self.document.second_order.scaling = Some(rule),
            other => {
                self.document
                    .facet_scaling
                    .insert(other.key().to_string(), rule);
            }
        }
    }

    /// Overall short code: the user override when it survives sanitizing,
    /// otherwise derived from the construct name.
    pub fn overall_short_code(&self) -> String {
        let code = self
            .document
            .overall_short_code
            .as_deref()
            .map(normalize_short_code)
            .filter(|c| !c.is_empty())
            .unwrap_or_else(|| derive_short_code(&self.inputs.construct.name));
        if code.is_empty() {
            DEFAULT_OVERALL_CODE.to_string()
        } else {
            code
        }
    }
}

/// Ids of the two global reflective slots a formative latent starts with.
pub fn global_slot_ids(latent: &LatentId) -> Vec<String> {
    let stem = match latent {
        LatentId::Unidim => return Vec::new(),
        LatentId::Facet(id) => id.as_str(),
        LatentId::SecondOrder => SECOND_ORDER_GLOBAL_STEM,
    };
    (1..=GLOBAL_SLOTS)
        .map(|n| format!("g_{}_{}", stem, n))
        .collect()
}

// ═══════════════════════════════════════════════════════════════════════════════
// SERDE HELPERS
// ═══════════════════════════════════════════════════════════════════════════════

#[derive(Deserialize)]
#[serde(untagged)]
enum RawId {
    Text(String),
    Number(i64),
}

fn deserialize_opt_id<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<RawId>::deserialize(deserializer)?;
    Ok(raw.map(|id| match id {
        RawId::Text(s) => s,
        RawId::Number(n) => n.to_string(),
    }))
}

/// Accepts `null`, `"none"`, `"reflective"` and `"formative"`.
fn deserialize_second_order_type<'de, D>(
    deserializer: D,
) -> Result<Option<MeasurementMode>, D::Error>
where
    D: Deserializer<'de>,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref() {
        None | Some("") | Some("none") => Ok(None),
        Some("reflective") => Ok(Some(MeasurementMode::Reflective)),
        Some("formative") => Ok(Some(MeasurementMode::Formative)),
        Some(other) => Err(serde::de::Error::unknown_variant(
            other,
            &["none", "reflective", "formative"],
        )),
    }
}
