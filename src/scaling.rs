//! Scaling Resolver
//!
//! Decides how each latent variable is identified: either one loading is
//! fixed to 1 (`fix_loading`, needs a reference indicator) or the latent
//! variance is fixed to 1 (`fix_variance`).
//!
//! ## Invariants
//!
//! 1. `fix_loading` needs at least [`MIN_REFERENCE_INDICATORS`] eligible
//!    indicators. Below that the rule falls back to `fix_variance`.
//! 2. The reference of a `fix_loading` rule is always a member of the
//!    latent's current eligible set (see [`eligible_indicators`]).
//! 3. Resolving one latent never touches the rule of another.

use tracing::debug;

use crate::document::{LatentId, MeasurementMode, MeasurementModel, ScalingRule};
use crate::indicators::{eligible_indicators, emitted_facets, Candidate};

pub const MIN_REFERENCE_INDICATORS: usize = 2;

/// Default rule for a latent that has none yet: fix the loading of the
/// indicator with the shortest text (first one on ties) when there are enough
/// indicators, otherwise fix the variance.
pub fn resolve_scaling_defaults(eligible: &[Candidate]) -> ScalingRule {
    if eligible.len() < MIN_REFERENCE_INDICATORS {
        return ScalingRule::FixVariance;
    }
    eligible
        .iter()
        .min_by_key(|c| c.text.chars().count())
        .map(|c| ScalingRule::fix_loading(c.id.clone()))
        .unwrap_or(ScalingRule::FixVariance)
}

/// Re-checks an existing rule against a changed eligible set.
pub fn revalidate_rule(rule: &ScalingRule, eligible: &[Candidate]) -> ScalingRule {
    match rule {
        ScalingRule::FixVariance => ScalingRule::FixVariance,
        ScalingRule::FixLoading { .. } if eligible.len() < MIN_REFERENCE_INDICATORS => {
            ScalingRule::FixVariance
        }
        ScalingRule::FixLoading { .. } => match rule.reference() {
            Some(reference) if eligible.iter().any(|c| c.id == reference) => rule.clone(),
            _ => ScalingRule::fix_loading(eligible[0].id.clone()),
        },
    }
}

/// Default rule of a latent in the context of the whole model.
///
/// A reflective higher-order construct prefers the first reflective facet as
/// its reference, then the first emitted facet. Every other latent uses
/// [`resolve_scaling_defaults`].
pub fn default_rule(model: &MeasurementModel, latent: &LatentId) -> ScalingRule {
    let eligible = eligible_indicators(model, latent);
    if *latent == LatentId::SecondOrder
        && model.latent_mode(latent) == Some(MeasurementMode::Reflective)
    {
        if eligible.len() < MIN_REFERENCE_INDICATORS {
            return ScalingRule::FixVariance;
        }
        let facets = emitted_facets(model);
        let preferred = facets
            .iter()
            .find(|f| model.facet_mode(&f.id) == Some(MeasurementMode::Reflective))
            .or_else(|| facets.first());
        return preferred
            .map(|f| ScalingRule::fix_loading(f.id.clone()))
            .unwrap_or(ScalingRule::FixVariance);
    }
    resolve_scaling_defaults(&eligible)
}

/// The rule the compiler applies: the stored rule re-checked against the
/// current eligible set, or the default when nothing is stored. Pure.
pub fn effective_scaling(model: &MeasurementModel, latent: &LatentId) -> ScalingRule {
    match model.scaling_rule(latent) {
        Some(rule) => revalidate_rule(rule, &eligible_indicators(model, latent)),
        None => default_rule(model, latent),
    }
}

/// Creates the default rule if the latent has none, otherwise revalidates
/// the stored one. Returns the resulting rule.
pub fn ensure_scaling(model: &mut MeasurementModel, latent: &LatentId) -> ScalingRule {
    let rule = effective_scaling(model, latent);
    if model.scaling_rule(latent) != Some(&rule) {
        debug!(latent = %latent, ?rule, "scaling rule resolved");
        model.set_scaling_rule(latent, rule.clone());
    }
    rule
}

/// Revalidates an existing rule after the latent's eligible set changed.
/// Latents without a stored rule are left alone. Returns whether the stored
/// rule changed.
pub fn revalidate(model: &mut MeasurementModel, latent: &LatentId) -> bool {
    let Some(current) = model.scaling_rule(latent).cloned() else {
        return false;
    };
    let next = revalidate_rule(&current, &eligible_indicators(model, latent));
    if next == current {
        return false;
    }
    debug!(latent = %latent, ?current, ?next, "scaling rule revalidated");
    model.set_scaling_rule(latent, next);
    true
}

/// Latents that appear in the compiled output and therefore need a rule.
pub fn scaled_latents(model: &MeasurementModel) -> Vec<LatentId> {
    if model.is_unidimensional() {
        return vec![LatentId::Unidim];
    }
    let mut latents: Vec<LatentId> = model
        .inputs
        .facets
        .iter()
        .filter(|f| model.facet_mode(&f.id).is_some())
        .map(|f| LatentId::facet(f.id.clone()))
        .collect();
    if model.document.second_order.kind.is_some() {
        latents.push(LatentId::SecondOrder);
    }
    latents
}

/// Runs [`ensure_scaling`] for every scaled latent.
pub fn ensure_all(model: &mut MeasurementModel) {
    for latent in scaled_latents(model) {
        ensure_scaling(model, &latent);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::GlobalItem;
    use crate::test_fixtures::{facet, item, multidim_model, unidim_model};

    fn candidates(texts: &[(&str, &str)]) -> Vec<Candidate> {
        texts.iter().map(|(id, t)| Candidate::new(*id, *t)).collect()
    }

    #[test]
    fn test_default_picks_shortest_text() {
        let eligible = candidates(&[("1", "longer text"), ("2", "short"), ("3", "tiny!")]);
        assert_eq!(
            resolve_scaling_defaults(&eligible),
            ScalingRule::fix_loading("2")
        );
    }

    #[test]
    fn test_default_with_one_indicator_fixes_variance() {
        let eligible = candidates(&[("1", "only")]);
        assert_eq!(resolve_scaling_defaults(&eligible), ScalingRule::FixVariance);
        assert_eq!(resolve_scaling_defaults(&[]), ScalingRule::FixVariance);
    }

    #[test]
    fn test_revalidate_repicks_first_when_reference_gone() {
        let eligible = candidates(&[("4", "d"), ("5", "e")]);
        let rule = ScalingRule::fix_loading("1");
        assert_eq!(revalidate_rule(&rule, &eligible), ScalingRule::fix_loading("4"));
    }

    #[test]
    fn test_revalidate_keeps_valid_reference() {
        let eligible = candidates(&[("4", "d"), ("5", "e")]);
        let rule = ScalingRule::fix_loading("5");
        assert_eq!(revalidate_rule(&rule, &eligible), rule);
    }

    #[test]
    fn test_revalidate_below_threshold_fixes_variance() {
        let rule = ScalingRule::fix_loading("1");
        assert_eq!(
            revalidate_rule(&rule, &candidates(&[("1", "a")])),
            ScalingRule::FixVariance
        );
        assert_eq!(revalidate_rule(&rule, &[]), ScalingRule::FixVariance);
    }

    #[test]
    fn test_single_item_reflective_facet_never_fixes_loading() {
        let mut model = multidim_model(vec![facet("f1", "Vigor")], vec![item(1, "a", Some("f1"))]);
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Reflective);
        model
            .document
            .facet_scaling
            .insert("f1".into(), ScalingRule::fix_loading("1"));

        let latent = LatentId::facet("f1");
        assert_eq!(ensure_scaling(&mut model, &latent), ScalingRule::FixVariance);
    }

    #[test]
    fn test_formative_gating_until_two_globals() {
        let mut model = multidim_model(vec![facet("f1", "Vigor")], vec![
            item(1, "a", Some("f1")),
            item(2, "b", Some("f1")),
        ]);
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Formative);
        model.document.global_reflective.insert(
            "f1".into(),
            vec![
                GlobalItem {
                    id: "g_f1_1".into(),
                    text: "I feel energetic overall".into(),
                },
                GlobalItem::empty("g_f1_2"),
            ],
        );
        let latent = LatentId::facet("f1");
        assert_eq!(ensure_scaling(&mut model, &latent), ScalingRule::FixVariance);

        model.document.global_reflective.get_mut("f1").unwrap()[1].text = "Vigor".into();
        model.document.facet_scaling.clear();
        assert_eq!(
            ensure_scaling(&mut model, &latent),
            ScalingRule::fix_loading("g_f1_2")
        );
    }

    #[test]
    fn test_revalidate_only_touches_its_latent() {
        let mut model = multidim_model(vec![facet("f1", "Vigor"), facet("f2", "Dedication")], vec![
            item(1, "a", Some("f1")),
            item(2, "bb", Some("f1")),
            item(3, "c", Some("f2")),
            item(4, "dd", Some("f2")),
        ]);
        for id in ["f1", "f2"] {
            model
                .document
                .facet_modes
                .insert(id.into(), MeasurementMode::Reflective);
        }
        ensure_all(&mut model);
        let f2_before = model.scaling_rule(&LatentId::facet("f2")).cloned();

        model
            .document
            .facet_disabled_items
            .entry("f1".into())
            .or_default()
            .insert(1);
        assert!(revalidate(&mut model, &LatentId::facet("f1")));
        assert_eq!(
            model.scaling_rule(&LatentId::facet("f1")),
            Some(&ScalingRule::FixVariance)
        );
        assert_eq!(model.scaling_rule(&LatentId::facet("f2")).cloned(), f2_before);
    }

    #[test]
    fn test_reflective_second_order_prefers_reflective_facet() {
        let mut model = multidim_model(vec![facet("f1", "Vigor"), facet("f2", "Dedication")], vec![
            item(1, "a", Some("f1")),
            item(2, "b", Some("f2")),
        ]);
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Formative);
        model
            .document
            .facet_modes
            .insert("f2".into(), MeasurementMode::Reflective);
        model.document.second_order.kind = Some(MeasurementMode::Reflective);

        assert_eq!(
            default_rule(&model, &LatentId::SecondOrder),
            ScalingRule::fix_loading("f2")
        );
    }

    #[test]
    fn test_unidim_latent_is_scaled() {
        let mut model = unidim_model(vec![item(1, "abc", None), item(2, "ab", None)]);
        ensure_all(&mut model);
        assert_eq!(
            model.scaling_rule(&LatentId::Unidim),
            Some(&ScalingRule::fix_loading("2"))
        );
    }
}
