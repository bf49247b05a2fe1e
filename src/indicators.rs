//! Indicator Builder
//!
//! Derives the measurement relations of the model from facet modes, the
//! active (non-excluded) item sets, and the global reflective items.
//!
//! Facets without a configured mode contribute nothing. This is policy, not
//! an accident: a half-configured facet must not show up as a partial
//! latent in the compiled output.

use crate::document::{
    Direction, Facet, Indicator, IndicatorRef, LatentId, MeasurementMode, MeasurementModel,
    SECOND_ORDER_ID,
};

/// A possible reference indicator of a latent, in stable order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Candidate {
    pub id: String,
    pub text: String,
}

impl Candidate {
    pub fn new(id: impl Into<String>, text: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
        }
    }
}

/// Synthetic indicator id of a facet acting as a cause of the higher-order
/// construct.
pub fn facet_indicator_id(facet_id: &str) -> String {
    format!("facet_{}", facet_id)
}

/// Builds every measurement relation, ordered by facet declaration order,
/// then item id, with globals after the regular items of their latent.
pub fn build_indicators(model: &MeasurementModel) -> Vec<Indicator> {
    let mut result = Vec::new();

    for facet in &model.inputs.facets {
        let Some(mode) = model.facet_mode(&facet.id) else {
            continue;
        };
        let latent = LatentId::facet(facet.id.clone());
        let item_direction = match mode {
            MeasurementMode::Reflective => Direction::Out,
            MeasurementMode::Formative => Direction::In,
        };
        for item in model.active_items(&latent) {
            result.push(Indicator {
                facet_id: facet.id.clone(),
                item_id: IndicatorRef::Item(item.id),
                direction: item_direction,
                global: false,
                second_order: false,
            });
        }
        if mode == MeasurementMode::Formative {
            for global in model.present_globals(&latent) {
                result.push(Indicator {
                    facet_id: facet.id.clone(),
                    item_id: IndicatorRef::Named(global.id.clone()),
                    direction: Direction::Out,
                    global: true,
                    second_order: false,
                });
            }
        }
    }

    if model.document.second_order.kind == Some(MeasurementMode::Formative) {
        for facet in &model.inputs.facets {
            result.push(Indicator {
                facet_id: SECOND_ORDER_ID.to_string(),
                item_id: IndicatorRef::Named(facet_indicator_id(&facet.id)),
                direction: Direction::In,
                global: false,
                second_order: true,
            });
        }
        for global in model.present_globals(&LatentId::SecondOrder) {
            result.push(Indicator {
                facet_id: SECOND_ORDER_ID.to_string(),
                item_id: IndicatorRef::Named(global.id.clone()),
                direction: Direction::Out,
                global: true,
                second_order: true,
            });
        }
    }

    result
}

/// Facets that appear as latents in the compiled output: reflective facets
/// with at least one active item, and every formative facet.
pub fn emitted_facets(model: &MeasurementModel) -> Vec<&Facet> {
    model
        .inputs
        .facets
        .iter()
        .filter(|facet| match model.facet_mode(&facet.id) {
            Some(MeasurementMode::Reflective) => !model
                .active_items(&LatentId::facet(facet.id.clone()))
                .is_empty(),
            Some(MeasurementMode::Formative) => true,
            None => false,
        })
        .collect()
}

/// The indicators a latent may use as its `fix_loading` reference.
///
/// - reflective facets and the unidimensional latent: active items
/// - formative facets and a formative higher-order construct: present globals
/// - reflective higher-order construct: emitted facets
pub fn eligible_indicators(model: &MeasurementModel, latent: &LatentId) -> Vec<Candidate> {
    let formative = model.latent_mode(latent) == Some(MeasurementMode::Formative);
    match latent {
        LatentId::SecondOrder if !formative => emitted_facets(model)
            .into_iter()
            .map(|f| Candidate::new(f.id.clone(), f.label()))
            .collect(),
        _ if formative => model
            .present_globals(latent)
            .into_iter()
            .map(|g| Candidate::new(g.id.clone(), g.text.trim()))
            .collect(),
        _ => model
            .active_items(latent)
            .into_iter()
            .map(|it| Candidate::new(it.id.to_string(), it.text.clone()))
            .collect(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::GlobalItem;
    use crate::test_fixtures::{facet, item, multidim_model};

    #[test]
    fn test_reflective_facet_items_point_out() {
        let mut model = multidim_model(vec![facet("f1", "Vigor")], vec![
            item(2, "b", Some("f1")),
            item(1, "a", Some("f1")),
        ]);
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Reflective);

        let indicators = build_indicators(&model);
        assert_eq!(indicators.len(), 2);
        assert_eq!(indicators[0].item_id, IndicatorRef::Item(1));
        assert_eq!(indicators[1].item_id, IndicatorRef::Item(2));
        assert!(indicators.iter().all(|i| i.direction == Direction::Out));
    }

    #[test]
    fn test_formative_facet_appends_present_globals() {
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
                    text: "Overall I feel vigorous".into(),
                },
                GlobalItem::empty("g_f1_2"),
            ],
        );

        let indicators = build_indicators(&model);
        assert_eq!(indicators.len(), 3);
        assert_eq!(indicators[0].direction, Direction::In);
        assert_eq!(indicators[1].direction, Direction::In);
        let last = &indicators[2];
        assert!(last.global);
        assert_eq!(last.direction, Direction::Out);
        assert_eq!(last.item_id, IndicatorRef::Named("g_f1_1".into()));
    }

    #[test]
    fn test_unconfigured_facet_contributes_nothing() {
        let model = multidim_model(vec![facet("f1", "Vigor")], vec![item(1, "a", Some("f1"))]);
        assert!(build_indicators(&model).is_empty());
        assert!(emitted_facets(&model).is_empty());
    }

    #[test]
    fn test_excluded_item_is_dropped_and_restored() {
        let mut model = multidim_model(vec![facet("f1", "Vigor"), facet("f2", "Dedication")], vec![
            item(1, "a", Some("f1")),
            item(2, "b", Some("f1")),
            item(3, "c", Some("f2")),
        ]);
        for id in ["f1", "f2"] {
            model
                .document
                .facet_modes
                .insert(id.into(), MeasurementMode::Reflective);
        }
        let before = build_indicators(&model);

        model
            .document
            .facet_disabled_items
            .entry("f1".into())
            .or_default()
            .insert(1);
        let excluded = build_indicators(&model);
        assert_eq!(excluded.len(), 2);
        assert!(!excluded.iter().any(|i| i.item_id == IndicatorRef::Item(1)));
        assert!(excluded.iter().any(|i| i.item_id == IndicatorRef::Item(3)));

        model.document.facet_disabled_items.clear();
        assert_eq!(build_indicators(&model), before);
    }

    #[test]
    fn test_formative_second_order_lists_every_facet() {
        let mut model = multidim_model(vec![facet("f1", "Vigor"), facet("f2", "Dedication")], vec![]);
        model.document.second_order.kind = Some(MeasurementMode::Formative);
        model.document.second_order.global_reflective = Some(vec![
            GlobalItem {
                id: "g_second_1".into(),
                text: "Overall engagement".into(),
            },
            GlobalItem::empty("g_second_2"),
        ]);

        let indicators = build_indicators(&model);
        assert_eq!(indicators.len(), 3);
        assert_eq!(indicators[0].item_id, IndicatorRef::Named("facet_f1".into()));
        assert_eq!(indicators[1].item_id, IndicatorRef::Named("facet_f2".into()));
        assert!(indicators.iter().all(|i| i.second_order));
        assert!(indicators[2].global);
    }

    #[test]
    fn test_eligible_sets_follow_mode() {
        let mut model = multidim_model(vec![facet("f1", "Vigor")], vec![
            item(1, "a", Some("f1")),
            item(2, "b", Some("f1")),
        ]);
        let latent = LatentId::facet("f1");
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Reflective);
        assert_eq!(eligible_indicators(&model, &latent).len(), 2);

        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Formative);
        assert!(eligible_indicators(&model, &latent).is_empty());
    }
}
