#[cfg(test)]
mod tests {
    use crate::document::{MeasurementMode, MeasurementModel, ScalingRule};
    use crate::scaling::ensure_all;
    use crate::test_fixtures::{facet, global, item, multidim_model, unidim_model};
    use crate::validate::{
        validate, Severity, MM_MARGINAL_ITEMS, MM_REFERENCE_MISSING, MM_SCALING_MISSING,
        MM_SECOND_ORDER_REFERENCE_MISSING, MM_SECOND_ORDER_SCALING_MISSING,
        MM_SECOND_ORDER_TOO_FEW_GLOBALS, MM_SECOND_ORDER_WITHOUT_FACETS, MM_TOO_FEW_GLOBALS,
        MM_TOO_FEW_ITEMS,
    };

    fn codes(diagnostics: &[crate::validate::Diagnostic]) -> Vec<&str> {
        diagnostics.iter().map(|d| d.code.as_str()).collect()
    }

    fn three_facets() -> MeasurementModel {
        multidim_model(
            vec![facet("f1", "Vigor"), facet("f2", "Dedication"), facet("f3", "Absorption")],
            vec![
                item(1, "a", Some("f1")),
                item(2, "b", Some("f1")),
                item(3, "c", Some("f1")),
                item(4, "d", Some("f2")),
                item(5, "e", Some("f2")),
                item(6, "f", Some("f3")),
            ],
        )
    }

    #[test]
    fn test_complete_model_is_valid() {
        let mut model = three_facets();
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Reflective);
        ensure_all(&mut model);

        let report = validate(&model);
        assert!(report.is_valid(), "{:?}", report.error_messages());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_unconfigured_facets_are_not_checked() {
        let model = three_facets();
        let report = validate(&model);
        assert!(report.errors.is_empty());
        assert!(report.warnings.is_empty());
    }

    #[test]
    fn test_missing_scaling_and_reference() {
        let mut model = three_facets();
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Reflective);
        model
            .document
            .facet_modes
            .insert("f2".into(), MeasurementMode::Reflective);
        model.document.facet_scaling.insert(
            "f2".into(),
            ScalingRule::FixLoading { reference: None },
        );

        let report = validate(&model);
        assert_eq!(
            report.error_messages(),
            vec![
                "Facet \"Vigor\" has no scaling rule selected.",
                "Facet \"Dedication\" set to fix a loading but no reference item chosen.",
            ]
        );
        assert_eq!(codes(&report.errors), vec![MM_SCALING_MISSING, MM_REFERENCE_MISSING]);
        assert_eq!(report.errors[0].latent.as_deref(), Some("f1"));
        assert_eq!(
            report.warning_messages(),
            vec!["Reflective facet \"Dedication\" has only 2 items."]
        );
    }

    #[test]
    fn test_item_counts_follow_exclusions() {
        let mut model = three_facets();
        for id in ["f1", "f3"] {
            model
                .document
                .facet_modes
                .insert(id.into(), MeasurementMode::Reflective);
        }
        ensure_all(&mut model);
        model
            .document
            .facet_disabled_items
            .entry("f1".into())
            .or_default()
            .insert(3);

        let report = validate(&model);
        assert_eq!(codes(&report.errors), vec![MM_TOO_FEW_ITEMS]);
        assert_eq!(
            report.errors[0].message,
            "Reflective facet \"Absorption\" must have at least 2 items (has 1)."
        );
        assert_eq!(codes(&report.warnings), vec![MM_MARGINAL_ITEMS]);
        assert_eq!(report.warnings[0].severity, Severity::Warning);
    }

    #[test]
    fn test_formative_facet_needs_two_globals() {
        let mut model = three_facets();
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Formative);
        model.document.global_reflective.insert(
            "f1".into(),
            vec![global("g_f1_1", "one"), global("g_f1_2", "")],
        );
        ensure_all(&mut model);

        let report = validate(&model);
        assert_eq!(codes(&report.errors), vec![MM_TOO_FEW_GLOBALS]);
        assert_eq!(
            report.errors[0].message,
            "Formative facet \"Vigor\" requires two global reflective items (has 1)."
        );

        model.document.global_reflective.get_mut("f1").unwrap()[1].text = "two".into();
        assert!(validate(&model).is_valid());
    }

    #[test]
    fn test_unidimensional_checks() {
        let model = unidim_model(vec![item(1, "a", None)]);
        let report = validate(&model);
        assert_eq!(
            report.error_messages(),
            vec![
                "Unidimensional construct has no scaling rule selected.",
                "Unidimensional construct must have at least 2 items (has 1).",
            ]
        );

        let mut model = unidim_model(vec![item(1, "a", None), item(2, "b", None)]);
        ensure_all(&mut model);
        let report = validate(&model);
        assert!(report.is_valid());
        assert_eq!(
            report.warning_messages(),
            vec!["Unidimensional construct has only 2 items."]
        );
    }

    #[test]
    fn test_second_order_without_facets() {
        let mut model = unidim_model(vec![item(1, "a", None), item(2, "bb", None), item(3, "c", None)]);
        ensure_all(&mut model);
        model.document.second_order.kind = Some(MeasurementMode::Reflective);

        let report = validate(&model);
        assert_eq!(
            codes(&report.errors),
            vec![MM_SECOND_ORDER_SCALING_MISSING, MM_SECOND_ORDER_WITHOUT_FACETS]
        );
        assert_eq!(
            report.errors[1].message,
            "Higher-order latent specified but there are no first-order facets."
        );
    }

    #[test]
    fn test_second_order_without_facets_keeps_checking() {
        let mut model = unidim_model(vec![item(1, "a", None), item(2, "bb", None), item(3, "c", None)]);
        ensure_all(&mut model);
        model.document.second_order.kind = Some(MeasurementMode::Formative);
        model.document.second_order.scaling = Some(ScalingRule::FixLoading { reference: None });

        let report = validate(&model);
        assert_eq!(
            codes(&report.errors),
            vec![
                MM_SECOND_ORDER_REFERENCE_MISSING,
                MM_SECOND_ORDER_TOO_FEW_GLOBALS,
                MM_SECOND_ORDER_WITHOUT_FACETS,
            ]
        );
    }

    #[test]
    fn test_declared_unidimensional_with_facets_flags_second_order() {
        let mut model = three_facets();
        model.inputs.dimensionality = Some("Unidimensional".into());
        ensure_all(&mut model);
        model.document.second_order.kind = Some(MeasurementMode::Reflective);
        model.document.second_order.scaling = Some(ScalingRule::FixVariance);

        let report = validate(&model);
        assert_eq!(codes(&report.errors), vec![MM_SECOND_ORDER_WITHOUT_FACETS]);
    }

    #[test]
    fn test_second_order_scaling_checks() {
        let mut model = three_facets();
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Reflective);
        ensure_all(&mut model);
        model.document.second_order.kind = Some(MeasurementMode::Reflective);

        let report = validate(&model);
        assert_eq!(codes(&report.errors), vec![MM_SECOND_ORDER_SCALING_MISSING]);

        model.document.second_order.scaling = Some(ScalingRule::FixLoading { reference: None });
        let report = validate(&model);
        assert_eq!(
            report.error_messages(),
            vec!["Higher-order reflective latent requires a reference facet for fixed loading scaling."]
        );

        model.document.second_order.kind = Some(MeasurementMode::Formative);
        let report = validate(&model);
        assert_eq!(
            codes(&report.errors),
            vec![MM_SECOND_ORDER_REFERENCE_MISSING, MM_SECOND_ORDER_TOO_FEW_GLOBALS]
        );
        assert_eq!(
            report.errors[1].message,
            "Higher-order formative latent requires two global reflective items (has 0)."
        );
    }

    #[test]
    fn test_checks_are_additive_and_ordered() {
        let mut model = three_facets();
        model
            .document
            .facet_modes
            .insert("f1".into(), MeasurementMode::Formative);
        model
            .document
            .facet_modes
            .insert("f3".into(), MeasurementMode::Reflective);
        model.document.second_order.kind = Some(MeasurementMode::Formative);

        let report = validate(&model);
        let latents: Vec<_> = report
            .errors
            .iter()
            .map(|d| d.latent.as_deref().unwrap_or_default())
            .collect();
        assert_eq!(
            latents,
            vec!["f1", "f1", "f3", "f3", "secondOrder", "secondOrder"]
        );
        assert!(report.errors.iter().all(|d| !d.guarantee.is_empty()));
    }

    #[test]
    fn test_report_serializes_for_the_host() {
        let model = unidim_model(vec![item(1, "a", None)]);
        let json = serde_json::to_value(validate(&model)).unwrap();
        assert_eq!(json["errors"][0]["code"], "MM001");
        assert_eq!(json["errors"][0]["severity"], "error");
        assert_eq!(json["errors"][0]["latent"], "unidim");
    }
}
