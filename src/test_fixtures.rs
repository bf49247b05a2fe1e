//! Model builders shared by the unit tests.

use crate::document::{
    ConstructInfo, Facet, GlobalItem, Item, MeasurementModel, Step4Document, StepInputs,
};

pub fn facet(id: &str, name: &str) -> Facet {
    Facet {
        id: id.to_string(),
        name: name.to_string(),
        code: None,
        definition: None,
    }
}

pub fn coded_facet(id: &str, name: &str, code: &str) -> Facet {
    Facet {
        code: Some(code.to_string()),
        ..facet(id, name)
    }
}

pub fn item(id: i64, text: &str, facet_id: Option<&str>) -> Item {
    Item {
        id,
        text: text.to_string(),
        subdimension_id: facet_id.map(str::to_string),
    }
}

pub fn global(id: &str, text: &str) -> GlobalItem {
    GlobalItem {
        id: id.to_string(),
        text: text.to_string(),
    }
}

pub fn multidim_model(facets: Vec<Facet>, items: Vec<Item>) -> MeasurementModel {
    MeasurementModel::new(
        StepInputs {
            construct: ConstructInfo {
                name: "Overall".to_string(),
                saved_definition: String::new(),
            },
            dimensionality: Some("Multidimensional".to_string()),
            facets,
            items,
        },
        Step4Document {
            overall_short_code: Some("OVERALL".to_string()),
            ..Default::default()
        },
    )
}

pub fn unidim_model(items: Vec<Item>) -> MeasurementModel {
    MeasurementModel::new(
        StepInputs {
            construct: ConstructInfo {
                name: "Overall".to_string(),
                saved_definition: String::new(),
            },
            dimensionality: Some("Unidimensional".to_string()),
            facets: Vec::new(),
            items,
        },
        Step4Document {
            overall_short_code: Some("OVERALL".to_string()),
            ..Default::default()
        },
    )
}
