//! Findings predicted by the classifier.
//!
//! The order is the order of the classifier's output vector and must match the
//! order the weights were trained with. Nothing at runtime can verify that.

pub const NUM_LABELS: usize = 14;

pub const LABELS: [&str; NUM_LABELS] = [
    "Atelectasis",
    "Cardiomegaly",
    "Effusion",
    "Infiltration",
    "Mass",
    "Nodule",
    "Pneumonia",
    "Pneumothorax",
    "Consolidation",
    "Edema",
    "Emphysema",
    "Fibrosis",
    "Pleural_Thickening",
    "Hernia",
];

/// Owned copy of the label set, as sent over the wire.
pub fn label_names() -> Vec<String> {
    LABELS.iter().map(|label| label.to_string()).collect()
}

/// Human readable form used in reports ("Pleural_Thickening" -> "Pleural Thickening").
pub fn display_name(label: &str) -> String {
    label.replace('_', " ")
}
