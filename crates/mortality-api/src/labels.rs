//! Human-readable labels for the dataset's country, age and gender codes.

use serde::Serialize;

/// Which dimension a label belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum LabelKind {
    /// Age band.
    Age,
    /// Country.
    Country,
    /// Gender.
    Gender,
}

/// One code and its display label.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct MetadataLabel {
    /// Code as it appears in the dataset and in queries.
    pub value: &'static str,
    /// Display text.
    pub label: &'static str,
    /// 1-based display position within its kind.
    pub order: usize,
    /// Dimension of the code.
    #[serde(rename = "type")]
    pub kind: LabelKind,
}

const AGES: &[(&str, &str)] = &[
    ("TOTAL", "Total"),
    ("UNK", "Unknown"),
    ("Y_LT5", "<5"),
    ("Y5-9", "From 5 to 9"),
    ("Y10-14", "From 10 to 14"),
    ("Y15-19", "From 15 to 19"),
    ("Y20-24", "From 20 to 24"),
    ("Y25-29", "From 25 to 29"),
    ("Y30-34", "From 30 to 34"),
    ("Y35-39", "From 35 to 39"),
    ("Y40-44", "From 40 to 44"),
    ("Y45-49", "From 45 to 49"),
    ("Y50-54", "From 50 to 54"),
    ("Y55-59", "From 55 to 59"),
    ("Y60-64", "From 60 to 64"),
    ("Y65-69", "From 65 to 69"),
    ("Y70-74", "From 70 to 74"),
    ("Y75-79", "From 75 to 79"),
    ("Y80-84", "From 80 to 84"),
    ("Y85-89", "From 85 to 89"),
    ("Y_GE90", ">=90"),
];

const COUNTRIES: &[(&str, &str)] = &[
    ("AD", "Andorra"),
    ("AL", "Albania"),
    ("AM", "Armenia"),
    ("AT", "Austria"),
    ("BE", "Belgium"),
    ("BG", "Bulgaria"),
    ("CH", "Switzerland"),
    ("CY", "Cyprus"),
    ("CZ", "Czechia"),
    ("DE", "Germany"),
    ("DK", "Denmark"),
    ("EE", "Estonia"),
    ("EL", "Greece"),
    ("ES", "Spain"),
    ("FI", "Finland"),
    ("FR", "France"),
    ("GE", "Georgia"),
    ("HR", "Croatia"),
    ("HU", "Hungary"),
    ("IE", "Ireland"),
    ("IS", "Iceland"),
    ("IT", "Italy"),
    ("LI", "Liechtenstein"),
    ("LT", "Lithuania"),
    ("LU", "Luxembourg"),
    ("LV", "Latvia"),
    ("ME", "Montenegro"),
    ("MT", "Malta"),
    ("NL", "Netherlands"),
    ("NO", "Norway"),
    ("PL", "Poland"),
    ("PT", "Portugal"),
    ("RO", "Romania"),
    ("RS", "Serbia"),
    ("SE", "Sweden"),
    ("SI", "Slovenia"),
    ("SK", "Slovakia"),
    ("UK", "United Kingdom"),
];

const GENDERS: &[(&str, &str)] = &[("T", "Total"), ("F", "Female"), ("M", "Male")];

fn table(
    kind: LabelKind,
    entries: &'static [(&'static str, &'static str)],
) -> impl Iterator<Item = MetadataLabel> {
    entries
        .iter()
        .enumerate()
        .map(move |(index, &(value, label))| MetadataLabel {
            value,
            label,
            order: index.saturating_add(1),
            kind,
        })
}

/// Every label: ages, then countries, then genders.
pub fn all_labels() -> Vec<MetadataLabel> {
    table(LabelKind::Age, AGES)
        .chain(table(LabelKind::Country, COUNTRIES))
        .chain(table(LabelKind::Gender, GENDERS))
        .collect()
}

#[cfg(test)]
#[allow(clippy::unwrap_used, clippy::indexing_slicing)]
mod tests {
    use super::*;

    #[test]
    fn tables_have_expected_sizes_and_order() {
        let labels = all_labels();
        let count = |kind| labels.iter().filter(|l| l.kind == kind).count();
        assert_eq!(count(LabelKind::Age), 21);
        assert_eq!(count(LabelKind::Country), 38);
        assert_eq!(count(LabelKind::Gender), 3);

        assert_eq!(labels.first().unwrap().value, "TOTAL");
        assert_eq!(labels.last().unwrap().value, "M");
        let uk = labels.iter().find(|l| l.value == "UK").unwrap();
        assert_eq!((uk.label, uk.order), ("United Kingdom", 38));
    }

    #[test]
    fn serializes_kind_as_type() {
        let json = serde_json::to_value(all_labels()[0]).unwrap();
        assert_eq!(
            json,
            serde_json::json!({"value": "TOTAL", "label": "Total", "order": 1, "type": "age"})
        );
    }
}
