//! Composite key identifying one weekly series.
//!
//! A [`SeriesKey`] is built from (country, year, age band, gender). It is
//! used to group cells while parsing and to look series up while querying,
//! so both sides must build it the same way.

use std::fmt;

/// Errors that can occur when building a [`SeriesKey`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum KeyError {
    /// One of the textual components was empty.
    #[error("key component `{0}` cannot be empty")]
    EmptyComponent(&'static str),
}

/// Identifier of a single weekly deaths series.
///
/// Displayed as `COUNTRY|YEAR|AGE|GENDER`, e.g. `AD|2021|TOTAL|F`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SeriesKey {
    country: String,
    year: i32,
    age: String,
    gender: String,
}

impl SeriesKey {
    /// Build a key from its components.
    ///
    /// # Errors
    ///
    /// Returns [`KeyError::EmptyComponent`] naming the first empty component.
    pub fn new(country: &str, gender: &str, age: &str, year: i32) -> Result<Self, KeyError> {
        ensure_component("country", country)?;
        ensure_component("gender", gender)?;
        ensure_component("age", age)?;

        Ok(Self {
            country: country.to_owned(),
            year,
            age: age.to_owned(),
            gender: gender.to_owned(),
        })
    }

    /// Country code (e.g. `PL`).
    pub fn country(&self) -> &str {
        &self.country
    }

    /// Calendar year of the series.
    pub const fn year(&self) -> i32 {
        self.year
    }

    /// Age band code (e.g. `TOTAL`, `Y_LT5`).
    pub fn age(&self) -> &str {
        &self.age
    }

    /// Gender code (`T`, `F` or `M`).
    pub fn gender(&self) -> &str {
        &self.gender
    }
}

impl fmt::Display for SeriesKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}|{}|{}|{}",
            self.country, self.year, self.age, self.gender
        )
    }
}

fn ensure_component(name: &'static str, value: &str) -> Result<(), KeyError> {
    if value.is_empty() {
        return Err(KeyError::EmptyComponent(name));
    }
    Ok(())
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn display_joins_components_in_lookup_order() {
        let key = SeriesKey::new("AD", "F", "TOTAL", 2021).unwrap();
        assert_eq!(key.to_string(), "AD|2021|TOTAL|F");
    }

    #[test]
    fn empty_components_are_rejected() {
        assert_eq!(
            SeriesKey::new("", "F", "TOTAL", 2021),
            Err(KeyError::EmptyComponent("country"))
        );
        assert_eq!(
            SeriesKey::new("AD", "", "TOTAL", 2021),
            Err(KeyError::EmptyComponent("gender"))
        );
        assert_eq!(
            SeriesKey::new("AD", "F", "", 2021),
            Err(KeyError::EmptyComponent("age"))
        );
    }

    #[test]
    fn accessors_return_components() {
        let key = SeriesKey::new("PL", "T", "Y_GE90", 2020).unwrap();
        assert_eq!(key.country(), "PL");
        assert_eq!(key.gender(), "T");
        assert_eq!(key.age(), "Y_GE90");
        assert_eq!(key.year(), 2020);
    }

    proptest! {
        #[test]
        fn equal_inputs_build_equal_keys(
            country in "[A-Z]{2}",
            gender in "[TFM]",
            age in "[A-Z0-9_-]{1,8}",
            year in 1990i32..2100,
        ) {
            let a = SeriesKey::new(&country, &gender, &age, year).unwrap();
            let b = SeriesKey::new(&country, &gender, &age, year).unwrap();
            prop_assert_eq!(a.to_string(), b.to_string());
            prop_assert_eq!(a, b);
        }

        #[test]
        fn differing_year_builds_distinct_keys(
            country in "[A-Z]{2}",
            age in "[A-Z0-9_-]{1,8}",
            year in 1990i32..2100,
        ) {
            let a = SeriesKey::new(&country, "T", &age, year).unwrap();
            let b = SeriesKey::new(&country, "T", &age, year.saturating_add(1)).unwrap();
            prop_assert_ne!(a.to_string(), b.to_string());
        }

        #[test]
        fn differing_country_builds_distinct_keys(
            country in "[A-Z]{2}",
            other in "[A-Z]{3}",
            year in 1990i32..2100,
        ) {
            let a = SeriesKey::new(&country, "M", "TOTAL", year).unwrap();
            let b = SeriesKey::new(&other, "M", "TOTAL", year).unwrap();
            prop_assert_ne!(a, b);
        }
    }
}
