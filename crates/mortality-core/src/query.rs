//! Weekly deaths query: parameter validation and store lookup.
//!
//! Validation reports every offending field at once rather than stopping
//! at the first one, so a client can fix its request in a single round trip.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::key::KeyError;
use crate::record::WeekYearDeaths;
use crate::store::SnapshotStore;

/// Message for a parameter that is absent or empty.
pub const REQUIRED_MESSAGE: &str = "This query url parameter is required.";

/// Message for a year parameter that is not an integer.
pub const NOT_AN_INTEGER_MESSAGE: &str = "Provided value cannot be converted to integer.";

/// Raw query-string parameters, as received.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct WeeklyDeathsParams {
    /// Country code.
    pub country: Option<String>,
    /// Gender code.
    pub gender: Option<String>,
    /// Age band code.
    pub age: Option<String>,
    /// First year, inclusive.
    pub year_from: Option<String>,
    /// Last year, inclusive.
    pub year_to: Option<String>,
}

/// A validated weekly deaths query.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WeeklyDeathsRequest {
    /// Country code.
    pub country: String,
    /// Gender code.
    pub gender: String,
    /// Age band code.
    pub age: String,
    /// First year, inclusive.
    pub year_from: i32,
    /// Last year, inclusive.
    pub year_to: i32,
}

/// Validation failure for one parameter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct FieldError {
    /// Parameter name.
    pub field: &'static str,
    /// What is wrong with it.
    pub message: &'static str,
}

/// Every validation failure of a request, in parameter order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct ValidationErrors(pub Vec<FieldError>);

impl std::error::Error for ValidationErrors {}

impl fmt::Display for ValidationErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invalid query parameters:")?;
        for error in &self.0 {
            write!(f, " {}: {}", error.field, error.message)?;
        }
        Ok(())
    }
}

impl WeeklyDeathsParams {
    /// Check presence of every parameter and integer-ness of the years.
    ///
    /// # Errors
    ///
    /// Returns all [`FieldError`]s found.
    pub fn validate(&self) -> Result<WeeklyDeathsRequest, ValidationErrors> {
        let mut errors = Vec::new();

        let country = required("country", self.country.as_deref(), &mut errors);
        let gender = required("gender", self.gender.as_deref(), &mut errors);
        let age = required("age", self.age.as_deref(), &mut errors);
        let year_from = year("year_from", self.year_from.as_deref(), &mut errors);
        let year_to = year("year_to", self.year_to.as_deref(), &mut errors);

        match (country, gender, age, year_from, year_to) {
            (Some(country), Some(gender), Some(age), Some(year_from), Some(year_to))
                if errors.is_empty() =>
            {
                Ok(WeeklyDeathsRequest {
                    country: country.to_owned(),
                    gender: gender.to_owned(),
                    age: age.to_owned(),
                    year_from,
                    year_to,
                })
            }
            _ => Err(ValidationErrors(errors)),
        }
    }
}

fn required<'a>(
    field: &'static str,
    value: Option<&'a str>,
    errors: &mut Vec<FieldError>,
) -> Option<&'a str> {
    match value {
        Some(value) if !value.is_empty() => Some(value),
        _ => {
            errors.push(FieldError {
                field,
                message: REQUIRED_MESSAGE,
            });
            None
        }
    }
}

fn year(field: &'static str, value: Option<&str>, errors: &mut Vec<FieldError>) -> Option<i32> {
    let value = required(field, value, errors)?;
    match value.parse::<i32>() {
        Ok(year) => Some(year),
        Err(_not_integer) => {
            errors.push(FieldError {
                field,
                message: NOT_AN_INTEGER_MESSAGE,
            });
            None
        }
    }
}

/// Response body of a weekly deaths query.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct WeeklyDeathsResponse {
    /// Gender code, echoed from the request.
    pub gender: String,
    /// Age band code, echoed from the request.
    pub age: String,
    /// Country code, echoed from the request.
    pub country: String,
    /// Matching weeks, ordered by year then week.
    pub weekly_deaths: Vec<WeekYearDeaths>,
}

/// Errors that can occur when answering a query.
#[derive(Debug, thiserror::Error)]
pub enum QueryError {
    /// The request parameters are invalid.
    #[error(transparent)]
    Invalid(#[from] ValidationErrors),

    /// The series key could not be built.
    #[error(transparent)]
    Key(#[from] KeyError),
}

/// Answers weekly deaths queries from a [`SnapshotStore`].
#[derive(Debug, Clone)]
pub struct QueryService {
    store: Arc<SnapshotStore>,
}

impl QueryService {
    /// Service reading through `store`.
    pub const fn new(store: Arc<SnapshotStore>) -> Self {
        Self { store }
    }

    /// The underlying store.
    pub const fn store(&self) -> &Arc<SnapshotStore> {
        &self.store
    }

    /// Validate `params` and run the query.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Invalid`] with every field error, or
    /// [`QueryError::Key`] if the lookup key cannot be built.
    pub async fn weekly_deaths(
        &self,
        params: &WeeklyDeathsParams,
    ) -> Result<WeeklyDeathsResponse, QueryError> {
        let request = params.validate()?;
        self.run(request).await
    }

    /// Run an already validated query.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::Key`] if the lookup key cannot be built.
    pub async fn run(
        &self,
        request: WeeklyDeathsRequest,
    ) -> Result<WeeklyDeathsResponse, QueryError> {
        let weekly_deaths = self
            .store
            .query(
                &request.country,
                &request.age,
                &request.gender,
                request.year_from,
                request.year_to,
            )
            .await?;

        Ok(WeeklyDeathsResponse {
            gender: request.gender,
            age: request.age,
            country: request.country,
            weekly_deaths,
        })
    }
}
