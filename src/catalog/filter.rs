use chrono::NaiveDate;
use serde::Deserialize;

use super::{CatalogError, CatalogResult};
use crate::db::{MovieFilter, Predicate, SortField, SortKey};

/// Raw search parameters as they arrive on the query string. Values stay
/// strings so malformed input can be reported as a validation failure.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SearchParams {
    pub query: Option<String>,
    pub genre: Option<String>,
    pub rating: Option<String>,
    pub release_year: Option<String>,
    pub sort_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct SearchSpec {
    pub filter: MovieFilter,
    pub sort: SortKey,
}

fn present(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|v| !v.is_empty())
}

pub fn build_search_filter(params: &SearchParams) -> CatalogResult<SearchSpec> {
    let mut filter = MovieFilter::new();

    if let Some(text) = present(&params.query) {
        filter = filter.and(Predicate::TextMatch(text.to_string()));
    }

    if let Some(genre) = present(&params.genre) {
        filter = filter.and(Predicate::GenreIn(vec![genre.to_string()]));
    }

    if let Some(rating) = present(&params.rating) {
        let min = rating
            .parse::<f64>()
            .ok()
            .filter(|r| r.is_finite())
            .ok_or_else(|| CatalogError::Validation(format!("invalid rating: {}", rating)))?;
        filter = filter.and(Predicate::MinRating(min));
    }

    if let Some(year) = present(&params.release_year) {
        let invalid = || CatalogError::Validation(format!("invalid releaseYear: {}", year));
        let year = year.parse::<i32>().map_err(|_| invalid())?;
        let from = NaiveDate::from_ymd_opt(year, 1, 1).ok_or_else(invalid)?;
        let until = year
            .checked_add(1)
            .and_then(|next| NaiveDate::from_ymd_opt(next, 1, 1))
            .ok_or_else(invalid)?;
        filter = filter.and(Predicate::ReleasedBetween(from, until));
    }

    let field = match present(&params.sort_by) {
        None => SortField::AverageRating,
        Some(name) => SortField::from_str(name).ok_or_else(|| {
            let allowed: Vec<&str> = SortField::ALLOWED.iter().map(|f| f.as_str()).collect();
            CatalogError::Validation(format!(
                "sortBy must be one of {}, got {}",
                allowed.join(", "),
                name
            ))
        })?,
    };

    Ok(SearchSpec {
        filter,
        sort: SortKey::desc(field),
    })
}
