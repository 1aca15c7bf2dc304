//! Catalog logic that sits on top of the store: rating aggregation,
//! similarity, recommendation rankings and search filter construction.

pub mod filter;
pub mod rating;
pub mod recommend;
pub mod similar;

pub use filter::{build_search_filter, SearchParams, SearchSpec};
pub use rating::{mean_rating, recompute_movie_rating, RatingAggregator};
pub use recommend::{
    personalized_recommendations, top_of_month, top_rated_by_genre, top_rated_movies,
    trending_movies,
};
pub use similar::{find_similar_movies, similarity_filter};

use crate::db::DbError;

#[derive(Debug, thiserror::Error)]
pub enum CatalogError {
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Validation failed: {0}")]
    Validation(String),
    #[error("Store error: {0}")]
    Store(#[source] DbError),
}

impl From<DbError> for CatalogError {
    fn from(e: DbError) -> Self {
        match e {
            DbError::NotFound(what) => CatalogError::NotFound(what),
            other => CatalogError::Store(other),
        }
    }
}

pub type CatalogResult<T> = Result<T, CatalogError>;
