use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use super::{CatalogError, CatalogResult};
use crate::db::{Movie, MovieRepo, Review, ReviewRepo};

/// Arithmetic mean of the ratings, or `None` for an empty set.
pub fn mean_rating(ratings: &[i64]) -> Option<f64> {
    if ratings.is_empty() {
        return None;
    }
    let sum: i64 = ratings.iter().sum();
    Some(sum as f64 / ratings.len() as f64)
}

/// Re-scan every review of the movie and persist the mean and count.
///
/// A movie without reviews gets a mean of 0.0. Running this twice with no
/// intervening review write leaves the movie unchanged.
pub async fn recompute_movie_rating<R>(db: &R, movie_id: &str) -> CatalogResult<f64>
where
    R: MovieRepo + ReviewRepo + ?Sized,
{
    db.get_movie(movie_id).await?;

    let ratings = db.movie_ratings(movie_id).await?;
    let average = mean_rating(&ratings).unwrap_or(0.0);
    db.set_movie_rating(movie_id, average, ratings.len() as i64)
        .await?;

    debug!(
        movie = %movie_id,
        average = average,
        reviews = ratings.len(),
        "Recomputed movie rating"
    );
    Ok(average)
}

/// Serializes review writes and rating recomputes per movie.
///
/// Each movie id maps to its own async mutex; the map entry lives only while
/// some task holds or waits on it.
#[derive(Default)]
pub struct RatingAggregator {
    locks: Mutex<HashMap<String, Arc<Mutex<()>>>>,
}

impl RatingAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    async fn with_movie_lock<F, Fut, T>(&self, movie_id: &str, f: F) -> T
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = T>,
    {
        let lock = {
            let mut locks = self.locks.lock().await;
            locks.entry(movie_id.to_string()).or_default().clone()
        };

        let result = {
            let _guard = lock.lock().await;
            f().await
        };

        let mut locks = self.locks.lock().await;
        // One handle in the map, one here: nobody else is waiting.
        if Arc::strong_count(&lock) == 2 {
            locks.remove(movie_id);
        }
        result
    }

    pub async fn recompute<R>(&self, db: &R, movie_id: &str) -> CatalogResult<f64>
    where
        R: MovieRepo + ReviewRepo + ?Sized,
    {
        self.with_movie_lock(movie_id, || recompute_movie_rating(db, movie_id))
            .await
    }

    /// Store the user's review of a movie (replacing an earlier one) and
    /// refresh the movie's rating. Returns the stored review and new mean.
    pub async fn submit_review<R>(
        &self,
        db: &R,
        review: &Review,
    ) -> CatalogResult<(Review, f64)>
    where
        R: MovieRepo + ReviewRepo + ?Sized,
    {
        let movie_id = review.movie_id.as_str();
        self.with_movie_lock(movie_id, || async move {
            db.get_movie(movie_id).await?;
            let stored = db.upsert_review(review).await?;
            let average = recompute_movie_rating(db, movie_id).await?;
            info!(
                movie = %movie_id,
                user = %stored.user_id,
                rating = stored.rating,
                average = average,
                "Review saved"
            );
            Ok::<_, CatalogError>((stored, average))
        })
        .await
    }

    /// Delete a review and refresh its movie's rating.
    pub async fn remove_review<R>(&self, db: &R, review_id: &str) -> CatalogResult<Review>
    where
        R: MovieRepo + ReviewRepo + ?Sized,
    {
        let review = db.get_review(review_id).await?;
        let movie_id = review.movie_id.as_str();

        self.with_movie_lock(movie_id, || async move {
            let removed = db.delete_review(review_id).await?;
            match recompute_movie_rating(db, movie_id).await {
                Ok(_) => {}
                Err(CatalogError::NotFound(_)) => {
                    warn!(movie = %movie_id, "Removed review of a movie that no longer exists");
                }
                Err(e) => return Err(e),
            }
            Ok::<_, CatalogError>(removed)
        })
        .await
    }

    /// Delete a movie and everything that references it, holding the movie's
    /// lock so no review for it can land halfway through.
    pub async fn remove_movie<R>(&self, db: &R, movie_id: &str) -> CatalogResult<Movie>
    where
        R: MovieRepo + ?Sized,
    {
        self.with_movie_lock(movie_id, || async move {
            Ok::<_, CatalogError>(db.delete_movie(movie_id).await?)
        })
        .await
    }

    /// Recompute several movies, skipping ids that no longer resolve.
    pub async fn refresh<R>(&self, db: &R, movie_ids: &[String]) -> CatalogResult<()>
    where
        R: MovieRepo + ReviewRepo + ?Sized,
    {
        for movie_id in movie_ids {
            match self.recompute(db, movie_id).await {
                Ok(_) | Err(CatalogError::NotFound(_)) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(())
    }

    #[cfg(test)]
    async fn tracked(&self) -> usize {
        self.locks.lock().await.len()
    }
}
