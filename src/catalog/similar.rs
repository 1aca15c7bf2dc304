use super::CatalogResult;
use crate::db::{
    DbError, Movie, MovieFilter, MovieQuery, MovieRepo, Predicate, SortField, SortKey,
};

/// Other movies sharing at least one genre or the director with `source`.
pub fn similarity_filter(source: &Movie) -> MovieFilter {
    MovieFilter::new()
        .and(Predicate::IdNot(source.id.clone()))
        .and(Predicate::Any(vec![
            Predicate::GenreIn(source.genres.clone()),
            Predicate::DirectorIs(source.director.clone()),
        ]))
}

/// Up to `limit` movies related to `movie_id`, best rated first.
///
/// An unknown source id yields an empty list.
pub async fn find_similar_movies<R>(
    db: &R,
    movie_id: &str,
    limit: usize,
) -> CatalogResult<Vec<Movie>>
where
    R: MovieRepo + ?Sized,
{
    let source = match db.get_movie(movie_id).await {
        Ok(movie) => movie,
        Err(DbError::NotFound(_)) => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let query = MovieQuery::new(similarity_filter(&source))
        .sorted_by(SortKey::desc(SortField::AverageRating))
        .limit(limit.max(1));

    Ok(db.find_movies(&query).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testutil::{movie, store_with};

    #[tokio::test]
    async fn test_shared_director_counts() {
        let db = store_with(&[
            movie("alpha", &["Drama"], "d1"),
            movie("beta", &["Comedy"], "d1"),
            movie("gamma", &["Horror"], "d2"),
        ])
        .await;
        db.set_movie_rating("alpha", 4.0, 2).await.unwrap();
        db.set_movie_rating("beta", 2.0, 1).await.unwrap();

        let similar = find_similar_movies(&db, "alpha", 5).await.unwrap();
        let ids: Vec<&str> = similar.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["beta"]);
        assert_eq!(similar[0].average_rating, 2.0);
        assert_eq!(similar[0].review_count, 1);
    }

    #[tokio::test]
    async fn test_ordering_limit_and_exclusion() {
        let db = store_with(&[
            movie("src", &["Drama", "War"], "d1"),
            movie("a", &["Drama"], "d2"),
            movie("b", &["War"], "d3"),
            movie("c", &["Comedy"], "d1"),
            movie("d", &["Drama"], "d4"),
            movie("e", &["Western"], "d5"),
        ])
        .await;
        for (id, rating) in [("a", 3.0), ("b", 4.5), ("c", 3.0), ("d", 1.0), ("e", 5.0)] {
            db.set_movie_rating(id, rating, 1).await.unwrap();
        }

        let similar = find_similar_movies(&db, "src", 5).await.unwrap();
        let ids: Vec<&str> = similar.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "a", "c", "d"]);

        let limited = find_similar_movies(&db, "src", 2).await.unwrap();
        assert_eq!(limited.len(), 2);

        // A zero limit still returns the best match.
        assert_eq!(find_similar_movies(&db, "src", 0).await.unwrap().len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_source_is_empty() {
        let db = store_with(&[movie("a", &["Drama"], "d1")]).await;
        assert!(find_similar_movies(&db, "nope", 5).await.unwrap().is_empty());
    }
}
