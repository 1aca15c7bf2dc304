use chrono::{Datelike, Duration, Months, NaiveDate};

use super::CatalogResult;
use crate::db::{
    Movie, MovieFilter, MovieQuery, MovieRepo, Predicate, SortField, SortKey, UserRepo,
};

/// Movies in the user's favorite genres, best rated first.
///
/// A user without favorite genres gets no recommendations.
pub async fn personalized_recommendations<R>(
    db: &R,
    user_id: &str,
    limit: usize,
) -> CatalogResult<Vec<Movie>>
where
    R: MovieRepo + UserRepo + ?Sized,
{
    let user = db.get_user_by_id(user_id).await?;
    if user.profile.favorite_genres.is_empty() {
        return Ok(Vec::new());
    }

    let filter = MovieFilter::new().and(Predicate::GenreIn(user.profile.favorite_genres));
    let query = MovieQuery::new(filter)
        .sorted_by(SortKey::desc(SortField::AverageRating))
        .limit(limit);
    Ok(db.find_movies(&query).await?)
}

/// Most viewed first, then best rated.
pub async fn trending_movies<R>(db: &R, limit: usize) -> CatalogResult<Vec<Movie>>
where
    R: MovieRepo + ?Sized,
{
    let query = MovieQuery::default()
        .sorted_by(SortKey::desc(SortField::ViewCount))
        .sorted_by(SortKey::desc(SortField::AverageRating))
        .limit(limit);
    Ok(db.find_movies(&query).await?)
}

pub async fn top_rated_movies<R>(db: &R, limit: usize) -> CatalogResult<Vec<Movie>>
where
    R: MovieRepo + ?Sized,
{
    let query = MovieQuery::default()
        .sorted_by(SortKey::desc(SortField::AverageRating))
        .limit(limit);
    Ok(db.find_movies(&query).await?)
}

pub async fn top_rated_by_genre<R>(db: &R, genre: &str, limit: usize) -> CatalogResult<Vec<Movie>>
where
    R: MovieRepo + ?Sized,
{
    let filter = MovieFilter::new().and(Predicate::GenreIn(vec![genre.to_string()]));
    let query = MovieQuery::new(filter)
        .sorted_by(SortKey::desc(SortField::AverageRating))
        .limit(limit);
    Ok(db.find_movies(&query).await?)
}

/// First day of `today`'s month and first day of the following month.
pub fn month_window(today: NaiveDate) -> (NaiveDate, NaiveDate) {
    let first = today - Duration::days(i64::from(today.day0()));
    let next = first
        .checked_add_months(Months::new(1))
        .unwrap_or(NaiveDate::MAX);
    (first, next)
}

/// Best rated movies released in the month containing `today`.
pub async fn top_of_month<R>(db: &R, today: NaiveDate, limit: usize) -> CatalogResult<Vec<Movie>>
where
    R: MovieRepo + ?Sized,
{
    let (from, until) = month_window(today);
    let filter = MovieFilter::new().and(Predicate::ReleasedBetween(from, until));
    let query = MovieQuery::new(filter)
        .sorted_by(SortKey::desc(SortField::AverageRating))
        .limit(limit);
    Ok(db.find_movies(&query).await?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::testutil::{movie, store_with};
    use crate::catalog::CatalogError;
    use crate::db::{Profile, User};
    use chrono::Utc;

    fn user(id: &str, favorite_genres: &[&str]) -> User {
        let now = Utc::now();
        User {
            id: id.to_string(),
            username: id.to_string(),
            email: format!("{}@example.com", id),
            password: String::new(),
            profile: Profile {
                favorite_genres: favorite_genres.iter().map(|g| g.to_string()).collect(),
                ..Default::default()
            },
            wishlist: vec![],
            created: now,
            updated: now,
        }
    }

    #[tokio::test]
    async fn test_personalized_matches_favorites() {
        let db = store_with(&[
            movie("a", &["Drama"], "d1"),
            movie("b", &["Comedy"], "d1"),
            movie("c", &["Sci-Fi", "Drama"], "d2"),
        ])
        .await;
        db.set_movie_rating("a", 2.0, 1).await.unwrap();
        db.set_movie_rating("c", 4.0, 1).await.unwrap();
        db.insert_user(&user("fan", &["Drama", "Western"])).await.unwrap();
        db.insert_user(&user("blank", &[])).await.unwrap();

        let recs = personalized_recommendations(&db, "fan", 10).await.unwrap();
        let ids: Vec<&str> = recs.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["c", "a"]);

        assert!(personalized_recommendations(&db, "blank", 10)
            .await
            .unwrap()
            .is_empty());

        assert!(matches!(
            personalized_recommendations(&db, "ghost", 10).await,
            Err(CatalogError::NotFound(_))
        ));
    }

    #[tokio::test]
    async fn test_trending_orders_by_views_then_rating() {
        let db = store_with(&[
            movie("a", &["Drama"], "d1"),
            movie("b", &["Drama"], "d1"),
            movie("c", &["Drama"], "d1"),
        ])
        .await;
        for _ in 0..3 {
            db.increment_view_count("b").await.unwrap();
        }
        db.increment_view_count("a").await.unwrap();
        db.increment_view_count("c").await.unwrap();
        db.set_movie_rating("c", 5.0, 1).await.unwrap();

        let trending = trending_movies(&db, 10).await.unwrap();
        let ids: Vec<&str> = trending.iter().map(|m| m.id.as_str()).collect();
        assert_eq!(ids, vec!["b", "c", "a"]);
        for pair in trending.windows(2) {
            assert!(pair[0].view_count >= pair[1].view_count);
        }
    }

    #[tokio::test]
    async fn test_empty_store() {
        let db = store_with(&[]).await;
        assert!(trending_movies(&db, 10).await.unwrap().is_empty());
        assert!(top_rated_movies(&db, 10).await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_top_by_genre_and_month() {
        let mut march = movie("march", &["Drama"], "d1");
        march.release_date = NaiveDate::from_ymd_opt(2024, 3, 31).unwrap();
        let mut april = movie("april", &["Comedy"], "d1");
        april.release_date = NaiveDate::from_ymd_opt(2024, 4, 1).unwrap();
        let db = store_with(&[march, april]).await;

        let drama = top_rated_by_genre(&db, "Drama", 10).await.unwrap();
        assert_eq!(drama.len(), 1);
        assert_eq!(drama[0].id, "march");

        let today = NaiveDate::from_ymd_opt(2024, 3, 15).unwrap();
        let month = top_of_month(&db, today, 10).await.unwrap();
        assert_eq!(month.len(), 1);
        assert_eq!(month[0].id, "march");
    }

    #[test]
    fn test_month_window() {
        let (from, until) = month_window(NaiveDate::from_ymd_opt(2023, 12, 25).unwrap());
        assert_eq!(from, NaiveDate::from_ymd_opt(2023, 12, 1).unwrap());
        assert_eq!(until, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
    }
}
