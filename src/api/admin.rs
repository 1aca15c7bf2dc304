use axum::extract::{Path, State};
use axum::Json;
use tracing::info;

use super::auth::AuthUser;
use super::error::AppResult;
use super::types::*;
use crate::db::{
    GenreCount, Movie, MovieQuery, MovieRepo, ReviewRepo, SortField, SortKey, UserRepo,
};
use crate::server::AppState;

const POPULAR_LIMIT: usize = 10;
const TRENDING_GENRES: usize = 5;

/// Most viewed movies.
pub async fn popular_movies(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<Vec<Movie>>> {
    let query = MovieQuery::default()
        .sorted_by(SortKey::desc(SortField::ViewCount))
        .limit(POPULAR_LIMIT);
    Ok(Json(state.db.find_movies(&query).await?))
}

pub async fn user_activity(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<Vec<UserActivity>>> {
    let users = state.db.list_users().await?;

    let mut activity = Vec::with_capacity(users.len());
    for user in users {
        let wishlist = state.db.get_movies_by_ids(&user.wishlist).await?;
        activity.push(UserActivity {
            id: user.id,
            username: user.username,
            email: user.email,
            profile: user.profile,
            wishlist,
            created: user.created,
        });
    }
    Ok(Json(activity))
}

pub async fn trending_genres(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<Vec<GenreCount>>> {
    Ok(Json(state.db.genre_counts(TRENDING_GENRES).await?))
}

pub async fn moderate_reviews(
    State(state): State<AppState>,
    _user: AuthUser,
) -> AppResult<Json<Vec<ReviewView>>> {
    let reviews = state.db.list_all_reviews().await?;
    Ok(Json(review_views(state.db.as_ref(), reviews, true).await?))
}

pub async fn delete_review(
    State(state): State<AppState>,
    user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Message>> {
    let review = state.ratings.remove_review(state.db.as_ref(), &id).await?;
    info!(
        review = %review.id,
        movie = %review.movie_id,
        by = %user.user_id,
        "Review removed by moderator"
    );
    Ok(Json(Message::new("Review deleted successfully")))
}
