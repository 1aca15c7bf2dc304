use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;

use super::auth::AuthUser;
use super::error::{AppError, AppResult};
use super::pagination::{PageParams, Paged};
use super::types::*;
use crate::catalog::CatalogError;
use crate::db::{Movie, MovieFilter, MovieQuery, MovieRepo};
use crate::server::AppState;

pub async fn create_movie(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<MovieRequest>,
) -> AppResult<(StatusCode, Json<Movie>)> {
    req.validate()?;

    let now = Utc::now();
    let movie = Movie {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title.trim().to_string(),
        genres: unique(req.genres),
        director: req.director,
        cast: unique(req.cast),
        release_date: req.release_date,
        release_status: req.release_status,
        runtime: req.runtime,
        synopsis: req.synopsis,
        age_rating: req.age_rating,
        cover_photo: req.cover_photo,
        trailer_url: req.trailer_url,
        trivia: req.trivia,
        average_rating: 0.0,
        review_count: 0,
        view_count: 0,
        created: now,
        updated: now,
    };

    state.db.insert_movie(&movie).await?;
    info!(movie = %movie.id, title = %movie.title, "Movie added");

    Ok((StatusCode::CREATED, Json(movie)))
}

pub async fn list_movies(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paged<MovieDetail>>> {
    let query = MovieQuery::default().window(page.skip(), page.limit());
    let movies = state.db.find_movies(&query).await?;
    let total = state.db.count_movies(&MovieFilter::new()).await?;

    let mut items = Vec::with_capacity(movies.len());
    for movie in movies {
        items.push(movie_detail(state.db.as_ref(), movie).await?);
    }

    Ok(Json(Paged::new(items, &page, total)))
}

/// Reading a single movie counts as a view.
pub async fn get_movie(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<MovieDetail>> {
    if let Err(e) = state.db.increment_view_count(&id).await {
        warn!(movie = %id, "Attempt to fetch missing movie");
        return Err(e.into());
    }

    let movie = state.db.get_movie(&id).await?;
    Ok(Json(movie_detail(state.db.as_ref(), movie).await?))
}

pub async fn update_movie(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<MoviePatch>,
) -> AppResult<Json<Movie>> {
    patch.validate()?;

    let mut movie = state.db.get_movie(&id).await.map_err(|e| {
        warn!(movie = %id, "Attempt to update missing movie");
        AppError::from(e)
    })?;

    if let Some(title) = patch.title {
        movie.title = title.trim().to_string();
    }
    if let Some(genres) = patch.genres {
        movie.genres = unique(genres);
    }
    if let Some(director) = patch.director {
        movie.director = director;
    }
    if let Some(cast) = patch.cast {
        movie.cast = unique(cast);
    }
    if let Some(release_date) = patch.release_date {
        movie.release_date = release_date;
    }
    if let Some(release_status) = patch.release_status {
        movie.release_status = release_status;
    }
    if let Some(runtime) = patch.runtime {
        movie.runtime = runtime;
    }
    if let Some(synopsis) = patch.synopsis {
        movie.synopsis = synopsis;
    }
    if let Some(age_rating) = patch.age_rating {
        movie.age_rating = age_rating;
    }
    if let Some(cover_photo) = patch.cover_photo {
        movie.cover_photo = cover_photo;
    }
    if patch.trailer_url.is_some() {
        movie.trailer_url = patch.trailer_url;
    }
    if let Some(trivia) = patch.trivia {
        movie.trivia = trivia;
    }
    movie.updated = Utc::now();

    state.db.update_movie(&movie).await?;
    info!(movie = %movie.id, title = %movie.title, "Movie updated");

    Ok(Json(movie))
}

pub async fn delete_movie(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Message>> {
    let movie = match state.ratings.remove_movie(state.db.as_ref(), &id).await {
        Ok(movie) => movie,
        Err(CatalogError::NotFound(what)) => {
            warn!(movie = %id, "Attempt to delete missing movie");
            return Err(AppError::NotFound(what));
        }
        Err(e) => return Err(e.into()),
    };
    info!(movie = %movie.id, title = %movie.title, "Movie deleted");

    Ok(Json(Message::new("Movie deleted successfully")))
}
