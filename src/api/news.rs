use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::info;
use validator::Validate;

use super::auth::AuthUser;
use super::error::AppResult;
use super::pagination::{PageParams, Paged};
use super::types::*;
use crate::db::{News, NewsRepo};
use crate::server::AppState;

pub async fn create_news(
    State(state): State<AppState>,
    user: AuthUser,
    Json(req): Json<NewsRequest>,
) -> AppResult<(StatusCode, Json<News>)> {
    req.validate()?;

    let now = Utc::now();
    let news = News {
        id: uuid::Uuid::new_v4().to_string(),
        title: req.title.trim().to_string(),
        content: req.content,
        author: user.user_id,
        related_movies: unique(req.related_movies),
        related_people: unique(req.related_people),
        tags: unique(req.tags),
        created: now,
        updated: now,
    };

    state.db.insert_news(&news).await?;
    info!(news = %news.id, title = %news.title, "News article published");

    Ok((StatusCode::CREATED, Json(news)))
}

/// Newest first.
pub async fn list_news(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paged<News>>> {
    let articles = state.db.list_news(page.skip(), page.limit()).await?;
    let total = state.db.count_news().await?;
    Ok(Json(Paged::new(articles, &page, total)))
}

pub async fn get_news(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<NewsDetail>> {
    let news = state.db.get_news(&id).await?;
    Ok(Json(news_detail(state.db.as_ref(), news).await?))
}

pub async fn update_news(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<NewsPatch>,
) -> AppResult<Json<News>> {
    patch.validate()?;

    let mut news = state.db.get_news(&id).await?;
    if let Some(title) = patch.title {
        news.title = title.trim().to_string();
    }
    if let Some(content) = patch.content {
        news.content = content;
    }
    if let Some(movies) = patch.related_movies {
        news.related_movies = unique(movies);
    }
    if let Some(people) = patch.related_people {
        news.related_people = unique(people);
    }
    if let Some(tags) = patch.tags {
        news.tags = unique(tags);
    }
    news.updated = Utc::now();

    state.db.update_news(&news).await?;
    info!(news = %news.id, "News article updated");

    Ok(Json(news))
}

pub async fn delete_news(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Message>> {
    let news = state.db.delete_news(&id).await?;
    info!(news = %news.id, "News article deleted");
    Ok(Json(Message::new("News article deleted successfully")))
}
