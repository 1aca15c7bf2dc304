use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;
use chrono::Utc;
use tracing::{info, warn};
use validator::Validate;

use super::auth::{hash_password, hash_token, new_token, verify_password, AuthUser};
use super::error::{AppError, AppResult};
use super::types::*;
use crate::db::{AccessToken, AccessTokenRepo, DbError, Movie, MovieRepo, Profile, User, UserRepo};
use crate::server::AppState;

pub async fn register(
    State(state): State<AppState>,
    Json(req): Json<RegisterRequest>,
) -> AppResult<(StatusCode, Json<User>)> {
    let req = RegisterRequest {
        username: req.username.trim().to_string(),
        email: req.email.trim().to_lowercase(),
        password: req.password,
    };
    req.validate()?;

    let now = Utc::now();
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        username: req.username,
        email: req.email,
        password: hash_password(&req.password, state.config.auth.password_cost)?,
        profile: Profile::default(),
        wishlist: Vec::new(),
        created: now,
        updated: now,
    };

    state.db.insert_user(&user).await?;
    info!(user = %user.id, username = %user.username, "User registered");

    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> AppResult<Json<LoginResponse>> {
    let invalid = || AppError::Unauthorized("Invalid username or password".to_string());

    let user = match state.db.get_user(req.username.trim()).await {
        Ok(user) => user,
        Err(DbError::NotFound(_)) => return Err(invalid()),
        Err(e) => return Err(e.into()),
    };
    if !verify_password(&req.password, &user.password) {
        warn!(username = %user.username, "Failed login");
        return Err(invalid());
    }

    let token = new_token();
    state
        .db
        .insert_token(&AccessToken {
            token_hash: hash_token(&token),
            user_id: user.id.clone(),
            created: Utc::now(),
        })
        .await?;
    info!(user = %user.id, "User logged in");

    Ok(Json(LoginResponse { token, user }))
}

pub async fn logout(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<Message>> {
    state.db.delete_token(&user.token_hash).await?;
    Ok(Json(Message::new("Logged out")))
}

pub async fn get_me(State(state): State<AppState>, user: AuthUser) -> AppResult<Json<User>> {
    Ok(Json(state.db.get_user_by_id(&user.user_id).await?))
}

pub async fn update_me(
    State(state): State<AppState>,
    auth: AuthUser,
    Json(req): Json<UpdateMeRequest>,
) -> AppResult<Json<User>> {
    let req = UpdateMeRequest {
        email: req.email.map(|e| e.trim().to_lowercase()),
        ..req
    };
    req.validate()?;

    let mut user = state.db.get_user_by_id(&auth.user_id).await?;

    if let Some(email) = req.email {
        user.email = email;
    }
    if let Some(password) = req.password {
        user.password = hash_password(&password, state.config.auth.password_cost)?;
    }
    if let Some(genres) = req.favorite_genres {
        user.profile.favorite_genres = unique(genres);
    }
    if let Some(actors) = req.favorite_actors {
        user.profile.favorite_actors = unique(actors);
    }
    if req.bio.is_some() {
        user.profile.bio = req.bio;
    }
    if req.avatar.is_some() {
        user.profile.avatar = req.avatar;
    }
    user.updated = Utc::now();

    state.db.update_user(&user).await?;
    info!(user = %user.id, "Profile updated");

    Ok(Json(user))
}

/// Removes the account with its reviews, likes, tokens and lists, then
/// refreshes the ratings of every movie the user had reviewed.
pub async fn delete_me(State(state): State<AppState>, auth: AuthUser) -> AppResult<Json<Message>> {
    let reviewed = state.db.delete_user(&auth.user_id).await?;
    state.ratings.refresh(state.db.as_ref(), &reviewed).await?;

    info!(user = %auth.user_id, movies = reviewed.len(), "Account deleted");
    Ok(Json(Message::new("Account deleted successfully")))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<User>> {
    Ok(Json(state.db.get_user_by_id(&id).await?))
}

pub async fn get_wishlist(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<Vec<Movie>>> {
    let user = state.db.get_user_by_id(&auth.user_id).await?;
    Ok(Json(state.db.get_movies_by_ids(&user.wishlist).await?))
}

pub async fn add_to_wishlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(movie_id): Path<String>,
) -> AppResult<Json<Vec<String>>> {
    state.db.get_movie(&movie_id).await?;

    let mut user = state.db.get_user_by_id(&auth.user_id).await?;
    if !user.wishlist.contains(&movie_id) {
        user.wishlist.push(movie_id);
        user.updated = Utc::now();
        state.db.update_user(&user).await?;
    }
    Ok(Json(user.wishlist))
}

pub async fn remove_from_wishlist(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(movie_id): Path<String>,
) -> AppResult<Json<Vec<String>>> {
    let mut user = state.db.get_user_by_id(&auth.user_id).await?;
    let before = user.wishlist.len();
    user.wishlist.retain(|id| id != &movie_id);
    if user.wishlist.len() != before {
        user.updated = Utc::now();
        state.db.update_user(&user).await?;
    }
    Ok(Json(user.wishlist))
}
