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
use crate::db::{Person, PersonRepo, PersonRole};
use crate::server::AppState;

fn unique_roles(roles: Vec<PersonRole>) -> Vec<PersonRole> {
    let mut out = Vec::with_capacity(roles.len());
    for role in roles {
        if !out.contains(&role) {
            out.push(role);
        }
    }
    out
}

pub async fn create_person(
    State(state): State<AppState>,
    _user: AuthUser,
    Json(req): Json<PersonRequest>,
) -> AppResult<(StatusCode, Json<Person>)> {
    req.validate()?;
    check_awards(&req.awards)?;

    let now = Utc::now();
    let person = Person {
        id: uuid::Uuid::new_v4().to_string(),
        name: req.name.trim().to_string(),
        birth_date: req.birth_date,
        biography: req.biography,
        photo: req.photo,
        roles: unique_roles(req.roles),
        filmography: req.filmography,
        awards: req.awards,
        created: now,
        updated: now,
    };

    state.db.insert_person(&person).await?;
    info!(person = %person.id, name = %person.name, "Person added");

    Ok((StatusCode::CREATED, Json(person)))
}

pub async fn list_people(
    State(state): State<AppState>,
    Query(page): Query<PageParams>,
) -> AppResult<Json<Paged<Person>>> {
    let people = state.db.list_people(page.skip(), page.limit()).await?;
    let total = state.db.count_people().await?;
    Ok(Json(Paged::new(people, &page, total)))
}

pub async fn get_person(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> AppResult<Json<PersonDetail>> {
    let person = state.db.get_person(&id).await?;
    Ok(Json(person_detail(state.db.as_ref(), person).await?))
}

pub async fn update_person(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
    Json(patch): Json<PersonPatch>,
) -> AppResult<Json<Person>> {
    patch.validate()?;

    let mut person = state.db.get_person(&id).await?;

    if let Some(name) = patch.name {
        person.name = name.trim().to_string();
    }
    if patch.birth_date.is_some() {
        person.birth_date = patch.birth_date;
    }
    if patch.biography.is_some() {
        person.biography = patch.biography;
    }
    if patch.photo.is_some() {
        person.photo = patch.photo;
    }
    if let Some(roles) = patch.roles {
        person.roles = unique_roles(roles);
    }
    if let Some(filmography) = patch.filmography {
        person.filmography = filmography;
    }
    if let Some(awards) = patch.awards {
        check_awards(&awards)?;
        person.awards = awards;
    }
    person.updated = Utc::now();

    state.db.update_person(&person).await?;
    info!(person = %person.id, "Person updated");

    Ok(Json(person))
}

/// Movies keep their references to a deleted person; reads skip them.
pub async fn delete_person(
    State(state): State<AppState>,
    _user: AuthUser,
    Path(id): Path<String>,
) -> AppResult<Json<Message>> {
    let person = state.db.delete_person(&id).await?;
    info!(person = %person.id, name = %person.name, "Person deleted");
    Ok(Json(Message::new("Person deleted successfully")))
}
