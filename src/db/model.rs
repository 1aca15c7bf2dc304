use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum ReleaseStatus {
    #[default]
    Announced,
    ComingSoon,
    Released,
}

impl ReleaseStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ReleaseStatus::Announced => "announced",
            ReleaseStatus::ComingSoon => "coming_soon",
            ReleaseStatus::Released => "released",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "announced" => Some(ReleaseStatus::Announced),
            "coming_soon" => Some(ReleaseStatus::ComingSoon),
            "released" => Some(ReleaseStatus::Released),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AgeRating {
    #[serde(rename = "G")]
    G,
    #[serde(rename = "PG")]
    Pg,
    #[serde(rename = "PG-13")]
    Pg13,
    #[serde(rename = "R")]
    R,
    #[serde(rename = "NC-17")]
    Nc17,
}

impl AgeRating {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgeRating::G => "G",
            AgeRating::Pg => "PG",
            AgeRating::Pg13 => "PG-13",
            AgeRating::R => "R",
            AgeRating::Nc17 => "NC-17",
        }
    }

    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "G" => Some(AgeRating::G),
            "PG" => Some(AgeRating::Pg),
            "PG-13" => Some(AgeRating::Pg13),
            "R" => Some(AgeRating::R),
            "NC-17" => Some(AgeRating::Nc17),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Movie {
    pub id: String,
    pub title: String,
    pub genres: Vec<String>,
    pub director: String,
    pub cast: Vec<String>,
    pub release_date: NaiveDate,
    pub release_status: ReleaseStatus,
    pub runtime: i64,
    pub synopsis: String,
    pub age_rating: AgeRating,
    pub cover_photo: String,
    pub trailer_url: Option<String>,
    pub trivia: Vec<String>,
    /// Mean of all review ratings for this movie, 0 when there are none.
    pub average_rating: f64,
    pub review_count: i64,
    pub view_count: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PersonRole {
    Actor,
    Director,
    Producer,
    Writer,
    Composer,
    Cinematographer,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmographyEntry {
    pub movie: String,
    pub role: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Award {
    pub name: String,
    pub year: i32,
    pub category: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Person {
    pub id: String,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub biography: Option<String>,
    pub photo: Option<String>,
    pub roles: Vec<PersonRole>,
    pub filmography: Vec<FilmographyEntry>,
    pub awards: Vec<Award>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Review {
    pub id: String,
    #[serde(rename = "user")]
    pub user_id: String,
    #[serde(rename = "movie")]
    pub movie_id: String,
    pub rating: i64,
    pub content: String,
    pub likes: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Profile {
    #[serde(default)]
    pub favorite_genres: Vec<String>,
    #[serde(default)]
    pub favorite_actors: Vec<String>,
    #[serde(default)]
    pub bio: Option<String>,
    #[serde(default)]
    pub avatar: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct User {
    pub id: String,
    pub username: String,
    pub email: String,
    #[serde(skip_serializing, default)]
    pub password: String,
    pub profile: Profile,
    pub wishlist: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct AccessToken {
    /// SHA-256 hex digest of the bearer token; the token itself is never stored.
    pub token_hash: String,
    pub user_id: String,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieList {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub creator: String,
    pub movies: Vec<String>,
    pub is_public: bool,
    pub followers: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct News {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: String,
    pub related_movies: Vec<String>,
    pub related_people: Vec<String>,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GenreCount {
    pub genre: String,
    pub count: i64,
}

/// Ordering for per-movie review listings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewOrder {
    Newest,
    HighestRated,
    MostLiked,
}

#[derive(Debug, thiserror::Error)]
pub enum DbError {
    #[error("Database error: {0}")]
    Sqlx(#[from] sqlx::Error),
    #[error("Not found: {0}")]
    NotFound(String),
    #[error("Already exists: {0}")]
    AlreadyExists(String),
    #[error("Corrupt row: {0}")]
    Decode(String),
    #[error("Search index error: {0}")]
    Search(#[from] super::search::SearchError),
}

pub type DbResult<T> = Result<T, DbError>;
