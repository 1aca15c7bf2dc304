use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use validator::Validate;

use super::error::{AppError, AppResult};
use crate::db::{
    AgeRating, Award, DbResult, FilmographyEntry, Movie, MovieList, News, Person, PersonRole,
    Profile, ReleaseStatus, Repository, Review, User,
};

// ---- Views returned to clients ----

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserSummary {
    pub id: String,
    pub username: String,
}

impl From<&User> for UserSummary {
    fn from(user: &User) -> Self {
        Self {
            id: user.id.clone(),
            username: user.username.clone(),
        }
    }
}

/// A movie with its director and cast resolved to people.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MovieDetail {
    pub id: String,
    pub title: String,
    pub genres: Vec<String>,
    pub director: Option<Person>,
    pub cast: Vec<Person>,
    pub release_date: NaiveDate,
    pub release_status: ReleaseStatus,
    pub runtime: i64,
    pub synopsis: String,
    pub age_rating: AgeRating,
    pub cover_photo: String,
    pub trailer_url: Option<String>,
    pub trivia: Vec<String>,
    pub average_rating: f64,
    pub review_count: i64,
    pub view_count: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

impl MovieDetail {
    pub fn new(movie: Movie, director: Option<Person>, cast: Vec<Person>) -> Self {
        Self {
            id: movie.id,
            title: movie.title,
            genres: movie.genres,
            director,
            cast,
            release_date: movie.release_date,
            release_status: movie.release_status,
            runtime: movie.runtime,
            synopsis: movie.synopsis,
            age_rating: movie.age_rating,
            cover_photo: movie.cover_photo,
            trailer_url: movie.trailer_url,
            trivia: movie.trivia,
            average_rating: movie.average_rating,
            review_count: movie.review_count,
            view_count: movie.view_count,
            created: movie.created,
            updated: movie.updated,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FilmographyItem {
    pub movie: Movie,
    pub role: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PersonDetail {
    pub id: String,
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    pub biography: Option<String>,
    pub photo: Option<String>,
    pub roles: Vec<PersonRole>,
    pub filmography: Vec<FilmographyItem>,
    pub awards: Vec<Award>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewView {
    pub id: String,
    pub user: Option<UserSummary>,
    pub movie: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_title: Option<String>,
    pub rating: i64,
    pub content: String,
    pub likes: i64,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ReviewHighlights {
    pub top_rated: Vec<ReviewView>,
    pub most_liked: Vec<ReviewView>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ListDetail {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub creator: Option<UserSummary>,
    pub movies: Vec<Movie>,
    pub is_public: bool,
    pub followers: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct NewsDetail {
    pub id: String,
    pub title: String,
    pub content: String,
    pub author: Option<UserSummary>,
    pub related_movies: Vec<Movie>,
    pub related_people: Vec<Person>,
    pub tags: Vec<String>,
    pub created: DateTime<Utc>,
    pub updated: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UserActivity {
    pub id: String,
    pub username: String,
    pub email: String,
    pub profile: Profile,
    pub wishlist: Vec<Movie>,
    pub created: DateTime<Utc>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginResponse {
    pub token: String,
    pub user: User,
}

#[derive(Debug, Serialize)]
pub struct Message {
    pub message: String,
}

impl Message {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
        }
    }
}

// ---- Populating references ----

pub async fn movie_detail<R: Repository + ?Sized>(db: &R, movie: Movie) -> DbResult<MovieDetail> {
    let director = db
        .get_people_by_ids(std::slice::from_ref(&movie.director))
        .await?
        .into_iter()
        .next();
    let cast = db.get_people_by_ids(&movie.cast).await?;
    Ok(MovieDetail::new(movie, director, cast))
}

pub async fn person_detail<R: Repository + ?Sized>(
    db: &R,
    person: Person,
) -> DbResult<PersonDetail> {
    let ids: Vec<String> = person.filmography.iter().map(|f| f.movie.clone()).collect();
    let movies: HashMap<String, Movie> = db
        .get_movies_by_ids(&ids)
        .await?
        .into_iter()
        .map(|m| (m.id.clone(), m))
        .collect();

    let filmography = person
        .filmography
        .into_iter()
        .filter_map(|entry| {
            movies.get(&entry.movie).cloned().map(|movie| FilmographyItem {
                movie,
                role: entry.role,
            })
        })
        .collect();

    Ok(PersonDetail {
        id: person.id,
        name: person.name,
        birth_date: person.birth_date,
        biography: person.biography,
        photo: person.photo,
        roles: person.roles,
        filmography,
        awards: person.awards,
        created: person.created,
        updated: person.updated,
    })
}

/// Attach the author's username to each review.
pub async fn review_views<R: Repository + ?Sized>(
    db: &R,
    reviews: Vec<Review>,
    with_movie_titles: bool,
) -> DbResult<Vec<ReviewView>> {
    let user_ids = unique(reviews.iter().map(|r| r.user_id.clone()));
    let users: HashMap<String, UserSummary> = db
        .get_users_by_ids(&user_ids)
        .await?
        .iter()
        .map(|u| (u.id.clone(), UserSummary::from(u)))
        .collect();

    let titles: HashMap<String, String> = if with_movie_titles {
        let movie_ids = unique(reviews.iter().map(|r| r.movie_id.clone()));
        db.get_movies_by_ids(&movie_ids)
            .await?
            .into_iter()
            .map(|m| (m.id, m.title))
            .collect()
    } else {
        HashMap::new()
    };

    Ok(reviews
        .into_iter()
        .map(|r| ReviewView {
            user: users.get(&r.user_id).cloned(),
            movie_title: titles.get(&r.movie_id).cloned(),
            id: r.id,
            movie: r.movie_id,
            rating: r.rating,
            content: r.content,
            likes: r.likes,
            created: r.created,
            updated: r.updated,
        })
        .collect())
}

pub async fn list_detail<R: Repository + ?Sized>(db: &R, list: MovieList) -> DbResult<ListDetail> {
    let creator = db
        .get_users_by_ids(std::slice::from_ref(&list.creator))
        .await?
        .first()
        .map(UserSummary::from);
    let movies = db.get_movies_by_ids(&list.movies).await?;
    Ok(ListDetail {
        id: list.id,
        name: list.name,
        description: list.description,
        creator,
        movies,
        is_public: list.is_public,
        followers: list.followers,
        created: list.created,
        updated: list.updated,
    })
}

pub async fn news_detail<R: Repository + ?Sized>(db: &R, news: News) -> DbResult<NewsDetail> {
    let author = db
        .get_users_by_ids(std::slice::from_ref(&news.author))
        .await?
        .first()
        .map(UserSummary::from);
    let related_movies = db.get_movies_by_ids(&news.related_movies).await?;
    let related_people = db.get_people_by_ids(&news.related_people).await?;
    Ok(NewsDetail {
        id: news.id,
        title: news.title,
        content: news.content,
        author,
        related_movies,
        related_people,
        tags: news.tags,
        created: news.created,
        updated: news.updated,
    })
}

/// Drop repeated values, keeping the first occurrence.
pub fn unique(values: impl IntoIterator<Item = String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for v in values {
        if !out.contains(&v) {
            out.push(v);
        }
    }
    out
}

// ---- Request bodies ----

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[validate(length(min = 3, max = 30))]
    pub username: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 6, max = 128))]
    pub password: String,
}

#[derive(Debug, Deserialize)]
pub struct LoginRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct UpdateMeRequest {
    #[validate(email)]
    pub email: Option<String>,
    #[validate(length(min = 6, max = 128))]
    pub password: Option<String>,
    pub favorite_genres: Option<Vec<String>>,
    pub favorite_actors: Option<Vec<String>>,
    #[validate(length(max = 500))]
    pub bio: Option<String>,
    pub avatar: Option<String>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MovieRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(default)]
    pub genres: Vec<String>,
    #[validate(length(min = 1))]
    pub director: String,
    #[serde(default)]
    pub cast: Vec<String>,
    pub release_date: NaiveDate,
    #[serde(default)]
    pub release_status: ReleaseStatus,
    #[validate(range(min = 1))]
    pub runtime: i64,
    #[validate(length(max = 2000))]
    pub synopsis: String,
    pub age_rating: AgeRating,
    #[serde(default)]
    pub cover_photo: String,
    #[validate(url)]
    pub trailer_url: Option<String>,
    #[serde(default)]
    pub trivia: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct MoviePatch {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    pub genres: Option<Vec<String>>,
    #[validate(length(min = 1))]
    pub director: Option<String>,
    pub cast: Option<Vec<String>>,
    pub release_date: Option<NaiveDate>,
    pub release_status: Option<ReleaseStatus>,
    #[validate(range(min = 1))]
    pub runtime: Option<i64>,
    #[validate(length(max = 2000))]
    pub synopsis: Option<String>,
    pub age_rating: Option<AgeRating>,
    pub cover_photo: Option<String>,
    #[validate(url)]
    pub trailer_url: Option<String>,
    pub trivia: Option<Vec<String>>,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PersonRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub biography: Option<String>,
    pub photo: Option<String>,
    #[serde(default)]
    pub roles: Vec<PersonRole>,
    #[serde(default)]
    pub filmography: Vec<FilmographyEntry>,
    #[serde(default)]
    pub awards: Vec<Award>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct PersonPatch {
    #[validate(length(min = 1, max = 100))]
    pub name: Option<String>,
    pub birth_date: Option<NaiveDate>,
    #[validate(length(max = 2000))]
    pub biography: Option<String>,
    pub photo: Option<String>,
    pub roles: Option<Vec<PersonRole>>,
    pub filmography: Option<Vec<FilmographyEntry>>,
    pub awards: Option<Vec<Award>>,
}

/// Awards predate cinema only by mistake.
pub fn check_awards(awards: &[Award]) -> AppResult<()> {
    match awards.iter().find(|a| a.year < 1888) {
        Some(a) => Err(AppError::Validation(format!(
            "award {} has invalid year {}",
            a.name, a.year
        ))),
        None => Ok(()),
    }
}

#[derive(Debug, Deserialize, Validate)]
pub struct ReviewRequest {
    #[validate(range(min = 1, max = 5))]
    pub rating: i64,
    #[validate(length(min = 10, max = 5000))]
    pub content: String,
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ListRequest {
    #[validate(length(min = 1, max = 100))]
    pub name: String,
    #[validate(length(max = 500))]
    pub description: Option<String>,
    #[serde(default)]
    pub movies: Vec<String>,
    #[serde(default = "default_true")]
    pub is_public: bool,
}

#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewsRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[validate(length(min = 1, max = 10000))]
    pub content: String,
    #[serde(default)]
    pub related_movies: Vec<String>,
    #[serde(default)]
    pub related_people: Vec<String>,
    #[serde(default)]
    pub tags: Vec<String>,
}

#[derive(Debug, Default, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct NewsPatch {
    #[validate(length(min = 1, max = 200))]
    pub title: Option<String>,
    #[validate(length(min = 1, max = 10000))]
    pub content: Option<String>,
    pub related_movies: Option<Vec<String>>,
    pub related_people: Option<Vec<String>>,
    pub tags: Option<Vec<String>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_keeps_first() {
        let v = unique(["b", "a", "b", "c", "a"].map(String::from));
        assert_eq!(v, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_review_request_bounds() {
        let ok = ReviewRequest {
            rating: 5,
            content: "Ten chars!".to_string(),
        };
        assert!(ok.validate().is_ok());

        let low = ReviewRequest {
            rating: 0,
            content: "Long enough text".to_string(),
        };
        assert!(low.validate().is_err());

        let short = ReviewRequest {
            rating: 3,
            content: "short".to_string(),
        };
        assert!(short.validate().is_err());
    }

    #[test]
    fn test_check_awards() {
        let award = |year| Award {
            name: "Palme".to_string(),
            year,
            category: "Best Film".to_string(),
        };
        assert!(check_awards(&[award(1960)]).is_ok());
        assert!(check_awards(&[award(1960), award(1700)]).is_err());
    }
}
