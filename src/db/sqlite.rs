use std::collections::{BTreeSet, HashMap};
use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::sqlite::{Sqlite, SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::types::Json;
use sqlx::{QueryBuilder, Transaction};
use tracing::info;

use super::model::*;
use super::query::*;
use super::repo::*;
use super::search::SearchIndex;

const MOVIE_COLUMNS: &str = "id, title, genres, director, cast_members, release_date, \
     release_status, runtime, synopsis, age_rating, cover_photo, trailer_url, trivia, \
     average_rating, review_count, view_count, created, updated";

const PERSON_COLUMNS: &str =
    "id, name, birth_date, biography, photo, roles, filmography, awards, created, updated";

const REVIEW_COLUMNS: &str = "id, userid, movieid, rating, content, likes, created, updated";

const USER_COLUMNS: &str = "id, username, email, password, profile, wishlist, created, updated";

const LIST_COLUMNS: &str = "id, name, description, creator, movies, is_public, created, updated";

const NEWS_COLUMNS: &str =
    "id, title, content, author, related_movies, related_people, tags, created, updated";

pub struct SqliteRepository {
    pool: SqlitePool,
    search: Arc<SearchIndex>,
}

impl SqliteRepository {
    pub async fn new(db_path: &str, max_connections: u32) -> DbResult<Self> {
        let options = SqliteConnectOptions::new()
            .filename(db_path)
            .create_if_missing(true);

        let pool = SqlitePoolOptions::new()
            .max_connections(max_connections)
            .connect_with(options)
            .await?;

        let repo = Self::open(pool).await?;
        info!("Database initialized at {}", db_path);
        Ok(repo)
    }

    /// A private database that lives as long as the repository.
    pub async fn in_memory() -> DbResult<Self> {
        let options = SqliteConnectOptions::from_str("sqlite::memory:")?;

        // Every connection would get its own empty database, so keep exactly one alive.
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        Self::open(pool).await
    }

    async fn open(pool: SqlitePool) -> DbResult<Self> {
        let search = SearchIndex::new()?;
        let repo = Self {
            pool,
            search: Arc::new(search),
        };

        repo.init_schema().await?;
        repo.rebuild_search_index().await?;

        Ok(repo)
    }

    async fn init_schema(&self) -> DbResult<()> {
        let schema = include_str!("schema.sql");
        sqlx::raw_sql(schema).execute(&self.pool).await?;
        Ok(())
    }

    pub async fn rebuild_search_index(&self) -> DbResult<()> {
        let movies = self.find_movies(&MovieQuery::default()).await?;
        self.search.rebuild(&movies).await?;
        info!("Search index holds {} movies", movies.len());
        Ok(())
    }

    fn push_filter(&self, qb: &mut QueryBuilder<'_, Sqlite>, filter: &MovieFilter) -> DbResult<()> {
        qb.push(" WHERE 1");
        for predicate in &filter.all {
            qb.push(" AND ");
            self.push_predicate(qb, predicate)?;
        }
        Ok(())
    }

    fn push_predicate(
        &self,
        qb: &mut QueryBuilder<'_, Sqlite>,
        predicate: &Predicate,
    ) -> DbResult<()> {
        match predicate {
            Predicate::IdNot(id) => {
                qb.push("movies.id != ").push_bind(id.clone());
            }
            Predicate::GenreIn(genres) => {
                if genres.is_empty() {
                    qb.push("0");
                } else {
                    qb.push(
                        "EXISTS (SELECT 1 FROM json_each(movies.genres) \
                         WHERE json_each.value IN (",
                    );
                    {
                        let mut separated = qb.separated(", ");
                        for genre in genres {
                            separated.push_bind(genre.clone());
                        }
                    }
                    qb.push("))");
                }
            }
            Predicate::DirectorIs(director) => {
                qb.push("movies.director = ").push_bind(director.clone());
            }
            Predicate::TextMatch(text) => {
                let ids = self.search.matching_ids(text)?;
                push_id_set(qb, ids);
            }
            Predicate::MinRating(rating) => {
                qb.push("movies.average_rating >= ").push_bind(*rating);
            }
            Predicate::ReleasedBetween(from, until) => {
                qb.push("(movies.release_date >= ")
                    .push_bind(*from)
                    .push(" AND movies.release_date < ")
                    .push_bind(*until)
                    .push(")");
            }
            Predicate::Any(inner) => {
                if inner.is_empty() {
                    qb.push("0");
                } else {
                    qb.push("(");
                    for (i, p) in inner.iter().enumerate() {
                        if i > 0 {
                            qb.push(" OR ");
                        }
                        self.push_predicate(qb, p)?;
                    }
                    qb.push(")");
                }
            }
        }
        Ok(())
    }
}

fn push_id_set(qb: &mut QueryBuilder<'_, Sqlite>, ids: Vec<String>) {
    if ids.is_empty() {
        qb.push("0");
        return;
    }
    qb.push("movies.id IN (");
    {
        let mut separated = qb.separated(", ");
        for id in ids {
            separated.push_bind(id);
        }
    }
    qb.push(")");
}

fn push_window(qb: &mut QueryBuilder<'_, Sqlite>, skip: usize, limit: Option<usize>) {
    match limit {
        Some(limit) => {
            qb.push(" LIMIT ")
                .push_bind(limit as i64)
                .push(" OFFSET ")
                .push_bind(skip as i64);
        }
        None if skip > 0 => {
            qb.push(" LIMIT -1 OFFSET ").push_bind(skip as i64);
        }
        None => {}
    }
}

/// Reorder `items` to follow `ids`, dropping ids that did not resolve.
fn order_by_ids<T>(ids: &[String], items: Vec<T>, key: impl Fn(&T) -> &str) -> Vec<T> {
    let mut by_id: HashMap<String, T> = items
        .into_iter()
        .map(|item| (key(&item).to_string(), item))
        .collect();
    ids.iter().filter_map(|id| by_id.remove(id)).collect()
}

fn map_unique_violation(e: sqlx::Error, what: String) -> DbError {
    match e {
        sqlx::Error::Database(ref db_err) if db_err.is_unique_violation() => {
            DbError::AlreadyExists(what)
        }
        _ => DbError::Sqlx(e),
    }
}

/// Remove `id` from a JSON string-array column on every row that references it.
async fn strip_id_from_array(
    tx: &mut Transaction<'_, Sqlite>,
    table: &str,
    column: &str,
    id: &str,
) -> DbResult<u64> {
    let select = format!(
        "SELECT id, {column} FROM {table} WHERE EXISTS \
         (SELECT 1 FROM json_each({table}.{column}) WHERE json_each.value = ?)"
    );
    let rows = sqlx::query_as::<_, (String, Json<Vec<String>>)>(&select)
        .bind(id)
        .fetch_all(&mut **tx)
        .await?;

    let update = format!("UPDATE {table} SET {column} = ?, updated = ? WHERE id = ?");
    let now = Utc::now();
    let count = rows.len() as u64;
    for (row_id, Json(mut values)) in rows {
        values.retain(|v| v != id);
        sqlx::query(&update)
            .bind(Json(&values))
            .bind(now)
            .bind(&row_id)
            .execute(&mut **tx)
            .await?;
    }
    Ok(count)
}

#[derive(sqlx::FromRow)]
struct MovieRow {
    id: String,
    title: String,
    genres: Json<Vec<String>>,
    director: String,
    cast_members: Json<Vec<String>>,
    release_date: NaiveDate,
    release_status: String,
    runtime: i64,
    synopsis: String,
    age_rating: String,
    cover_photo: String,
    trailer_url: Option<String>,
    trivia: Json<Vec<String>>,
    average_rating: f64,
    review_count: i64,
    view_count: i64,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl TryFrom<MovieRow> for Movie {
    type Error = DbError;

    fn try_from(row: MovieRow) -> DbResult<Self> {
        let release_status = ReleaseStatus::from_str(&row.release_status).ok_or_else(|| {
            DbError::Decode(format!("movie {}: release status {}", row.id, row.release_status))
        })?;
        let age_rating = AgeRating::from_str(&row.age_rating).ok_or_else(|| {
            DbError::Decode(format!("movie {}: age rating {}", row.id, row.age_rating))
        })?;
        Ok(Movie {
            id: row.id,
            title: row.title,
            genres: row.genres.0,
            director: row.director,
            cast: row.cast_members.0,
            release_date: row.release_date,
            release_status,
            runtime: row.runtime,
            synopsis: row.synopsis,
            age_rating,
            cover_photo: row.cover_photo,
            trailer_url: row.trailer_url,
            trivia: row.trivia.0,
            average_rating: row.average_rating,
            review_count: row.review_count,
            view_count: row.view_count,
            created: row.created,
            updated: row.updated,
        })
    }
}

#[derive(sqlx::FromRow)]
struct PersonRow {
    id: String,
    name: String,
    birth_date: Option<NaiveDate>,
    biography: Option<String>,
    photo: Option<String>,
    roles: Json<Vec<PersonRole>>,
    filmography: Json<Vec<FilmographyEntry>>,
    awards: Json<Vec<Award>>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<PersonRow> for Person {
    fn from(row: PersonRow) -> Self {
        Person {
            id: row.id,
            name: row.name,
            birth_date: row.birth_date,
            biography: row.biography,
            photo: row.photo,
            roles: row.roles.0,
            filmography: row.filmography.0,
            awards: row.awards.0,
            created: row.created,
            updated: row.updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ReviewRow {
    id: String,
    userid: String,
    movieid: String,
    rating: i64,
    content: String,
    likes: i64,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<ReviewRow> for Review {
    fn from(row: ReviewRow) -> Self {
        Review {
            id: row.id,
            user_id: row.userid,
            movie_id: row.movieid,
            rating: row.rating,
            content: row.content,
            likes: row.likes,
            created: row.created,
            updated: row.updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct UserRow {
    id: String,
    username: String,
    email: String,
    password: String,
    profile: Json<Profile>,
    wishlist: Json<Vec<String>>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<UserRow> for User {
    fn from(row: UserRow) -> Self {
        User {
            id: row.id,
            username: row.username,
            email: row.email,
            password: row.password,
            profile: row.profile.0,
            wishlist: row.wishlist.0,
            created: row.created,
            updated: row.updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct ListRow {
    id: String,
    name: String,
    description: Option<String>,
    creator: String,
    movies: Json<Vec<String>>,
    is_public: bool,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl ListRow {
    fn into_list(self, followers: Vec<String>) -> MovieList {
        MovieList {
            id: self.id,
            name: self.name,
            description: self.description,
            creator: self.creator,
            movies: self.movies.0,
            is_public: self.is_public,
            followers,
            created: self.created,
            updated: self.updated,
        }
    }
}

#[derive(sqlx::FromRow)]
struct NewsRow {
    id: String,
    title: String,
    content: String,
    author: String,
    related_movies: Json<Vec<String>>,
    related_people: Json<Vec<String>>,
    tags: Json<Vec<String>>,
    created: DateTime<Utc>,
    updated: DateTime<Utc>,
}

impl From<NewsRow> for News {
    fn from(row: NewsRow) -> Self {
        News {
            id: row.id,
            title: row.title,
            content: row.content,
            author: row.author,
            related_movies: row.related_movies.0,
            related_people: row.related_people.0,
            tags: row.tags.0,
            created: row.created,
            updated: row.updated,
        }
    }
}

#[async_trait]
impl MovieRepo for SqliteRepository {
    async fn get_movie(&self, id: &str) -> DbResult<Movie> {
        let row = sqlx::query_as::<_, MovieRow>(&format!(
            "SELECT {MOVIE_COLUMNS} FROM movies WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("Movie not found: {}", id)))?;

        Movie::try_from(row)
    }

    async fn get_movies_by_ids(&self, ids: &[String]) -> DbResult<Vec<Movie>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new(format!("SELECT {MOVIE_COLUMNS} FROM movies WHERE "));
        push_id_set(&mut qb, ids.to_vec());
        let rows: Vec<MovieRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let movies = rows
            .into_iter()
            .map(Movie::try_from)
            .collect::<DbResult<Vec<_>>>()?;
        Ok(order_by_ids(ids, movies, |m| &m.id))
    }

    async fn insert_movie(&self, movie: &Movie) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO movies ({MOVIE_COLUMNS}) \
             VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&movie.id)
        .bind(&movie.title)
        .bind(Json(&movie.genres))
        .bind(&movie.director)
        .bind(Json(&movie.cast))
        .bind(movie.release_date)
        .bind(movie.release_status.as_str())
        .bind(movie.runtime)
        .bind(&movie.synopsis)
        .bind(movie.age_rating.as_str())
        .bind(&movie.cover_photo)
        .bind(&movie.trailer_url)
        .bind(Json(&movie.trivia))
        .bind(movie.average_rating)
        .bind(movie.review_count)
        .bind(movie.view_count)
        .bind(movie.created)
        .bind(movie.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("Movie {}", movie.id)))?;

        self.search.upsert(movie).await?;
        Ok(())
    }

    async fn update_movie(&self, movie: &Movie) -> DbResult<()> {
        // Rating and view counters are owned by their own write paths.
        let result = sqlx::query(
            "UPDATE movies SET title = ?, genres = ?, director = ?, cast_members = ?, \
             release_date = ?, release_status = ?, runtime = ?, synopsis = ?, age_rating = ?, \
             cover_photo = ?, trailer_url = ?, trivia = ?, updated = ? WHERE id = ?",
        )
        .bind(&movie.title)
        .bind(Json(&movie.genres))
        .bind(&movie.director)
        .bind(Json(&movie.cast))
        .bind(movie.release_date)
        .bind(movie.release_status.as_str())
        .bind(movie.runtime)
        .bind(&movie.synopsis)
        .bind(movie.age_rating.as_str())
        .bind(&movie.cover_photo)
        .bind(&movie.trailer_url)
        .bind(Json(&movie.trivia))
        .bind(movie.updated)
        .bind(&movie.id)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Movie not found: {}", movie.id)));
        }

        self.search.upsert(movie).await?;
        Ok(())
    }

    async fn delete_movie(&self, id: &str) -> DbResult<Movie> {
        let movie = self.get_movie(id).await?;

        let mut tx = self.pool.begin().await?;

        sqlx::query("DELETE FROM movies WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query(
            "DELETE FROM review_likes WHERE reviewid IN (SELECT id FROM reviews WHERE movieid = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        let reviews = sqlx::query("DELETE FROM reviews WHERE movieid = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        let lists = strip_id_from_array(&mut tx, "lists", "movies", id).await?;
        let wishlists = strip_id_from_array(&mut tx, "users", "wishlist", id).await?;
        let news = strip_id_from_array(&mut tx, "news", "related_movies", id).await?;

        let people = sqlx::query_as::<_, (String, Json<Vec<FilmographyEntry>>)>(
            "SELECT id, filmography FROM people WHERE EXISTS \
             (SELECT 1 FROM json_each(people.filmography) \
             WHERE json_extract(json_each.value, '$.movie') = ?)",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        let now = Utc::now();
        for (person_id, Json(mut filmography)) in people {
            filmography.retain(|entry| entry.movie != id);
            sqlx::query("UPDATE people SET filmography = ?, updated = ? WHERE id = ?")
                .bind(Json(&filmography))
                .bind(now)
                .bind(&person_id)
                .execute(&mut *tx)
                .await?;
        }

        tx.commit().await?;

        self.search.remove(id).await?;

        info!(
            movie = %id,
            reviews = reviews,
            lists = lists,
            wishlists = wishlists,
            news = news,
            "Movie deleted with dependent references"
        );
        Ok(movie)
    }

    async fn find_movies(&self, query: &MovieQuery) -> DbResult<Vec<Movie>> {
        let mut qb = QueryBuilder::new(format!("SELECT {MOVIE_COLUMNS} FROM movies"));
        self.push_filter(&mut qb, &query.filter)?;

        qb.push(" ORDER BY ");
        for key in &query.sort {
            qb.push(key.field.column());
            qb.push(if key.descending { " DESC, " } else { " ASC, " });
        }
        qb.push("movies.rowid ASC");
        push_window(&mut qb, query.skip, query.limit);

        let rows: Vec<MovieRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        rows.into_iter().map(Movie::try_from).collect()
    }

    async fn count_movies(&self, filter: &MovieFilter) -> DbResult<i64> {
        let mut qb = QueryBuilder::new("SELECT COUNT(*) FROM movies");
        self.push_filter(&mut qb, filter)?;
        let (count,): (i64,) = qb.build_query_as().fetch_one(&self.pool).await?;
        Ok(count)
    }

    async fn increment_view_count(&self, id: &str) -> DbResult<()> {
        let result = sqlx::query("UPDATE movies SET view_count = view_count + 1 WHERE id = ?")
            .bind(id)
            .execute(&self.pool)
            .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Movie not found: {}", id)));
        }
        Ok(())
    }

    async fn set_movie_rating(&self, id: &str, average: f64, count: i64) -> DbResult<()> {
        let result =
            sqlx::query("UPDATE movies SET average_rating = ?, review_count = ? WHERE id = ?")
                .bind(average)
                .bind(count)
                .bind(id)
                .execute(&self.pool)
                .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Movie not found: {}", id)));
        }
        Ok(())
    }

    async fn genre_counts(&self, limit: usize) -> DbResult<Vec<GenreCount>> {
        let rows = sqlx::query_as::<_, (String, i64)>(
            "SELECT json_each.value AS genre, COUNT(*) AS count \
             FROM movies, json_each(movies.genres) \
             GROUP BY json_each.value ORDER BY count DESC, genre ASC LIMIT ?",
        )
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await?;

        Ok(rows
            .into_iter()
            .map(|(genre, count)| GenreCount { genre, count })
            .collect())
    }
}

#[async_trait]
impl PersonRepo for SqliteRepository {
    async fn get_person(&self, id: &str) -> DbResult<Person> {
        sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT {PERSON_COLUMNS} FROM people WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Person::from)
        .ok_or_else(|| DbError::NotFound(format!("Person not found: {}", id)))
    }

    async fn get_people_by_ids(&self, ids: &[String]) -> DbResult<Vec<Person>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb =
            QueryBuilder::new(format!("SELECT {PERSON_COLUMNS} FROM people WHERE id IN ("));
        {
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id.clone());
            }
        }
        qb.push(")");
        let rows: Vec<PersonRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let people = rows.into_iter().map(Person::from).collect();
        Ok(order_by_ids(ids, people, |p| &p.id))
    }

    async fn insert_person(&self, person: &Person) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO people ({PERSON_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&person.id)
        .bind(&person.name)
        .bind(person.birth_date)
        .bind(&person.biography)
        .bind(&person.photo)
        .bind(Json(&person.roles))
        .bind(Json(&person.filmography))
        .bind(Json(&person.awards))
        .bind(person.created)
        .bind(person.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("Person {}", person.id)))?;
        Ok(())
    }

    async fn update_person(&self, person: &Person) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE people SET name = ?, birth_date = ?, biography = ?, photo = ?, roles = ?, \
             filmography = ?, awards = ?, updated = ? WHERE id = ?",
        )
        .bind(&person.name)
        .bind(person.birth_date)
        .bind(&person.biography)
        .bind(&person.photo)
        .bind(Json(&person.roles))
        .bind(Json(&person.filmography))
        .bind(Json(&person.awards))
        .bind(person.updated)
        .bind(&person.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("Person not found: {}", person.id)));
        }
        Ok(())
    }

    async fn delete_person(&self, id: &str) -> DbResult<Person> {
        // Movies keep dangling director/cast ids; lookups by id skip them.
        let row = sqlx::query_as::<_, PersonRow>(&format!(
            "DELETE FROM people WHERE id = ? RETURNING {PERSON_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("Person not found: {}", id)))?;
        Ok(row.into())
    }

    async fn list_people(&self, skip: usize, limit: usize) -> DbResult<Vec<Person>> {
        let rows = sqlx::query_as::<_, PersonRow>(&format!(
            "SELECT {PERSON_COLUMNS} FROM people ORDER BY rowid LIMIT ? OFFSET ?"
        ))
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Person::from).collect())
    }

    async fn count_people(&self) -> DbResult<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM people")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}

#[async_trait]
impl ReviewRepo for SqliteRepository {
    async fn get_review(&self, id: &str) -> DbResult<Review> {
        sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(Review::from)
        .ok_or_else(|| DbError::NotFound(format!("Review not found: {}", id)))
    }

    async fn upsert_review(&self, review: &Review) -> DbResult<Review> {
        // Both the movie and the author must still exist when the row lands.
        let written = sqlx::query(
            "INSERT INTO reviews (id, userid, movieid, rating, content, likes, created, updated) \
             SELECT ?1, ?2, ?3, ?4, ?5, 0, ?6, ?7 \
             WHERE EXISTS (SELECT 1 FROM movies WHERE id = ?3) \
             AND EXISTS (SELECT 1 FROM users WHERE id = ?2) \
             ON CONFLICT (userid, movieid) DO UPDATE SET \
             rating = excluded.rating, content = excluded.content, updated = excluded.updated",
        )
        .bind(&review.id)
        .bind(&review.user_id)
        .bind(&review.movie_id)
        .bind(review.rating)
        .bind(&review.content)
        .bind(review.created)
        .bind(review.updated)
        .execute(&self.pool)
        .await?
        .rows_affected();

        if written == 0 {
            return Err(DbError::NotFound(format!(
                "Movie {} or user {} not found",
                review.movie_id, review.user_id
            )));
        }

        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE userid = ? AND movieid = ?"
        ))
        .bind(&review.user_id)
        .bind(&review.movie_id)
        .fetch_one(&self.pool)
        .await?;
        Ok(row.into())
    }

    async fn movie_ratings(&self, movie_id: &str) -> DbResult<Vec<i64>> {
        let rows = sqlx::query_as::<_, (i64,)>("SELECT rating FROM reviews WHERE movieid = ?")
            .bind(movie_id)
            .fetch_all(&self.pool)
            .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }

    async fn list_movie_reviews(
        &self,
        movie_id: &str,
        order: ReviewOrder,
        skip: usize,
        limit: usize,
    ) -> DbResult<Vec<Review>> {
        let order_by = match order {
            ReviewOrder::Newest => "created DESC, rowid DESC",
            ReviewOrder::HighestRated => "rating DESC, rowid ASC",
            ReviewOrder::MostLiked => "likes DESC, rowid ASC",
        };
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews WHERE movieid = ? \
             ORDER BY {order_by} LIMIT ? OFFSET ?"
        ))
        .bind(movie_id)
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn count_movie_reviews(&self, movie_id: &str) -> DbResult<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM reviews WHERE movieid = ?")
            .bind(movie_id)
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn list_all_reviews(&self) -> DbResult<Vec<Review>> {
        let rows = sqlx::query_as::<_, ReviewRow>(&format!(
            "SELECT {REVIEW_COLUMNS} FROM reviews ORDER BY created DESC, rowid DESC"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(Review::from).collect())
    }

    async fn delete_review(&self, id: &str) -> DbResult<Review> {
        let mut tx = self.pool.begin().await?;

        let row = sqlx::query_as::<_, ReviewRow>(&format!(
            "DELETE FROM reviews WHERE id = ? RETURNING {REVIEW_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&mut *tx)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("Review not found: {}", id)))?;

        sqlx::query("DELETE FROM review_likes WHERE reviewid = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;
        Ok(row.into())
    }

    async fn toggle_review_like(&self, review_id: &str, user_id: &str) -> DbResult<Review> {
        let mut tx = self.pool.begin().await?;

        let removed = sqlx::query("DELETE FROM review_likes WHERE reviewid = ? AND userid = ?")
            .bind(review_id)
            .bind(user_id)
            .execute(&mut *tx)
            .await?
            .rows_affected();

        if removed == 0 {
            sqlx::query("INSERT INTO review_likes (reviewid, userid) VALUES (?, ?)")
                .bind(review_id)
                .bind(user_id)
                .execute(&mut *tx)
                .await?;
        }

        let updated = sqlx::query(
            "UPDATE reviews SET likes = (SELECT COUNT(*) FROM review_likes WHERE reviewid = ?1) \
             WHERE id = ?1",
        )
        .bind(review_id)
        .execute(&mut *tx)
        .await?
        .rows_affected();

        if updated == 0 {
            // Dropping the transaction rolls back the stray like.
            return Err(DbError::NotFound(format!("Review not found: {}", review_id)));
        }

        tx.commit().await?;
        self.get_review(review_id).await
    }
}

#[async_trait]
impl UserRepo for SqliteRepository {
    async fn get_user(&self, username: &str) -> DbResult<User> {
        sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE username = ?"
        ))
        .bind(username)
        .fetch_optional(&self.pool)
        .await?
        .map(User::from)
        .ok_or_else(|| DbError::NotFound(format!("User not found: {}", username)))
    }

    async fn get_user_by_id(&self, id: &str) -> DbResult<User> {
        sqlx::query_as::<_, UserRow>(&format!("SELECT {USER_COLUMNS} FROM users WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(User::from)
            .ok_or_else(|| DbError::NotFound(format!("User not found: {}", id)))
    }

    async fn get_users_by_ids(&self, ids: &[String]) -> DbResult<Vec<User>> {
        if ids.is_empty() {
            return Ok(Vec::new());
        }
        let mut qb = QueryBuilder::new(format!("SELECT {USER_COLUMNS} FROM users WHERE id IN ("));
        {
            let mut separated = qb.separated(", ");
            for id in ids {
                separated.push_bind(id.clone());
            }
        }
        qb.push(")");
        let rows: Vec<UserRow> = qb.build_query_as().fetch_all(&self.pool).await?;
        let users = rows.into_iter().map(User::from).collect();
        Ok(order_by_ids(ids, users, |u| &u.id))
    }

    async fn insert_user(&self, user: &User) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO users ({USER_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&user.id)
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(Json(&user.profile))
        .bind(Json(&user.wishlist))
        .bind(user.created)
        .bind(user.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("User {}", user.username)))?;
        Ok(())
    }

    async fn update_user(&self, user: &User) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE users SET username = ?, email = ?, password = ?, profile = ?, wishlist = ?, \
             updated = ? WHERE id = ?",
        )
        .bind(&user.username)
        .bind(&user.email)
        .bind(&user.password)
        .bind(Json(&user.profile))
        .bind(Json(&user.wishlist))
        .bind(user.updated)
        .bind(&user.id)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("User {}", user.username)))?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("User not found: {}", user.id)));
        }
        Ok(())
    }

    async fn delete_user(&self, id: &str) -> DbResult<Vec<String>> {
        let mut tx = self.pool.begin().await?;

        let deleted = sqlx::query("DELETE FROM users WHERE id = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?
            .rows_affected();
        if deleted == 0 {
            return Err(DbError::NotFound(format!("User not found: {}", id)));
        }

        sqlx::query(
            "DELETE FROM review_likes WHERE reviewid IN (SELECT id FROM reviews WHERE userid = ?)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;

        let movie_ids: BTreeSet<String> =
            sqlx::query_as::<_, (String,)>("DELETE FROM reviews WHERE userid = ? RETURNING movieid")
                .bind(id)
                .fetch_all(&mut *tx)
                .await?
                .into_iter()
                .map(|r| r.0)
                .collect();

        let liked = sqlx::query_as::<_, (String,)>(
            "DELETE FROM review_likes WHERE userid = ? RETURNING reviewid",
        )
        .bind(id)
        .fetch_all(&mut *tx)
        .await?;
        for (review_id,) in liked {
            sqlx::query(
                "UPDATE reviews SET likes = \
                 (SELECT COUNT(*) FROM review_likes WHERE reviewid = ?1) WHERE id = ?1",
            )
            .bind(&review_id)
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "DELETE FROM list_followers WHERE userid = ?1 \
             OR listid IN (SELECT id FROM lists WHERE creator = ?1)",
        )
        .bind(id)
        .execute(&mut *tx)
        .await?;
        sqlx::query("DELETE FROM lists WHERE creator = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;
        sqlx::query("DELETE FROM accesstokens WHERE userid = ?")
            .bind(id)
            .execute(&mut *tx)
            .await?;

        tx.commit().await?;

        info!(user = %id, reviewed_movies = movie_ids.len(), "User deleted");
        Ok(movie_ids.into_iter().collect())
    }

    async fn list_users(&self) -> DbResult<Vec<User>> {
        let rows = sqlx::query_as::<_, UserRow>(&format!(
            "SELECT {USER_COLUMNS} FROM users ORDER BY rowid"
        ))
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(User::from).collect())
    }
}

#[async_trait]
impl AccessTokenRepo for SqliteRepository {
    async fn get_token(&self, token_hash: &str) -> DbResult<AccessToken> {
        let (token_hash, user_id, created) = sqlx::query_as::<_, (String, String, DateTime<Utc>)>(
            "SELECT token_hash, userid, created FROM accesstokens WHERE token_hash = ?",
        )
        .bind(token_hash)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound("Token not found".to_string()))?;

        Ok(AccessToken {
            token_hash,
            user_id,
            created,
        })
    }

    async fn insert_token(&self, token: &AccessToken) -> DbResult<()> {
        sqlx::query("INSERT INTO accesstokens (token_hash, userid, created) VALUES (?, ?, ?)")
            .bind(&token.token_hash)
            .bind(&token.user_id)
            .bind(token.created)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn delete_token(&self, token_hash: &str) -> DbResult<()> {
        sqlx::query("DELETE FROM accesstokens WHERE token_hash = ?")
            .bind(token_hash)
            .execute(&self.pool)
            .await?;
        Ok(())
    }
}

impl SqliteRepository {
    async fn list_followers(&self, list_id: &str) -> DbResult<Vec<String>> {
        let rows = sqlx::query_as::<_, (String,)>(
            "SELECT userid FROM list_followers WHERE listid = ? ORDER BY followed, rowid",
        )
        .bind(list_id)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(|r| r.0).collect())
    }
}

#[async_trait]
impl ListRepo for SqliteRepository {
    async fn get_list(&self, id: &str) -> DbResult<MovieList> {
        let row = sqlx::query_as::<_, ListRow>(&format!(
            "SELECT {LIST_COLUMNS} FROM lists WHERE id = ?"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| DbError::NotFound(format!("List not found: {}", id)))?;

        let followers = self.list_followers(id).await?;
        Ok(row.into_list(followers))
    }

    async fn insert_list(&self, list: &MovieList) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO lists ({LIST_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&list.id)
        .bind(&list.name)
        .bind(&list.description)
        .bind(&list.creator)
        .bind(Json(&list.movies))
        .bind(list.is_public)
        .bind(list.created)
        .bind(list.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("List {}", list.id)))?;
        Ok(())
    }

    async fn list_public_lists(&self, skip: usize, limit: usize) -> DbResult<Vec<MovieList>> {
        let rows = sqlx::query_as::<_, ListRow>(&format!(
            "SELECT {LIST_COLUMNS} FROM lists WHERE is_public = 1 ORDER BY rowid LIMIT ? OFFSET ?"
        ))
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await?;

        let mut lists = Vec::with_capacity(rows.len());
        for row in rows {
            let followers = self.list_followers(&row.id).await?;
            lists.push(row.into_list(followers));
        }
        Ok(lists)
    }

    async fn count_public_lists(&self) -> DbResult<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM lists WHERE is_public = 1")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }

    async fn follow_list(&self, list_id: &str, user_id: &str) -> DbResult<MovieList> {
        self.get_list(list_id).await?;
        sqlx::query(
            "INSERT OR IGNORE INTO list_followers (listid, userid, followed) VALUES (?, ?, ?)",
        )
        .bind(list_id)
        .bind(user_id)
        .bind(Utc::now())
        .execute(&self.pool)
        .await?;
        self.get_list(list_id).await
    }

    async fn unfollow_list(&self, list_id: &str, user_id: &str) -> DbResult<MovieList> {
        self.get_list(list_id).await?;
        sqlx::query("DELETE FROM list_followers WHERE listid = ? AND userid = ?")
            .bind(list_id)
            .bind(user_id)
            .execute(&self.pool)
            .await?;
        self.get_list(list_id).await
    }
}

#[async_trait]
impl NewsRepo for SqliteRepository {
    async fn get_news(&self, id: &str) -> DbResult<News> {
        sqlx::query_as::<_, NewsRow>(&format!("SELECT {NEWS_COLUMNS} FROM news WHERE id = ?"))
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .map(News::from)
            .ok_or_else(|| DbError::NotFound(format!("News article not found: {}", id)))
    }

    async fn insert_news(&self, news: &News) -> DbResult<()> {
        sqlx::query(&format!(
            "INSERT INTO news ({NEWS_COLUMNS}) VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?)"
        ))
        .bind(&news.id)
        .bind(&news.title)
        .bind(&news.content)
        .bind(&news.author)
        .bind(Json(&news.related_movies))
        .bind(Json(&news.related_people))
        .bind(Json(&news.tags))
        .bind(news.created)
        .bind(news.updated)
        .execute(&self.pool)
        .await
        .map_err(|e| map_unique_violation(e, format!("News {}", news.id)))?;
        Ok(())
    }

    async fn update_news(&self, news: &News) -> DbResult<()> {
        let result = sqlx::query(
            "UPDATE news SET title = ?, content = ?, related_movies = ?, related_people = ?, \
             tags = ?, updated = ? WHERE id = ?",
        )
        .bind(&news.title)
        .bind(&news.content)
        .bind(Json(&news.related_movies))
        .bind(Json(&news.related_people))
        .bind(Json(&news.tags))
        .bind(news.updated)
        .bind(&news.id)
        .execute(&self.pool)
        .await?;
        if result.rows_affected() == 0 {
            return Err(DbError::NotFound(format!("News article not found: {}", news.id)));
        }
        Ok(())
    }

    async fn delete_news(&self, id: &str) -> DbResult<News> {
        sqlx::query_as::<_, NewsRow>(&format!(
            "DELETE FROM news WHERE id = ? RETURNING {NEWS_COLUMNS}"
        ))
        .bind(id)
        .fetch_optional(&self.pool)
        .await?
        .map(News::from)
        .ok_or_else(|| DbError::NotFound(format!("News article not found: {}", id)))
    }

    async fn list_news(&self, skip: usize, limit: usize) -> DbResult<Vec<News>> {
        let rows = sqlx::query_as::<_, NewsRow>(&format!(
            "SELECT {NEWS_COLUMNS} FROM news ORDER BY created DESC, rowid DESC LIMIT ? OFFSET ?"
        ))
        .bind(limit as i64)
        .bind(skip as i64)
        .fetch_all(&self.pool)
        .await?;
        Ok(rows.into_iter().map(News::from).collect())
    }

    async fn count_news(&self) -> DbResult<i64> {
        let (count,) = sqlx::query_as::<_, (i64,)>("SELECT COUNT(*) FROM news")
            .fetch_one(&self.pool)
            .await?;
        Ok(count)
    }
}
