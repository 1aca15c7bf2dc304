use async_trait::async_trait;

use super::model::*;
use super::query::{MovieFilter, MovieQuery};

#[async_trait]
pub trait MovieRepo: Send + Sync {
    async fn get_movie(&self, id: &str) -> DbResult<Movie>;
    /// Resolve ids in the given order, skipping ids that no longer exist.
    async fn get_movies_by_ids(&self, ids: &[String]) -> DbResult<Vec<Movie>>;
    async fn insert_movie(&self, movie: &Movie) -> DbResult<()>;
    async fn update_movie(&self, movie: &Movie) -> DbResult<()>;
    /// Delete a movie together with its reviews and every reference to it.
    async fn delete_movie(&self, id: &str) -> DbResult<Movie>;
    async fn find_movies(&self, query: &MovieQuery) -> DbResult<Vec<Movie>>;
    async fn count_movies(&self, filter: &MovieFilter) -> DbResult<i64>;
    async fn increment_view_count(&self, id: &str) -> DbResult<()>;
    async fn set_movie_rating(&self, id: &str, average: f64, count: i64) -> DbResult<()>;
    async fn genre_counts(&self, limit: usize) -> DbResult<Vec<GenreCount>>;
}

#[async_trait]
pub trait PersonRepo: Send + Sync {
    async fn get_person(&self, id: &str) -> DbResult<Person>;
    async fn get_people_by_ids(&self, ids: &[String]) -> DbResult<Vec<Person>>;
    async fn insert_person(&self, person: &Person) -> DbResult<()>;
    async fn update_person(&self, person: &Person) -> DbResult<()>;
    async fn delete_person(&self, id: &str) -> DbResult<Person>;
    async fn list_people(&self, skip: usize, limit: usize) -> DbResult<Vec<Person>>;
    async fn count_people(&self) -> DbResult<i64>;
}

#[async_trait]
pub trait ReviewRepo: Send + Sync {
    async fn get_review(&self, id: &str) -> DbResult<Review>;
    /// Insert or update the review for its (user, movie) pair and return the stored row.
    async fn upsert_review(&self, review: &Review) -> DbResult<Review>;
    async fn movie_ratings(&self, movie_id: &str) -> DbResult<Vec<i64>>;
    async fn list_movie_reviews(
        &self,
        movie_id: &str,
        order: ReviewOrder,
        skip: usize,
        limit: usize,
    ) -> DbResult<Vec<Review>>;
    async fn count_movie_reviews(&self, movie_id: &str) -> DbResult<i64>;
    async fn list_all_reviews(&self) -> DbResult<Vec<Review>>;
    async fn delete_review(&self, id: &str) -> DbResult<Review>;
    /// Add the user's like if absent, remove it if present.
    async fn toggle_review_like(&self, review_id: &str, user_id: &str) -> DbResult<Review>;
}

#[async_trait]
pub trait UserRepo: Send + Sync {
    async fn get_user(&self, username: &str) -> DbResult<User>;
    async fn get_user_by_id(&self, id: &str) -> DbResult<User>;
    async fn get_users_by_ids(&self, ids: &[String]) -> DbResult<Vec<User>>;
    async fn insert_user(&self, user: &User) -> DbResult<()>;
    async fn update_user(&self, user: &User) -> DbResult<()>;
    /// Delete a user and everything they own. Returns the ids of movies
    /// that lost a review, whose ratings need recomputing.
    async fn delete_user(&self, id: &str) -> DbResult<Vec<String>>;
    async fn list_users(&self) -> DbResult<Vec<User>>;
}

#[async_trait]
pub trait AccessTokenRepo: Send + Sync {
    async fn get_token(&self, token_hash: &str) -> DbResult<AccessToken>;
    async fn insert_token(&self, token: &AccessToken) -> DbResult<()>;
    async fn delete_token(&self, token_hash: &str) -> DbResult<()>;
}

#[async_trait]
pub trait ListRepo: Send + Sync {
    async fn get_list(&self, id: &str) -> DbResult<MovieList>;
    async fn insert_list(&self, list: &MovieList) -> DbResult<()>;
    async fn list_public_lists(&self, skip: usize, limit: usize) -> DbResult<Vec<MovieList>>;
    async fn count_public_lists(&self) -> DbResult<i64>;
    async fn follow_list(&self, list_id: &str, user_id: &str) -> DbResult<MovieList>;
    async fn unfollow_list(&self, list_id: &str, user_id: &str) -> DbResult<MovieList>;
}

#[async_trait]
pub trait NewsRepo: Send + Sync {
    async fn get_news(&self, id: &str) -> DbResult<News>;
    async fn insert_news(&self, news: &News) -> DbResult<()>;
    async fn update_news(&self, news: &News) -> DbResult<()>;
    async fn delete_news(&self, id: &str) -> DbResult<News>;
    async fn list_news(&self, skip: usize, limit: usize) -> DbResult<Vec<News>>;
    async fn count_news(&self) -> DbResult<i64>;
}

pub trait Repository:
    MovieRepo + PersonRepo + ReviewRepo + UserRepo + AccessTokenRepo + ListRepo + NewsRepo
{
}

impl<T> Repository for T where
    T: MovieRepo + PersonRepo + ReviewRepo + UserRepo + AccessTokenRepo + ListRepo + NewsRepo
{
}
