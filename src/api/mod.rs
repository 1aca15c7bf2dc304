//! REST surface. Each resource lives in its own module and is mounted
//! under `/api/<resource>`.

pub mod admin;
pub mod auth;
pub mod error;
pub mod list;
pub mod movie;
pub mod news;
pub mod pagination;
pub mod person;
pub mod recommendation;
pub mod review;
pub mod search;
pub mod types;
pub mod user;

use axum::routing::{delete, get, post};
use axum::Router;

use crate::server::AppState;

pub fn build_api_router() -> Router<AppState> {
    let users = Router::new()
        .route("/register", post(user::register))
        .route("/login", post(user::login))
        .route("/logout", post(user::logout))
        .route(
            "/me",
            get(user::get_me).put(user::update_me).delete(user::delete_me),
        )
        .route("/me/wishlist", get(user::get_wishlist))
        .route(
            "/me/wishlist/:movie_id",
            post(user::add_to_wishlist).delete(user::remove_from_wishlist),
        )
        .route("/:id", get(user::get_user));

    let people = Router::new()
        .route("/", post(person::create_person).get(person::list_people))
        .route(
            "/:id",
            get(person::get_person)
                .put(person::update_person)
                .delete(person::delete_person),
        );

    let movies = Router::new()
        .route("/", post(movie::create_movie).get(movie::list_movies))
        .route(
            "/:id",
            get(movie::get_movie)
                .put(movie::update_movie)
                .delete(movie::delete_movie),
        );

    let reviews = Router::new()
        .route("/:movie_id", post(review::upsert_review))
        .route("/movie/:movie_id", get(review::movie_reviews))
        .route("/highlights/:movie_id", get(review::review_highlights))
        .route("/like/:review_id", post(review::like_review));

    let recommendations = Router::new()
        .route("/similar/:movie_id", get(recommendation::similar_movies))
        .route("/personalized", get(recommendation::personalized))
        .route("/trending", get(recommendation::trending))
        .route("/top-rated", get(recommendation::top_rated));

    let lists = Router::new()
        .route("/", post(list::create_list).get(list::list_lists))
        .route(
            "/:id",
            get(list::get_list)
                .post(list::follow_list)
                .delete(list::unfollow_list),
        );

    let search = Router::new()
        .route("/search", get(search::search_movies))
        .route("/top/genre/:genre", get(search::top_by_genre))
        .route("/top/month", get(search::top_of_month));

    let news = Router::new()
        .route("/", post(news::create_news).get(news::list_news))
        .route(
            "/:id",
            get(news::get_news)
                .put(news::update_news)
                .delete(news::delete_news),
        );

    let admin = Router::new()
        .route("/popular-movies", get(admin::popular_movies))
        .route("/user-activity", get(admin::user_activity))
        .route("/trending-genres", get(admin::trending_genres))
        .route("/moderate-reviews", get(admin::moderate_reviews))
        .route("/reviews/:id", delete(admin::delete_review));

    Router::new()
        .nest("/users", users)
        .nest("/people", people)
        .nest("/movies", movies)
        .nest("/reviews", reviews)
        .nest("/recommendations", recommendations)
        .nest("/lists", lists)
        .nest("/search", search)
        .nest("/news", news)
        .nest("/admin", admin)
}
