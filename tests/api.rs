use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use serde_json::{json, Value};
use tower::ServiceExt;

use reelbase::config::Config;
use reelbase::db::SqliteRepository;
use reelbase::server::{build_app, AppState};

async fn test_app() -> Router {
    let mut config = Config::default();
    config.auth.password_cost = 4;
    let db = Arc::new(SqliteRepository::in_memory().await.unwrap());
    build_app(AppState::new(config, db))
}

async fn send(
    app: &Router,
    method: &str,
    uri: &str,
    token: Option<&str>,
    body: Option<Value>,
) -> (StatusCode, Value) {
    let mut builder = Request::builder().method(method).uri(uri);
    if let Some(token) = token {
        builder = builder.header("authorization", format!("Bearer {}", token));
    }
    let request = match body {
        Some(body) => builder
            .header("content-type", "application/json")
            .body(Body::from(body.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };

    let response = app.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap_or(Value::Null)
    };
    (status, value)
}

async fn register_and_login(app: &Router, username: &str) -> String {
    let (status, _) = send(
        app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({
            "username": username,
            "email": format!("{}@Example.com", username),
            "password": "correct horse",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);

    let (status, body) = send(
        app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": username, "password": "correct horse" })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    body["token"].as_str().unwrap().to_string()
}

async fn create_movie(
    app: &Router,
    token: &str,
    title: &str,
    genre: &str,
    director: &str,
) -> String {
    let (status, body) = send(
        app,
        "POST",
        "/api/movies",
        Some(token),
        Some(json!({
            "title": title,
            "genres": [genre],
            "director": director,
            "releaseDate": "2021-05-14",
            "runtime": 104,
            "synopsis": format!("{} is a film.", title),
            "ageRating": "PG-13",
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
    body["id"].as_str().unwrap().to_string()
}

async fn review(app: &Router, token: &str, movie_id: &str, rating: i64) {
    let (status, body) = send(
        app,
        "POST",
        &format!("/api/reviews/{}", movie_id),
        Some(token),
        Some(json!({ "rating": rating, "content": "Worth watching at least once." })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", body);
}

#[tokio::test]
async fn test_review_similar_and_search_flow() {
    let app = test_app().await;
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;

    let (status, person) = send(
        &app,
        "POST",
        "/api/people",
        Some(&alice),
        Some(json!({ "name": "Dana Director", "roles": ["Director"] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let d1 = person["id"].as_str().unwrap().to_string();

    let alpha = create_movie(&app, &alice, "Alpha", "Drama", &d1).await;
    let beta = create_movie(&app, &alice, "Beta", "Comedy", &d1).await;
    let _gamma = create_movie(&app, &alice, "Gamma", "Horror", "someone-else").await;

    review(&app, &alice, &alpha, 3).await;
    review(&app, &bob, &alpha, 5).await;
    review(&app, &alice, &beta, 2).await;

    let (status, movie) = send(&app, "GET", &format!("/api/movies/{}", alpha), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(movie["averageRating"], json!(4.0));
    assert_eq!(movie["reviewCount"], json!(2));
    assert_eq!(movie["viewCount"], json!(1));
    assert_eq!(movie["director"]["name"], json!("Dana Director"));

    let (status, similar) = send(
        &app,
        "GET",
        &format!("/api/recommendations/similar/{}", alpha),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ids: Vec<&str> = similar
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![beta.as_str()]);
    assert_eq!(similar[0]["averageRating"], json!(2.0));
    assert_eq!(similar[0]["reviewCount"], json!(1));

    let uri = "/api/search/search?genre=Comedy&rating=3";
    let (status, found) = send(&app, "GET", uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["total"], json!(0));
    assert_eq!(found["items"], json!([]));

    let (status, found) = send(&app, "GET", "/api/search/search?query=alpha", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(found["items"][0]["id"], json!(alpha));

    let (status, err) = send(&app, "GET", "/api/search/search?sortBy=password", None, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(err["code"], json!("VALIDATION_ERROR"));
}

#[tokio::test]
async fn test_auth_required_and_errors() {
    let app = test_app().await;

    let (status, body) = send(
        &app,
        "POST",
        "/api/reviews/whatever",
        None,
        Some(json!({ "rating": 4, "content": "Nice movie overall." })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert_eq!(body["code"], json!("UNAUTHORIZED"));

    let uri = "/api/recommendations/personalized";
    let (status, _) = send(&app, "GET", uri, Some("bogus"), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = send(&app, "GET", "/api/movies/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send(&app, "GET", "/api/nothing-here", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, body) = send(&app, "GET", "/api//movies/", None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["currentPage"], json!(1));

    let token = register_and_login(&app, "carol").await;
    let (status, _) = send(
        &app,
        "POST",
        "/api/users/register",
        None,
        Some(json!({ "username": "carol", "email": "other@example.com", "password": "secret123" })),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, _) = send(
        &app,
        "POST",
        "/api/users/login",
        None,
        Some(json!({ "username": "carol", "password": "wrong" })),
    )
    .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, me) = send(&app, "GET", "/api/users/me", Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["email"], json!("carol@example.com"));
    assert!(me.get("password").is_none());
}

#[tokio::test]
async fn test_personalized_and_profile() {
    let app = test_app().await;
    let token = register_and_login(&app, "dave").await;

    let drama = create_movie(&app, &token, "Harbour", "Drama", "d1").await;
    create_movie(&app, &token, "Laughs", "Comedy", "d2").await;

    let uri = "/api/recommendations/personalized";
    let (status, recs) = send(&app, "GET", uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(recs, json!([]));

    let (status, _) = send(
        &app,
        "PUT",
        "/api/users/me",
        Some(&token),
        Some(json!({ "favoriteGenres": ["Drama"] })),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (_, recs) = send(&app, "GET", uri, Some(&token), None).await;
    let ids: Vec<&str> = recs
        .as_array()
        .unwrap()
        .iter()
        .map(|m| m["id"].as_str().unwrap())
        .collect();
    assert_eq!(ids, vec![drama.as_str()]);

    let (status, wishlist) = send(
        &app,
        "POST",
        &format!("/api/users/me/wishlist/{}", drama),
        Some(&token),
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(wishlist, json!([drama]));
}

#[tokio::test]
async fn test_movie_delete_cleans_up() {
    let app = test_app().await;
    let token = register_and_login(&app, "erin").await;
    let movie = create_movie(&app, &token, "Doomed", "Drama", "d1").await;
    review(&app, &token, &movie, 4).await;

    let (status, list) = send(
        &app,
        "POST",
        "/api/lists",
        Some(&token),
        Some(json!({ "name": "Keepers", "movies": [movie] })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED);
    let list_id = list["id"].as_str().unwrap().to_string();

    let uri = format!("/api/movies/{}", movie);
    let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = send(&app, "GET", &format!("/api/reviews/movie/{}", movie), None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, list) = send(&app, "GET", &format!("/api/lists/{}", list_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(list["movies"], json!([]));
}

#[tokio::test]
async fn test_account_delete_recomputes_ratings() {
    let app = test_app().await;
    let alice = register_and_login(&app, "alice").await;
    let bob = register_and_login(&app, "bob").await;
    let movie = create_movie(&app, &alice, "Shared", "Drama", "d1").await;
    review(&app, &alice, &movie, 5).await;
    review(&app, &bob, &movie, 1).await;

    let (_, before) = send(&app, "GET", &format!("/api/movies/{}", movie), None, None).await;
    assert_eq!(before["averageRating"], json!(3.0));
    assert_eq!(before["reviewCount"], json!(2));

    let (status, _) = send(&app, "DELETE", "/api/users/me", Some(&bob), None).await;
    assert_eq!(status, StatusCode::OK);

    let (_, after) = send(&app, "GET", &format!("/api/movies/{}", movie), None, None).await;
    assert_eq!(after["averageRating"], json!(5.0));
    assert_eq!(after["reviewCount"], json!(1));

    // The deleted account's token no longer works.
    let (status, _) = send(&app, "GET", "/api/users/me", Some(&bob), None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn test_review_highlights_and_likes() {
    let app = test_app().await;
    let mut tokens = Vec::new();
    for name in ["ann", "ben", "cat", "dan"] {
        tokens.push(register_and_login(&app, name).await);
    }
    let movie = create_movie(&app, &tokens[0], "Debated", "Drama", "d1").await;
    for (token, rating) in tokens.iter().zip([2, 5, 4, 3]) {
        review(&app, token, &movie, rating).await;
    }

    let uri = format!("/api/reviews/movie/{}", movie);
    let (status, page) = send(&app, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(page["total"], json!(4));
    let low = page["items"]
        .as_array()
        .unwrap()
        .iter()
        .find(|r| r["rating"] == json!(2))
        .unwrap();
    assert_eq!(low["user"]["username"], json!("ann"));
    let low_id = low["id"].as_str().unwrap().to_string();

    for token in &tokens[1..3] {
        let (status, liked) = send(
            &app,
            "POST",
            &format!("/api/reviews/like/{}", low_id),
            Some(token),
            None,
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert!(liked["likes"].as_i64().unwrap() >= 1);
    }

    // Liking again takes the like back.
    let (_, toggled) = send(
        &app,
        "POST",
        &format!("/api/reviews/like/{}", low_id),
        Some(&tokens[3]),
        None,
    )
    .await;
    assert_eq!(toggled["likes"], json!(3));
    let (_, toggled) = send(
        &app,
        "POST",
        &format!("/api/reviews/like/{}", low_id),
        Some(&tokens[3]),
        None,
    )
    .await;
    assert_eq!(toggled["likes"], json!(2));

    let (status, highlights) = send(
        &app,
        "GET",
        &format!("/api/reviews/highlights/{}", movie),
        None,
        None,
    )
    .await;
    assert_eq!(status, StatusCode::OK);
    let ratings: Vec<i64> = highlights["topRated"]
        .as_array()
        .unwrap()
        .iter()
        .map(|r| r["rating"].as_i64().unwrap())
        .collect();
    assert_eq!(ratings, vec![5, 4, 3]);
    let most_liked = highlights["mostLiked"].as_array().unwrap();
    assert_eq!(most_liked.len(), 3);
    assert_eq!(most_liked[0]["id"], json!(low_id));
    assert_eq!(most_liked[0]["likes"], json!(2));

    let (status, _) = send(&app, "GET", "/api/reviews/highlights/missing", None, None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_news_is_populated_on_read() {
    let app = test_app().await;
    let token = register_and_login(&app, "reporter").await;

    let (_, person) = send(
        &app,
        "POST",
        "/api/people",
        Some(&token),
        Some(json!({ "name": "Sam Star", "roles": ["Actor"] })),
    )
    .await;
    let person_id = person["id"].as_str().unwrap().to_string();
    let movie = create_movie(&app, &token, "Premiere", "Drama", "d1").await;

    let (status, created) = send(
        &app,
        "POST",
        "/api/news",
        Some(&token),
        Some(json!({
            "title": "Premiere night",
            "content": "The cast walked the red carpet.",
            "relatedMovies": [movie, "missing-movie"],
            "relatedPeople": [person_id],
            "tags": ["festival"],
        })),
    )
    .await;
    assert_eq!(status, StatusCode::CREATED, "{}", created);
    let news_id = created["id"].as_str().unwrap().to_string();

    let (status, news) = send(&app, "GET", &format!("/api/news/{}", news_id), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(news["author"]["username"], json!("reporter"));
    let related = news["relatedMovies"].as_array().unwrap();
    assert_eq!(related.len(), 1);
    assert_eq!(related[0]["id"], json!(movie));
    assert_eq!(news["relatedPeople"][0]["name"], json!("Sam Star"));
    assert_eq!(news["tags"], json!(["festival"]));

    let (_, listed) = send(&app, "GET", "/api/news", None, None).await;
    assert_eq!(listed["total"], json!(1));
}

#[tokio::test]
async fn test_deleted_director_reads_as_null() {
    let app = test_app().await;
    let token = register_and_login(&app, "frank").await;

    let (_, person) = send(
        &app,
        "POST",
        "/api/people",
        Some(&token),
        Some(json!({ "name": "Gone Director", "roles": ["Director"] })),
    )
    .await;
    let director = person["id"].as_str().unwrap().to_string();
    let movie = create_movie(&app, &token, "Orphaned", "Drama", &director).await;

    let uri = format!("/api/people/{}", director);
    let (status, _) = send(&app, "DELETE", &uri, Some(&token), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send(&app, "GET", &format!("/api/movies/{}", movie), None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["director"], Value::Null);
    assert_eq!(body["title"], json!("Orphaned"));
}

#[tokio::test]
async fn test_follow_list_twice_then_unfollow() {
    let app = test_app().await;
    let owner = register_and_login(&app, "gina").await;
    let fan = register_and_login(&app, "hank").await;

    let body = json!({ "name": "Classics" });
    let (_, list) = send(&app, "POST", "/api/lists", Some(&owner), Some(body)).await;
    let list_uri = format!("/api/lists/{}", list["id"].as_str().unwrap());

    let (status, once) = send(&app, "POST", &list_uri, Some(&fan), None).await;
    assert_eq!(status, StatusCode::OK);
    let (_, twice) = send(&app, "POST", &list_uri, Some(&fan), None).await;
    assert_eq!(once["followers"], twice["followers"]);
    assert_eq!(twice["followers"].as_array().unwrap().len(), 1);

    let (status, after) = send(&app, "DELETE", &list_uri, Some(&fan), None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(after["followers"], json!([]));
}
