//! Session per request: commit, rollback and misuse.

mod common;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use fastsqlx::{Database, Error, Item, Session};
use serde::Deserialize;
use serde_json::json;
use tower::ServiceExt;

use common::{get as get_req, hero_count, json_body, post_json, Fixture, Hero};

#[derive(Deserialize)]
struct NewHero {
    name: String,
    secret_identity: String,
    age: i64,
}

async fn insert(session: &mut Session, hero: NewHero) -> Result<Hero, Error> {
    let hero = sqlx::query_as::<_, Hero>(
        "INSERT INTO hero (name, secret_identity, age) VALUES (?, ?, ?) \
         RETURNING id, name, secret_identity, age",
    )
    .bind(hero.name)
    .bind(hero.secret_identity)
    .bind(hero.age)
    .fetch_one(&mut **session)
    .await?;
    Ok(hero)
}

async fn ok(mut session: Session) -> Result<Json<serde_json::Value>, Error> {
    let value: String = sqlx::query_scalar("SELECT 'OK'").fetch_one(&mut *session).await?;
    Ok(Json(json!({ "data": value })))
}

async fn create_hero(mut session: Session, Json(hero): Json<NewHero>) -> Response {
    match insert(&mut session, hero).await {
        Ok(hero) => (StatusCode::CREATED, Item::new(hero)).into_response(),
        Err(e) if e.is_unique_violation() => StatusCode::CONFLICT.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Writes, then reports a client error: the write must not survive.
async fn create_then_fail(mut session: Session, Json(hero): Json<NewHero>) -> Response {
    match insert(&mut session, hero).await {
        Ok(_) => StatusCode::BAD_REQUEST.into_response(),
        Err(e) => e.into_response(),
    }
}

/// Leaves a deferred foreign key dangling, so the commit itself fails.
async fn orphan_member(mut session: Session) -> Result<StatusCode, Error> {
    sqlx::query("INSERT INTO member (team_id) VALUES (42)")
        .execute(&mut *session)
        .await?;
    Ok(StatusCode::CREATED)
}

async fn two_sessions(_first: Session, _second: Session) -> StatusCode {
    StatusCode::OK
}

async fn no_session() -> &'static str {
    "pong"
}

fn app(db: &Database) -> Router {
    Router::new()
        .route("/session-dependency", get(ok))
        .route("/heroes", post(create_hero))
        .route("/heroes/fail", post(create_then_fail))
        .route("/members/orphan", post(orphan_member))
        .route("/two-sessions", get(two_sessions))
        .route("/ping", get(no_session))
        .layer(db.session_layer())
}

async fn create_members(db: &Database) {
    sqlx::query("CREATE TABLE team (id INTEGER PRIMARY KEY)")
        .execute(db.pool())
        .await
        .unwrap();
    sqlx::query(
        "CREATE TABLE member (
            id      INTEGER PRIMARY KEY,
            team_id INTEGER NOT NULL REFERENCES team (id) DEFERRABLE INITIALLY DEFERRED
        )",
    )
    .execute(db.pool())
    .await
    .unwrap();
}

async fn member_count(db: &Database) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM member")
        .fetch_one(db.pool())
        .await
        .unwrap()
}

#[tokio::test]
async fn session_runs_queries() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;

    let response = app(&db).oneshot(get_req("/session-dependency")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(json_body(response).await, json!({ "data": "OK" }));
}

#[tokio::test]
async fn session_is_committed() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;

    let payload = json!({ "name": "Hulk", "secret_identity": "Bruce Banner", "age": 37 });
    let response = app(&db).oneshot(post_json("/heroes", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);

    let body = json_body(response).await;
    assert_eq!(body["data"]["id"], 13);
    assert_eq!(body["data"]["name"], "Hulk");

    assert_eq!(hero_count(&db).await, 13);
    let stored: Hero = sqlx::query_as("SELECT id, name, secret_identity, age FROM hero WHERE id = 13")
        .fetch_one(db.pool())
        .await
        .unwrap();
    assert_eq!(stored.secret_identity, "Bruce Banner");
}

#[tokio::test]
async fn integrity_error_maps_to_conflict() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;

    let payload = json!({ "name": "Superman", "secret_identity": "Clark Kent", "age": 30 });
    let response = app(&db).oneshot(post_json("/heroes", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::CONFLICT);
    assert_eq!(hero_count(&db).await, 12);
}

#[tokio::test]
async fn error_response_rolls_back() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;

    let payload = json!({ "name": "Hulk", "secret_identity": "Bruce Banner", "age": 37 });
    let response = app(&db).oneshot(post_json("/heroes/fail", payload)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(hero_count(&db).await, 12);
}

#[tokio::test]
async fn failed_commit_is_an_internal_error() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;
    create_members(&db).await;

    let response = app(&db)
        .oneshot(post_json("/members/orphan", json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "internal_error");
    assert_eq!(member_count(&db).await, 0);
}

#[tokio::test]
async fn handlers_without_session_skip_the_pool() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;

    let response = app(&db).oneshot(get_req("/ping")).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn second_session_in_one_request_is_rejected() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;

    let response = app(&db).oneshot(get_req("/two-sessions")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
    assert_eq!(json_body(response).await["error"], "internal_error");
}

#[tokio::test]
async fn missing_layer_is_an_internal_error() {
    let app = Router::new().route("/session-dependency", get(ok));

    let response = app.oneshot(get_req("/session-dependency")).await.unwrap();
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn with_session_commits_on_ok() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;

    let id: i64 = db
        .with_session(|tx| {
            Box::pin(async move {
                let id: i64 = sqlx::query_scalar(
                    "INSERT INTO hero (name, secret_identity, age) VALUES ('Hulk', 'Bruce Banner', 37) \
                     RETURNING id",
                )
                .fetch_one(&mut **tx)
                .await?;
                Ok::<i64, Error>(id)
            })
        })
        .await
        .unwrap();

    assert_eq!(id, 13);
    assert_eq!(hero_count(&db).await, 13);
}

#[tokio::test]
async fn with_session_rolls_back_on_err() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;

    let result: Result<(), Error> = db
        .with_session(|tx| {
            Box::pin(async move {
                sqlx::query(
                    "INSERT INTO hero (name, secret_identity, age) VALUES ('Hulk', 'Bruce Banner', 37)",
                )
                .execute(&mut **tx)
                .await?;
                Err::<(), Error>(Error::Pagination("abort".into()))
            })
        })
        .await;

    assert!(matches!(result, Err(Error::Pagination(_))));
    assert_eq!(hero_count(&db).await, 12);
}

#[tokio::test]
async fn with_session_reports_failed_commit() {
    let fixture = Fixture::seeded().await;
    let db = fixture.connect().await;
    create_members(&db).await;

    let result: Result<(), Error> = db
        .with_session(|tx| {
            Box::pin(async move {
                sqlx::query("INSERT INTO member (team_id) VALUES (42)")
                    .execute(&mut **tx)
                    .await?;
                Ok::<(), Error>(())
            })
        })
        .await;

    assert!(matches!(result, Err(Error::Database(_))));
    assert_eq!(member_count(&db).await, 0);
}
