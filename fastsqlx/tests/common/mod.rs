//! Shared fixtures: a temporary SQLite database seeded with heroes.

#![allow(dead_code)]

use axum::body::{to_bytes, Body};
use axum::http::{Request, Response};
use fastsqlx::{Database, DatabaseConfig};
use serde::{Deserialize, Serialize};
use tempfile::TempDir;

pub const HEROES: [(&str, &str, i64); 12] = [
    ("Superman", "Clark Kent", 30),
    ("Batman", "Bruce Wayne", 35),
    ("Wonder Woman", "Diana Prince", 30),
    ("Iron Man", "Tony Stark", 45),
    ("Spider-Man", "Peter Parker", 25),
    ("Captain America", "Steve Rogers", 100),
    ("Black Widow", "Natasha Romanoff", 35),
    ("Thor", "Thor Odinson", 1500),
    ("Scarlet Witch", "Wanda Maximoff", 30),
    ("Doctor Strange", "Stephen Strange", 40),
    ("The Flash", "Barry Allen", 28),
    ("Green Lantern", "Hal Jordan", 35),
];

#[derive(Debug, Clone, PartialEq, sqlx::FromRow, Serialize, Deserialize)]
pub struct Hero {
    pub id: i64,
    pub name: String,
    pub secret_identity: String,
    pub age: i64,
}

/// A database file that lives as long as the fixture.
pub struct Fixture {
    pub dir: TempDir,
    pub url: String,
}

impl Fixture {
    /// Create the `hero` table and seed it.
    pub async fn seeded() -> Self {
        let fixture = Self::empty();
        let db = Database::connect(fixture.config()).await.unwrap();
        sqlx::query(
            r#"
            CREATE TABLE hero (
                id              INTEGER PRIMARY KEY AUTOINCREMENT,
                name            TEXT NOT NULL UNIQUE,
                secret_identity TEXT NOT NULL,
                age             INTEGER NOT NULL
            )
            "#,
        )
        .execute(db.pool())
        .await
        .unwrap();

        for (name, secret_identity, age) in HEROES {
            sqlx::query("INSERT INTO hero (name, secret_identity, age) VALUES (?, ?, ?)")
                .bind(name)
                .bind(secret_identity)
                .bind(age)
                .execute(db.pool())
                .await
                .unwrap();
        }

        db.close().await;
        fixture
    }

    /// A path for a database file that does not exist yet.
    pub fn empty() -> Self {
        let dir = tempfile::tempdir().unwrap();
        let url = format!("sqlite://{}?mode=rwc", dir.path().join("test.db").display());
        Self { dir, url }
    }

    pub fn config(&self) -> DatabaseConfig {
        DatabaseConfig::new(self.url.clone()).unwrap()
    }

    pub async fn connect(&self) -> Database {
        Database::connect(self.config()).await.unwrap()
    }
}

pub async fn hero_count(db: &Database) -> i64 {
    sqlx::query_scalar("SELECT COUNT(*) FROM hero")
        .fetch_one(db.pool())
        .await
        .unwrap()
}

pub fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

pub fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header("content-type", "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

pub async fn json_body(response: Response<Body>) -> serde_json::Value {
    let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
    serde_json::from_slice(&bytes).unwrap()
}
