#![allow(dead_code)]

use std::future::Future;
use std::path::Path;
use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::Router;
use serde_json::{json, Value};
use sqlx::SqlitePool;
use tower::ServiceExt;

use volunteer_hub::config::Config;
use volunteer_hub::db;
use volunteer_hub::routes::router;
use volunteer_hub::salesforce::Crm;

#[derive(Clone)]
pub struct TestApp {
    pub app: Router,
    pub pool: SqlitePool,
}

impl TestApp {
    pub async fn new() -> Self {
        Self::build(None).await
    }

    pub async fn with_crm(crm: Arc<dyn Crm>) -> Self {
        Self::build(Some(crm)).await
    }

    /// Serves a database file in `dir`, with a pool of several connections
    /// so requests really run side by side.
    pub async fn on_disk(dir: &Path) -> Self {
        let url = format!("sqlite://{}", dir.join("volunteer_hub.db").display());
        let pool = db::connect(&url).await.unwrap();

        Self::with_pool(pool, None)
    }

    async fn build(crm: Option<Arc<dyn Crm>>) -> Self {
        let pool = db::connect_in_memory().await.unwrap();

        Self::with_pool(pool, crm)
    }

    fn with_pool(pool: SqlitePool, crm: Option<Arc<dyn Crm>>) -> Self {
        let config = Config::from_lookup(|_| None).unwrap();
        let app = router(pool.clone(), &config, crm);

        Self { app, pool }
    }

    /// The same store served with a different CRM.
    pub fn with_other_crm(&self, crm: Arc<dyn Crm>) -> Self {
        Self::with_pool(self.pool.clone(), Some(crm))
    }

    /// Sends a request, returning the status code and the parsed JSON body
    /// (`null` for empty bodies).
    ///
    /// The returned future owns its own handle to the router, so it is `Send`
    /// and can be spawned onto other tasks.
    pub fn request(
        &self,
        method: Method,
        uri: &str,
        body: Option<Value>,
    ) -> impl Future<Output = (u16, Value)> + Send + 'static {
        let mut builder = Request::builder().method(method).uri(uri);
        let body = match body {
            Some(body) => {
                builder = builder.header("content-type", "application/json");
                Body::from(body.to_string())
            }
            None => Body::empty(),
        };
        let request = builder.body(body).unwrap();
        let app = self.app.clone();

        async move {
            let response = app.oneshot(request).await.unwrap();
            let status = response.status().as_u16();
            let bytes = hyper::body::to_bytes(response.into_body()).await.unwrap();
            let json = if bytes.is_empty() {
                Value::Null
            } else {
                serde_json::from_slice(&bytes).unwrap_or_else(|_| {
                    Value::String(String::from_utf8_lossy(&bytes).into_owned())
                })
            };

            (status, json)
        }
    }

    pub fn get(&self, uri: &str) -> impl Future<Output = (u16, Value)> + Send + 'static {
        self.request(Method::GET, uri, None)
    }

    pub fn post(
        &self,
        uri: &str,
        body: Value,
    ) -> impl Future<Output = (u16, Value)> + Send + 'static {
        self.request(Method::POST, uri, Some(body))
    }

    pub fn put(
        &self,
        uri: &str,
        body: Value,
    ) -> impl Future<Output = (u16, Value)> + Send + 'static {
        self.request(Method::PUT, uri, Some(body))
    }

    pub fn delete(&self, uri: &str) -> impl Future<Output = (u16, Value)> + Send + 'static {
        self.request(Method::DELETE, uri, None)
    }

    /// Creates a record that is expected to be valid, returning its id.
    pub async fn create(&self, uri: &str, body: Value) -> i64 {
        let (status, created) = self.post(uri, body).await;
        assert_eq!(status, 201, "creating at {} failed: {}", uri, created);
        created["id"].as_i64().unwrap()
    }

    pub async fn program(&self, name: &str) -> i64 {
        self.create("/api/programs", json!({ "name": name, "status": "active" }))
            .await
    }

    pub async fn volunteer(&self, n: usize) -> i64 {
        self.create(
            "/api/volunteers",
            json!({
                "firstName": format!("Volunteer{}", n),
                "lastName": "Tester",
                "email": format!("volunteer{}@example.org", n),
            }),
        )
        .await
    }

    pub async fn opportunity(&self, title: &str, total_spots: i64) -> i64 {
        self.create(
            "/api/opportunities",
            json!({ "title": title, "totalSpots": total_spots }),
        )
        .await
    }

    /// One field of the record at `uri`.
    pub async fn field(&self, uri: &str, field: &str) -> Value {
        let (status, record) = self.get(uri).await;
        assert_eq!(status, 200, "fetching {} failed: {}", uri, record);
        record[field].clone()
    }

    pub async fn count(&self, table: &str) -> i64 {
        sqlx::query_scalar::<_, i64>(&format!("SELECT COUNT(*) FROM {}", table))
            .fetch_one(&self.pool)
            .await
            .unwrap()
    }
}
