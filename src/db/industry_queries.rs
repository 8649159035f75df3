use sqlx::PgPool;
use uuid::Uuid;

use crate::models::{CreateIndustry, Industry};

pub async fn fetch_all(pool: &PgPool) -> Result<Vec<Industry>, sqlx::Error> {
    sqlx::query_as::<_, Industry>("SELECT id, name FROM industries ORDER BY name")
        .fetch_all(pool)
        .await
}

pub async fn insert(pool: &PgPool, new: &CreateIndustry) -> Result<Industry, sqlx::Error> {
    sqlx::query_as::<_, Industry>(
        "INSERT INTO industries (id, name) VALUES ($1, $2) RETURNING id, name",
    )
    .bind(Uuid::new_v4())
    .bind(&new.name)
    .fetch_one(pool)
    .await
}
