use sqlx::PgPool;

use crate::models::post::Post;

pub async fn list_posts(pool: &PgPool, limit: i64) -> Result<Vec<Post>, sqlx::Error> {
    sqlx::query_as::<_, Post>(
        r#"
        SELECT id, author_id, title, body, created_at, updated_at
        FROM posts
        ORDER BY created_at DESC
        LIMIT $1
        "#,
    )
    .bind(limit)
    .fetch_all(pool)
    .await
}

pub async fn insert_post(pool: &PgPool, post: &Post) -> Result<(), sqlx::Error> {
    sqlx::query(
        r#"
        INSERT INTO posts (id, author_id, title, body, created_at, updated_at)
        VALUES ($1, $2, $3, $4, $5, $6)
        "#,
    )
    .bind(post.id)
    .bind(post.author_id)
    .bind(&post.title)
    .bind(&post.body)
    .bind(post.created_at)
    .bind(post.updated_at)
    .execute(pool)
    .await
    .map(|_| ())
}
