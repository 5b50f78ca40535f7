use sqlx::postgres::PgPoolOptions;
use sqlx::PgPool;

pub async fn create_pool(database_url: &str) -> anyhow::Result<PgPool> {
    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(database_url)
        .await?;
    Ok(pool)
}

/// Run the schema migrations embedded from ./migrations/
pub async fn run_migrations(pool: &PgPool) -> anyhow::Result<()> {
    sqlx::migrate!("./migrations").run(pool).await?;
    Ok(())
}

/// Explicit column list for users, shared by every query returning a `User`.
pub const USER_COLS: &str = "id, email, password_hash, first_name, last_name, phone, role,
     is_verified, documents_approved, is_active, force_password_change, created_at, updated_at";

/// Row builders for the database-backed service tests. Those tests need
/// `DATABASE_URL` pointing at a Postgres server and are `#[ignore]`d; run them
/// with `cargo test -- --ignored`.
#[cfg(test)]
pub(crate) mod fixtures {
    use sqlx::PgPool;
    use uuid::Uuid;

    use crate::models::{auth::AuthenticatedUser, user::UserRole};

    pub async fn user(pool: &PgPool, role: UserRole) -> AuthenticatedUser {
        let user_id: Uuid = sqlx::query_scalar(
            "INSERT INTO users (email, password_hash, first_name, last_name, role, is_verified)
             VALUES ($1, 'x', 'Test', $2, $3, TRUE)
             RETURNING id",
        )
        .bind(format!("{}@school.test", Uuid::new_v4()))
        .bind(role.as_str())
        .bind(role)
        .fetch_one(pool)
        .await
        .unwrap();
        AuthenticatedUser { user_id, role }
    }

    pub async fn child(pool: &PgPool, parent_id: Uuid, teacher_id: Option<Uuid>, group_id: Option<Uuid>) -> Uuid {
        sqlx::query_scalar(
            "INSERT INTO children (parent_id, first_name, last_name, birth_date, gender, teacher_id, group_id)
             VALUES ($1, 'Kofi', 'Test', '2021-04-01', 'male', $2, $3)
             RETURNING id",
        )
        .bind(parent_id)
        .bind(teacher_id)
        .bind(group_id)
        .fetch_one(pool)
        .await
        .unwrap()
    }

    pub async fn group(pool: &PgPool, teacher_id: Option<Uuid>) -> Uuid {
        sqlx::query_scalar("INSERT INTO groups (name, teacher_id) VALUES ('Sunflowers', $1) RETURNING id")
            .bind(teacher_id)
            .fetch_one(pool)
            .await
            .unwrap()
    }
}
