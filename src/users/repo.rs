use sqlx::PgPool;
use uuid::Uuid;

use crate::users::model::{Role, User};

const USER_COLUMNS: &str = "id, email, password_hash, name, role, profile_picture, created_at";

impl User {
    pub async fn find_by_email(db: &PgPool, email: &str) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE email = $1"
        ))
        .bind(email)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    pub async fn find_by_id(db: &PgPool, id: Uuid) -> anyhow::Result<Option<User>> {
        let user = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users WHERE id = $1"
        ))
        .bind(id)
        .fetch_optional(db)
        .await?;
        Ok(user)
    }

    /// Returns the raw sqlx error so the caller can tell a lost uniqueness
    /// race (mapped to 409) from anything else.
    pub async fn create(
        db: &PgPool,
        email: &str,
        password_hash: &str,
        name: &str,
        role: Role,
        profile_picture: &str,
    ) -> Result<User, sqlx::Error> {
        sqlx::query_as::<_, User>(&format!(
            "INSERT INTO users (email, password_hash, name, role, profile_picture) \
             VALUES ($1, $2, $3, $4, $5) \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(email)
        .bind(password_hash)
        .bind(name)
        .bind(role)
        .bind(profile_picture)
        .fetch_one(db)
        .await
    }

    pub async fn list(db: &PgPool, role: Option<Role>) -> anyhow::Result<Vec<User>> {
        let users = sqlx::query_as::<_, User>(&format!(
            "SELECT {USER_COLUMNS} FROM users \
             WHERE ($1::text IS NULL OR role = $1) \
             ORDER BY created_at"
        ))
        .bind(role.map(|r| r.as_str()))
        .fetch_all(db)
        .await?;
        Ok(users)
    }

    /// Persists the mutable fields. Email and role are immutable through
    /// this path by design.
    pub async fn update(&self, db: &PgPool) -> anyhow::Result<User> {
        let user = sqlx::query_as::<_, User>(&format!(
            "UPDATE users SET name = $2, password_hash = $3, profile_picture = $4 \
             WHERE id = $1 \
             RETURNING {USER_COLUMNS}"
        ))
        .bind(self.id)
        .bind(&self.name)
        .bind(&self.password_hash)
        .bind(&self.profile_picture)
        .fetch_one(db)
        .await?;
        Ok(user)
    }
}

/// Postgres unique_violation, the authoritative guard behind the signup
/// pre-check.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    err.as_database_error()
        .and_then(|db| db.code())
        .map(|code| code == "23505")
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_database_errors_are_not_unique_violations() {
        assert!(!is_unique_violation(&sqlx::Error::RowNotFound));
        assert!(!is_unique_violation(&sqlx::Error::PoolClosed));
    }
}

// Run with `cargo test -- --ignored` against a disposable database.
#[cfg(test)]
mod pg_tests {
    use super::*;
    use crate::users::model::DEFAULT_PROFILE_PICTURE;

    async fn pool() -> PgPool {
        let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");
        let db = sqlx::postgres::PgPoolOptions::new()
            .max_connections(2)
            .connect(&url)
            .await
            .expect("connect");
        sqlx::migrate!("./migrations").run(&db).await.expect("migrate");
        db
    }

    async fn user_count(db: &PgPool) -> i64 {
        sqlx::query_scalar::<_, i64>("SELECT count(*) FROM users")
            .fetch_one(db)
            .await
            .expect("count users")
    }

    #[tokio::test]
    #[ignore = "needs a running Postgres"]
    async fn duplicate_email_insert_fails_and_adds_no_row() {
        let db = pool().await;
        let email = format!("dup-{}@example.com", Uuid::new_v4());

        User::create(&db, &email, "$argon2id$hash", "Alice", Role::User, DEFAULT_PROFILE_PICTURE)
            .await
            .expect("first insert");
        let before = user_count(&db).await;

        let err = User::create(
            &db,
            &email,
            "$argon2id$hash",
            "Alice Again",
            Role::User,
            DEFAULT_PROFILE_PICTURE,
        )
        .await
        .expect_err("second insert with the same email must fail");

        assert!(is_unique_violation(&err));
        assert_eq!(user_count(&db).await, before);
    }

    #[tokio::test]
    #[ignore = "needs a running Postgres"]
    async fn admin_filter_lists_only_admin_rows() {
        let db = pool().await;
        let admin_email = format!("admin-{}@example.com", Uuid::new_v4());
        let client_email = format!("client-{}@example.com", Uuid::new_v4());

        User::create(&db, &admin_email, "$argon2id$hash", "Ada Admin", Role::Admin, DEFAULT_PROFILE_PICTURE)
            .await
            .expect("insert admin");
        User::create(&db, &client_email, "$argon2id$hash", "Cleo Client", Role::Client, DEFAULT_PROFILE_PICTURE)
            .await
            .expect("insert client");

        let admins = User::list(&db, Some(Role::Admin)).await.expect("list admins");
        assert!(admins.iter().all(|u| u.role == Role::Admin));
        assert!(admins.iter().any(|u| u.email == admin_email));
        assert!(!admins.iter().any(|u| u.email == client_email));

        let everyone = User::list(&db, None).await.expect("list all");
        assert!(everyone.iter().any(|u| u.email == client_email));
    }
}
