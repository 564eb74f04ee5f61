//! Per-test `PostgreSQL` databases inside one shared container.

use std::{
    env, thread,
    time::{SystemTime, UNIX_EPOCH},
};

use once_cell::sync::Lazy;
use sqlx::{Connection, PgConnection, PgPool};
use testcontainers::{ContainerAsync, ImageExt, runners::AsyncRunner};
use testcontainers_modules::postgres::Postgres as PostgresImage;
use tokio::sync::{OnceCell, mpsc};

const USER: &str = "conditions_test";
const PASSWORD: &str = "conditions_test_password";

/// Database names are interpolated into DDL, so only plain identifiers are accepted.
fn validate_database_name(name: &str) -> Result<(), String> {
    if name.is_empty() || name.len() > 63 {
        return Err("database name must be 1-63 characters long".to_string());
    }

    if !name
        .chars()
        .next()
        .is_some_and(|c| c.is_ascii_alphabetic() || c == '_')
    {
        return Err("database name must start with a letter or underscore".to_string());
    }

    if !name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err("database name can only contain letters, digits and underscores".to_string());
    }

    Ok(())
}

async fn start_container() -> ContainerAsync<PostgresImage> {
    PostgresImage::default()
        .with_user(USER)
        .with_password(PASSWORD)
        .with_db_name(USER)
        .with_env_var("POSTGRES_INITDB_ARGS", "--auth-host=trust")
        .start()
        .await
        .expect("Failed to start PostgreSQL container")
}

static CONTAINER: Lazy<OnceCell<ContainerAsync<PostgresImage>>> = Lazy::new(OnceCell::new);

static DROP_SENDER: Lazy<OnceCell<mpsc::UnboundedSender<String>>> = Lazy::new(OnceCell::new);

async fn start_drop_task() -> mpsc::UnboundedSender<String> {
    let (sender, mut receiver) = mpsc::unbounded_channel::<String>();

    tokio::spawn(async move {
        while let Some(name) = receiver.recv().await {
            if let Err(error) = drop_database(&name).await {
                eprintln!("Failed to drop test database '{name}': {error}");
            }
        }
    });

    sender
}

async fn server_url(database: &str) -> Option<String> {
    let port = CONTAINER.get()?.get_host_port_ipv4(5432).await.ok()?;
    let host = env::var("TESTCONTAINERS_HOST_OVERRIDE").unwrap_or_else(|_| "localhost".into());

    Some(format!(
        "postgresql://{USER}:{PASSWORD}@{host}:{port}/{database}"
    ))
}

async fn drop_database(name: &str) -> Result<(), sqlx::Error> {
    validate_database_name(name).map_err(sqlx::Error::Protocol)?;

    let Some(url) = server_url("postgres").await else {
        return Ok(());
    };

    let mut conn = PgConnection::connect(&url).await?;

    sqlx::query(&format!("DROP DATABASE IF EXISTS \"{name}\""))
        .execute(&mut conn)
        .await?;

    conn.close().await
}

/// An isolated, migrated database, dropped in the background when the value is dropped.
#[derive(Debug, Clone)]
pub struct TestDb {
    /// Pool connected to the isolated database
    pub pool: PgPool,

    /// Database name
    pub name: String,
}

impl Drop for TestDb {
    fn drop(&mut self) {
        if let Some(sender) = DROP_SENDER.get() {
            let _sent = sender.send(self.name.clone());
        }
    }
}

impl TestDb {
    /// Create and migrate a uniquely named database.
    pub async fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("Clock before epoch")
            .as_nanos();

        let name = format!("conditions_test_{nanos}_{:?}", thread::current().id())
            .replace([':', ' ', '(', ')'], "");

        validate_database_name(&name).expect("Invalid generated database name");

        DROP_SENDER.get_or_init(start_drop_task).await;
        CONTAINER.get_or_init(start_container).await;

        let admin_url = server_url("postgres")
            .await
            .expect("Failed to resolve container address");

        let mut conn = PgConnection::connect(&admin_url)
            .await
            .expect("Failed to connect to postgres database");

        sqlx::query(&format!("CREATE DATABASE \"{name}\""))
            .execute(&mut conn)
            .await
            .expect("Failed to create test database");

        conn.close()
            .await
            .expect("Failed to close admin connection");

        let url = server_url(&name)
            .await
            .expect("Failed to resolve container address");

        let pool = PgPool::connect(&url)
            .await
            .expect("Failed to create pool for database");

        sqlx::migrate!("../../migrations")
            .run(&pool)
            .await
            .expect("Failed to run migrations on database");

        Self { pool, name }
    }

    /// Returns the connection pool for this test database.
    pub fn pool(&self) -> &PgPool {
        &self.pool
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn database_names_are_plain_identifiers() {
        assert!(validate_database_name("conditions_test_1").is_ok());
        assert!(validate_database_name("_leading").is_ok());

        assert!(validate_database_name("").is_err());
        assert!(validate_database_name(&"a".repeat(64)).is_err());
        assert!(validate_database_name("1leading").is_err());
        assert!(validate_database_name("with-hyphen").is_err());
        assert!(validate_database_name("quote\"d").is_err());
    }

    #[tokio::test]
    async fn migrations_create_the_schema() {
        let db = TestDb::new().await;

        let tables: i64 = sqlx::query_scalar(
            "SELECT COUNT(*) FROM information_schema.tables \
             WHERE table_schema = 'public' \
               AND table_name IN ('users', 'companies', 'memberships', 'conditions', 'assignments', 'rules')",
        )
        .fetch_one(db.pool())
        .await
        .expect("Failed to count tables");

        assert_eq!(tables, 6);
    }
}
