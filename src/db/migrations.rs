//! Database migrations
//!
//! Migrations are embedded in the binary as SQL strings, one variant per
//! backend. Applied versions are recorded in the `_migrations` table so each
//! migration runs exactly once.
//!
//! ```ignore
//! let pool = create_pool(&config).await?;
//! migrations::run_migrations(&pool).await?;
//! ```

use anyhow::{Context, Result};
use sqlx::{MySqlPool, SqlitePool};

use super::{Backend, DynDatabasePool};

/// A database migration with SQL for both SQLite and MySQL
#[derive(Debug, Clone)]
pub struct Migration {
    /// Migration version number (must be unique and sequential)
    pub version: i32,
    /// Human-readable migration name
    pub name: &'static str,
    /// SQL statements for SQLite
    pub up_sqlite: &'static str,
    /// SQL statements for MySQL
    pub up_mysql: &'static str,
}

pub const MIGRATIONS: &[Migration] = &[
    Migration {
        version: 1,
        name: "create_users",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                email VARCHAR(254) NOT NULL UNIQUE,
                full_name VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 1,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS users (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                email VARCHAR(254) NOT NULL UNIQUE,
                full_name VARCHAR(255) NOT NULL,
                password_hash VARCHAR(255) NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT TRUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP
            );
        "#,
    },
    Migration {
        version: 2,
        name: "create_sessions",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id INTEGER NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX IF NOT EXISTS idx_sessions_expires_at ON sessions(expires_at);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS sessions (
                id VARCHAR(64) PRIMARY KEY,
                user_id BIGINT NOT NULL,
                expires_at TIMESTAMP NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_sessions_user_id ON sessions(user_id);
            CREATE INDEX idx_sessions_expires_at ON sessions(expires_at);
        "#,
    },
    Migration {
        version: 3,
        name: "create_categories",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            INSERT OR IGNORE INTO categories (name) VALUES ('General');
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS categories (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                name VARCHAR(100) NOT NULL UNIQUE,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            );
            INSERT IGNORE INTO categories (name) VALUES ('General');
        "#,
    },
    Migration {
        version: 4,
        name: "create_blog_posts",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title VARCHAR(255) NOT NULL,
                text TEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT 0,
                document VARCHAR(255),
                category_id INTEGER,
                deleted BOOLEAN NOT NULL DEFAULT 0,
                created_by INTEGER,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX IF NOT EXISTS idx_blog_posts_deleted ON blog_posts(deleted);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_posts (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                title VARCHAR(255) NOT NULL,
                text LONGTEXT NOT NULL,
                is_active BOOLEAN NOT NULL DEFAULT FALSE,
                document VARCHAR(255),
                category_id BIGINT,
                deleted BOOLEAN NOT NULL DEFAULT FALSE,
                created_by BIGINT,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                updated_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP ON UPDATE CURRENT_TIMESTAMP,
                FOREIGN KEY (category_id) REFERENCES categories(id) ON DELETE SET NULL,
                FOREIGN KEY (created_by) REFERENCES users(id) ON DELETE SET NULL
            );
            CREATE INDEX idx_blog_posts_deleted ON blog_posts(deleted);
        "#,
    },
    Migration {
        version: 5,
        name: "create_blog_post_authors",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_post_authors (
                blog_post_id INTEGER NOT NULL,
                user_id INTEGER NOT NULL,
                PRIMARY KEY (blog_post_id, user_id),
                FOREIGN KEY (blog_post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_blog_post_authors_user_id ON blog_post_authors(user_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_post_authors (
                blog_post_id BIGINT NOT NULL,
                user_id BIGINT NOT NULL,
                PRIMARY KEY (blog_post_id, user_id),
                FOREIGN KEY (blog_post_id) REFERENCES blog_posts(id) ON DELETE CASCADE,
                FOREIGN KEY (user_id) REFERENCES users(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_blog_post_authors_user_id ON blog_post_authors(user_id);
        "#,
    },
    Migration {
        version: 6,
        name: "create_blog_post_covers",
        up_sqlite: r#"
            CREATE TABLE IF NOT EXISTS blog_post_covers (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                blog_post_id INTEGER NOT NULL,
                image VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (blog_post_id) REFERENCES blog_posts(id) ON DELETE CASCADE
            );
            CREATE INDEX IF NOT EXISTS idx_blog_post_covers_post ON blog_post_covers(blog_post_id);
        "#,
        up_mysql: r#"
            CREATE TABLE IF NOT EXISTS blog_post_covers (
                id BIGINT PRIMARY KEY AUTO_INCREMENT,
                blog_post_id BIGINT NOT NULL,
                image VARCHAR(255) NOT NULL,
                created_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP,
                FOREIGN KEY (blog_post_id) REFERENCES blog_posts(id) ON DELETE CASCADE
            );
            CREATE INDEX idx_blog_post_covers_post ON blog_post_covers(blog_post_id);
        "#,
    },
];

/// Run all pending migrations.
///
/// Returns the number of migrations applied.
pub async fn run_migrations(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_versions(pool).await?;

    let mut count = 0;

    for migration in MIGRATIONS {
        if !applied.contains(&migration.version) {
            tracing::info!("Applying migration {}: {}", migration.version, migration.name);
            apply_migration(pool, migration)
                .await
                .with_context(|| format!("Failed to apply migration: {}", migration.name))?;
            count += 1;
        }
    }

    if count > 0 {
        tracing::info!("Applied {} migration(s)", count);
    } else {
        tracing::debug!("No pending migrations");
    }

    Ok(count)
}

async fn create_migrations_table(pool: &DynDatabasePool) -> Result<()> {
    let sql = match pool.backend() {
        Backend::Sqlite(_) => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INTEGER PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
        Backend::Mysql(_) => {
            r#"
            CREATE TABLE IF NOT EXISTS _migrations (
                version INT PRIMARY KEY,
                name VARCHAR(255) NOT NULL UNIQUE,
                applied_at TIMESTAMP NOT NULL DEFAULT CURRENT_TIMESTAMP
            )
            "#
        }
    };

    pool.execute(sql).await?;
    Ok(())
}

async fn get_applied_versions(pool: &DynDatabasePool) -> Result<Vec<i32>> {
    let query = "SELECT version FROM _migrations ORDER BY version";
    let versions = match pool.backend() {
        Backend::Sqlite(p) => sqlx::query_scalar::<_, i64>(query).fetch_all(p).await,
        Backend::Mysql(p) => sqlx::query_scalar::<_, i32>(query)
            .fetch_all(p)
            .await
            .map(|v| v.into_iter().map(i64::from).collect()),
    }
    .context("Failed to read applied migrations")?;

    Ok(versions.into_iter().map(|v| v as i32).collect())
}

async fn apply_migration(pool: &DynDatabasePool, migration: &Migration) -> Result<()> {
    match pool.backend() {
        Backend::Sqlite(p) => apply_migration_sqlite(p, migration).await,
        Backend::Mysql(p) => apply_migration_mysql(p, migration).await,
    }
}

async fn apply_migration_sqlite(pool: &SqlitePool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_sqlite) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

async fn apply_migration_mysql(pool: &MySqlPool, migration: &Migration) -> Result<()> {
    for statement in split_sql_statements(migration.up_mysql) {
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Failed to execute: {}", truncate_sql(statement)))?;
    }

    sqlx::query("INSERT INTO _migrations (version, name) VALUES (?, ?)")
        .bind(migration.version)
        .bind(migration.name)
        .execute(pool)
        .await?;

    Ok(())
}

fn truncate_sql(sql: &str) -> String {
    match sql.char_indices().nth(100) {
        Some((idx, _)) => format!("{}...", &sql[..idx]),
        None => sql.to_string(),
    }
}

/// Split SQL into individual statements, skipping comment-only fragments
fn split_sql_statements(sql: &str) -> Vec<&str> {
    sql.split(';')
        .map(str::trim)
        .filter(|stmt| !stmt.is_empty() && !is_comment_only(stmt))
        .collect()
}

fn is_comment_only(s: &str) -> bool {
    s.lines().all(|line| {
        let trimmed = line.trim();
        trimmed.is_empty() || trimmed.starts_with("--")
    })
}

/// Get pending migrations count
pub async fn pending_count(pool: &DynDatabasePool) -> Result<usize> {
    create_migrations_table(pool).await?;

    let applied = get_applied_versions(pool).await?;
    Ok(MIGRATIONS
        .iter()
        .filter(|m| !applied.contains(&m.version))
        .count())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::create_test_pool;

    async fn migrated_pool() -> DynDatabasePool {
        let pool = create_test_pool().await.expect("Failed to create test pool");
        run_migrations(&pool).await.expect("Failed to run migrations");
        pool
    }

    fn sqlite(pool: &DynDatabasePool) -> &SqlitePool {
        match pool.backend() {
            Backend::Sqlite(p) => p,
            Backend::Mysql(_) => panic!("expected sqlite"),
        }
    }

    #[tokio::test]
    async fn test_run_migrations_once() {
        let pool = create_test_pool().await.expect("Failed to create test pool");

        assert_eq!(pending_count(&pool).await.unwrap(), MIGRATIONS.len());

        let applied = run_migrations(&pool).await.expect("Failed to run migrations");
        assert_eq!(applied, MIGRATIONS.len());
        assert_eq!(pending_count(&pool).await.unwrap(), 0);

        let applied = run_migrations(&pool).await.expect("Second run failed");
        assert_eq!(applied, 0);
    }

    #[tokio::test]
    async fn test_default_category_seeded() {
        let pool = migrated_pool().await;

        let names: Vec<String> = sqlx::query_scalar("SELECT name FROM categories")
            .fetch_all(sqlite(&pool))
            .await
            .unwrap();
        assert_eq!(names, vec!["General".to_string()]);
    }

    #[tokio::test]
    async fn test_blog_post_defaults() {
        let pool = migrated_pool().await;
        let p = sqlite(&pool);

        sqlx::query("INSERT INTO blog_posts (title, text) VALUES ('t', 'x')")
            .execute(p)
            .await
            .unwrap();

        let (is_active, deleted): (bool, bool) =
            sqlx::query_as("SELECT is_active, deleted FROM blog_posts")
                .fetch_one(p)
                .await
                .unwrap();
        assert!(!is_active);
        assert!(!deleted);
    }

    #[tokio::test]
    async fn test_cover_requires_existing_post() {
        let pool = migrated_pool().await;

        let result = sqlx::query("INSERT INTO blog_post_covers (blog_post_id, image) VALUES (?, ?)")
            .bind(999i64)
            .bind("covers/x.png")
            .execute(sqlite(&pool))
            .await;

        assert!(result.is_err());
    }

    #[tokio::test]
    async fn test_user_email_unique() {
        let pool = migrated_pool().await;
        let p = sqlite(&pool);

        let insert = "INSERT INTO users (email, full_name, password_hash) VALUES (?, ?, ?)";
        sqlx::query(insert)
            .bind("a@example.com")
            .bind("A")
            .bind("hash")
            .execute(p)
            .await
            .unwrap();

        let result = sqlx::query(insert)
            .bind("a@example.com")
            .bind("B")
            .bind("hash")
            .execute(p)
            .await;
        assert!(result.is_err());
    }

    #[test]
    fn test_split_sql_statements() {
        let sql = "CREATE TABLE a (id INT);\n-- just a comment\n;\nCREATE TABLE b (id INT)";
        let statements = split_sql_statements(sql);
        assert_eq!(statements, vec!["CREATE TABLE a (id INT)", "CREATE TABLE b (id INT)"]);
    }

    #[test]
    fn test_is_comment_only() {
        assert!(is_comment_only("-- comment\n  -- another"));
        assert!(!is_comment_only("-- comment\nSELECT 1"));
    }

    #[test]
    fn test_versions_are_sequential() {
        for (i, m) in MIGRATIONS.iter().enumerate() {
            assert_eq!(m.version as usize, i + 1, "migration {} out of order", m.name);
        }
    }
}
