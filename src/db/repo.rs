use super::model::{NewUnit, UnitRow};
use chrono::{DateTime, Utc};
use sqlx::sqlite::{
    SqliteConnectOptions, SqliteJournalMode, SqlitePoolOptions, SqliteSynchronous,
};
use sqlx::{SqliteConnection, SqlitePool};
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, instrument};

pub type Pool = SqlitePool;

/// Open a pool for `database_url`. In-memory databases live only as long as
/// their connection, so they get exactly one connection that is never
/// recycled.
pub async fn init_pool(
    database_url: &str,
    max_connections: u32,
    busy_timeout: Duration,
) -> Result<Pool, sqlx::Error> {
    let normalized = prepare_sqlite_url(database_url);
    let in_memory = is_memory_url(&normalized);

    let mut options = SqliteConnectOptions::from_str(&normalized)?
        .create_if_missing(true)
        .foreign_keys(true)
        .busy_timeout(busy_timeout)
        .synchronous(SqliteSynchronous::Full);
    if !in_memory {
        options = options.journal_mode(SqliteJournalMode::Wal);
    }

    let pool_options = if in_memory {
        SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
    } else {
        SqlitePoolOptions::new().max_connections(max_connections.max(1))
    };

    let pool = pool_options.connect_with(options).await?;
    debug!(url = %normalized, in_memory, "catalogue pool ready");
    Ok(pool)
}

fn is_memory_url(url: &str) -> bool {
    url.starts_with("sqlite::memory") || url.contains("mode=memory")
}

/// If using a file-backed SQLite URL, expand a leading `~/` and ensure the parent
/// directory exists. Leaves in-memory URLs untouched. Returns possibly-updated URL.
fn prepare_sqlite_url(url: &str) -> String {
    if !url.starts_with("sqlite:") || is_memory_url(url) {
        return url.to_string();
    }

    let rest = &url["sqlite:".len()..];
    let path_with_query = rest.strip_prefix("//").unwrap_or(rest);

    let (path_part, query_part) = match path_with_query.split_once('?') {
        Some((p, q)) => (p, Some(q)),
        None => (path_with_query, None),
    };

    if path_part.is_empty() {
        return url.to_string();
    }

    let expanded_path = match (path_part.strip_prefix("~/"), std::env::var("HOME")) {
        (Some(rest), Ok(home)) => format!("{}/{}", home.trim_end_matches('/'), rest),
        _ => path_part.to_string(),
    };

    if let Some(parent) = std::path::Path::new(&expanded_path).parent() {
        if !parent.as_os_str().is_empty() {
            let _ = std::fs::create_dir_all(parent);
        }
    }

    let mut rebuilt = String::from("sqlite://");
    rebuilt.push_str(&expanded_path);
    if let Some(q) = query_part {
        rebuilt.push('?');
        rebuilt.push_str(q);
    }
    rebuilt
}

pub async fn run_migrations(pool: &Pool) -> Result<(), sqlx::migrate::MigrateError> {
    sqlx::migrate!("./migrations").run(pool).await
}

/// Insert the catalogue unless a row with the same name exists. Returns the
/// id and whether this call created it.
#[instrument(skip_all)]
pub async fn upsert_catalogue(
    conn: &mut SqliteConnection,
    name: &str,
    source_lang: &str,
    target_lang: &str,
    at: DateTime<Utc>,
) -> sqlx::Result<(i64, bool)> {
    let res = sqlx::query(
        "INSERT INTO catalogue (name, source_lang, target_lang, created_at, created_by, updated_at, updated_by) \
         VALUES (?, ?, ?, ?, 1, ?, 1) ON CONFLICT(name) DO NOTHING",
    )
    .bind(name)
    .bind(source_lang)
    .bind(target_lang)
    .bind(at)
    .bind(at)
    .execute(&mut *conn)
    .await?;

    if res.rows_affected() == 1 {
        return Ok((res.last_insert_rowid(), true));
    }

    let id = sqlx::query_scalar::<_, i64>("SELECT id FROM catalogue WHERE name = ?")
        .bind(name)
        .fetch_one(&mut *conn)
        .await?;
    Ok((id, false))
}

#[instrument(skip_all)]
pub async fn catalogue_updated_at(pool: &Pool, name: &str) -> sqlx::Result<Option<DateTime<Utc>>> {
    sqlx::query_scalar::<_, DateTime<Utc>>("SELECT updated_at FROM catalogue WHERE name = ?")
        .bind(name)
        .fetch_optional(pool)
        .await
}

#[instrument(skip_all)]
pub async fn list_catalogue_names(pool: &Pool) -> sqlx::Result<Vec<String>> {
    sqlx::query_scalar("SELECT name FROM catalogue ORDER BY name")
        .fetch_all(pool)
        .await
}

/// All units of the named catalogue in insertion order.
#[instrument(skip_all)]
pub async fn load_units(pool: &Pool, name: &str) -> sqlx::Result<Vec<UnitRow>> {
    sqlx::query_as::<_, UnitRow>(
        "SELECT t.id, t.source, t.target, t.comments \
         FROM trans_unit t \
         JOIN catalogue c ON c.id = t.catalogue_id \
         WHERE c.name = ? \
         ORDER BY t.id",
    )
    .bind(name)
    .fetch_all(pool)
    .await
}

/// Set `updated_at` of the named catalogue and return its id, or `None`
/// when no such catalogue exists.
#[instrument(skip_all)]
pub async fn touch_catalogue(
    conn: &mut SqliteConnection,
    name: &str,
    user_id: i64,
    at: DateTime<Utc>,
) -> sqlx::Result<Option<i64>> {
    sqlx::query_scalar::<_, i64>(
        "UPDATE catalogue SET updated_at = ?, updated_by = ? WHERE name = ? RETURNING id",
    )
    .bind(at)
    .bind(user_id)
    .bind(name)
    .fetch_optional(conn)
    .await
}

#[instrument(skip_all)]
pub async fn source_exists(
    conn: &mut SqliteConnection,
    catalogue_id: i64,
    source: &str,
) -> sqlx::Result<bool> {
    let cnt: i64 = sqlx::query_scalar(
        "SELECT COUNT(*) FROM trans_unit WHERE catalogue_id = ? AND source = ?",
    )
    .bind(catalogue_id)
    .bind(source)
    .fetch_one(conn)
    .await?;
    Ok(cnt > 0)
}

/// Insert one unit. The sequence number is computed by the same statement
/// as `MAX(msg) + 1` for the catalogue.
#[instrument(skip_all)]
pub async fn insert_unit(conn: &mut SqliteConnection, unit: &NewUnit<'_>) -> sqlx::Result<i64> {
    let translated = !unit.target.is_empty();
    let id: i64 = sqlx::query_scalar(
        "INSERT INTO trans_unit \
            (catalogue_id, msg, source, target, comments, translated, created_at, created_by, updated_at, updated_by) \
         SELECT ?, COALESCE(MAX(msg), 0) + 1, ?, ?, ?, ?, ?, ?, ?, ? \
         FROM trans_unit WHERE catalogue_id = ? \
         RETURNING id",
    )
    .bind(unit.catalogue_id)
    .bind(unit.source)
    .bind(unit.target)
    .bind(unit.comments)
    .bind(translated)
    .bind(unit.at)
    .bind(unit.user_id)
    .bind(unit.at)
    .bind(unit.user_id)
    .bind(unit.catalogue_id)
    .fetch_one(conn)
    .await?;
    Ok(id)
}

/// Returns the number of rows matched by `source`.
#[instrument(skip_all)]
pub async fn update_unit(
    conn: &mut SqliteConnection,
    catalogue_id: i64,
    source: &str,
    target: &str,
    comments: &str,
    at: DateTime<Utc>,
) -> sqlx::Result<u64> {
    let res = sqlx::query(
        "UPDATE trans_unit SET target = ?, comments = ?, translated = ?, updated_at = ? \
         WHERE catalogue_id = ? AND source = ?",
    )
    .bind(target)
    .bind(comments)
    .bind(!target.is_empty())
    .bind(at)
    .bind(catalogue_id)
    .bind(source)
    .execute(conn)
    .await?;
    Ok(res.rows_affected())
}

/// Returns the number of rows removed.
#[instrument(skip_all)]
pub async fn delete_unit(
    conn: &mut SqliteConnection,
    catalogue_id: i64,
    source: &str,
) -> sqlx::Result<u64> {
    let res = sqlx::query("DELETE FROM trans_unit WHERE catalogue_id = ? AND source = ?")
        .bind(catalogue_id)
        .bind(source)
        .execute(conn)
        .await?;
    Ok(res.rows_affected())
}
