//! Provider persistence using SQLite.

use super::{
    AuthStyle, ProviderFilter, ProviderPatch, ProviderRecord, ProviderRepository, ProviderStatus,
    SecretState, StoreError,
};
use crate::crypto::Sealed;
use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::types::Value;
use rusqlite::{params, params_from_iter, Connection, ErrorCode, Row};
use serde_json::{Map, Value as JsonValue};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use tracing::warn;

const COLUMNS: &str = "id, name, display_name, kind, provider_type, client_id, \
    legacy_secret, encrypted_secret, encryption_key_id, redirect_url, scopes, \
    auth_url, token_url, info_url, auth_style, extra_config, enabled, sort, remark, \
    support_pkce, icon_url, cache_ttl, webhook_url, success_count, failure_count, \
    last_used_at, status, tenant_id, created_at, updated_at";

/// Provider records backed by SQLite.
///
/// # Schema
/// ```sql
/// CREATE TABLE providers (
///     id INTEGER PRIMARY KEY AUTOINCREMENT,
///     name TEXT NOT NULL UNIQUE,
///     ...
///     legacy_secret TEXT NOT NULL DEFAULT '',      -- plaintext, pre-migration only
///     encrypted_secret TEXT NOT NULL DEFAULT '',   -- base64(nonce || ciphertext)
///     encryption_key_id TEXT NOT NULL DEFAULT '',
///     ...
///     created_at TEXT NOT NULL,                    -- RFC 3339
///     updated_at TEXT NOT NULL                     -- RFC 3339
/// );
/// ```
///
/// # Thread Safety
/// The connection is wrapped in a Mutex; every operation is one statement.
pub struct SqliteProviderStore {
    conn: Mutex<Connection>,
}

impl SqliteProviderStore {
    /// Opens (or creates) the database and ensures the table exists.
    ///
    /// `":memory:"` gives a private in-memory database.
    pub fn new<P: AsRef<Path>>(db_path: P) -> Result<Self> {
        let path = db_path.as_ref();
        let conn = Connection::open(path)
            .with_context(|| format!("Failed to open provider DB at {}", path.display()))?;
        let store = Self {
            conn: Mutex::new(conn),
        };
        store.create_table()?;
        Ok(store)
    }

    fn create_table(&self) -> Result<()> {
        self.lock()
            .execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS providers (
                    id                INTEGER PRIMARY KEY AUTOINCREMENT,
                    name              TEXT NOT NULL UNIQUE,
                    display_name      TEXT NOT NULL DEFAULT '',
                    kind              TEXT NOT NULL DEFAULT '',
                    provider_type     TEXT NOT NULL DEFAULT '',
                    client_id         TEXT NOT NULL DEFAULT '',
                    legacy_secret     TEXT NOT NULL DEFAULT '',
                    encrypted_secret  TEXT NOT NULL DEFAULT '',
                    encryption_key_id TEXT NOT NULL DEFAULT '',
                    redirect_url      TEXT NOT NULL DEFAULT '',
                    scopes            TEXT NOT NULL DEFAULT '',
                    auth_url          TEXT NOT NULL DEFAULT '',
                    token_url         TEXT NOT NULL DEFAULT '',
                    info_url          TEXT NOT NULL DEFAULT '',
                    auth_style        INTEGER NOT NULL DEFAULT 0,
                    extra_config      TEXT,
                    enabled           INTEGER NOT NULL DEFAULT 1,
                    sort              INTEGER NOT NULL DEFAULT 0,
                    remark            TEXT NOT NULL DEFAULT '',
                    support_pkce      INTEGER NOT NULL DEFAULT 0,
                    icon_url          TEXT NOT NULL DEFAULT '',
                    cache_ttl         INTEGER NOT NULL DEFAULT 0,
                    webhook_url       TEXT NOT NULL DEFAULT '',
                    success_count     INTEGER NOT NULL DEFAULT 0,
                    failure_count     INTEGER NOT NULL DEFAULT 0,
                    last_used_at      TEXT,
                    status            INTEGER NOT NULL DEFAULT 1,
                    tenant_id         TEXT NOT NULL DEFAULT '',
                    created_at        TEXT NOT NULL,
                    updated_at        TEXT NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_providers_encrypted
                    ON providers(encrypted_secret);
                "#,
            )
            .context("Failed to create providers table")?;
        Ok(())
    }

    fn lock(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl ProviderRepository for SqliteProviderStore {
    fn create(&self, record: &ProviderRecord) -> Result<i64, StoreError> {
        let now = Utc::now().to_rfc3339();
        let values = vec![
            Value::Text(record.name.clone()),
            Value::Text(record.display_name.clone()),
            Value::Text(record.kind.clone()),
            Value::Text(record.provider_type.clone()),
            Value::Text(record.client_id.clone()),
            Value::Text(record.legacy_secret.clone()),
            Value::Text(record.encrypted_secret.clone()),
            Value::Text(record.encryption_key_id.clone()),
            Value::Text(record.redirect_url.clone()),
            Value::Text(record.scopes.clone()),
            Value::Text(record.auth_url.clone()),
            Value::Text(record.token_url.clone()),
            Value::Text(record.info_url.clone()),
            Value::Integer(record.auth_style.0.into()),
            json_column(record.extra_config.as_ref()),
            Value::Integer(record.enabled.into()),
            Value::Integer(record.sort.into()),
            Value::Text(record.remark.clone()),
            Value::Integer(record.support_pkce.into()),
            Value::Text(record.icon_url.clone()),
            Value::Integer(record.cache_ttl),
            Value::Text(record.webhook_url.clone()),
            Value::Integer(record.success_count),
            Value::Integer(record.failure_count),
            time_column(record.last_used_at),
            Value::Integer(record.status.0.into()),
            Value::Text(record.tenant_id.clone()),
            Value::Text(now.clone()),
            Value::Text(now),
        ];

        let conn = self.lock();
        conn.execute(
            r#"
            INSERT INTO providers (
                name, display_name, kind, provider_type, client_id,
                legacy_secret, encrypted_secret, encryption_key_id,
                redirect_url, scopes, auth_url, token_url, info_url,
                auth_style, extra_config, enabled, sort, remark,
                support_pkce, icon_url, cache_ttl, webhook_url,
                success_count, failure_count, last_used_at, status,
                tenant_id, created_at, updated_at
            )
            VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15,
                    ?16, ?17, ?18, ?19, ?20, ?21, ?22, ?23, ?24, ?25, ?26, ?27, ?28, ?29)
            "#,
            params_from_iter(values),
        )
        .map_err(|e| map_write_error(e, &record.name))?;

        Ok(conn.last_insert_rowid())
    }

    fn get(&self, id: i64) -> Result<ProviderRecord, StoreError> {
        let conn = self.lock();
        let mut stmt = conn
            .prepare(&format!("SELECT {} FROM providers WHERE id = ?1", COLUMNS))
            .context("Failed to prepare query")?;
        let mut rows = stmt.query([id]).context("Failed to execute query")?;

        let record = match rows.next().context("Failed to read row")? {
            Some(row) => read_record(row)?,
            None => return Err(StoreError::NotFound(format!("provider {}", id))),
        };
        Ok(record)
    }

    fn query(&self, filter: &ProviderFilter) -> Result<Vec<ProviderRecord>, StoreError> {
        let (where_clause, mut values) = where_clause(filter);
        let mut sql = format!(
            "SELECT {} FROM providers{} ORDER BY sort ASC, id ASC",
            COLUMNS, where_clause
        );

        if filter.limit.is_some() || filter.offset.is_some() {
            // SQLite needs a LIMIT before OFFSET; -1 means unbounded
            let limit = filter.limit.map(clamp_i64).unwrap_or(-1);
            let offset = filter.offset.map(clamp_i64).unwrap_or(0);
            sql.push_str(&format!(" LIMIT ?{} OFFSET ?{}", values.len() + 1, values.len() + 2));
            values.push(Value::Integer(limit));
            values.push(Value::Integer(offset));
        }

        let conn = self.lock();
        let mut stmt = conn.prepare(&sql).context("Failed to prepare query")?;
        let mut rows = stmt
            .query(params_from_iter(values))
            .context("Failed to execute query")?;

        let mut records = Vec::new();
        while let Some(row) = rows.next().context("Failed to read row")? {
            records.push(read_record(row)?);
        }
        Ok(records)
    }

    fn update(&self, id: i64, patch: &ProviderPatch) -> Result<(), StoreError> {
        let mut assignments = patch_assignments(patch);
        assignments.push(("updated_at", Value::Text(Utc::now().to_rfc3339())));

        let set_clause = assignments
            .iter()
            .enumerate()
            .map(|(i, (column, _))| format!("{} = ?{}", column, i + 1))
            .collect::<Vec<_>>()
            .join(", ");
        let sql = format!(
            "UPDATE providers SET {} WHERE id = ?{}",
            set_clause,
            assignments.len() + 1
        );

        let mut values: Vec<Value> = assignments.into_iter().map(|(_, v)| v).collect();
        values.push(Value::Integer(id));

        let rows_affected = self
            .lock()
            .execute(&sql, params_from_iter(values))
            .map_err(|e| map_write_error(e, patch.name.as_deref().unwrap_or_default()))?;

        if rows_affected == 0 {
            return Err(StoreError::NotFound(format!("provider {}", id)));
        }
        Ok(())
    }

    fn seal_if_unchanged(
        &self,
        id: i64,
        expected: &ProviderRecord,
        sealed: &Sealed,
    ) -> Result<bool, StoreError> {
        let conn = self.lock();
        let rows_affected = conn
            .execute(
                "UPDATE providers
                 SET encrypted_secret = ?1, encryption_key_id = ?2, legacy_secret = '', updated_at = ?3
                 WHERE id = ?4 AND encrypted_secret = ?5 AND encryption_key_id = ?6 AND legacy_secret = ?7",
                params![
                    sealed.ciphertext,
                    sealed.key_id,
                    Utc::now().to_rfc3339(),
                    id,
                    expected.encrypted_secret,
                    expected.encryption_key_id,
                    expected.legacy_secret,
                ],
            )
            .context("Failed to store sealed secret")?;

        if rows_affected > 0 {
            return Ok(true);
        }

        let exists: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM providers WHERE id = ?1",
                params![id],
                |row| row.get(0),
            )
            .context("Failed to check provider")?;
        if exists == 0 {
            return Err(StoreError::NotFound(format!("provider {}", id)));
        }
        Ok(false)
    }

    fn count(&self, filter: &ProviderFilter) -> Result<u64, StoreError> {
        let (where_clause, values) = where_clause(filter);
        let sql = format!("SELECT COUNT(*) FROM providers{}", where_clause);

        let count: i64 = self
            .lock()
            .query_row(&sql, params_from_iter(values), |row| row.get(0))
            .context("Failed to count providers")?;
        Ok(count.max(0) as u64)
    }
}

fn where_clause(filter: &ProviderFilter) -> (String, Vec<Value>) {
    let mut conditions: Vec<String> = Vec::new();
    let mut values = Vec::new();

    if let Some(name) = &filter.name {
        values.push(Value::Text(name.clone()));
        conditions.push(format!("name = ?{}", values.len()));
    }
    if let Some(fragment) = &filter.name_contains {
        values.push(Value::Text(format!("%{}%", escape_like(fragment))));
        conditions.push(format!("name LIKE ?{} ESCAPE '\\'", values.len()));
    }
    match filter.secret_state {
        Some(SecretState::LegacyOnly) => {
            conditions.push("legacy_secret != '' AND encrypted_secret = ''".to_string())
        }
        Some(SecretState::Encrypted) => conditions.push("encrypted_secret != ''".to_string()),
        None => {}
    }

    if conditions.is_empty() {
        (String::new(), values)
    } else {
        (format!(" WHERE {}", conditions.join(" AND ")), values)
    }
}

fn patch_assignments(patch: &ProviderPatch) -> Vec<(&'static str, Value)> {
    let mut set = Vec::new();

    let text = |v: &Option<String>| v.as_ref().map(|s| Value::Text(s.clone()));
    let mut push = |column: &'static str, value: Option<Value>| {
        if let Some(value) = value {
            set.push((column, value));
        }
    };

    push("name", text(&patch.name));
    push("display_name", text(&patch.display_name));
    push("kind", text(&patch.kind));
    push("provider_type", text(&patch.provider_type));
    push("client_id", text(&patch.client_id));
    if let Some(sealed) = &patch.sealed {
        push("encrypted_secret", Some(Value::Text(sealed.ciphertext.clone())));
        push("encryption_key_id", Some(Value::Text(sealed.key_id.clone())));
        push("legacy_secret", Some(Value::Text(String::new())));
    }
    push("redirect_url", text(&patch.redirect_url));
    push("scopes", text(&patch.scopes));
    push("auth_url", text(&patch.auth_url));
    push("token_url", text(&patch.token_url));
    push("info_url", text(&patch.info_url));
    push("auth_style", patch.auth_style.map(|s| Value::Integer(s.0.into())));
    push("extra_config", patch.extra_config.as_ref().map(|m| json_column(Some(m))));
    push("enabled", patch.enabled.map(|b| Value::Integer(b.into())));
    push("sort", patch.sort.map(|n| Value::Integer(n.into())));
    push("remark", text(&patch.remark));
    push("support_pkce", patch.support_pkce.map(|b| Value::Integer(b.into())));
    push("icon_url", text(&patch.icon_url));
    push("cache_ttl", patch.cache_ttl.map(Value::Integer));
    push("webhook_url", text(&patch.webhook_url));
    push("success_count", patch.success_count.map(Value::Integer));
    push("failure_count", patch.failure_count.map(Value::Integer));
    push("last_used_at", patch.last_used_at.map(|t| time_column(Some(t))));
    push("status", patch.status.map(|s| Value::Integer(s.0.into())));
    push("tenant_id", text(&patch.tenant_id));

    set
}

fn read_record(row: &Row<'_>) -> Result<ProviderRecord> {
    let id: i64 = row.get(0)?;
    let extra_config: Option<String> = row.get(15)?;
    let last_used_at: Option<String> = row.get(25)?;
    let created_at: String = row.get(28)?;
    let updated_at: String = row.get(29)?;

    Ok(ProviderRecord {
        id,
        name: row.get(1)?,
        display_name: row.get(2)?,
        kind: row.get(3)?,
        provider_type: row.get(4)?,
        client_id: row.get(5)?,
        legacy_secret: row.get(6)?,
        encrypted_secret: row.get(7)?,
        encryption_key_id: row.get(8)?,
        redirect_url: row.get(9)?,
        scopes: row.get(10)?,
        auth_url: row.get(11)?,
        token_url: row.get(12)?,
        info_url: row.get(13)?,
        auth_style: AuthStyle(row.get(14)?),
        extra_config: extra_config.and_then(|raw| parse_json_column(id, &raw)),
        enabled: row.get(16)?,
        sort: row.get(17)?,
        remark: row.get(18)?,
        support_pkce: row.get(19)?,
        icon_url: row.get(20)?,
        cache_ttl: row.get(21)?,
        webhook_url: row.get(22)?,
        success_count: row.get(23)?,
        failure_count: row.get(24)?,
        last_used_at: last_used_at
            .map(|s| parse_time(&s))
            .transpose()
            .with_context(|| format!("Failed to parse last_used_at for provider {}", id))?,
        status: ProviderStatus(row.get(26)?),
        tenant_id: row.get(27)?,
        created_at: parse_time(&created_at)
            .with_context(|| format!("Failed to parse created_at for provider {}", id))?,
        updated_at: parse_time(&updated_at)
            .with_context(|| format!("Failed to parse updated_at for provider {}", id))?,
    })
}

fn parse_time(s: &str) -> Result<DateTime<Utc>> {
    Ok(DateTime::parse_from_rfc3339(s)?.with_timezone(&Utc))
}

fn parse_json_column(id: i64, raw: &str) -> Option<Map<String, JsonValue>> {
    match serde_json::from_str(raw) {
        Ok(map) => Some(map),
        Err(e) => {
            warn!(provider_id = id, error = %e, "Ignoring unreadable extra_config");
            None
        }
    }
}

fn json_column(map: Option<&Map<String, JsonValue>>) -> Value {
    match map {
        Some(map) => Value::Text(JsonValue::Object(map.clone()).to_string()),
        None => Value::Null,
    }
}

fn time_column(t: Option<DateTime<Utc>>) -> Value {
    match t {
        Some(t) => Value::Text(t.to_rfc3339()),
        None => Value::Null,
    }
}

fn escape_like(s: &str) -> String {
    s.replace('\\', "\\\\").replace('%', "\\%").replace('_', "\\_")
}

fn clamp_i64(n: u64) -> i64 {
    i64::try_from(n).unwrap_or(i64::MAX)
}

fn map_write_error(e: rusqlite::Error, name: &str) -> StoreError {
    match &e {
        rusqlite::Error::SqliteFailure(err, _) if err.code == ErrorCode::ConstraintViolation => {
            StoreError::Conflict(name.to_string())
        }
        _ => StoreError::Backend(anyhow::Error::new(e).context("Failed to write provider")),
    }
}
