use crate::migrations;
use crate::StoreError;
use aiden_proto::{DbOperation, Entity, RecordFilter};
use rusqlite::types::Value as SqlValue;
use rusqlite::{Connection, OptionalExtension};
use serde_json::{Map, Value};
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// JSON-document store keyed by `(entity, id)`.
pub struct Store {
    conn: Mutex<Connection>,
}

impl Store {
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let conn = Connection::open(path)?;
        conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA foreign_keys=ON;")?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub fn in_memory() -> anyhow::Result<Self> {
        let conn = Connection::open_in_memory()?;
        migrations::run_migrations(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    pub(crate) fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Resolve a durable-store operation.
    pub fn execute(&self, op: DbOperation) -> Result<Value, StoreError> {
        match op {
            DbOperation::List { entity, filter } => {
                Ok(Value::Array(self.list(entity, &filter)?))
            }
            DbOperation::Get { entity, id } => Ok(self.get(entity, &id)?.unwrap_or(Value::Null)),
            DbOperation::Create { entity, data } => self.create(entity, data),
            DbOperation::Update { entity, id, data } => self.update(entity, &id, data),
            DbOperation::Delete { entity, id } => Ok(Value::Bool(self.delete(entity, &id)?)),
            DbOperation::GetSettings { user_id } => {
                Ok(self.settings(&user_id)?.unwrap_or(Value::Null))
            }
            DbOperation::UpsertSettings { user_id, data } => self.upsert_settings(&user_id, data),
        }
    }

    pub fn list(&self, entity: Entity, filter: &RecordFilter) -> Result<Vec<Value>, StoreError> {
        let mut sql = String::from("SELECT data FROM records WHERE entity = ?");
        let mut params: Vec<SqlValue> = vec![SqlValue::Text(entity.as_str().to_string())];

        for (field, value) in &filter.fields {
            validate_field(field)?;
            let path = format!("$.{field}");
            match json_to_sql(value)? {
                Some(v) => {
                    sql.push_str(" AND json_extract(data, ?) = ?");
                    params.push(SqlValue::Text(path));
                    params.push(v);
                }
                None => {
                    sql.push_str(" AND json_extract(data, ?) IS NULL");
                    params.push(SqlValue::Text(path));
                }
            }
        }

        // Conversations read oldest-first; everything else newest-first.
        if entity == Entity::ChatMessage {
            sql.push_str(" ORDER BY created_at ASC, rowid ASC");
        } else {
            sql.push_str(" ORDER BY created_at DESC, rowid DESC");
        }
        if let Some(limit) = filter.limit {
            sql.push_str(&format!(" LIMIT {limit}"));
        }

        let conn = self.conn();
        let mut stmt = conn.prepare(&sql)?;
        let rows = stmt
            .query_map(rusqlite::params_from_iter(params), |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        rows.iter()
            .map(|raw| serde_json::from_str(raw).map_err(StoreError::from))
            .collect()
    }

    pub fn get(&self, entity: Entity, id: &str) -> Result<Option<Value>, StoreError> {
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE entity = ?1 AND id = ?2",
                rusqlite::params![entity.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        raw.map(|r| serde_json::from_str(&r).map_err(StoreError::from))
            .transpose()
    }

    /// Insert a document. `id` is taken from the document when present,
    /// otherwise generated; `createdAt`/`updatedAt` are always set here.
    pub fn create(&self, entity: Entity, data: Value) -> Result<Value, StoreError> {
        let mut doc = into_object(data)?;
        let id = match doc.get("id").and_then(Value::as_str) {
            Some(id) if !id.is_empty() => id.to_string(),
            _ => uuid::Uuid::new_v4().to_string(),
        };
        let now = now_rfc3339();
        doc.insert("id".into(), Value::String(id.clone()));
        doc.insert("createdAt".into(), Value::String(now.clone()));
        doc.insert("updatedAt".into(), Value::String(now.clone()));
        let doc = Value::Object(doc);

        self.conn().execute(
            "INSERT INTO records (entity, id, data, created_at, updated_at) VALUES (?1, ?2, ?3, ?4, ?4)",
            rusqlite::params![entity.as_str(), id, serde_json::to_string(&doc)?, now],
        )?;
        tracing::debug!(entity = entity.as_str(), id = %id, "record created");
        Ok(doc)
    }

    /// Shallow-merge `patch` into an existing document.
    pub fn update(&self, entity: Entity, id: &str, patch: Value) -> Result<Value, StoreError> {
        let patch = into_object(patch)?;
        let conn = self.conn();
        let raw: Option<String> = conn
            .query_row(
                "SELECT data FROM records WHERE entity = ?1 AND id = ?2",
                rusqlite::params![entity.as_str(), id],
                |row| row.get(0),
            )
            .optional()?;
        let Some(raw) = raw else {
            return Err(StoreError::NotFound {
                entity: entity.as_str(),
                id: id.to_string(),
            });
        };

        let mut doc = into_object(serde_json::from_str(&raw)?)?;
        for (key, value) in patch {
            if key == "id" || key == "createdAt" {
                continue;
            }
            doc.insert(key, value);
        }
        let now = now_rfc3339();
        doc.insert("updatedAt".into(), Value::String(now.clone()));
        let doc = Value::Object(doc);

        conn.execute(
            "UPDATE records SET data = ?1, updated_at = ?2 WHERE entity = ?3 AND id = ?4",
            rusqlite::params![serde_json::to_string(&doc)?, now, entity.as_str(), id],
        )?;
        Ok(doc)
    }

    pub fn delete(&self, entity: Entity, id: &str) -> Result<bool, StoreError> {
        let removed = self.conn().execute(
            "DELETE FROM records WHERE entity = ?1 AND id = ?2",
            rusqlite::params![entity.as_str(), id],
        )?;
        Ok(removed > 0)
    }

    pub fn settings(&self, user_id: &str) -> Result<Option<Value>, StoreError> {
        self.get(Entity::UserSettings, user_id)
    }

    /// Settings documents are keyed by the owning user id.
    pub fn upsert_settings(&self, user_id: &str, data: Value) -> Result<Value, StoreError> {
        if self.get(Entity::UserSettings, user_id)?.is_some() {
            return self.update(Entity::UserSettings, user_id, data);
        }
        let mut doc = into_object(data)?;
        doc.insert("id".into(), Value::String(user_id.to_string()));
        doc.insert("userId".into(), Value::String(user_id.to_string()));
        self.create(Entity::UserSettings, Value::Object(doc))
    }
}

pub(crate) fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}

pub(crate) fn into_object(value: Value) -> Result<Map<String, Value>, StoreError> {
    match value {
        Value::Object(map) => Ok(map),
        other => Err(StoreError::InvalidDocument(format!(
            "expected a JSON object, got {other}"
        ))),
    }
}

fn validate_field(field: &str) -> Result<(), StoreError> {
    let valid = !field.is_empty()
        && field
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_');
    if valid {
        Ok(())
    } else {
        Err(StoreError::InvalidField(field.to_string()))
    }
}

/// `None` means the filter should match JSON null / missing.
fn json_to_sql(value: &Value) -> Result<Option<SqlValue>, StoreError> {
    Ok(match value {
        Value::Null => None,
        Value::Bool(b) => Some(SqlValue::Integer(i64::from(*b))),
        Value::Number(n) => match n.as_i64() {
            Some(i) => Some(SqlValue::Integer(i)),
            None => Some(SqlValue::Real(n.as_f64().unwrap_or_default())),
        },
        Value::String(s) => Some(SqlValue::Text(s.clone())),
        other => {
            return Err(StoreError::InvalidField(format!(
                "cannot filter on composite value {other}"
            )))
        }
    })
}
