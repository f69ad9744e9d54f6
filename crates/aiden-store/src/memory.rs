use crate::store::{into_object, Store};
use crate::StoreError;
use aiden_proto::{Entity, MemoryFilter, MemoryStats, RecordFilter};
use serde_json::{json, Value};

/// How many memories `enrich_context` attaches to a prompt.
const CONTEXT_MEMORY_LIMIT: usize = 20;

impl Store {
    pub fn list_memories(
        &self,
        project_id: &str,
        filter: &MemoryFilter,
    ) -> Result<Vec<Value>, StoreError> {
        let mut records = RecordFilter::by("projectId", project_id);
        if let Some(kind) = &filter.kind {
            records = records.and("type", kind.as_str());
        }
        if let Some(category) = &filter.category {
            records = records.and("category", category.as_str());
        }
        let docs = self.list(Entity::Memory, &records)?;
        Ok(docs
            .into_iter()
            .filter(|doc| filter.include_deprecated || !is_deprecated(doc))
            .collect())
    }

    /// New memories start undeprecated; `projectId` is required.
    pub fn create_memory(&self, data: Value) -> Result<Value, StoreError> {
        let mut doc = into_object(data)?;
        if !doc.get("projectId").is_some_and(Value::is_string) {
            return Err(StoreError::InvalidDocument(
                "memory requires a projectId".to_string(),
            ));
        }
        doc.entry("deprecated").or_insert(Value::Bool(false));
        self.create(Entity::Memory, Value::Object(doc))
    }

    pub fn update_memory(&self, id: &str, data: Value) -> Result<Value, StoreError> {
        self.update(Entity::Memory, id, data)
    }

    pub fn deprecate_memory(&self, id: &str, reason: &str) -> Result<Value, StoreError> {
        self.update(
            Entity::Memory,
            id,
            json!({
                "deprecated": true,
                "deprecationReason": reason,
                "deprecatedAt": chrono::Utc::now(),
            }),
        )
    }

    /// Case-insensitive substring match over title and content of live memories.
    pub fn search_memories(
        &self,
        project_id: &str,
        query: &str,
        limit: usize,
    ) -> Result<Vec<Value>, StoreError> {
        let needle = query.trim().to_lowercase();
        if needle.is_empty() {
            return Ok(Vec::new());
        }
        let docs = self.list_memories(project_id, &MemoryFilter::default())?;
        Ok(docs
            .into_iter()
            .filter(|doc| {
                ["title", "content"].iter().any(|field| {
                    doc.get(*field)
                        .and_then(Value::as_str)
                        .is_some_and(|text| text.to_lowercase().contains(&needle))
                })
            })
            .take(limit)
            .collect())
    }

    pub fn memory_stats(&self, project_id: &str) -> Result<MemoryStats, StoreError> {
        let docs = self.list(Entity::Memory, &RecordFilter::by("projectId", project_id))?;
        let mut stats = MemoryStats::default();
        for doc in &docs {
            if is_deprecated(doc) {
                stats.deprecated += 1;
                continue;
            }
            stats.total_memories += 1;
            let kind = doc
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or("general")
                .to_string();
            *stats.by_type.entry(kind).or_default() += 1;
        }
        Ok(stats)
    }

    /// Live memories for the project plus the story document when one is named.
    pub fn enrich_context(
        &self,
        project_id: &str,
        story_id: Option<&str>,
    ) -> Result<Value, StoreError> {
        let mut memories = self.list_memories(project_id, &MemoryFilter::default())?;
        memories.truncate(CONTEXT_MEMORY_LIMIT);
        let story = match story_id {
            Some(id) => self.get(Entity::Story, id)?,
            None => None,
        };
        Ok(json!({ "memories": memories, "story": story }))
    }
}

fn is_deprecated(doc: &Value) -> bool {
    doc.get("deprecated")
        .and_then(Value::as_bool)
        .unwrap_or(false)
}
