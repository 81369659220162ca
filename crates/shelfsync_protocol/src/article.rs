//! Remote articles and per-store sync settings.

use crate::types::{EntityType, StoreId, Timestamp};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;
use std::fmt;

/// An article record as returned by the external label system.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteArticle {
    /// Article id assigned by the external system.
    pub article_id: String,
    /// Article fields (`data` block of the remote record).
    #[serde(default)]
    pub data: Map<String, Value>,
}

impl RemoteArticle {
    /// Creates an article from its id and fields.
    pub fn new(article_id: impl Into<String>, data: Map<String, Value>) -> Self {
        Self {
            article_id: article_id.into(),
            data,
        }
    }
}

/// Maps remote article fields onto local entity fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FieldMapping {
    /// Remote field whose value identifies the local entity.
    pub unique_id_field: String,
    /// Remote field name → local field name. Empty copies every field.
    #[serde(default)]
    pub fields: BTreeMap<String, String>,
}

impl FieldMapping {
    /// Creates a mapping keyed on `unique_id_field` that copies every field.
    pub fn new(unique_id_field: impl Into<String>) -> Self {
        Self {
            unique_id_field: unique_id_field.into(),
            fields: BTreeMap::new(),
        }
    }

    /// Adds a remote → local field rename.
    pub fn with_field(mut self, remote: impl Into<String>, local: impl Into<String>) -> Self {
        self.fields.insert(remote.into(), local.into());
        self
    }

    /// Extracts the unique id of `article`, falling back to the article id
    /// when the mapping is keyed on `articleId` itself.
    pub fn unique_id(&self, article: &RemoteArticle) -> Option<String> {
        match article.data.get(&self.unique_id_field) {
            Some(Value::String(s)) if !s.trim().is_empty() => Some(s.clone()),
            Some(Value::Number(n)) => Some(n.to_string()),
            Some(_) => None,
            None if self.unique_id_field == "articleId" => Some(article.article_id.clone()),
            None => None,
        }
    }

    /// Projects the article onto local field names.
    pub fn map_fields(&self, article: &RemoteArticle) -> Map<String, Value> {
        if self.fields.is_empty() {
            return article.data.clone();
        }
        self.fields
            .iter()
            .filter_map(|(remote, local)| {
                article
                    .data
                    .get(remote)
                    .map(|value| (local.clone(), value.clone()))
            })
            .collect()
    }
}

impl Default for FieldMapping {
    fn default() -> Self {
        Self::new("articleId")
    }
}

/// Credentials for a store's external label system tenant.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AimsCredentials {
    /// Base URL of the label system API.
    pub base_url: String,
    /// Company code in the label system.
    pub company: String,
    /// API key or bearer token.
    pub api_key: String,
}

impl fmt::Debug for AimsCredentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("AimsCredentials")
            .field("base_url", &self.base_url)
            .field("company", &self.company)
            .field("api_key", &"<redacted>")
            .finish()
    }
}

/// Sync-relevant settings of a store.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StoreConfig {
    /// Store identity.
    pub store_id: StoreId,
    /// Store code in the label system.
    pub store_code: String,
    /// Whether sync runs for this store at all.
    pub sync_enabled: bool,
    /// Label system credentials; `None` means not configured.
    #[serde(default)]
    pub aims: Option<AimsCredentials>,
    /// Entity type that plain articles reconcile into.
    pub article_entity: EntityType,
    /// Articles whose unique id starts with this prefix are conference rooms.
    #[serde(default)]
    pub conference_prefix: Option<String>,
    /// Article → entity field mapping.
    #[serde(default)]
    pub mapping: FieldMapping,
    /// Completion time of the last successful sync cycle.
    #[serde(default)]
    pub last_aims_sync_at: Option<Timestamp>,
}

impl StoreConfig {
    /// Creates an enabled store config with no credentials.
    pub fn new(store_id: impl Into<StoreId>, store_code: impl Into<String>) -> Self {
        Self {
            store_id: store_id.into(),
            store_code: store_code.into(),
            sync_enabled: true,
            aims: None,
            article_entity: EntityType::Spaces,
            conference_prefix: None,
            mapping: FieldMapping::default(),
            last_aims_sync_at: None,
        }
    }

    /// Sets the label system credentials.
    pub fn with_aims(mut self, aims: AimsCredentials) -> Self {
        self.aims = Some(aims);
        self
    }

    /// Sets the field mapping.
    pub fn with_mapping(mut self, mapping: FieldMapping) -> Self {
        self.mapping = mapping;
        self
    }

    /// Sets the entity type plain articles reconcile into.
    pub fn with_article_entity(mut self, entity_type: EntityType) -> Self {
        self.article_entity = entity_type;
        self
    }

    /// Routes articles with this unique-id prefix to conference rooms.
    pub fn with_conference_prefix(mut self, prefix: impl Into<String>) -> Self {
        self.conference_prefix = Some(prefix.into());
        self
    }

    /// Enables or disables sync.
    pub fn with_sync_enabled(mut self, enabled: bool) -> Self {
        self.sync_enabled = enabled;
        self
    }

    /// Returns true if credentials are present.
    pub fn is_configured(&self) -> bool {
        self.aims.is_some()
    }

    /// Local entity type an article with `unique_id` reconciles into.
    pub fn entity_type_for(&self, unique_id: &str) -> EntityType {
        match &self.conference_prefix {
            Some(prefix) if !prefix.is_empty() && unique_id.starts_with(prefix.as_str()) => {
                EntityType::Conference
            }
            _ => self.article_entity,
        }
    }
}
