// Declarative policies loaded from YAML
use std::path::Path;

use serde::Deserialize;
use serde_json::Value;
use thiserror::Error;

use crate::filter::Query;
use crate::policy::policy::{CollectionPolicy, OperationSet};
use crate::policy::registry::PolicyRegistry;
use crate::types::Operation;

#[derive(Debug, Error)]
pub enum PolicyFileError {
    #[error("Failed to read policy file {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Invalid policy file: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("Policy #{index} ({binding}): {message}")]
    Entry {
        index: usize,
        binding: String,
        message: String,
    },
}

/// ```yaml
/// default_connection: memory://local
/// policies:
///   - database: demo
///     collection: todos
///     allow: ["*"]
///     user_field: Username
///     stamp_created: CreatedDateUtc
/// ```
#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyFile {
    #[serde(default)]
    pub default_connection: Option<String>,
    #[serde(default)]
    pub policies: Vec<PolicyEntry>,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct PolicyEntry {
    pub database: String,
    pub collection: String,
    #[serde(default)]
    pub allow: Vec<String>,
    #[serde(default)]
    pub connection: Option<String>,
    #[serde(default)]
    pub user_field: Option<String>,
    #[serde(default)]
    pub filter: Option<Value>,
    #[serde(default)]
    pub stamp_created: Option<String>,
    #[serde(default)]
    pub stamp_updated: Option<String>,
}

impl PolicyFile {
    pub fn from_yaml_str(text: &str) -> Result<Self, PolicyFileError> {
        Ok(serde_yaml::from_str(text)?)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, PolicyFileError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|source| PolicyFileError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_yaml_str(&text)
    }

    pub fn into_registry(self) -> Result<PolicyRegistry, PolicyFileError> {
        let mut builder = PolicyRegistry::builder();
        if let Some(connection) = self.default_connection {
            builder.with_default_connection(connection);
        }
        for (index, entry) in self.policies.into_iter().enumerate() {
            builder.register(entry.into_policy(index)?);
        }
        Ok(builder.build())
    }
}

impl PolicyEntry {
    fn into_policy(self, index: usize) -> Result<CollectionPolicy, PolicyFileError> {
        let binding = format!("{}/{}", self.database, self.collection);
        let entry_error = |message: String| PolicyFileError::Entry { index, binding: binding.clone(), message };

        let allowed = OperationSet::parse(&self.allow).map_err(|e| entry_error(e.to_string()))?;
        let mut builder = CollectionPolicy::builder(self.database, self.collection).with_allowed(allowed);

        if let Some(field) = self.user_field {
            builder = builder.with_user_filter(field);
        }
        if let Some(filter) = self.filter {
            let query = Query::from_value(filter).map_err(|e| entry_error(format!("invalid filter: {}", e)))?;
            builder = builder.with_static_filter(query);
        }
        if let Some(field) = self.stamp_created {
            builder = builder.with_timestamp(Operation::Add, field);
        }
        if let Some(field) = self.stamp_updated {
            builder = builder
                .with_timestamp(Operation::Add, field.clone())
                .with_timestamp(Operation::Update, field);
        }
        if let Some(connection) = self.connection {
            builder = builder.with_connection(connection);
        }

        builder.build().map_err(|e| entry_error(e.to_string()))
    }
}

/// Read and compile a policy file in one step
pub fn load_registry(path: impl AsRef<Path>) -> Result<PolicyRegistry, PolicyFileError> {
    PolicyFile::load(path)?.into_registry()
}
