
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use thiserror::Error;
use url::Url;

pub const DEFAULT_EMBEDDING_DIMENSIONS: u32 = 1536;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
#[serde(default)]
pub struct Config {
    pub openai: OpenAiConfig,
    pub mongodb: MongoConfig,
    pub server: ServerConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct OpenAiConfig {
    pub endpoint: String,
    pub api_key: String,
    pub api_version: String,
    pub embeddings_deployment: String,
    pub completions_deployment: String,
    pub embedding_dimensions: u32,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct MongoConfig {
    pub user: String,
    pub password: String,
    pub servername: String,
    pub database: String,
    pub collection: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct ServerConfig {
    pub host: String,
    pub port: u16,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            endpoint: "https://localhost".to_string(),
            api_key: String::new(),
            api_version: "2024-02-01".to_string(),
            embeddings_deployment: "text-embedding-ada-002".to_string(),
            completions_deployment: "gpt-4o".to_string(),
            embedding_dimensions: DEFAULT_EMBEDDING_DIMENSIONS,
        }
    }
}

impl Default for MongoConfig {
    fn default() -> Self {
        Self {
            user: String::new(),
            password: String::new(),
            servername: "localhost".to_string(),
            database: "MapleBondDB".to_string(),
            collection: "ImmigrationCollection".to_string(),
        }
    }
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: "127.0.0.1".to_string(),
            port: 8000,
        }
    }
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Invalid endpoint URL: {0}")]
    InvalidEndpoint(String),
    #[error("Invalid API version: cannot be empty")]
    InvalidApiVersion,
    #[error("Invalid deployment name: {0} (cannot be empty)")]
    InvalidDeployment(String),
    #[error("Invalid embedding dimensions: {0} (must be between 64 and 4096)")]
    InvalidEmbeddingDimensions(u32),
    #[error("Invalid server name: cannot be empty")]
    InvalidServerName,
    #[error("Invalid database name: cannot be empty")]
    InvalidDatabaseName,
    #[error("Invalid collection name: cannot be empty")]
    InvalidCollectionName,
    #[error("Invalid port: {0} (must be between 1 and 65535)")]
    InvalidPort(u16),
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
    #[error("TOML parsing error: {0}")]
    TomlParse(#[from] toml::de::Error),
}

impl Config {
    #[inline]
    pub fn load<P: AsRef<Path>>(config_path: P) -> Result<Self> {
        let config_path = config_path.as_ref();

        if !config_path.exists() {
            return Ok(Self::default());
        }

        let content = fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {}", config_path.display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", config_path.display()))?;

        config
            .validate()
            .with_context(|| "Configuration validation failed")?;

        Ok(config)
    }

    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.openai.validate()?;
        self.mongodb.validate()?;
        self.server.validate()?;
        Ok(())
    }
}

impl OpenAiConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.endpoint_url()?;

        if self.api_version.trim().is_empty() {
            return Err(ConfigError::InvalidApiVersion);
        }

        if self.embeddings_deployment.trim().is_empty() {
            return Err(ConfigError::InvalidDeployment(
                self.embeddings_deployment.clone(),
            ));
        }

        if self.completions_deployment.trim().is_empty() {
            return Err(ConfigError::InvalidDeployment(
                self.completions_deployment.clone(),
            ));
        }

        if !(64..=4096).contains(&self.embedding_dimensions) {
            return Err(ConfigError::InvalidEmbeddingDimensions(
                self.embedding_dimensions,
            ));
        }

        Ok(())
    }

    #[inline]
    pub fn endpoint_url(&self) -> Result<Url, ConfigError> {
        Url::parse(&self.endpoint).map_err(|_| ConfigError::InvalidEndpoint(self.endpoint.clone()))
    }
}

impl MongoConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.servername.trim().is_empty() {
            return Err(ConfigError::InvalidServerName);
        }

        if self.database.trim().is_empty() {
            return Err(ConfigError::InvalidDatabaseName);
        }

        if self.collection.trim().is_empty() {
            return Err(ConfigError::InvalidCollectionName);
        }

        Ok(())
    }

    /// Build the connection string for an Azure Cosmos DB Mongo vCore account.
    ///
    /// User and password are percent-encoded so credentials containing
    /// reserved characters survive the URI round-trip.
    #[inline]
    pub fn connection_string(&self) -> String {
        let user = percent_encode(&self.user);
        let password = percent_encode(&self.password);

        format!(
            "mongodb+srv://{}:{}@{}/{}?tls=true&authMechanism=SCRAM-SHA-256&retrywrites=false&maxIdleTimeMS=120000",
            user, password, self.servername, self.database
        )
    }
}

impl ServerConfig {
    #[inline]
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.port == 0 {
            return Err(ConfigError::InvalidPort(self.port));
        }

        Ok(())
    }

    #[inline]
    pub fn bind_address(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn percent_encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}
