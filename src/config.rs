use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct Config {
    #[serde(default)]
    pub listen: ListenConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub recommendations: RecommendationConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(skip)]
    pub debug_logs: bool,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ListenConfig {
    #[serde(default)]
    pub address: Option<String>,
    #[serde(default = "default_port")]
    pub port: String,
    #[serde(default)]
    pub tlscert: Option<String>,
    #[serde(default)]
    pub tlskey: Option<String>,
}

impl Default for ListenConfig {
    fn default() -> Self {
        Self {
            address: None,
            port: default_port(),
            tlscert: None,
            tlskey: None,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize, Default)]
pub struct DatabaseConfig {
    #[serde(default)]
    pub sqlite: Option<SqliteConfig>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SqliteConfig {
    pub filename: String,
    #[serde(default = "default_max_connections")]
    pub max_connections: u32,
}

/// Result sizes for the recommendation endpoints.
#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct RecommendationConfig {
    #[serde(default = "default_similar_limit")]
    pub similar_limit: usize,
    #[serde(default = "default_list_limit")]
    pub list_limit: usize,
}

impl Default for RecommendationConfig {
    fn default() -> Self {
        Self {
            similar_limit: default_similar_limit(),
            list_limit: default_list_limit(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AuthConfig {
    /// bcrypt cost factor used when hashing new passwords.
    #[serde(default = "default_password_cost")]
    pub password_cost: u32,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            password_cost: default_password_cost(),
        }
    }
}

fn default_port() -> String {
    "3000".to_string()
}

fn default_max_connections() -> u32 {
    5
}

fn default_similar_limit() -> usize {
    5
}

fn default_list_limit() -> usize {
    10
}

fn default_password_cost() -> u32 {
    bcrypt::DEFAULT_COST
}

impl Config {
    pub fn from_file(path: &str) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::ReadError(path.to_string(), e))?;

        Self::from_yaml(&content).map_err(|e| ConfigError::ParseError(path.to_string(), e))
    }

    pub fn from_yaml(content: &str) -> Result<Self, serde_yaml::Error> {
        serde_yaml::from_str(content)
    }

    pub fn get_database_path(&self) -> Option<String> {
        self.database.sqlite.as_ref().map(|sqlite| sqlite.filename.clone())
    }

    pub fn max_connections(&self) -> u32 {
        self.database
            .sqlite
            .as_ref()
            .map(|sqlite| sqlite.max_connections)
            .unwrap_or_else(default_max_connections)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Failed to read config file {0}: {1}")]
    ReadError(String, std::io::Error),
    #[error("Failed to parse config file {0}: {1}")]
    ParseError(String, serde_yaml::Error),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_fill_missing_sections() {
        let yaml = "database:\n  sqlite:\n    filename: reelbase.db\n";
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.listen.port, "3000");
        assert_eq!(config.get_database_path().as_deref(), Some("reelbase.db"));
        assert_eq!(config.max_connections(), 5);
        assert_eq!(config.recommendations.similar_limit, 5);
        assert_eq!(config.recommendations.list_limit, 10);
        assert_eq!(config.auth.password_cost, bcrypt::DEFAULT_COST);
    }

    #[test]
    fn test_explicit_values() {
        let yaml = r#"
listen:
  address: 127.0.0.1
  port: "8080"
database:
  sqlite:
    filename: /var/lib/reelbase/catalog.db
    max_connections: 2
recommendations:
  similar_limit: 3
  list_limit: 20
auth:
  password_cost: 6
"#;
        let config = Config::from_yaml(yaml).unwrap();
        assert_eq!(config.listen.address.as_deref(), Some("127.0.0.1"));
        assert_eq!(config.listen.port, "8080");
        assert_eq!(config.max_connections(), 2);
        assert_eq!(config.recommendations.similar_limit, 3);
        assert_eq!(config.recommendations.list_limit, 20);
        assert_eq!(config.auth.password_cost, 6);
    }
}
