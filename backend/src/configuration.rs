use serde::Deserialize;

#[derive(Clone, Deserialize)]
pub struct Settings {
    pub application: ApplicationSettings,
    pub database: DatabaseSettings,
    pub auth: AuthSettings,
    pub blob: BlobSettings,
    pub llm: LlmSettings,
    pub agent: AgentSettings,
}

#[derive(Clone, Deserialize)]
pub struct ApplicationSettings {
    pub port: u16,
    pub host: String,
}

/// Connection settings for the two database roles.
///
/// Migrations and the lending pool use `lending_url`; the compliance pool
/// connects as the `compliance_app` role via `compliance_url`. When the
/// compliance URL is not configured the lending URL is reused, which keeps
/// single-database development setups working (role isolation then relies
/// on the GRANTs alone).
#[derive(Clone, Deserialize)]
pub struct DatabaseSettings {
    pub username: Option<String>,
    pub password: Option<String>,
    pub port: Option<u16>,
    pub host: Option<String>,
    pub database_name: Option<String>,
    pub lending_url: Option<String>,
    pub compliance_url: Option<String>,
    pub max_connections: Option<u32>,
}

impl DatabaseSettings {
    pub fn lending_connection_string(&self) -> String {
        if let Some(url) = &self.lending_url {
            url.clone()
        } else {
            format!(
                "postgres://{}:{}@{}:{}/{}",
                self.username.as_deref().unwrap_or(""),
                self.password.as_deref().unwrap_or(""),
                self.host.as_deref().unwrap_or("127.0.0.1"),
                self.port.unwrap_or(5432),
                self.database_name.as_deref().unwrap_or("crestline")
            )
        }
    }

    pub fn compliance_connection_string(&self) -> String {
        self.compliance_url
            .clone()
            .unwrap_or_else(|| self.lending_connection_string())
    }
}

/// Identity-provider verification settings.
#[derive(Clone, Deserialize)]
pub struct AuthSettings {
    pub jwks_url: String,
    pub issuer: Option<String>,
    pub audience: Option<String>,
}

/// S3-compatible object store for document bytes.
#[derive(Clone, Deserialize)]
pub struct BlobSettings {
    pub endpoint: String,
    pub bucket: String,
}

/// Inference endpoints consumed through the LLM contract.
#[derive(Clone, Deserialize)]
pub struct LlmSettings {
    pub endpoint: String,
    pub api_key: Option<String>,
    pub chat_model: String,
    pub embeddings_model: String,
    pub safety_model: Option<String>,
}

/// External agent runtime backing the chat WebSocket.
#[derive(Clone, Deserialize)]
pub struct AgentSettings {
    pub endpoint: String,
}

pub fn get_configuration() -> Result<Settings, config::ConfigError> {
    let mut builder = config::Config::builder()
        // Defaults make a bare environment loadable; deployments override.
        .set_default("application.host", "127.0.0.1")?
        .set_default("application.port", 8000_i64)?
        .set_default("database.max_connections", 5_i64)?
        .set_default("auth.jwks_url", "http://127.0.0.1:8080/realms/crestline/protocol/openid-connect/certs")?
        .set_default("blob.endpoint", "http://127.0.0.1:9000")?
        .set_default("blob.bucket", "loan-documents")?
        .set_default("llm.endpoint", "http://127.0.0.1:11434/v1")?
        .set_default("llm.chat_model", "default-chat")?
        .set_default("llm.embeddings_model", "default-embed")?
        .set_default("agent.endpoint", "http://127.0.0.1:8100")?
        // Add support for environment variables (e.g. APP__APPLICATION__PORT=5001)
        .add_source(
            config::Environment::with_prefix("APP")
                .separator("__")
        );

    // Manually override with standard env vars if present
    if let Ok(port) = std::env::var("PORT") {
        builder = builder.set_override("application.port", port)?;
    }
    if let Ok(host) = std::env::var("HOST") {
        builder = builder.set_override("application.host", host)?;
    }
    if let Ok(db_url) = std::env::var("DATABASE_URL") {
        builder = builder.set_override("database.lending_url", db_url)?;
    }
    if let Ok(db_url) = std::env::var("COMPLIANCE_DATABASE_URL") {
        builder = builder.set_override("database.compliance_url", db_url)?;
    }
    if let Ok(url) = std::env::var("JWKS_URL") {
        builder = builder.set_override("auth.jwks_url", url)?;
    }
    if let Ok(url) = std::env::var("BLOB_ENDPOINT") {
        builder = builder.set_override("blob.endpoint", url)?;
    }
    if let Ok(url) = std::env::var("LLM_ENDPOINT") {
        builder = builder.set_override("llm.endpoint", url)?;
    }
    if let Ok(url) = std::env::var("AGENT_ENDPOINT") {
        builder = builder.set_override("agent.endpoint", url)?;
    }

    let settings = builder.build()?;

    settings.try_deserialize::<Settings>()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_env() {
        let config = get_configuration().expect("defaults should satisfy every section");
        assert_eq!(config.blob.bucket, "loan-documents");
        assert!(config.database.lending_connection_string().starts_with("postgres://"));
    }

    #[test]
    fn compliance_url_falls_back_to_lending() {
        let db = DatabaseSettings {
            username: None,
            password: None,
            port: None,
            host: None,
            database_name: None,
            lending_url: Some("postgres://u:p@db:5432/crestline".into()),
            compliance_url: None,
            max_connections: None,
        };
        assert_eq!(
            db.compliance_connection_string(),
            db.lending_connection_string()
        );
    }
}
