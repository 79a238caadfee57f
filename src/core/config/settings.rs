use super::parsing::{
    env_number, env_optional, env_or_default, parse_bool, parse_cors_origins, parse_environment,
    parse_store_backend,
};
use super::types::{
    ApiSettings, ConfigError, CorsSettings, DatabaseSettings, ExamSettings, NotificationSettings,
    RuntimeSettings, SecuritySettings, ServerHost, ServerPort, ServerSettings, Settings,
    StoreBackend, TelemetrySettings,
};

const DEVELOPMENT_SECRET_KEY: &str = "gradegate-development-secret";
const MAX_WRITE_RETRIES: u32 = 50;

impl Settings {
    pub(crate) fn load() -> Result<Self, ConfigError> {
        let host = env_or_default("GRADEGATE_HOST", "0.0.0.0");
        let port = env_or_default("GRADEGATE_PORT", "8000");

        let environment = parse_environment(
            env_optional("GRADEGATE_ENV").or_else(|| env_optional("ENVIRONMENT")),
        );
        let strict_config = env_optional("GRADEGATE_STRICT_CONFIG")
            .map(|value| parse_bool(&value))
            .unwrap_or(false)
            || environment.is_production();

        let project_name = env_or_default("PROJECT_NAME", "Gradegate API");
        let version = env_or_default("VERSION", env!("CARGO_PKG_VERSION"));
        let api_v1_str = env_or_default("API_V1_STR", "/api/v1");

        let secret_key = env_optional("SECRET_KEY");
        if secret_key.is_none() && strict_config {
            return Err(ConfigError::MissingSecret("SECRET_KEY"));
        }
        let secret_key = secret_key.unwrap_or_else(|| {
            tracing::warn!("SECRET_KEY is not set; using the development key");
            DEVELOPMENT_SECRET_KEY.to_string()
        });
        let algorithm = env_or_default("ALGORITHM", "HS256");

        let cors_origins = parse_cors_origins(env_optional("BACKEND_CORS_ORIGINS"))?;

        let postgres_server = env_or_default("POSTGRES_SERVER", "localhost");
        let postgres_port: u16 = env_number("POSTGRES_PORT", "5432")?;
        let postgres_user = env_or_default("POSTGRES_USER", "gradegate");
        let postgres_password = env_or_default("POSTGRES_PASSWORD", "");
        let postgres_db = env_or_default("POSTGRES_DB", "gradegate");
        let database_url = env_optional("DATABASE_URL");

        let store = parse_store_backend(env_or_default("EXAM_STORE", "postgres"))?;
        let write_retries: u32 = env_number("EXAM_WRITE_RETRIES", "5")?;

        let webhook_url = env_optional("NOTIFY_WEBHOOK_URL");
        let timeout_seconds: u64 = env_number("NOTIFY_TIMEOUT_SECONDS", "5")?;

        let log_level = env_or_default("GRADEGATE_LOG_LEVEL", "info");
        let json = env_optional("GRADEGATE_LOG_JSON").map(|value| parse_bool(&value)).unwrap_or(false);
        let prometheus_enabled =
            env_optional("PROMETHEUS_ENABLED").map(|value| parse_bool(&value)).unwrap_or(false);

        let settings = Self {
            server: ServerSettings { host: ServerHost::parse(host)?, port: ServerPort::parse(port)? },
            runtime: RuntimeSettings { environment, strict_config },
            api: ApiSettings { project_name, version, api_v1_str },
            security: SecuritySettings { secret_key, algorithm },
            cors: CorsSettings { origins: cors_origins },
            database: DatabaseSettings {
                postgres_server,
                postgres_port,
                postgres_user,
                postgres_password,
                postgres_db,
                database_url,
            },
            exam: ExamSettings { store, write_retries },
            notifications: NotificationSettings { webhook_url, timeout_seconds },
            telemetry: TelemetrySettings { log_level, json, prometheus_enabled },
        };

        settings.validate()?;

        Ok(settings)
    }

    pub(crate) fn server_addr(&self) -> String {
        format!("{}:{}", self.server.host.0, self.server.port.0)
    }

    pub(crate) fn server_host(&self) -> &str {
        &self.server.host.0
    }

    pub(crate) fn server_port(&self) -> u16 {
        self.server.port.0
    }

    pub(crate) fn api(&self) -> &ApiSettings {
        &self.api
    }

    pub(crate) fn security(&self) -> &SecuritySettings {
        &self.security
    }

    pub(crate) fn cors(&self) -> &CorsSettings {
        &self.cors
    }

    pub(crate) fn database(&self) -> &DatabaseSettings {
        &self.database
    }

    pub(crate) fn exam(&self) -> &ExamSettings {
        &self.exam
    }

    pub(crate) fn notifications(&self) -> &NotificationSettings {
        &self.notifications
    }

    pub(crate) fn telemetry(&self) -> &TelemetrySettings {
        &self.telemetry
    }

    pub(crate) fn runtime(&self) -> &RuntimeSettings {
        &self.runtime
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.exam.write_retries == 0 || self.exam.write_retries > MAX_WRITE_RETRIES {
            return Err(ConfigError::InvalidValue {
                field: "EXAM_WRITE_RETRIES",
                value: self.exam.write_retries.to_string(),
            });
        }

        if self.notifications.timeout_seconds == 0 {
            return Err(ConfigError::InvalidValue {
                field: "NOTIFY_TIMEOUT_SECONDS",
                value: "0".to_string(),
            });
        }

        if let Some(url) = &self.notifications.webhook_url {
            if !(url.starts_with("http://") || url.starts_with("https://")) {
                return Err(ConfigError::InvalidValue {
                    field: "NOTIFY_WEBHOOK_URL",
                    value: url.clone(),
                });
            }
        }

        if self.security.algorithm != "HS256" {
            return Err(ConfigError::InvalidValue {
                field: "ALGORITHM",
                value: self.security.algorithm.clone(),
            });
        }

        if !(self.runtime.strict_config || self.runtime.environment.is_production()) {
            return Ok(());
        }

        if self.exam.store == StoreBackend::Postgres
            && self.database.database_url.is_none()
            && self.database.postgres_password.is_empty()
        {
            return Err(ConfigError::MissingSecret("POSTGRES_PASSWORD"));
        }

        Ok(())
    }
}
