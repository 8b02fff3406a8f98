use std::env;
use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 3001;
pub const DEFAULT_API_URL: &str = "http://localhost:3001/api";
pub const MAX_UPLOAD_BYTES: usize = 10 * 1024 * 1024;

#[derive(Debug, Clone)]
pub struct PostgresConfig {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub username: Option<String>,
    pub password: Option<String>,
    pub database: Option<String>,
}

#[derive(Debug, Clone)]
pub struct DatabaseConfig {
    /// SQLite file. `None` keeps everything in memory.
    pub path: Option<PathBuf>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub secret: String,
    pub token_ttl: chrono::Duration,
}

/// Knobs of the simulated generation backend.
#[derive(Debug, Clone)]
pub struct SimulationConfig {
    pub failure_rate: f64,
    pub min_latency: Duration,
    pub max_latency: Duration,
}

#[derive(Debug, Clone)]
pub struct UploadConfig {
    pub dir: PathBuf,
    pub max_bytes: usize,
}

#[derive(Debug, Clone)]
pub struct ClientConfig {
    pub base_url: String,
    pub timeout: Option<Duration>,
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: Option<u16>,
    pub use_psql: bool,
    pub database: DatabaseConfig,
    pub postgres: Option<PostgresConfig>,
    pub auth: AuthConfig,
    pub simulation: SimulationConfig,
    pub uploads: UploadConfig,
}

impl Default for PostgresConfig {
    fn default() -> Self {
        PostgresConfig {
            host: None,
            port: None,
            username: None,
            password: None,
            database: None,
        }
    }
}

impl PostgresConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        PostgresConfig {
            host: env::var("POSTGRES_HOST").ok(),
            port: env::var("POSTGRES_PORT").ok().and_then(|s| s.parse().ok()),
            username: env::var("POSTGRES_USERNAME").ok(),
            password: env::var("POSTGRES_PASSWORD").ok(),
            database: env::var("POSTGRES_DATABASE").ok(),
        }
    }

    pub fn with_credentials(
        mut self,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.username = Some(username.into());
        self.password = Some(password.into());
        self
    }

    pub fn with_connection_info(
        mut self,
        host: impl Into<String>,
        port: u16,
        database: impl Into<String>,
    ) -> Self {
        self.host = Some(host.into());
        self.port = Some(port);
        self.database = Some(database.into());
        self
    }
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        DatabaseConfig {
            path: Some(PathBuf::from("data/database.sqlite")),
        }
    }
}

impl DatabaseConfig {
    pub fn in_memory() -> Self {
        DatabaseConfig { path: None }
    }

    pub fn with_path(path: impl Into<PathBuf>) -> Self {
        DatabaseConfig {
            path: Some(path.into()),
        }
    }
}

/// Hours outside what `chrono::Duration` can hold are rejected.
fn parse_ttl_hours(raw: &str) -> Option<chrono::Duration> {
    let hours = raw.trim().parse::<i64>().ok()?;
    match chrono::Duration::try_hours(hours) {
        Some(ttl) => Some(ttl),
        None => {
            log::warn!("⚠️  TOKEN_TTL_HOURS={} is out of range, using default", hours);
            None
        }
    }
}

impl Default for AuthConfig {
    fn default() -> Self {
        AuthConfig {
            secret: "your-secret-key-change-in-production".to_string(),
            token_ttl: chrono::Duration::days(7),
        }
    }
}

impl AuthConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        AuthConfig {
            secret: env::var("AUTH_SECRET").unwrap_or(defaults.secret),
            token_ttl: env::var("TOKEN_TTL_HOURS")
                .ok()
                .and_then(|h| parse_ttl_hours(&h))
                .unwrap_or(defaults.token_ttl),
        }
    }

    pub fn with_secret(mut self, secret: impl Into<String>) -> Self {
        self.secret = secret.into();
        self
    }

    pub fn with_token_ttl(mut self, ttl: chrono::Duration) -> Self {
        self.token_ttl = ttl;
        self
    }
}

impl Default for SimulationConfig {
    fn default() -> Self {
        SimulationConfig {
            failure_rate: 0.2,
            min_latency: Duration::from_millis(1000),
            max_latency: Duration::from_millis(2000),
        }
    }
}

impl SimulationConfig {
    pub fn from_env() -> Self {
        let defaults = Self::default();
        let millis = |key: &str| {
            env::var(key)
                .ok()
                .and_then(|v| v.parse::<u64>().ok())
                .map(Duration::from_millis)
        };
        SimulationConfig {
            failure_rate: env::var("SIMULATED_FAILURE_RATE")
                .ok()
                .and_then(|v| v.parse().ok())
                .unwrap_or(defaults.failure_rate),
            min_latency: millis("SIMULATED_LATENCY_MIN_MS").unwrap_or(defaults.min_latency),
            max_latency: millis("SIMULATED_LATENCY_MAX_MS").unwrap_or(defaults.max_latency),
        }
    }

    pub fn with_failure_rate(mut self, rate: f64) -> Self {
        self.failure_rate = rate;
        self
    }

    pub fn with_latency(mut self, min: Duration, max: Duration) -> Self {
        self.min_latency = min;
        self.max_latency = max;
        self
    }
}

impl Default for UploadConfig {
    fn default() -> Self {
        UploadConfig {
            dir: PathBuf::from("uploads"),
            max_bytes: MAX_UPLOAD_BYTES,
        }
    }
}

impl UploadConfig {
    pub fn with_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.dir = dir.into();
        self
    }
}

impl Default for ClientConfig {
    fn default() -> Self {
        ClientConfig {
            base_url: DEFAULT_API_URL.to_string(),
            timeout: Some(Duration::from_secs(30)),
        }
    }
}

impl ClientConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        ClientConfig {
            base_url: base_url.into(),
            ..Self::default()
        }
    }

    pub fn from_env() -> Self {
        match env::var("STUDIO_API_URL") {
            Ok(url) => Self::new(url),
            Err(_) => Self::default(),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            port: None,
            use_psql: false,
            database: DatabaseConfig::default(),
            postgres: None,
            auth: AuthConfig::default(),
            simulation: SimulationConfig::default(),
            uploads: UploadConfig::default(),
        }
    }
}

impl Config {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_env() -> Self {
        let port = env::var("PORT").ok().and_then(|port| port.parse().ok());
        let use_psql = env::var("USE_PSQL").ok().map_or(false, |val| val == "true");
        let database = match env::var("DATABASE_PATH") {
            Ok(path) if path == ":memory:" => DatabaseConfig::in_memory(),
            Ok(path) => DatabaseConfig::with_path(path),
            Err(_) => DatabaseConfig::default(),
        };
        let uploads = match env::var("UPLOAD_DIR") {
            Ok(dir) => UploadConfig::default().with_dir(dir),
            Err(_) => UploadConfig::default(),
        };

        Config {
            port,
            use_psql,
            database,
            postgres: use_psql.then(PostgresConfig::from_env),
            auth: AuthConfig::from_env(),
            simulation: SimulationConfig::from_env(),
            uploads,
        }
    }

    pub fn port(&self) -> u16 {
        self.port.unwrap_or(DEFAULT_PORT)
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = Some(port);
        self
    }

    pub fn with_database(mut self, database: DatabaseConfig) -> Self {
        self.database = database;
        self
    }

    pub fn with_postgres(mut self, config: PostgresConfig) -> Self {
        self.postgres = Some(config);
        self.use_psql = true;
        self
    }

    pub fn with_auth(mut self, auth: AuthConfig) -> Self {
        self.auth = auth;
        self
    }

    pub fn with_simulation(mut self, simulation: SimulationConfig) -> Self {
        self.simulation = simulation;
        self
    }

    pub fn with_uploads(mut self, uploads: UploadConfig) -> Self {
        self.uploads = uploads;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_match_simulated_backend() {
        let config = Config::default();
        assert_eq!(config.port(), DEFAULT_PORT);
        assert!(!config.use_psql);
        assert_eq!(config.simulation.failure_rate, 0.2);
        assert_eq!(config.simulation.min_latency, Duration::from_secs(1));
        assert_eq!(config.simulation.max_latency, Duration::from_secs(2));
        assert_eq!(config.uploads.max_bytes, 10 * 1024 * 1024);
        assert_eq!(config.auth.token_ttl, chrono::Duration::days(7));
    }

    #[test]
    fn test_builders() {
        let config = Config::new()
            .with_port(8080)
            .with_database(DatabaseConfig::in_memory())
            .with_postgres(PostgresConfig::new().with_credentials("studio", "pw"))
            .with_simulation(
                SimulationConfig::default()
                    .with_failure_rate(1.0)
                    .with_latency(Duration::ZERO, Duration::ZERO),
            );
        assert_eq!(config.port(), 8080);
        assert!(config.database.path.is_none());
        assert!(config.use_psql);
        assert_eq!(
            config.postgres.and_then(|p| p.username),
            Some("studio".to_string())
        );
        assert_eq!(config.simulation.failure_rate, 1.0);
        assert_eq!(config.simulation.max_latency, Duration::ZERO);
    }

    #[test]
    fn test_ttl_hours_parsing() {
        assert_eq!(parse_ttl_hours("24"), Some(chrono::Duration::hours(24)));
        assert_eq!(parse_ttl_hours(" 1 "), Some(chrono::Duration::hours(1)));
        assert_eq!(parse_ttl_hours("soon"), None);
        assert_eq!(parse_ttl_hours("9223372036854775807"), None);
        assert_eq!(parse_ttl_hours("3000000000000"), None);
    }
}
