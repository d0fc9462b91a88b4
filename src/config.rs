use std::env;

/// AppConfig
///
/// Holds the application's entire configuration state. Immutable once loaded and pulled
/// into handlers through `FromRef`, so every component sees the same values.
#[derive(Clone, Debug)]
pub struct AppConfig {
    // Runtime environment marker. Selects log format and which secrets are mandatory.
    pub env: Env,
    // Socket address the HTTP server binds to.
    pub bind_addr: String,
    // Postgres connection string. `None` in local mode runs against the in-memory store.
    pub db_url: Option<String>,
    // HMAC secret used to sign and verify session tokens (HS256).
    pub jwt_secret: String,
    // Session lifetime in hours.
    pub jwt_ttl_hours: i64,
    // Reset ticket lifetime in minutes.
    pub reset_ttl_minutes: i64,
    pub argon2: Argon2Config,
    pub mail: MailConfig,
}

/// Env
///
/// Defines the runtime context. Local gets pretty logs and tolerant defaults; Production
/// gets JSON logs and refuses to start without its secrets.
#[derive(Clone, PartialEq, Debug)]
pub enum Env {
    Local,
    Production,
}

/// Argon2id cost parameters for password hashing.
#[derive(Clone, Debug, PartialEq)]
pub struct Argon2Config {
    pub memory_kib: u32,
    pub iterations: u32,
    pub parallelism: u32,
}

impl Default for Argon2Config {
    fn default() -> Self {
        // OWASP baseline for Argon2id: 19 MiB, 2 passes, 1 lane.
        Self {
            memory_kib: 19 * 1024,
            iterations: 2,
            parallelism: 1,
        }
    }
}

/// Mail delivery settings. When `api_url` is `None` reset mails are only logged.
#[derive(Clone, Debug, Default)]
pub struct MailConfig {
    pub api_url: Option<String>,
    pub api_key: Option<String>,
    pub from: String,
    // Prefix of the link sent in reset mails; the secret is appended as a path segment.
    pub reset_url_base: String,
}

impl Default for AppConfig {
    /// default
    ///
    /// Safe, non-panicking values for tests. Argon2 costs are the minimum the algorithm
    /// accepts so test suites do not spend seconds hashing.
    fn default() -> Self {
        Self {
            env: Env::Local,
            bind_addr: "127.0.0.1:3000".to_string(),
            db_url: None,
            jwt_secret: "super-secure-test-secret-value-local".to_string(),
            jwt_ttl_hours: 24,
            reset_ttl_minutes: 15,
            argon2: Argon2Config {
                memory_kib: 8,
                iterations: 1,
                parallelism: 1,
            },
            mail: MailConfig {
                api_url: None,
                api_key: None,
                from: "no-reply@inkwell.local".to_string(),
                reset_url_base: "http://localhost:5173/reset-password".to_string(),
            },
        }
    }
}

impl AppConfig {
    /// load
    ///
    /// Reads every parameter from the environment once at startup.
    ///
    /// # Panics
    /// Panics if a variable required by the current environment is missing or a numeric
    /// variable does not parse, so the server never starts half-configured.
    pub fn load() -> Self {
        let env_str = env::var("APP_ENV").unwrap_or_else(|_| "local".to_string());
        let env = match env_str.as_str() {
            "production" => Env::Production,
            _ => Env::Local,
        };

        let jwt_secret = match env {
            Env::Production => {
                env::var("JWT_SECRET").expect("FATAL: JWT_SECRET must be set in production.")
            }
            Env::Local => env::var("JWT_SECRET")
                .unwrap_or_else(|_| "super-secure-test-secret-value-local".to_string()),
        };

        let db_url = match env {
            Env::Production => Some(
                env::var("DATABASE_URL").expect("FATAL: DATABASE_URL required in prod"),
            ),
            Env::Local => env::var("DATABASE_URL").ok(),
        };

        let api_url = env::var("MAIL_API_URL").ok();
        if env == Env::Production && api_url.is_none() {
            panic!("FATAL: MAIL_API_URL required in prod");
        }

        let argon2_defaults = Argon2Config::default();

        Self {
            bind_addr: env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            db_url,
            jwt_secret,
            jwt_ttl_hours: parse_var("JWT_TTL_HOURS", 24),
            reset_ttl_minutes: parse_var("RESET_TICKET_TTL_MINUTES", 15),
            argon2: Argon2Config {
                memory_kib: parse_var("ARGON2_MEMORY_KIB", argon2_defaults.memory_kib),
                iterations: parse_var("ARGON2_ITERATIONS", argon2_defaults.iterations),
                parallelism: parse_var("ARGON2_PARALLELISM", argon2_defaults.parallelism),
            },
            mail: MailConfig {
                api_url,
                api_key: env::var("MAIL_API_KEY").ok(),
                from: env::var("MAIL_FROM").unwrap_or_else(|_| "no-reply@inkwell.local".to_string()),
                reset_url_base: env::var("RESET_URL_BASE")
                    .unwrap_or_else(|_| "http://localhost:5173/reset-password".to_string()),
            },
            env,
        }
    }
}

fn parse_var<T: std::str::FromStr>(name: &str, default: T) -> T {
    match env::var(name) {
        Ok(raw) => raw
            .parse()
            .unwrap_or_else(|_| panic!("FATAL: {name} must be a number, got '{raw}'")),
        Err(_) => default,
    }
}
