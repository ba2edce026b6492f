use dotenvy::dotenv;
use std::env;

/// Process-wide configuration, loaded once at startup. Required variables
/// fail fast with `.expect(...)`; optional ones fall back to the defaults
/// below, matching the teacher's `AppEnv::new()` convention.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_port: u16,
    pub allowed_origins: Vec<String>,

    pub auth: AuthConfig,
    pub redis: RedisConfig,
    pub sfu_addr: String,
    pub summary_service_addr: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AuthConfig {
    pub auth0_domain: String,
    pub auth0_audience: String,
    pub skip_auth: bool,
}

#[derive(Debug, Clone)]
pub struct RedisConfig {
    pub enabled: bool,
    pub addr: String,
    pub password: Option<String>,
}

impl AppConfig {
    pub fn new() -> Self {
        dotenv().ok();

        let skip_auth = Self::get_bool_env("SKIP_AUTH", false);

        Self {
            app_port: Self::get_env("PORT", 3000),
            allowed_origins: Self::get_list_env("ALLOWED_ORIGINS", vec!["*".to_string()]),
            auth: AuthConfig {
                auth0_domain: if skip_auth {
                    env::var("AUTH0_DOMAIN").unwrap_or_default()
                } else {
                    env::var("AUTH0_DOMAIN").expect("AUTH0_DOMAIN must be set")
                },
                auth0_audience: if skip_auth {
                    env::var("AUTH0_AUDIENCE").unwrap_or_default()
                } else {
                    env::var("AUTH0_AUDIENCE").expect("AUTH0_AUDIENCE must be set")
                },
                skip_auth,
            },
            redis: RedisConfig {
                enabled: Self::get_bool_env("REDIS_ENABLED", false),
                addr: env::var("REDIS_ADDR").unwrap_or_else(|_| "127.0.0.1:6379".to_string()),
                password: env::var("REDIS_PASSWORD").ok(),
            },
            sfu_addr: env::var("RUST_SFU_ADDR").expect("RUST_SFU_ADDR must be set"),
            summary_service_addr: env::var("SUMMARY_SERVICE_ADDR").ok(),
        }
    }

    fn get_env<T: std::str::FromStr>(var: &str, default: T) -> T {
        env::var(var)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_bool_env(var: &str, default: bool) -> bool {
        env::var(var)
            .ok()
            .and_then(|v| v.parse().ok())
            .unwrap_or(default)
    }

    fn get_list_env(var: &str, default: Vec<String>) -> Vec<String> {
        env::var(var)
            .ok()
            .map(|v| v.split(',').map(|s| s.trim().to_string()).collect())
            .unwrap_or(default)
    }
}
