//! Configuration for the PayOS server: environment selector, per-service
//! overrides, feature flags, and bind address.
//!
//! Fields are resolved env-first with hardcoded fallbacks, the way the
//! facilitator server this was modeled on resolves its own `Config`.

use clap::Parser;
use std::collections::HashMap;
use std::net::IpAddr;
use std::str::FromStr;

/// CLI arguments for the PayOS server binary.
#[derive(Parser, Debug)]
#[command(name = "payos-server")]
#[command(about = "PayOS multi-protocol settlement and orchestration HTTP server")]
struct CliArgs {
    /// Bind port. Overrides `PORT`.
    #[arg(long, env = "PORT")]
    port: Option<u16>,
    /// Bind host. Overrides `HOST`.
    #[arg(long, env = "HOST")]
    host: Option<String>,
}

/// Three-valued environment selector.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Environment {
    Mock,
    Sandbox,
    Production,
}

impl Default for Environment {
    fn default() -> Self {
        Environment::Mock
    }
}

impl std::fmt::Display for Environment {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Environment::Mock => "mock",
            Environment::Sandbox => "sandbox",
            Environment::Production => "production",
        };
        write!(f, "{s}")
    }
}

impl FromStr for Environment {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "mock" => Ok(Environment::Mock),
            "sandbox" => Ok(Environment::Sandbox),
            "production" => Ok(Environment::Production),
            other => Err(ConfigError::InvalidEnvironment(other.to_string())),
        }
    }
}

/// Per-service environment overrides: circle, blockchain, x402, stripe, compliance, fx.
#[derive(Debug, Clone, Default)]
pub struct ServiceEnvironments {
    pub circle: Option<Environment>,
    pub blockchain: Option<Environment>,
    pub x402: Option<Environment>,
    pub stripe: Option<Environment>,
    pub compliance: Option<Environment>,
    pub fx: Option<Environment>,
}

impl ServiceEnvironments {
    fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            circle: Self::read("PAYOS_CIRCLE_ENV")?,
            blockchain: Self::read("PAYOS_BLOCKCHAIN_ENV")?,
            x402: Self::read("PAYOS_X402_ENV")?,
            stripe: Self::read("PAYOS_STRIPE_ENV")?,
            compliance: Self::read("PAYOS_COMPLIANCE_ENV")?,
            fx: Self::read("PAYOS_FX_ENV")?,
        })
    }

    fn read(var: &str) -> Result<Option<Environment>, ConfigError> {
        match std::env::var(var) {
            Ok(value) => Environment::from_str(&value).map(Some),
            Err(_) => Ok(None),
        }
    }

    /// Resolve a given service's environment, falling back to the global selector.
    pub fn resolve(&self, service: Option<Environment>, global: Environment) -> Environment {
        service.unwrap_or(global)
    }
}

/// Boolean rollout flags, read as `PAYOS_FEATURE_<NAME>`.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    flags: HashMap<&'static str, bool>,
}

const DEFAULT_ENABLED_FEATURES: &[&str] = &[
    "AP2_MANDATES",
    "ACP_CHECKOUTS",
    "BATCH_SIMULATIONS",
    "CONTEXT_CACHE",
    "X402_FACILITATOR",
    "CROSS_BORDER_FX",
    "PIX_RAIL",
    "SPEI_RAIL",
    "CVU_RAIL",
    "PSE_RAIL",
    "REFUNDS",
    "CAPABILITIES_REGISTRY",
];

impl FeatureFlags {
    fn from_env() -> Self {
        let mut flags = HashMap::new();
        for name in DEFAULT_ENABLED_FEATURES {
            let var = format!("PAYOS_FEATURE_{name}");
            let enabled = match std::env::var(&var) {
                Ok(value) => matches!(value.to_ascii_lowercase().as_str(), "1" | "true" | "yes"),
                Err(_) => true,
            };
            flags.insert(*name, enabled);
        }
        Self { flags }
    }

    pub fn is_enabled(&self, name: &str) -> bool {
        self.flags.get(name).copied().unwrap_or(false)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid PAYOS_ENVIRONMENT value: {0}")]
    InvalidEnvironment(String),
    #[error("invalid bind host: {0}")]
    InvalidHost(String),
    #[error(
        "refusing to start in production: set PAYOS_ALLOW_PRODUCTION=true once credentials are provisioned"
    )]
    ProductionNotAllowed,
}

/// Server configuration, resolved from CLI args, environment variables, and defaults.
#[derive(Debug, Clone)]
pub struct Config {
    port: u16,
    host: IpAddr,
    environment: Environment,
    service_environments: ServiceEnvironments,
    feature_flags: FeatureFlags,
}

mod config_defaults {
    pub fn default_port() -> u16 {
        8080
    }
    pub fn default_host() -> std::net::IpAddr {
        std::net::IpAddr::from([0, 0, 0, 0])
    }
}

impl Config {
    /// Loads configuration from CLI args / environment, applying boot-time validation.
    pub fn load() -> Result<Self, ConfigError> {
        let args = CliArgs::parse();

        let port = args
            .port
            .or_else(|| std::env::var("PORT").ok().and_then(|v| v.parse().ok()))
            .unwrap_or_else(config_defaults::default_port);

        let host = match args.host.or_else(|| std::env::var("HOST").ok()) {
            Some(raw) => raw
                .parse::<IpAddr>()
                .map_err(|_| ConfigError::InvalidHost(raw))?,
            None => config_defaults::default_host(),
        };

        let environment = match std::env::var("PAYOS_ENVIRONMENT") {
            Ok(value) => Environment::from_str(&value)?,
            Err(_) => Environment::default(),
        };

        let service_environments = ServiceEnvironments::from_env()?;
        let feature_flags = FeatureFlags::from_env();

        let config = Self {
            port,
            host,
            environment,
            service_environments,
            feature_flags,
        };
        config.validate()?;
        Ok(config)
    }

    /// Boot-time validation: refuses production unless explicitly unlocked.
    fn validate(&self) -> Result<(), ConfigError> {
        if self.environment == Environment::Production {
            let allowed = std::env::var("PAYOS_ALLOW_PRODUCTION")
                .map(|v| matches!(v.to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
                .unwrap_or(false);
            if !allowed {
                return Err(ConfigError::ProductionNotAllowed);
            }
        }
        Ok(())
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn host(&self) -> IpAddr {
        self.host
    }

    pub fn environment(&self) -> Environment {
        self.environment
    }

    pub fn service_environments(&self) -> &ServiceEnvironments {
        &self.service_environments
    }

    pub fn feature_flags(&self) -> &FeatureFlags {
        &self.feature_flags
    }

    /// Builds a config without touching CLI args or the environment, for
    /// integration tests that need an `AppState` without going through
    /// `load()`'s argv parsing.
    pub fn for_testing() -> Self {
        Self {
            port: config_defaults::default_port(),
            host: config_defaults::default_host(),
            environment: Environment::Mock,
            service_environments: ServiceEnvironments::default(),
            feature_flags: FeatureFlags::from_env(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn environment_parses_case_insensitively() {
        assert_eq!(Environment::from_str("Production").unwrap(), Environment::Production);
        assert_eq!(Environment::from_str("sandbox").unwrap(), Environment::Sandbox);
    }

    #[test]
    fn environment_rejects_unknown_value() {
        assert!(Environment::from_str("staging").is_err());
    }

    #[test]
    fn service_environments_fall_back_to_global() {
        let envs = ServiceEnvironments::default();
        assert_eq!(envs.resolve(None, Environment::Sandbox), Environment::Sandbox);
        assert_eq!(
            envs.resolve(Some(Environment::Production), Environment::Sandbox),
            Environment::Production
        );
    }
}
