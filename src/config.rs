use alloy_primitives::{address, Address};
use std::env;
use std::net::SocketAddr;
use zeroize::Zeroizing;

/// Anons governance token on Base.
pub const DEFAULT_TOKEN_CONTRACT: Address = address!("1ad890FCE6cB865737A3411E7d04f1F5668b0686");

/// ERC-8004 agent identity registry on Base.
pub const DEFAULT_AGENT_REGISTRY: Address = address!("00256C0D814c455425A0699D5eEE2A7DB7A5519c");

#[derive(Clone)]
pub struct Config {
    // Sessions
    pub session_secret: Zeroizing<String>,
    pub session_ttl_secs: u64,

    // Server
    pub bind_addr: SocketAddr,
    pub trusted_proxy_count: usize,
    pub cors_allow_any_origin: bool,

    // Challenge
    pub api_domain: String,
    pub api_uri: String,
    pub chain_id: u64,
    pub nonce_ttl_secs: u64,

    // Ledger
    pub rpc_url: Option<String>,
    pub token_contract: Address,
    pub delegation_contract: Address,
    pub agent_registry: Address,
    pub capability_cache_ttl_secs: u64,
    pub ledger_query_timeout_ms: u64,
    pub ledger_deadline_ms: u64,

    // Redis (optional shared store)
    pub redis_url: Option<String>,

    // Rate limiting
    pub rate_limit_per_window: u64,
    pub rate_limit_window_secs: u64,
    pub rate_limit_auth_per_window: u64,

    // Maintenance
    pub cleanup_interval_secs: u64,

    // Policy
    pub holder_recheck: bool,
    pub require_registered_agent: bool,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("session_secret", &"[REDACTED]")
            .field("session_ttl_secs", &self.session_ttl_secs)
            .field("bind_addr", &self.bind_addr)
            .field("trusted_proxy_count", &self.trusted_proxy_count)
            .field("cors_allow_any_origin", &self.cors_allow_any_origin)
            .field("api_domain", &self.api_domain)
            .field("api_uri", &self.api_uri)
            .field("chain_id", &self.chain_id)
            .field("nonce_ttl_secs", &self.nonce_ttl_secs)
            .field("rpc_url", &self.rpc_url.as_ref().map(|_| "[REDACTED]"))
            .field("token_contract", &self.token_contract)
            .field("delegation_contract", &self.delegation_contract)
            .field("agent_registry", &self.agent_registry)
            .field("capability_cache_ttl_secs", &self.capability_cache_ttl_secs)
            .field("ledger_query_timeout_ms", &self.ledger_query_timeout_ms)
            .field("ledger_deadline_ms", &self.ledger_deadline_ms)
            .field("redis_url", &self.redis_url.as_ref().map(|_| "[REDACTED]"))
            .field("rate_limit_per_window", &self.rate_limit_per_window)
            .field("rate_limit_window_secs", &self.rate_limit_window_secs)
            .field("rate_limit_auth_per_window", &self.rate_limit_auth_per_window)
            .field("cleanup_interval_secs", &self.cleanup_interval_secs)
            .field("holder_recheck", &self.holder_recheck)
            .field("require_registered_agent", &self.require_registered_agent)
            .finish()
    }
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),

    #[error("Failed to parse {0}: {1}")]
    ParseError(String, String),
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        // Attempt to load .env file, but don't fail if it doesn't exist
        // (env vars may be set directly in production)
        let _ = dotenvy::dotenv();

        // Session secret is required; anything shorter than 32 bytes is refused
        let session_secret = Zeroizing::new(
            env::var("SESSION_SECRET")
                .map_err(|_| ConfigError::MissingVar("SESSION_SECRET".to_string()))?,
        );
        if session_secret.len() < 32 {
            return Err(ConfigError::InvalidValue(
                "SESSION_SECRET".to_string(),
                "must be at least 32 bytes".to_string(),
            ));
        }
        let session_ttl_secs = parse_env_or_default("SESSION_TTL_SECS", 86_400)?;
        if session_ttl_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "SESSION_TTL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // Server
        let bind_addr_str = env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3128".to_string());
        let bind_addr = bind_addr_str
            .parse::<SocketAddr>()
            .map_err(|e| ConfigError::ParseError("BIND_ADDR".to_string(), e.to_string()))?;
        let trusted_proxy_count = parse_env_or_default("TRUSTED_PROXY_COUNT", 0)?;
        let cors_allow_any_origin = parse_env_or_default("CORS_ALLOW_ANY_ORIGIN", true)?;

        // Challenge
        let api_domain = env::var("API_DOMAIN").unwrap_or_else(|_| "api.anons.lol".to_string());
        if api_domain.is_empty() || api_domain.chars().any(char::is_whitespace) {
            return Err(ConfigError::InvalidValue(
                "API_DOMAIN".to_string(),
                "must be a non-empty host without whitespace".to_string(),
            ));
        }
        let api_uri = env::var("API_URI").unwrap_or_else(|_| format!("https://{}/auth", api_domain));
        let chain_id = parse_env_or_default("CHAIN_ID", 8453)?;
        let nonce_ttl_secs = parse_env_or_default("NONCE_TTL_SECS", 300)?;

        // Ledger
        let rpc_url = optional_env("RPC_URL");
        let token_contract = parse_env_or_default("TOKEN_CONTRACT", DEFAULT_TOKEN_CONTRACT)?;
        let delegation_contract = parse_env_or_default("DELEGATION_CONTRACT", token_contract)?;
        let agent_registry = parse_env_or_default("AGENT_REGISTRY", DEFAULT_AGENT_REGISTRY)?;
        let capability_cache_ttl_secs = parse_env_or_default("CAPABILITY_CACHE_TTL_SECS", 30)?;
        let ledger_query_timeout_ms = parse_env_or_default("LEDGER_QUERY_TIMEOUT_MS", 3_000)?;
        let ledger_deadline_ms = parse_env_or_default("LEDGER_DEADLINE_MS", 5_000)?;
        // A batch deadline shorter than one query would cut every query off
        if ledger_deadline_ms < ledger_query_timeout_ms {
            return Err(ConfigError::InvalidValue(
                "LEDGER_DEADLINE_MS".to_string(),
                "must be at least LEDGER_QUERY_TIMEOUT_MS".to_string(),
            ));
        }

        // Redis
        let redis_url = optional_env("REDIS_URL");

        // Rate limiting
        let rate_limit_per_window = parse_env_or_default("RATE_LIMIT_PER_WINDOW", 60)?;
        let rate_limit_window_secs = parse_env_or_default("RATE_LIMIT_WINDOW_SECS", 60)?;
        let rate_limit_auth_per_window = parse_env_or_default("RATE_LIMIT_AUTH_PER_WINDOW", 10)?;
        if rate_limit_window_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "RATE_LIMIT_WINDOW_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // Maintenance
        let cleanup_interval_secs = parse_env_or_default("CLEANUP_INTERVAL_SECS", 300)?;
        if cleanup_interval_secs == 0 {
            return Err(ConfigError::InvalidValue(
                "CLEANUP_INTERVAL_SECS".to_string(),
                "must be greater than zero".to_string(),
            ));
        }

        // Policy
        let holder_recheck = parse_env_or_default("HOLDER_RECHECK", true)?;
        let require_registered_agent = parse_env_or_default("REQUIRE_REGISTERED_AGENT", false)?;

        Ok(Config {
            session_secret,
            session_ttl_secs,
            bind_addr,
            trusted_proxy_count,
            cors_allow_any_origin,
            api_domain,
            api_uri,
            chain_id,
            nonce_ttl_secs,
            rpc_url,
            token_contract,
            delegation_contract,
            agent_registry,
            capability_cache_ttl_secs,
            ledger_query_timeout_ms,
            ledger_deadline_ms,
            redis_url,
            rate_limit_per_window,
            rate_limit_window_secs,
            rate_limit_auth_per_window,
            cleanup_interval_secs,
            holder_recheck,
            require_registered_agent,
        })
    }

    /// `eip155:{chain}:{registry}` as embedded in challenge messages.
    pub fn agent_registry_id(&self) -> String {
        format!("eip155:{}:{}", self.chain_id, self.agent_registry)
    }
}

/// Unset and empty are treated alike.
fn optional_env(key: &str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

/// Helper function to parse environment variable with a default value
fn parse_env_or_default<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env::var(key) {
        Ok(val) => val
            .trim()
            .parse::<T>()
            .map_err(|e| ConfigError::ParseError(key.to_string(), format!("{}: {}", e, val))),
        Err(_) => Ok(default),
    }
}
