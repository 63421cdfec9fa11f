//! Configuration module - environment variable parsing

use std::env;
use std::net::SocketAddr;
use std::str::FromStr;

use crate::game::GameConfig;

/// Application configuration loaded from environment variables
#[derive(Clone, Debug)]
pub struct Config {
    /// Server binding address
    pub server_addr: SocketAddr,
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,

    /// HMAC secret for JWT verification
    pub jwt_secret: String,
    /// Allowed client origin for CORS; any origin when unset
    pub client_origin: Option<String>,

    /// Hosted game storage; games stay in memory without it
    pub supabase: Option<SupabaseConfig>,

    /// Match tuning
    pub game: GameConfig,
}

/// Supabase connection settings
#[derive(Clone, Debug)]
pub struct SupabaseConfig {
    /// Supabase project URL
    pub url: String,
    /// Supabase service role key (bypasses RLS - server only!)
    pub service_role_key: String,
}

impl Config {
    /// Load configuration from environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|name| env::var(name).ok())
    }

    /// Load configuration from any name -> value source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self, ConfigError> {
        // Render provides PORT env var, fall back to SERVER_ADDR or default
        let server_addr = match lookup("PORT") {
            Some(port) => format!("0.0.0.0:{}", port),
            None => lookup("SERVER_ADDR").unwrap_or_else(|| "0.0.0.0:8080".to_string()),
        };

        let jwt_secret = lookup("JWT_SECRET")
            .or_else(|| lookup("SUPABASE_JWT_SECRET"))
            .ok_or(ConfigError::Missing("JWT_SECRET"))?;

        let supabase = match (lookup("SUPABASE_URL"), lookup("SUPABASE_SERVICE_ROLE_KEY")) {
            (Some(url), Some(service_role_key)) => Some(SupabaseConfig {
                url,
                service_role_key,
            }),
            (None, None) => None,
            (Some(_), None) => return Err(ConfigError::Missing("SUPABASE_SERVICE_ROLE_KEY")),
            (None, Some(_)) => return Err(ConfigError::Missing("SUPABASE_URL")),
        };

        let defaults = GameConfig::default();
        let game = GameConfig {
            actions_per_turn: parse_or(&lookup, "ACTIONS_PER_TURN", defaults.actions_per_turn)?,
            aerial_vision_range: parse_or(
                &lookup,
                "AERIAL_VISION_RANGE",
                defaults.aerial_vision_range,
            )?,
            naval_vision_range: parse_or(
                &lookup,
                "NAVAL_VISION_RANGE",
                defaults.naval_vision_range,
            )?,
            missile_max_distance: parse_or(
                &lookup,
                "MISSILE_MAX_DISTANCE",
                defaults.missile_max_distance,
            )?,
            naval_damage_fraction: parse_or(
                &lookup,
                "MISSILE_DAMAGE_PERCENT_ON_NAVAL",
                defaults.naval_damage_fraction,
            )?,
            ..defaults
        };
        game.validate()
            .map_err(|e| ConfigError::InvalidGame(e.to_string()))?;

        Ok(Self {
            server_addr: server_addr
                .parse()
                .map_err(|_| ConfigError::InvalidAddress)?,
            log_level: lookup("LOG_LEVEL").unwrap_or_else(|| "info".to_string()),
            jwt_secret,
            client_origin: lookup("CLIENT_ORIGIN"),
            supabase,
            game,
        })
    }
}

fn parse_or<T: FromStr>(
    lookup: &impl Fn(&str) -> Option<String>,
    name: &'static str,
    default: T,
) -> Result<T, ConfigError> {
    match lookup(name) {
        None => Ok(default),
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { name, value: raw }),
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid server address format")]
    InvalidAddress,

    #[error("Invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },

    #[error("Invalid game tuning: {0}")]
    InvalidGame(String),
}
