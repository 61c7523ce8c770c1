use std::path::PathBuf;

use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("missing required environment variable: {0}")]
    MissingEnvVar(String),
    #[error("invalid value for {name}: {message}")]
    InvalidValue { name: String, message: String },
    #[error("failed to parse {name} as integer: {source}")]
    ParseInt {
        name: String,
        #[source]
        source: std::num::ParseIntError,
    },
    #[error("failed to parse {name} as boolean: {value}")]
    ParseBool { name: String, value: String },
}

/// Default listing path of the board's user directory, sorted by karma.
pub const DEFAULT_USERLIST_PATH: &str =
    "/userlist.php?show_group=-1&sort_by=karma&sort_dir=DESC&username=-";

/// Crawler configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct Config {
    // Target board
    pub base_url: String,
    pub userlist_path: String,
    pub userlist_pages: usize,

    // Session
    pub session_cookie: Option<String>,
    pub cookie_name: String,

    // Transport
    pub proxy_url: String,

    // Logging
    pub log_verbosity: u8,
    pub log_file_path: PathBuf,

    // Output
    pub database_path: PathBuf,
    pub snapshot_dir: PathBuf,
    pub persist_to_database: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns an error if required environment variables are missing or invalid.
    pub fn from_env() -> Result<Self, ConfigError> {
        Ok(Self {
            // Target board
            base_url: required_env("CRAWLER_BASE_URL")?,
            userlist_path: env_or_default("CRAWLER_USERLIST_PATH", DEFAULT_USERLIST_PATH),
            userlist_pages: parse_env_usize("CRAWLER_USERLIST_PAGES", 25)?,

            // Session
            session_cookie: optional_env("CRAWLER_SESSION_COOKIE"),
            cookie_name: env_or_default("CRAWLER_COOKIE_NAME", "PHPSESSID"),

            // Transport
            proxy_url: env_or_default("CRAWLER_PROXY_URL", "socks5h://127.0.0.1:9050"),

            // Logging
            log_verbosity: parse_env_u8("LOG_VERBOSITY", 1)?,
            log_file_path: PathBuf::from(env_or_default("LOG_FILE_PATH", "./darknet-crawler.log")),

            // Output
            database_path: PathBuf::from(env_or_default("DATABASE_PATH", "./data/crawler.sqlite")),
            snapshot_dir: PathBuf::from(env_or_default("SNAPSHOT_DIR", "./data")),
            persist_to_database: parse_env_bool("PERSIST_TO_DATABASE", true)?,
        })
    }

    /// Configuration suitable for tests: nothing is read from the environment.
    #[must_use]
    pub fn for_testing() -> Self {
        Self {
            base_url: "http://forum.test".to_string(),
            userlist_path: DEFAULT_USERLIST_PATH.to_string(),
            userlist_pages: 25,
            session_cookie: Some("test-session-cookie".to_string()),
            cookie_name: "PHPSESSID".to_string(),
            proxy_url: "socks5h://127.0.0.1:9050".to_string(),
            log_verbosity: 1,
            log_file_path: PathBuf::from("./darknet-crawler.log"),
            database_path: PathBuf::from("./data/crawler.sqlite"),
            snapshot_dir: PathBuf::from("./data"),
            persist_to_database: false,
        }
    }

    /// Validate that the configuration is usable.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if url::Url::parse(&self.base_url).is_err() {
            return Err(ConfigError::InvalidValue {
                name: "CRAWLER_BASE_URL".to_string(),
                message: format!("'{}' is not an absolute URL", self.base_url),
            });
        }
        if self.userlist_pages == 0 {
            return Err(ConfigError::InvalidValue {
                name: "CRAWLER_USERLIST_PAGES".to_string(),
                message: "must be at least 1".to_string(),
            });
        }
        if self.cookie_name.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "CRAWLER_COOKIE_NAME".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if self.proxy_url.is_empty() {
            return Err(ConfigError::InvalidValue {
                name: "CRAWLER_PROXY_URL".to_string(),
                message: "cannot be empty".to_string(),
            });
        }
        if let Some(cookie) = &self.session_cookie {
            if !is_plausible_cookie(cookie) {
                return Err(ConfigError::InvalidValue {
                    name: "CRAWLER_SESSION_COOKIE".to_string(),
                    message: "must be at least 5 characters".to_string(),
                });
            }
        }
        Ok(())
    }

    /// URLs of every page of the user directory, in page order.
    ///
    /// Page 1 is the bare listing path, later pages append `&p=<n>`.
    #[must_use]
    pub fn userlist_urls(&self) -> Vec<String> {
        let base = self.base_url.trim_end_matches('/');
        let first = format!("{base}{}", self.userlist_path);
        std::iter::once(first.clone())
            .chain((2..=self.userlist_pages).map(|page| format!("{first}&p={page}")))
            .collect()
    }

    /// URL of the given 1-based user directory page.
    ///
    /// # Errors
    ///
    /// Returns an error if the page is outside `1..=userlist_pages`.
    pub fn userlist_start_url(&self, page: usize) -> Result<String, ConfigError> {
        if page == 0 || page > self.userlist_pages {
            return Err(ConfigError::InvalidValue {
                name: "start page".to_string(),
                message: format!(
                    "must be between 1 and {}, got {page}",
                    self.userlist_pages
                ),
            });
        }
        Ok(self.userlist_urls().swap_remove(page - 1))
    }
}

/// Session cookies shorter than this are certainly typos.
#[must_use]
pub fn is_plausible_cookie(cookie: &str) -> bool {
    cookie.trim().len() >= 5
}

fn required_env(name: &str) -> Result<String, ConfigError> {
    std::env::var(name).map_err(|_| ConfigError::MissingEnvVar(name.to_string()))
}

fn optional_env(name: &str) -> Option<String> {
    std::env::var(name).ok().filter(|s| !s.is_empty())
}

fn env_or_default(name: &str, default: &str) -> String {
    std::env::var(name)
        .ok()
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| default.to_string())
}

fn parse_env_u8(name: &str, default: u8) -> Result<u8, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_usize(name: &str, default: usize) -> Result<usize, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => val.parse().map_err(|e| ConfigError::ParseInt {
            name: name.to_string(),
            source: e,
        }),
        _ => Ok(default),
    }
}

fn parse_env_bool(name: &str, default: bool) -> Result<bool, ConfigError> {
    match std::env::var(name) {
        Ok(val) if !val.is_empty() => match val.to_lowercase().as_str() {
            "true" | "1" | "yes" | "on" => Ok(true),
            "false" | "0" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::ParseBool {
                name: name.to_string(),
                value: val,
            }),
        },
        _ => Ok(default),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_bool() {
        assert!(parse_env_bool("NONEXISTENT_VAR", true).unwrap());
        assert!(!parse_env_bool("NONEXISTENT_VAR", false).unwrap());
    }

    #[test]
    fn test_userlist_urls() {
        let config = Config {
            base_url: "http://forum.test/".to_string(),
            userlist_path: "/userlist.php?sort=karma".to_string(),
            userlist_pages: 3,
            ..Config::for_testing()
        };

        assert_eq!(
            config.userlist_urls(),
            vec![
                "http://forum.test/userlist.php?sort=karma".to_string(),
                "http://forum.test/userlist.php?sort=karma&p=2".to_string(),
                "http://forum.test/userlist.php?sort=karma&p=3".to_string(),
            ]
        );
    }

    #[test]
    fn test_userlist_start_url_bounds() {
        let config = Config {
            userlist_pages: 2,
            ..Config::for_testing()
        };

        assert!(config.userlist_start_url(0).is_err());
        assert!(config.userlist_start_url(3).is_err());
        assert!(config.userlist_start_url(2).unwrap().ends_with("&p=2"));
    }

    #[test]
    fn test_validate_rejects_short_cookie() {
        let config = Config {
            session_cookie: Some("abc".to_string()),
            ..Config::for_testing()
        };
        assert!(config.validate().is_err());
        assert!(Config::for_testing().validate().is_ok());
    }
}
