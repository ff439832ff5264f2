//! Environment configuration.
//!
//! Values come from the process environment, topped up from two `.env`
//! files: the backend one in the working directory and the project root one
//! a level above. Editors on Windows like to save `.env` with a BOM, which
//! glues itself onto the first key name, so every key is also looked up with
//! a leading `\u{feff}`.

use crate::credentials::{check_api_key, KeyProblem};
use crate::gemini::{DEFAULT_API_BASE, DEFAULT_MODEL};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};
use utoipa::ToSchema;

pub const DEFAULT_TIMEOUT_SECS: u64 = 120;
pub const DEFAULT_SCORE_CSV_PATH: &str = "data/score_db_final.csv";
pub const DEFAULT_PORT: u16 = 5000;

const BACKEND_DOTENV: &str = ".env";
const ROOT_DOTENV: &str = "../.env";

/// Which `.env` files were found and read.
#[derive(Debug, Clone, Default, Serialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct DotenvStatus {
    pub backend_exists: bool,
    pub root_exists: bool,
    pub backend_loaded: bool,
    pub root_loaded: bool,
}

/// Read the backend and root `.env` files.
///
/// `dotenv` never overwrites a variable that is already set, so the backend
/// file is read first to take precedence over the root one.
pub fn load_dotenv() -> DotenvStatus {
    let backend = Path::new(BACKEND_DOTENV);
    let root = Path::new(ROOT_DOTENV);

    let mut status = DotenvStatus {
        backend_exists: backend.exists(),
        root_exists: root.exists(),
        ..Default::default()
    };

    if status.backend_exists {
        status.backend_loaded = read_dotenv(backend);
    }
    if status.root_exists {
        status.root_loaded = read_dotenv(root);
    }
    status
}

fn read_dotenv(path: &Path) -> bool {
    match dotenv::from_path(path) {
        Ok(()) => true,
        Err(e) => {
            warn!("Failed to read {}: {}", path.display(), e);
            false
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    /// `GEMINI_API_KEY` exactly as found, for diagnostics only.
    pub gemini_key_raw: Option<String>,
    /// Sanitized key, `None` when the raw value is unusable.
    pub gemini_api_key: Option<String>,
    pub key_problem: Option<KeyProblem>,
    pub gemini_model: String,
    pub gemini_api_base: String,
    pub gemini_timeout: Duration,
    pub score_csv_path: PathBuf,
    pub database_url: Option<String>,
    pub jwt_secret: Option<String>,
    pub port: u16,
    pub dotenv: DotenvStatus,
}

impl Config {
    pub fn from_env(dotenv: DotenvStatus) -> Self {
        Self::from_lookup(|key| std::env::var(key).ok(), dotenv)
    }

    /// Build from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F, dotenv: DotenvStatus) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let get = |key: &str| {
            lookup(key).or_else(|| lookup(&format!("\u{feff}{}", key)))
        };
        let non_empty = |key: &str| get(key).filter(|v| !v.trim().is_empty());

        let gemini_key_raw = get("GEMINI_API_KEY");
        let (gemini_api_key, key_problem) = match check_api_key(gemini_key_raw.as_deref()) {
            Ok(key) => (Some(key), None),
            Err(problem) => (None, Some(problem)),
        };

        let gemini_timeout = match non_empty("GEMINI_TIMEOUT_SEC") {
            Some(raw) => match raw
                .trim()
                .parse::<f64>()
                .ok()
                .filter(|secs| *secs > 0.0)
                .and_then(|secs| Duration::try_from_secs_f64(secs).ok())
            {
                Some(limit) => limit,
                None => {
                    warn!(
                        "Invalid GEMINI_TIMEOUT_SEC '{}', using {}s",
                        raw, DEFAULT_TIMEOUT_SECS
                    );
                    Duration::from_secs(DEFAULT_TIMEOUT_SECS)
                }
            },
            None => Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let port = match non_empty("PORT") {
            Some(raw) => raw.trim().parse().unwrap_or_else(|_| {
                warn!("Invalid PORT '{}', using {}", raw, DEFAULT_PORT);
                DEFAULT_PORT
            }),
            None => DEFAULT_PORT,
        };

        Self {
            gemini_key_raw,
            gemini_api_key,
            key_problem,
            gemini_model: non_empty("GEMINI_MODEL")
                .map(|m| m.trim().to_string())
                .unwrap_or_else(|| DEFAULT_MODEL.to_string()),
            gemini_api_base: non_empty("GEMINI_API_BASE")
                .map(|b| b.trim().to_string())
                .unwrap_or_else(|| DEFAULT_API_BASE.to_string()),
            gemini_timeout,
            score_csv_path: non_empty("SCORE_CSV_PATH")
                .map(PathBuf::from)
                .unwrap_or_else(|| PathBuf::from(DEFAULT_SCORE_CSV_PATH)),
            database_url: non_empty("DATABASE_URL"),
            jwt_secret: non_empty("AUTH_JWT_SECRET"),
            port,
            dotenv,
        }
    }

    /// One-line startup summary, never containing secrets.
    pub fn log_summary(&self) {
        info!(
            "⚙️ model={} timeout={:.0}s csv={} db={} auth={}",
            self.gemini_model,
            self.gemini_timeout.as_secs_f64(),
            self.score_csv_path.display(),
            if self.database_url.is_some() { "postgres" } else { "none" },
            if self.jwt_secret.is_some() { "jwt" } else { "unconfigured" },
        );
        if let Some(problem) = self.key_problem {
            warn!(problem = problem.code(), "⚠️ GEMINI_API_KEY unusable: {}", problem);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let vars: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::from_lookup(|k| vars.get(k).cloned(), DotenvStatus::default())
    }

    #[test]
    fn test_defaults() {
        let cfg = config(&[]);
        assert!(cfg.gemini_api_key.is_none());
        assert_eq!(cfg.key_problem, Some(KeyProblem::Empty));
        assert_eq!(cfg.gemini_model, DEFAULT_MODEL);
        assert_eq!(cfg.gemini_api_base, DEFAULT_API_BASE);
        assert_eq!(cfg.gemini_timeout, Duration::from_secs(120));
        assert_eq!(cfg.score_csv_path, PathBuf::from(DEFAULT_SCORE_CSV_PATH));
        assert_eq!(cfg.port, 5000);
        assert!(cfg.database_url.is_none());
        assert!(cfg.jwt_secret.is_none());
    }

    #[test]
    fn test_key_is_sanitized() {
        let cfg = config(&[("GEMINI_API_KEY", "  \"AIzaSyA1234567890abcdefghij\"\n")]);
        assert_eq!(cfg.gemini_api_key.as_deref(), Some("AIzaSyA1234567890abcdefghij"));
        assert!(cfg.key_problem.is_none());
        assert!(cfg.gemini_key_raw.unwrap().starts_with("  \""));
    }

    #[test]
    fn test_bom_prefixed_key_is_found() {
        let cfg = config(&[("\u{feff}GEMINI_API_KEY", "AIzaSyA1234567890abcdefghij")]);
        assert!(cfg.gemini_api_key.is_some());
    }

    #[test]
    fn test_unusable_key_records_problem() {
        let cfg = config(&[("GEMINI_API_KEY", "키가 아님")]);
        assert!(cfg.gemini_api_key.is_none());
        assert_eq!(cfg.key_problem, Some(KeyProblem::NonAscii));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let cfg = config(&[("GEMINI_TIMEOUT_SEC", "soon"), ("PORT", "http")]);
        assert_eq!(cfg.gemini_timeout, Duration::from_secs(120));
        assert_eq!(cfg.port, 5000);

        for raw in ["-3", "0", "inf", "NaN", "1e20"] {
            let cfg = config(&[("GEMINI_TIMEOUT_SEC", raw)]);
            assert_eq!(cfg.gemini_timeout, Duration::from_secs(120), "{raw}");
        }
    }

    #[test]
    fn test_overrides() {
        let cfg = config(&[
            ("GEMINI_TIMEOUT_SEC", "1.5"),
            ("GEMINI_MODEL", "gemini-2.0-flash"),
            ("SCORE_CSV_PATH", "/srv/scores.csv"),
            ("DATABASE_URL", "postgres://localhost/trails"),
            ("AUTH_JWT_SECRET", "s3cret"),
            ("PORT", "8080"),
        ]);
        assert_eq!(cfg.gemini_timeout, Duration::from_millis(1500));
        assert_eq!(cfg.gemini_model, "gemini-2.0-flash");
        assert_eq!(cfg.score_csv_path, PathBuf::from("/srv/scores.csv"));
        assert_eq!(cfg.database_url.as_deref(), Some("postgres://localhost/trails"));
        assert_eq!(cfg.jwt_secret.as_deref(), Some("s3cret"));
        assert_eq!(cfg.port, 8080);
    }
}
