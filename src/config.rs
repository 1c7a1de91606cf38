use std::env;
use std::path::{Component, Path, PathBuf};
use std::time::Duration;

pub const DEFAULT_PORT: u16 = 8787;
pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(60);
pub const API_KEY_VAR: &str = "ANTHROPIC_API_KEY";

/// Skill document location when `SKILL_PATH` is unset, relative to the
/// working directory the service is started from.
pub const DEFAULT_SKILL_RELATIVE: &str = "../../skills/opsmeeting-machine.skill.md";

/// Where the completion API credential comes from.
#[derive(Clone)]
pub enum ApiKeySource {
    /// Looked up in the process environment on every request, so a key
    /// exported after startup is picked up without a restart.
    Env(String),
    /// Fixed at construction. `None` behaves like an unset variable.
    Fixed(Option<String>),
}

impl ApiKeySource {
    /// Resolve the key for one request. Empty or whitespace-only values
    /// count as unset.
    pub fn resolve(&self) -> Option<String> {
        let key = match self {
            Self::Env(var) => env::var(var).ok(),
            Self::Fixed(key) => key.clone(),
        };
        key.filter(|k| !k.trim().is_empty())
    }
}

impl std::fmt::Debug for ApiKeySource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Env(var) => f.debug_tuple("Env").field(var).finish(),
            Self::Fixed(Some(_)) => f.debug_tuple("Fixed").field(&"[REDACTED]").finish(),
            Self::Fixed(None) => f.debug_tuple("Fixed").field(&"None").finish(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub port: u16,
    pub skill_path: PathBuf,
    pub base_url: String,
    pub api_key: ApiKeySource,
    /// Upper bound on a single completion call.
    pub timeout: Duration,
}

impl Config {
    pub fn from_env() -> Self {
        let port = match env::var("PORT") {
            Ok(raw) => raw.trim().parse::<u16>().unwrap_or_else(|_| {
                tracing::warn!("invalid PORT {raw:?}, using {DEFAULT_PORT}");
                DEFAULT_PORT
            }),
            Err(_) => DEFAULT_PORT,
        };

        let skill_path = env::var("SKILL_PATH")
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from)
            .unwrap_or_else(default_skill_path);

        let base_url = env::var("ANTHROPIC_BASE_URL")
            .ok()
            .filter(|u| !u.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());

        let timeout = match env::var("GENERATE_TIMEOUT_SECS") {
            Ok(raw) => match raw.trim().parse::<u64>() {
                Ok(secs) if secs > 0 => Duration::from_secs(secs),
                _ => {
                    tracing::warn!(
                        "invalid GENERATE_TIMEOUT_SECS {raw:?}, using {}s",
                        DEFAULT_TIMEOUT.as_secs()
                    );
                    DEFAULT_TIMEOUT
                }
            },
            Err(_) => DEFAULT_TIMEOUT,
        };

        let api_key = ApiKeySource::Env(API_KEY_VAR.to_string());
        if api_key.resolve().is_none() {
            tracing::warn!("{API_KEY_VAR} not set, /generate will fail until it is");
        }

        Config {
            port,
            skill_path,
            base_url,
            api_key,
            timeout,
        }
    }

    /// Config for embedding the service (and for tests): explicit skill
    /// path and credential, defaults for everything else.
    pub fn new(skill_path: impl AsRef<Path>, api_key: Option<String>) -> Self {
        Config {
            port: DEFAULT_PORT,
            skill_path: skill_path.as_ref().to_path_buf(),
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: ApiKeySource::Fixed(api_key),
            timeout: DEFAULT_TIMEOUT,
        }
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Skill path as reported by `/health`.
    pub fn skill_path_display(&self) -> String {
        self.skill_path.display().to_string()
    }
}

/// `<cwd>/../../skills/...` with the `..` segments folded, or the bare
/// relative path if the working directory cannot be resolved.
fn default_skill_path() -> PathBuf {
    match env::current_dir() {
        Ok(cwd) => normalize_lexically(&cwd.join(DEFAULT_SKILL_RELATIVE)),
        Err(_) => PathBuf::from(DEFAULT_SKILL_RELATIVE),
    }
}

/// Fold `.` and `..` without touching the filesystem (the skill file may not
/// exist yet, so `canonicalize` is not an option).
pub fn normalize_lexically(path: &Path) -> PathBuf {
    let mut out = PathBuf::new();
    for component in path.components() {
        match component {
            Component::CurDir => {}
            Component::ParentDir => {
                let last = out.components().next_back();
                let after_name = matches!(last, Some(Component::Normal(_)));
                let at_root = matches!(last, Some(Component::RootDir | Component::Prefix(_)));
                if after_name {
                    out.pop();
                } else if !at_root {
                    // Relative path climbing past its start: keep the `..`.
                    out.push(component);
                }
            }
            other => out.push(other),
        }
    }
    out
}
