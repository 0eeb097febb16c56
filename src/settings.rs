use anyhow::{bail, Result};
use std::path::PathBuf;

/// Process-wide configuration, read from the environment once at startup
/// and passed by reference everywhere. A `.env` file is loaded beforehand
/// in `main`.
#[derive(Debug, Clone)]
pub struct Settings {
    pub gitlab_url: String,
    pub oauth_token: Option<String>,
    pub private_token: Option<String>,
    pub dump_dir: PathBuf,
    pub log_level: String,
}

impl Settings {
    pub fn from_env() -> Result<Settings> {
        Settings::from_lookup(|name| std::env::var(name).ok())
    }

    fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Settings> {
        let get_non_empty = |name: &str| get(name).filter(|v| !v.trim().is_empty());

        let gitlab_url = match get_non_empty("GITLAB_URL") {
            Some(url) => url.trim_end_matches('/').to_string(),
            None => bail!("GITLAB_URL is not set"),
        };
        let oauth_token = get_non_empty("GITLAB_OAUTH_TOKEN");
        let private_token = get_non_empty("GITLAB_PRIVATE_TOKEN");
        if oauth_token.is_none() && private_token.is_none() {
            bail!("Gitlab OAuth or Private token required");
        }
        if oauth_token.is_some() && private_token.is_some() {
            bail!("Only one of Gitlab tokens can be used");
        }

        let dump_dir = expand_tilde(
            get_non_empty("DEFAULT_DUMP_DIR")
                .as_deref()
                .unwrap_or("./dumps"),
        );
        let log_level = get_non_empty("LOG_LEVEL").unwrap_or_else(|| String::from("info"));

        Ok(Settings {
            gitlab_url,
            oauth_token,
            private_token,
            dump_dir,
            log_level,
        })
    }
}

fn expand_tilde(raw: &str) -> PathBuf {
    if let Some(rest) = raw.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return home.join(rest);
        }
    }
    PathBuf::from(raw)
}
