use std::path::{Path, PathBuf};
use std::time::Duration;

use chrono::NaiveTime;
use chrono_tz::Tz;
use harvest_core::types::source_key::SourceKey;
use harvest_infra::browser::BrowserSettings;
use thiserror::Error;

use crate::cli::Cli;

const DEFAULT_SOURCES: &str =
    "sberbank,tinkoff,bank-vtb,vkontakte,snapchat,facebook,mts,bilajn,rostelekom,ozon,wildberries";

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub sources: Vec<SourceKey>,
    pub base_url: String,
    pub webdriver_url: String,
    pub headless: bool,
    pub data_dir: PathBuf,
    pub database_path: PathBuf,
    pub csv_enabled: bool,
    pub days_back: u32,
    pub max_attempts: usize,
    pub max_consecutive_failures: usize,
    pub progress_timeout: Duration,
    pub action_timeout: Duration,
    pub page_settle: Duration,
    pub timezone: Tz,
    pub run_timezone: Tz,
    pub run_at: NaiveTime,
    pub run_deadline: Option<Duration>,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid integer for {0}: {1}")]
    InvalidNumber(&'static str, String),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(&'static str, String),
}

impl AppConfig {
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    pub(crate) fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let env = Env { lookup };
        let sources = parse_sources(
            "HARVEST_SOURCES",
            env.string("HARVEST_SOURCES", DEFAULT_SOURCES).split(','),
        )?;
        let base_url = env.string("HARVEST_BASE_URL", "https://detector404.ru");
        if base_url.trim().is_empty() {
            return Err(ConfigError::InvalidValue("HARVEST_BASE_URL", base_url));
        }
        let webdriver_url = env.string("HARVEST_WEBDRIVER_URL", "http://localhost:9515");
        let headless = env.bool("HARVEST_HEADLESS", true)?;
        let data_dir = PathBuf::from(env.string("HARVEST_DATA_DIR", "./parsed_data"));
        let database_path = env
            .optional("HARVEST_DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|| data_dir.join("all_parsed_data.db"));
        let csv_enabled = env.bool("HARVEST_CSV_ENABLED", true)?;
        let days_back = env.u64("HARVEST_DAYS_BACK", 0)?;
        let days_back = u32::try_from(days_back)
            .map_err(|_| ConfigError::InvalidNumber("HARVEST_DAYS_BACK", days_back.to_string()))?;
        let max_attempts = env.u64("HARVEST_MAX_ATTEMPTS", 100)? as usize;
        let max_consecutive_failures = env.u64("HARVEST_MAX_CONSECUTIVE_FAILURES", 4)? as usize;
        let progress_timeout_secs = env.u64("HARVEST_PROGRESS_TIMEOUT_SECS", 45)?;
        let action_timeout_secs = env.u64("HARVEST_ACTION_TIMEOUT_SECS", 60)?;
        let page_settle_secs = env.u64("HARVEST_PAGE_SETTLE_SECS", 4)?;
        let timezone = env.timezone("HARVEST_TIMEZONE", "Europe/Moscow")?;
        let run_timezone = env.timezone("HARVEST_RUN_TIMEZONE", "Asia/Almaty")?;
        let run_at_raw = env.string("HARVEST_RUN_AT", "09:00");
        let run_at = NaiveTime::parse_from_str(run_at_raw.trim(), "%H:%M")
            .map_err(|_| ConfigError::InvalidValue("HARVEST_RUN_AT", run_at_raw.clone()))?;
        let run_deadline_secs = env.u64("HARVEST_RUN_DEADLINE_SECS", 0)?;

        Ok(Self {
            sources,
            base_url,
            webdriver_url,
            headless,
            data_dir,
            database_path,
            csv_enabled,
            days_back,
            max_attempts,
            max_consecutive_failures,
            progress_timeout: Duration::from_secs(progress_timeout_secs),
            action_timeout: Duration::from_secs(action_timeout_secs),
            page_settle: Duration::from_secs(page_settle_secs),
            timezone,
            run_timezone,
            run_at,
            run_deadline: (run_deadline_secs > 0).then(|| Duration::from_secs(run_deadline_secs)),
        })
    }

    /// Command line flags win over the environment.
    pub fn apply_cli(&mut self, cli: &Cli) -> Result<(), ConfigError> {
        if !cli.sources.is_empty() {
            self.sources = parse_sources("--source", cli.sources.iter().map(String::as_str))?;
        }
        if let Some(days_back) = cli.days_back {
            self.days_back = days_back;
        }
        Ok(())
    }

    pub fn browser_settings(&self) -> BrowserSettings {
        let mut settings = BrowserSettings::new(self.webdriver_url.clone());
        settings.headless = self.headless;
        settings
    }
}

struct Env<F> {
    lookup: F,
}

impl<F> Env<F>
where
    F: Fn(&str) -> Option<String>,
{
    fn string(&self, key: &'static str, default: &'static str) -> String {
        (self.lookup)(key).unwrap_or_else(|| default.to_string())
    }

    fn optional(&self, key: &'static str) -> Option<String> {
        let value = (self.lookup)(key).unwrap_or_default();
        let trimmed = value.trim();
        if trimmed.is_empty() {
            None
        } else {
            Some(trimmed.to_string())
        }
    }

    fn u64(&self, key: &'static str, default: u64) -> Result<u64, ConfigError> {
        let raw = (self.lookup)(key).unwrap_or_else(|| default.to_string());
        raw.trim()
            .parse()
            .map_err(|_| ConfigError::InvalidNumber(key, raw))
    }

    fn bool(&self, key: &'static str, default: bool) -> Result<bool, ConfigError> {
        let Some(raw) = (self.lookup)(key) else {
            return Ok(default);
        };
        match raw.trim().to_ascii_lowercase().as_str() {
            "1" | "true" | "yes" | "on" => Ok(true),
            "0" | "false" | "no" | "off" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key, raw)),
        }
    }

    fn timezone(&self, key: &'static str, default: &'static str) -> Result<Tz, ConfigError> {
        let raw = self.string(key, default);
        raw.trim()
            .parse::<Tz>()
            .map_err(|_| ConfigError::InvalidValue(key, raw))
    }
}

fn parse_sources<'a>(
    key: &'static str,
    raw: impl Iterator<Item = &'a str>,
) -> Result<Vec<SourceKey>, ConfigError> {
    let mut sources: Vec<SourceKey> = Vec::new();
    for slug in raw.map(str::trim).filter(|slug| !slug.is_empty()) {
        let source = SourceKey::try_from(slug)
            .map_err(|err| ConfigError::InvalidValue(key, err.to_string()))?;
        if !sources.contains(&source) {
            sources.push(source);
        }
    }
    if sources.is_empty() {
        return Err(ConfigError::InvalidValue(key, "no sources".to_string()));
    }
    Ok(sources)
}

pub fn load_dotenv() -> Result<(), std::io::Error> {
    let path = Path::new(".env");
    if !path.exists() {
        return Ok(());
    }
    let contents = std::fs::read_to_string(path)?;
    for (key, value) in parse_dotenv(&contents) {
        if std::env::var_os(&key).is_none() {
            // Safety: invoked during startup before any threads are spawned.
            unsafe {
                std::env::set_var(key, value);
            }
        }
    }
    Ok(())
}

fn parse_dotenv(contents: &str) -> Vec<(String, String)> {
    contents.lines().filter_map(parse_dotenv_line).collect()
}

fn parse_dotenv_line(line: &str) -> Option<(String, String)> {
    let trimmed = line.trim();
    if trimmed.is_empty() || trimmed.starts_with('#') {
        return None;
    }
    let trimmed = trimmed.strip_prefix("export ").unwrap_or(trimmed);
    let (key, value) = trimmed.split_once('=')?;
    let key = key.trim();
    if key.is_empty() {
        return None;
    }
    Some((key.to_string(), parse_dotenv_value(value.trim())))
}

fn parse_dotenv_value(value: &str) -> String {
    if let Some(stripped) = value.strip_prefix('"').and_then(|inner| inner.strip_suffix('"')) {
        return unescape(stripped);
    }
    if let Some(stripped) = value.strip_prefix('\'').and_then(|inner| inner.strip_suffix('\'')) {
        return stripped.to_string();
    }
    value.to_string()
}

/// Decodes `\n`, `\r`, `\t`, `\\` and `\"`; other escapes are kept as written.
fn unescape(value: &str) -> String {
    let mut output = String::with_capacity(value.len());
    let mut chars = value.chars();
    while let Some(ch) = chars.next() {
        if ch != '\\' {
            output.push(ch);
            continue;
        }
        match chars.next() {
            Some('n') => output.push('\n'),
            Some('r') => output.push('\r'),
            Some('t') => output.push('\t'),
            Some(escaped @ ('\\' | '"')) => output.push(escaped),
            Some(other) => {
                output.push('\\');
                output.push(other);
            }
            None => output.push('\\'),
        }
    }
    output
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use clap::Parser;

    use super::*;

    fn config_from(pairs: &[(&str, &str)]) -> Result<AppConfig, ConfigError> {
        let env: HashMap<String, String> = pairs
            .iter()
            .map(|(key, value)| (key.to_string(), value.to_string()))
            .collect();
        AppConfig::from_lookup(|key| env.get(key).cloned())
    }

    #[test]
    fn defaults_match_the_daily_job() {
        let config = config_from(&[]).unwrap();
        assert_eq!(config.sources.len(), 11);
        assert_eq!(config.sources[2].as_str(), "bank-vtb");
        assert_eq!(config.database_path, PathBuf::from("./parsed_data/all_parsed_data.db"));
        assert_eq!(config.days_back, 0);
        assert_eq!(config.max_attempts, 100);
        assert_eq!(config.max_consecutive_failures, 4);
        assert_eq!(config.progress_timeout, Duration::from_secs(45));
        assert_eq!(config.timezone, chrono_tz::Europe::Moscow);
        assert_eq!(config.run_timezone, chrono_tz::Asia::Almaty);
        assert_eq!(config.run_at, NaiveTime::from_hms_opt(9, 0, 0).unwrap());
        assert_eq!(config.run_deadline, None);
        assert!(config.headless);
        assert!(config.csv_enabled);
    }

    #[test]
    fn sources_are_trimmed_and_deduplicated() {
        let config = config_from(&[("HARVEST_SOURCES", " ozon, mts ,,ozon")]).unwrap();
        let slugs: Vec<&str> = config.sources.iter().map(SourceKey::as_str).collect();
        assert_eq!(slugs, vec!["ozon", "mts"]);
    }

    #[test]
    fn invalid_values_are_rejected() {
        assert!(config_from(&[("HARVEST_SOURCES", "Ozon")]).is_err());
        assert!(config_from(&[("HARVEST_SOURCES", " , ")]).is_err());
        assert!(config_from(&[("HARVEST_TIMEZONE", "Mars/Base")]).is_err());
        assert!(config_from(&[("HARVEST_RUN_AT", "25:00")]).is_err());
        assert!(config_from(&[("HARVEST_HEADLESS", "maybe")]).is_err());
        assert!(config_from(&[("HARVEST_MAX_ATTEMPTS", "-1")]).is_err());
    }

    #[test]
    fn explicit_database_path_and_deadline() {
        let config = config_from(&[
            ("HARVEST_DATABASE_PATH", "/var/lib/harvest.db"),
            ("HARVEST_RUN_DEADLINE_SECS", "3600"),
            ("HARVEST_CSV_ENABLED", "off"),
        ])
        .unwrap();
        assert_eq!(config.database_path, PathBuf::from("/var/lib/harvest.db"));
        assert_eq!(config.run_deadline, Some(Duration::from_secs(3600)));
        assert!(!config.csv_enabled);
    }

    #[test]
    fn cli_overrides_sources_and_days_back() {
        let mut config = config_from(&[]).unwrap();
        let cli = Cli::parse_from(["harvest", "--source", "mts", "--source", "ozon", "--days-back", "2"]);
        config.apply_cli(&cli).unwrap();
        assert_eq!(config.sources.len(), 2);
        assert_eq!(config.days_back, 2);
    }

    #[test]
    fn parse_dotenv_line_variants() {
        assert_eq!(
            parse_dotenv_line("export FOO=bar"),
            Some(("FOO".to_string(), "bar".to_string()))
        );
        assert_eq!(
            parse_dotenv_line(r#"FOO="hello world""#),
            Some(("FOO".to_string(), "hello world".to_string()))
        );
        assert_eq!(
            parse_dotenv_line("FOO='a b'"),
            Some(("FOO".to_string(), "a b".to_string()))
        );
        assert!(parse_dotenv_line("# comment").is_none());
        assert!(parse_dotenv_line("   ").is_none());
    }

    #[test]
    fn double_quoted_escapes_decode_once() {
        assert_eq!(
            parse_dotenv_line(r#"PATH_HINT="C:\\new\tdir \"x\" \q""#),
            Some(("PATH_HINT".to_string(), "C:\\new\tdir \"x\" \\q".to_string()))
        );
        assert_eq!(
            parse_dotenv_line(r#"LINES="a\nb""#),
            Some(("LINES".to_string(), "a\nb".to_string()))
        );
    }
}
