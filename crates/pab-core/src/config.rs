use std::{collections::HashMap, env, path::Path, path::PathBuf, time::Duration};

use crate::{errors::Error, skip_cache::DEFAULT_SKIP_TTL, Result};

/// Typed configuration, read from the environment (and `.env`).
#[derive(Clone, Debug)]
pub struct Config {
    // Telegram
    pub telegram_token: String,
    pub telegram_whitelist: Vec<i64>,
    pub telegram_poll_timeout: Duration,

    // Backing store
    pub airtable: AirtableConfig,

    // Skip cache
    pub skip_ttl: Duration,
    pub skip_sweep_interval: Duration,

    // Audit
    pub audit_log_path: Option<PathBuf>,
}

#[derive(Clone, Debug)]
pub struct AirtableConfig {
    pub api_key: String,
    pub base_id: String,
    pub table_name: String,
    pub view: String,
    pub time_zone: String,
    pub locale: String,
    pub timeout: Duration,
    /// Pause between paginated requests (Airtable allows 5 req/s per base).
    pub request_delay: Duration,
    pub max_records: Option<u32>,
    pub fields: FieldNames,
}

/// Column names of the moderation table.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldNames {
    pub title: String,
    pub guid: String,
    pub approved: String,
    pub rejected: String,
    pub under_investigation: String,
}

impl Default for FieldNames {
    fn default() -> Self {
        Self {
            title: "Title".to_string(),
            guid: "guid".to_string(),
            approved: "IsApproved".to_string(),
            rejected: "IsRejected".to_string(),
            under_investigation: "ToInvistigate".to_string(),
        }
    }
}

impl Config {
    /// Process environment first, then `.env` in the working directory.
    /// The environment itself is never modified.
    pub fn load() -> Result<Self> {
        let dotenv = read_dotenv(Path::new(".env"))?;
        Self::from_lookup(env_then(|key| env::var(key).ok(), dotenv))
    }

    /// Build the config from an arbitrary key lookup.
    pub fn from_lookup(get: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let telegram_token = required(&get, "TELEGRAM_TOKEN")?;
        let telegram_whitelist = parse_csv_i64(&required(&get, "TELEGRAM_WHITELIST")?)?;
        if telegram_whitelist.is_empty() {
            return Err(Error::Config(
                "TELEGRAM_WHITELIST must list at least one user id".to_string(),
            ));
        }
        let telegram_poll_timeout = Duration::from_secs(
            parse_opt::<u64>(&get, "TELEGRAM_POLL_TIMEOUT_SECS")?.unwrap_or(60),
        );

        let defaults = FieldNames::default();
        let fields = FieldNames {
            title: optional(&get, "AIRTABLE_FIELD_TITLE").unwrap_or(defaults.title),
            guid: optional(&get, "AIRTABLE_FIELD_GUID").unwrap_or(defaults.guid),
            approved: optional(&get, "AIRTABLE_FIELD_APPROVED").unwrap_or(defaults.approved),
            rejected: optional(&get, "AIRTABLE_FIELD_REJECTED").unwrap_or(defaults.rejected),
            under_investigation: optional(&get, "AIRTABLE_FIELD_INVESTIGATE")
                .unwrap_or(defaults.under_investigation),
        };

        let airtable = AirtableConfig {
            api_key: required(&get, "AIRTABLE_API_KEY")?,
            base_id: required(&get, "AIRTABLE_BASE_ID")?,
            table_name: required(&get, "AIRTABLE_TABLE_NAME")?,
            view: optional(&get, "AIRTABLE_VIEW").unwrap_or_else(|| "view_1".to_string()),
            time_zone: optional(&get, "AIRTABLE_TIME_ZONE")
                .unwrap_or_else(|| "Europe/Moscow".to_string()),
            locale: optional(&get, "AIRTABLE_LOCALE").unwrap_or_else(|| "ru".to_string()),
            timeout: Duration::from_secs(
                parse_opt::<u64>(&get, "AIRTABLE_TIMEOUT_SECS")?.unwrap_or(120),
            ),
            request_delay: Duration::from_millis(
                parse_opt::<u64>(&get, "AIRTABLE_REQUEST_DELAY_MS")?.unwrap_or(200),
            ),
            max_records: parse_opt::<u32>(&get, "AIRTABLE_MAX_RECORDS")?,
            fields,
        };

        let skip_ttl = parse_opt::<u64>(&get, "SKIP_TTL_SECS")?
            .map(Duration::from_secs)
            .unwrap_or(DEFAULT_SKIP_TTL);
        let skip_sweep_interval = Duration::from_secs(
            parse_opt::<u64>(&get, "SKIP_SWEEP_INTERVAL_SECS")?
                .unwrap_or(60)
                .max(1),
        );

        let audit_log_path = optional(&get, "AUDIT_LOG_PATH").map(PathBuf::from);

        Ok(Self {
            telegram_token,
            telegram_whitelist,
            telegram_poll_timeout,
            airtable,
            skip_ttl,
            skip_sweep_interval,
            audit_log_path,
        })
    }
}

fn optional(get: &impl Fn(&str) -> Option<String>, key: &str) -> Option<String> {
    get(key).and_then(non_empty)
}

fn required(get: &impl Fn(&str) -> Option<String>, key: &str) -> Result<String> {
    optional(get, key).ok_or_else(|| Error::Config(format!("{key} is not set")))
}

fn parse_opt<T: std::str::FromStr>(
    get: &impl Fn(&str) -> Option<String>,
    key: &str,
) -> Result<Option<T>> {
    let Some(raw) = optional(get, key) else {
        return Ok(None);
    };
    raw.trim()
        .parse::<T>()
        .map(Some)
        .map_err(|_| Error::Config(format!("{key} has an invalid value: {raw}")))
}

fn parse_csv_i64(v: &str) -> Result<Vec<i64>> {
    v.split(',')
        .map(|s| s.trim())
        .filter(|s| !s.is_empty())
        .map(|s| {
            s.parse::<i64>()
                .map_err(|_| Error::Config(format!("invalid user id in TELEGRAM_WHITELIST: {s}")))
        })
        .collect()
}

/// Key/value pairs of a dotenv file; a missing file is empty.
fn read_dotenv(path: &Path) -> Result<HashMap<String, String>> {
    let iter = match dotenvy::from_path_iter(path) {
        Ok(iter) => iter,
        Err(e) if e.not_found() => return Ok(HashMap::new()),
        Err(e) => return Err(Error::Config(format!("{}: {e}", path.display()))),
    };
    iter.map(|item| item.map_err(|e| Error::Config(format!("{}: {e}", path.display()))))
        .collect()
}

/// Lookup that prefers `env` and falls back to the dotenv pairs. A variable
/// present in `env` wins even when empty.
fn env_then(
    env: impl Fn(&str) -> Option<String>,
    dotenv: HashMap<String, String>,
) -> impl Fn(&str) -> Option<String> {
    move |key: &str| env(key).or_else(|| dotenv.get(key).cloned())
}

fn non_empty(s: String) -> Option<String> {
    if s.trim().is_empty() {
        None
    } else {
        Some(s)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::skip_cache::SkipCache;

    fn tmp_dotenv(contents: &str) -> PathBuf {
        let ts = std::time::SystemTime::now()
            .duration_since(std::time::UNIX_EPOCH)
            .unwrap_or_default()
            .as_nanos();
        let path = env::temp_dir().join(format!("pab-dotenv-{}-{ts}", std::process::id()));
        std::fs::write(&path, contents).unwrap();
        path
    }

    fn lookup(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        move |k: &str| map.get(k).cloned()
    }

    const REQUIRED: [(&str, &str); 5] = [
        ("TELEGRAM_TOKEN", "123:abc"),
        ("TELEGRAM_WHITELIST", "42, 7"),
        ("AIRTABLE_API_KEY", "pat123"),
        ("AIRTABLE_BASE_ID", "appXYZ"),
        ("AIRTABLE_TABLE_NAME", "Posts"),
    ];

    #[test]
    fn required_only_uses_defaults() {
        let cfg = Config::from_lookup(lookup(&REQUIRED)).unwrap();
        assert_eq!(cfg.telegram_whitelist, vec![42, 7]);
        assert_eq!(cfg.telegram_poll_timeout, Duration::from_secs(60));
        assert_eq!(cfg.airtable.view, "view_1");
        assert_eq!(cfg.airtable.time_zone, "Europe/Moscow");
        assert_eq!(cfg.airtable.locale, "ru");
        assert_eq!(cfg.airtable.request_delay, Duration::from_millis(200));
        assert_eq!(cfg.airtable.max_records, None);
        assert_eq!(cfg.airtable.fields, FieldNames::default());
        assert_eq!(cfg.skip_ttl, DEFAULT_SKIP_TTL);
        assert!(cfg.audit_log_path.is_none());
    }

    #[test]
    fn missing_required_key_is_a_config_error() {
        for (missing, _) in REQUIRED {
            let pairs: Vec<(&str, &str)> =
                REQUIRED.iter().copied().filter(|(k, _)| *k != missing).collect();
            let err = Config::from_lookup(lookup(&pairs)).unwrap_err();
            assert!(
                matches!(&err, Error::Config(msg) if msg.contains(missing)),
                "{missing}: {err}"
            );
        }
    }

    #[test]
    fn bad_whitelist_entry_is_rejected() {
        let mut pairs = REQUIRED.to_vec();
        pairs[1] = ("TELEGRAM_WHITELIST", "42,bob");
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(Error::Config(_))
        ));

        pairs[1] = ("TELEGRAM_WHITELIST", " , ");
        assert!(matches!(
            Config::from_lookup(lookup(&pairs)),
            Err(Error::Config(_))
        ));
    }

    #[test]
    fn overrides_are_applied() {
        let mut pairs = REQUIRED.to_vec();
        pairs.extend([
            ("SKIP_TTL_SECS", "60"),
            ("AIRTABLE_MAX_RECORDS", "500"),
            ("AIRTABLE_FIELD_GUID", "Link"),
            ("AUDIT_LOG_PATH", "/tmp/pab-audit.log"),
        ]);
        let cfg = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.skip_ttl, Duration::from_secs(60));
        assert_eq!(cfg.airtable.max_records, Some(500));
        assert_eq!(cfg.airtable.fields.guid, "Link");
        assert_eq!(cfg.audit_log_path, Some(PathBuf::from("/tmp/pab-audit.log")));

        pairs.push(("TELEGRAM_POLL_TIMEOUT_SECS", "soon"));
        assert!(Config::from_lookup(lookup(&pairs)).is_err());
    }

    #[test]
    fn huge_skip_ttl_is_accepted_and_safe_to_use() {
        let mut pairs = REQUIRED.to_vec();
        let max = u64::MAX.to_string();
        pairs.push(("SKIP_TTL_SECS", max.as_str()));
        let cfg = Config::from_lookup(lookup(&pairs)).unwrap();
        assert_eq!(cfg.skip_ttl, Duration::from_secs(u64::MAX));

        let cache = SkipCache::new(cfg.skip_ttl);
        cache.insert("guid");
        assert!(cache.contains("guid"));
    }

    #[test]
    fn environment_wins_over_dotenv() {
        let path = tmp_dotenv(
            "# moderation bot\n\
             TELEGRAM_TOKEN=from-file\n\
             TELEGRAM_WHITELIST=\"42\"\n\
             AIRTABLE_API_KEY='pat-file'\n\
             AIRTABLE_BASE_ID=appFile\n\
             AIRTABLE_TABLE_NAME=Posts\n",
        );
        let dotenv = read_dotenv(&path).unwrap();
        let _ = std::fs::remove_file(&path);
        assert_eq!(dotenv.get("AIRTABLE_API_KEY").map(String::as_str), Some("pat-file"));

        let cfg = Config::from_lookup(env_then(
            lookup(&[("TELEGRAM_TOKEN", "from-env"), ("AIRTABLE_VIEW", "")]),
            dotenv,
        ))
        .unwrap();
        assert_eq!(cfg.telegram_token, "from-env");
        assert_eq!(cfg.telegram_whitelist, vec![42]);
        assert_eq!(cfg.airtable.api_key, "pat-file");
        assert_eq!(cfg.airtable.base_id, "appFile");
        assert_eq!(cfg.airtable.view, "view_1");
    }

    #[test]
    fn missing_dotenv_is_empty() {
        let path = env::temp_dir().join("pab-no-such-dotenv-file");
        assert!(read_dotenv(&path).unwrap().is_empty());
    }
}
