use serde::Deserialize;
use std::path::{Path, PathBuf};

#[derive(Debug, Deserialize, Clone)]
pub struct Config {
    pub telegram: TelegramConfig,
    pub tech_sheet: TechSheetConfig,
    #[serde(default)]
    pub workers: WorkersConfig,
    #[serde(default)]
    pub reports: ReportsConfig,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TelegramConfig {
    #[serde(default)]
    pub bot_token: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct TechSheetConfig {
    /// ID тех-таблицы с листами Users / Stores / service_acc
    #[serde(default)]
    pub id: String,
    /// Путь к JSON админского сервисного аккаунта
    #[serde(default)]
    pub admin_sa_json: String,
}

#[derive(Debug, Deserialize, Clone)]
pub struct WorkersConfig {
    pub count: usize,
    /// Период автоцикла магазина
    pub autoloop_minutes: u64,
}

impl Default for WorkersConfig {
    fn default() -> Self {
        Self {
            count: 2,
            autoloop_minutes: 30,
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
pub struct ReportsConfig {
    /// Налог по умолчанию, %
    pub default_tax: f64,
    /// Окно рекламной статистики, дней
    pub ad_spend_days: i64,
    /// Интервал опроса UUID отчёта Performance API
    pub ad_poll_interval_secs: u64,
    /// Максимальное ожидание одного UUID
    pub ad_poll_timeout_secs: u64,
    /// Нижняя граница выгрузки операций для недельного отчёта (YYYY-MM-DD)
    pub fin_week_start: String,
}

impl Default for ReportsConfig {
    fn default() -> Self {
        Self {
            default_tax: 7.0,
            ad_spend_days: 7,
            ad_poll_interval_secs: 120,
            ad_poll_timeout_secs: 3 * 60 * 60,
            fin_week_start: "2022-01-01".to_string(),
        }
    }
}

/// Default configuration embedded in the binary
const DEFAULT_CONFIG: &str = r#"
[telegram]
bot_token = ""

[tech_sheet]
id = ""
admin_sa_json = "secrets/admin_sa.json"

[workers]
count = 2
autoloop_minutes = 30

[reports]
default_tax = 7.0
ad_spend_days = 7
ad_poll_interval_secs = 120
ad_poll_timeout_secs = 10800
fin_week_start = "2022-01-01"
"#;

/// Load configuration from config.toml file
///
/// Search order:
/// 1. Next to the executable (for production)
/// 2. Falls back to embedded default config
///
/// Затем поверх применяются переменные окружения
/// `BOT_TOKEN`, `TECH_SHEET_ID`, `ADMIN_SA_JSON`, `WORKERS`.
pub fn load_config() -> anyhow::Result<Config> {
    let mut config = load_file_config()?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    Ok(config)
}

fn load_file_config() -> anyhow::Result<Config> {
    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            let config_path = exe_dir.join("config.toml");

            if config_path.exists() {
                tracing::info!("Loading config from: {}", config_path.display());
                let contents = std::fs::read_to_string(&config_path)?;
                let config: Config = toml::from_str(&contents)?;
                return Ok(config);
            } else {
                tracing::warn!("config.toml not found at: {}", config_path.display());
            }
        }
    }

    tracing::info!("Using default embedded configuration");
    let config: Config = toml::from_str(DEFAULT_CONFIG)?;
    Ok(config)
}

fn apply_env_overrides(
    config: &mut Config,
    get: impl Fn(&str) -> Option<String>,
) -> anyhow::Result<()> {
    if let Some(token) = get("BOT_TOKEN") {
        config.telegram.bot_token = token;
    }
    if let Some(id) = get("TECH_SHEET_ID") {
        config.tech_sheet.id = id;
    }
    if let Some(path) = get("ADMIN_SA_JSON") {
        config.tech_sheet.admin_sa_json = path;
    }
    if let Some(workers) = get("WORKERS") {
        config.workers.count = workers
            .trim()
            .parse()
            .map_err(|e| anyhow::anyhow!("WORKERS must be a number: {}", e))?;
    }
    if config.workers.count == 0 {
        config.workers.count = 1;
    }
    Ok(())
}

/// Resolves relative paths relative to the executable directory
pub fn resolve_path(path_str: &str) -> PathBuf {
    let path = Path::new(path_str);

    if path.is_absolute() || path.exists() {
        return path.to_path_buf();
    }

    if let Ok(exe_path) = std::env::current_exe() {
        if let Some(exe_dir) = exe_path.parent() {
            return exe_dir.join(path);
        }
    }

    PathBuf::from(path_str)
}
