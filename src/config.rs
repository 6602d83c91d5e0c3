//! 应用配置：从 config/default.toml 与环境变量加载
//!
//! 加载顺序：先读 TOML 文件，再用环境变量 `BRIEFING__*` 覆盖（双下划线表示嵌套，如 `BRIEFING__LLM__PROVIDER=mock`）。

use std::collections::HashMap;
use std::path::PathBuf;

use chrono_tz::Tz;
use serde::Deserialize;

/// 应用配置根（对应 config/default.toml 的顶层）
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct AppConfig {
    pub app: AppSection,
    pub llm: LlmSection,
    pub orchestrator: OrchestratorSection,
    pub reminders: RemindersSection,
    pub notify: NotifySection,
    pub worker: WorkerSection,
}

/// [app] 段：用户画像、Prompt 目录、数据目录、简报标题
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct AppSection {
    pub user_context: String,
    pub prompts_dir: PathBuf,
    /// 外部数据采集器的输出目录（每个分类一个 <category>.txt 或 <category>.json）
    pub data_dir: PathBuf,
    pub report_title: String,
}

impl Default for AppSection {
    fn default() -> Self {
        Self {
            user_context: "User Context: General User interested in Finance, Tech, and Trends."
                .to_string(),
            prompts_dir: PathBuf::from("prompts"),
            data_dir: PathBuf::from("data"),
            report_title: "DAILY STRATEGY BRIEFING".to_string(),
        }
    }
}

/// [llm] 段：后端、模型、端点与凭据
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LlmSection {
    /// openai（任意 OpenAI 兼容端点）/ mock（离线演练）
    pub provider: String,
    pub model: String,
    pub base_url: Option<String>,
    /// 主凭据；未设置时回退到环境变量 GEMINI_API_KEY / OPENAI_API_KEY
    pub api_key: Option<String>,
    /// 分类专属凭据，未配置的分类使用主凭据
    pub keys: HashMap<String, String>,
}

impl Default for LlmSection {
    fn default() -> Self {
        Self {
            provider: "openai".to_string(),
            model: "gemini-1.5-flash".to_string(),
            base_url: Some("https://generativelanguage.googleapis.com/v1beta/openai".to_string()),
            api_key: None,
            keys: HashMap::new(),
        }
    }
}

impl LlmSection {
    /// 解析某分类的凭据：分类专属 > 主凭据 > 环境变量；空字符串视为未设置
    pub fn key_for(&self, category: &str) -> Option<String> {
        let usable = |k: &String| !k.trim().is_empty();
        self.keys
            .get(category)
            .cloned()
            .filter(usable)
            .or_else(|| self.api_key.clone().filter(usable))
            .or_else(|| std::env::var("GEMINI_API_KEY").ok().filter(usable))
            .or_else(|| std::env::var("OPENAI_API_KEY").ok().filter(usable))
    }
}

/// [orchestrator] 段：分类注册顺序、并发、超时、重试
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct OrchestratorSection {
    /// 注册顺序即简报中的输出顺序
    pub categories: Vec<String>,
    pub max_concurrency: usize,
    pub agent_timeout_secs: u64,
    pub max_retries: u32,
    /// 线性退避基数：第 n 次重试前等待 n * base
    ///
    /// 默认值下退避累计 10+20+30 = 60s，超过 45s 的单分类超时：持续限流的分类
    /// 会先被超时截断，得到超时标记而不是限流标记。
    pub retry_base_delay_secs: u64,
}

impl Default for OrchestratorSection {
    fn default() -> Self {
        Self {
            categories: ["finance", "weather", "events", "tech", "trends", "news"]
                .into_iter()
                .map(String::from)
                .collect(),
            max_concurrency: 3,
            agent_timeout_secs: 45,
            max_retries: 3,
            retry_base_delay_secs: 10,
        }
    }
}

/// [reminders] 段：SQLite 路径、规范时区、提前量
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RemindersSection {
    pub db_path: PathBuf,
    /// IANA 时区名，指令中的 HH:MM 按此时区的「今天」解释
    pub timezone: String,
    pub lead_minutes: i64,
}

impl Default for RemindersSection {
    fn default() -> Self {
        Self {
            db_path: PathBuf::from("data/reminders.db"),
            timezone: "Asia/Ho_Chi_Minh".to_string(),
            lead_minutes: 60,
        }
    }
}

impl RemindersSection {
    pub fn tz(&self) -> anyhow::Result<Tz> {
        self.timezone
            .parse::<Tz>()
            .map_err(|e| anyhow::anyhow!("invalid time zone '{}': {}", self.timezone, e))
    }

    pub fn lead(&self) -> chrono::Duration {
        chrono::Duration::minutes(self.lead_minutes.max(0))
    }
}

/// [notify] 段：Telegram Bot 凭据与目标会话
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct NotifySection {
    pub telegram_bot_token: Option<String>,
    pub telegram_chat_id: Option<String>,
    pub api_base: String,
    pub parse_mode: Option<String>,
}

impl Default for NotifySection {
    fn default() -> Self {
        Self {
            telegram_bot_token: None,
            telegram_chat_id: None,
            api_base: "https://api.telegram.org".to_string(),
            parse_mode: Some("Markdown".to_string()),
        }
    }
}

/// [worker] 段：常驻扫描间隔（秒），0 表示只扫描一次后退出
#[derive(Debug, Clone, Deserialize, Default)]
#[serde(default)]
pub struct WorkerSection {
    pub interval_secs: u64,
}

/// 从 config 目录加载配置，环境变量 BRIEFING__* 可覆盖
///
/// 1. 按顺序查找 config/default.toml、../config/default.toml、default.toml，找到则作为第一源
/// 2. 若传入 config_path 且文件存在，则追加该文件（可覆盖前面的键）
/// 3. 最后叠加环境变量 BRIEFING__*（双下划线表示嵌套键）
pub fn load_config(config_path: Option<PathBuf>) -> Result<AppConfig, config::ConfigError> {
    let mut builder = config::Config::builder();

    let default_names = ["config/default", "../config/default", "default"];
    for name in default_names {
        let path = format!("{}.toml", name);
        if std::path::Path::new(&path).exists() {
            builder = builder.add_source(config::File::with_name(name).required(false));
            break;
        }
    }

    if let Some(ref path) = config_path {
        if path.exists() {
            builder = builder.add_source(config::File::from(path.clone()).required(false));
        }
    }

    builder = builder.add_source(
        config::Environment::with_prefix("BRIEFING")
            .separator("__")
            .try_parsing(true),
    );

    let c = builder.build()?;
    c.try_deserialize()
}

/// 入口统一使用：读取 BRIEFING_CONFIG 指定的额外配置文件
pub fn load_from_env() -> Result<AppConfig, config::ConfigError> {
    load_config(std::env::var("BRIEFING_CONFIG").ok().map(PathBuf::from))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.orchestrator.max_concurrency, 3);
        assert_eq!(cfg.orchestrator.agent_timeout_secs, 45);
        assert_eq!(cfg.orchestrator.max_retries, 3);
        assert_eq!(cfg.orchestrator.categories[0], "finance");
        assert_eq!(cfg.reminders.lead(), chrono::Duration::hours(1));
        assert_eq!(cfg.worker.interval_secs, 0);
    }

    #[test]
    fn test_timezone_parse() {
        let section = RemindersSection::default();
        assert_eq!(section.tz().unwrap(), chrono_tz::Asia::Ho_Chi_Minh);

        let bad = RemindersSection {
            timezone: "Mars/Olympus".to_string(),
            ..RemindersSection::default()
        };
        assert!(bad.tz().is_err());
    }

    #[test]
    fn test_category_key_falls_back_to_main_key() {
        let mut llm = LlmSection {
            api_key: Some("main".to_string()),
            ..LlmSection::default()
        };
        llm.keys.insert("finance".to_string(), "fin".to_string());
        assert_eq!(llm.key_for("finance").as_deref(), Some("fin"));
        assert_eq!(llm.key_for("news").as_deref(), Some("main"));
    }

    #[test]
    fn test_empty_category_key_falls_back() {
        let mut llm = LlmSection {
            api_key: Some("main".to_string()),
            ..LlmSection::default()
        };
        llm.keys.insert("finance".to_string(), "".to_string());
        llm.keys.insert("news".to_string(), "   ".to_string());
        assert_eq!(llm.key_for("finance").as_deref(), Some("main"));
        assert_eq!(llm.key_for("news").as_deref(), Some("main"));
    }

    #[test]
    fn test_default_backoff_outlasts_timeout() {
        let orch = OrchestratorSection::default();
        let worst_case: u64 = (1..=orch.max_retries as u64)
            .map(|n| n * orch.retry_base_delay_secs)
            .sum();
        assert_eq!(worst_case, 60);
        assert!(worst_case > orch.agent_timeout_secs);
    }

    #[test]
    fn test_toml_overrides() {
        let dir = tempfile::TempDir::new().unwrap();
        let path = dir.path().join("briefing.toml");
        std::fs::write(
            &path,
            r#"
[orchestrator]
categories = ["news", "finance"]
max_concurrency = 2

[reminders]
timezone = "UTC"
lead_minutes = 30
"#,
        )
        .unwrap();

        let cfg = load_config(Some(path)).unwrap();
        assert_eq!(cfg.orchestrator.categories, vec!["news", "finance"]);
        assert_eq!(cfg.orchestrator.max_concurrency, 2);
        assert_eq!(cfg.orchestrator.agent_timeout_secs, 45);
        assert_eq!(cfg.reminders.tz().unwrap(), chrono_tz::UTC);
        assert_eq!(cfg.reminders.lead(), chrono::Duration::minutes(30));
    }
}
