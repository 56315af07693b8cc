use crate::adapters::sqlite_writer::{WriterOptions, DEFAULT_ROS_DISTRO};
use crate::core::{FilterSettings, TimeWindow, TopicSelection};
use crate::utils::error::{BagFilterError, Result};
use crate::utils::validation::{self, Validate};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_BATCH_SIZE: usize = 1000;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TomlConfig {
    pub job: JobConfig,
    pub input: InputConfig,
    pub output: OutputConfig,
    #[serde(default)]
    pub filter: FilterConfig,
    pub performance: Option<PerformanceConfig>,
    pub monitoring: Option<MonitoringConfig>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JobConfig {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InputConfig {
    pub path: PathBuf,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OutputConfig {
    pub path: PathBuf,
    pub overwrite: Option<bool>,
    pub ros_distro: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct FilterConfig {
    pub topics: Option<Vec<String>>,
    pub all_topics: Option<bool>,
    /// seconds from the first message
    pub start_offset: Option<f64>,
    pub end_offset: Option<f64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PerformanceConfig {
    pub batch_size: Option<usize>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MonitoringConfig {
    pub enabled: bool,
    pub verbose: Option<bool>,
}

fn env_var_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid env var pattern"))
}

impl TomlConfig {
    /// 從 TOML 檔案載入配置
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)?;
        Self::from_toml_str(&content)
    }

    /// 從 TOML 字串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let processed = Self::substitute_env_vars(content);

        toml::from_str(&processed).map_err(|e| BagFilterError::ConfigValidationError {
            field: "toml_parsing".to_string(),
            message: format!("TOML parsing error: {}", e),
        })
    }

    /// 替換環境變數 (例如 ${BAG_ROOT})，未定義的變數保持原樣
    fn substitute_env_vars(content: &str) -> String {
        env_var_pattern()
            .replace_all(content, |caps: &regex::Captures| {
                let name = &caps[1];
                std::env::var(name).unwrap_or_else(|_| format!("${{{}}}", name))
            })
            .into_owned()
    }

    pub fn input_path(&self) -> &Path {
        &self.input.path
    }

    pub fn output_path(&self) -> &Path {
        &self.output.path
    }

    pub fn monitoring_enabled(&self) -> bool {
        self.monitoring.as_ref().map(|m| m.enabled).unwrap_or(false)
    }

    pub fn verbose(&self) -> bool {
        self.monitoring
            .as_ref()
            .and_then(|m| m.verbose)
            .unwrap_or(false)
    }

    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            overwrite: self.output.overwrite.unwrap_or(false),
            ros_distro: self
                .output
                .ros_distro
                .clone()
                .unwrap_or_else(|| DEFAULT_ROS_DISTRO.to_string()),
        }
    }

    pub fn validate_config(&self) -> Result<()> {
        validation::validate_path("input.path", &self.input.path)?;
        validation::validate_path("output.path", &self.output.path)?;
        validation::validate_distinct_paths("output.path", &self.input.path, &self.output.path)?;

        if let Some(topics) = &self.filter.topics {
            validation::validate_topic_names("filter.topics", topics)?;
            if self.filter.all_topics.unwrap_or(false) && !topics.is_empty() {
                return Err(BagFilterError::ConfigValidationError {
                    field: "filter".to_string(),
                    message: "Use either `topics` or `all_topics`, not both".to_string(),
                });
            }
        }

        validation::validate_positive_number("performance.batch_size", self.batch_size(), 1)?;
        self.time_window().validate()
    }
}

impl FilterSettings for TomlConfig {
    fn topic_selection(&self) -> TopicSelection {
        if self.filter.all_topics.unwrap_or(false) {
            TopicSelection::All
        } else {
            TopicSelection::Named(self.filter.topics.clone().unwrap_or_default())
        }
    }

    fn time_window(&self) -> TimeWindow {
        TimeWindow::new(
            self.filter.start_offset.unwrap_or(0.0),
            self.filter.end_offset,
        )
    }

    fn batch_size(&self) -> usize {
        self.performance
            .as_ref()
            .and_then(|p| p.batch_size)
            .unwrap_or(DEFAULT_BATCH_SIZE)
    }
}

impl Validate for TomlConfig {
    fn validate(&self) -> Result<()> {
        self.validate_config()
    }
}
