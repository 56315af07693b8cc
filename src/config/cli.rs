use crate::adapters::sqlite_writer::{WriterOptions, DEFAULT_ROS_DISTRO};
use crate::core::{FilterSettings, TimeWindow, TopicSelection};
use crate::utils::error::Result;
use crate::utils::validation::{self, Validate};
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(name = "ros2-bag-filter")]
#[command(about = "Filter ROS 2 bags by topic and time range")]
pub struct CliConfig {
    /// Input bag directory (or a single .db3 file)
    #[arg(short, long)]
    pub input: PathBuf,

    /// Output bag directory
    #[arg(short, long, required_unless_present = "list")]
    pub output: Option<PathBuf>,

    /// Topics to keep, comma separated
    #[arg(short, long, value_delimiter = ',')]
    pub topics: Vec<String>,

    /// Keep every topic of the input bag
    #[arg(long, conflicts_with = "topics")]
    pub all_topics: bool,

    /// Start offset in seconds from the first message
    #[arg(long, default_value = "0.0", allow_negative_numbers = true)]
    pub start: f64,

    /// End offset in seconds from the first message (default: end of bag)
    #[arg(long, allow_negative_numbers = true)]
    pub end: Option<f64>,

    /// Messages copied per transaction
    #[arg(long, default_value = "1000")]
    pub batch_size: usize,

    /// Replace the output directory if it is not empty
    #[arg(long)]
    pub overwrite: bool,

    /// ROS distribution recorded in the output bag schema
    #[arg(long, default_value = DEFAULT_ROS_DISTRO)]
    pub ros_distro: String,

    /// Print the topics of the input bag and exit
    #[arg(long)]
    pub list: bool,

    /// Show what would be written without writing
    #[arg(long)]
    pub dry_run: bool,

    /// Print the final report as JSON
    #[arg(long)]
    pub json: bool,

    /// Emit logs as JSON lines
    #[arg(long)]
    pub log_json: bool,

    #[arg(short, long, help = "Enable verbose output")]
    pub verbose: bool,

    #[arg(long, help = "Log CPU and memory usage per phase")]
    pub monitor: bool,
}

impl CliConfig {
    pub fn writer_options(&self) -> WriterOptions {
        WriterOptions {
            overwrite: self.overwrite,
            ros_distro: self.ros_distro.clone(),
        }
    }
}

impl FilterSettings for CliConfig {
    fn topic_selection(&self) -> TopicSelection {
        if self.all_topics {
            TopicSelection::All
        } else {
            TopicSelection::Named(self.topics.clone())
        }
    }

    fn time_window(&self) -> TimeWindow {
        TimeWindow::new(self.start, self.end)
    }

    fn batch_size(&self) -> usize {
        self.batch_size
    }
}

impl Validate for CliConfig {
    fn validate(&self) -> Result<()> {
        validation::validate_path("input", &self.input)?;

        // --list 只讀取 metadata，不需要輸出設定
        if self.list {
            return Ok(());
        }

        let output = validation::validate_required_field("output", &self.output)?;
        validation::validate_path("output", output)?;
        validation::validate_distinct_paths("output", &self.input, output)?;
        validation::validate_topic_names("topics", &self.topics)?;
        validation::validate_positive_number("batch_size", self.batch_size, 1)?;
        self.time_window().validate()
    }
}
