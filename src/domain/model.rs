use crate::utils::error::{BagFilterError, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::PathBuf;

const NANOS_PER_SECOND: f64 = 1e9;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadata {
    pub id: i64,
    pub name: String,
    pub type_name: String,
    pub serialization_format: String,
    pub offered_qos_profiles: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicInfo {
    pub metadata: TopicMetadata,
    pub message_count: u64,
}

impl TopicInfo {
    pub fn name(&self) -> &str {
        &self.metadata.name
    }

    /// 列表顯示用的文字，例如 `/scan (sensor_msgs/msg/LaserScan) [120 messages]`
    pub fn display_text(&self) -> String {
        format!(
            "{} ({}) [{} messages]",
            self.metadata.name, self.metadata.type_name, self.message_count
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BagMessage {
    pub topic_id: i64,
    pub timestamp: i64,
    pub data: Vec<u8>,
}

#[derive(Debug, Clone)]
pub struct BagSummary {
    pub bag_path: PathBuf,
    pub storage_files: Vec<PathBuf>,
    pub storage_identifier: String,
    pub topics: Vec<TopicInfo>,
    pub start_ns: Option<i64>,
    pub end_ns: Option<i64>,
    pub message_count: u64,
}

impl BagSummary {
    pub fn duration_ns(&self) -> i64 {
        match (self.start_ns, self.end_ns) {
            (Some(start), Some(end)) => end - start,
            _ => 0,
        }
    }

    pub fn topic(&self, name: &str) -> Option<&TopicInfo> {
        self.topics.iter().find(|t| t.metadata.name == name)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum TopicSelection {
    All,
    Named(Vec<String>),
}

impl TopicSelection {
    /// Picks the selected topics out of `available`, keeping bag order.
    pub fn resolve(&self, available: &[TopicInfo]) -> Result<Vec<TopicInfo>> {
        let selected: Vec<TopicInfo> = match self {
            TopicSelection::All => available.to_vec(),
            TopicSelection::Named(names) => {
                let wanted: HashSet<&str> = names.iter().map(String::as_str).collect();
                if let Some(missing) = names
                    .iter()
                    .find(|name| !available.iter().any(|t| t.name() == name.as_str()))
                {
                    return Err(BagFilterError::UnknownTopic {
                        name: missing.clone(),
                    });
                }
                available
                    .iter()
                    .filter(|t| wanted.contains(t.name()))
                    .cloned()
                    .collect()
            }
        };

        if selected.is_empty() {
            return Err(BagFilterError::NoTopicsSelected);
        }
        Ok(selected)
    }
}

/// Offsets in seconds relative to the first message of the bag.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start_offset: f64,
    pub end_offset: Option<f64>,
}

impl Default for TimeWindow {
    fn default() -> Self {
        Self {
            start_offset: 0.0,
            end_offset: None,
        }
    }
}

impl TimeWindow {
    pub fn new(start_offset: f64, end_offset: Option<f64>) -> Self {
        Self {
            start_offset,
            end_offset,
        }
    }

    pub fn validate(&self) -> Result<()> {
        let invalid = || BagFilterError::InvalidTimeRange {
            start: self.start_offset.to_string(),
            end: self
                .end_offset
                .map(|e| e.to_string())
                .unwrap_or_else(|| "inf".to_string()),
        };

        if !self.start_offset.is_finite() || self.start_offset < 0.0 {
            return Err(invalid());
        }
        if let Some(end) = self.end_offset {
            if !end.is_finite() || end < self.start_offset {
                return Err(invalid());
            }
        }
        Ok(())
    }

    pub fn resolve(&self, min_timestamp: i64) -> NsRange {
        let to_ns = |offset: f64| min_timestamp.saturating_add((offset * NANOS_PER_SECOND) as i64);
        NsRange {
            start_ns: to_ns(self.start_offset),
            end_ns: self.end_offset.map(to_ns),
        }
    }
}

/// Inclusive range of absolute timestamps; `end_ns == None` is unbounded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct NsRange {
    pub start_ns: i64,
    pub end_ns: Option<i64>,
}

impl NsRange {
    pub fn contains(&self, timestamp: i64) -> bool {
        timestamp >= self.start_ns && self.end_ns.map_or(true, |end| timestamp <= end)
    }
}

#[derive(Debug, Clone)]
pub struct FilterPlan {
    pub topics: Vec<TopicInfo>,
    /// `None` when the input bag holds no messages.
    pub range: Option<NsRange>,
    pub input_message_count: u64,
}

impl FilterPlan {
    pub fn topic_ids(&self) -> Vec<i64> {
        self.topics.iter().map(|t| t.metadata.id).collect()
    }
}

/// What the writer produced once the output bag is closed.
#[derive(Debug, Clone, Default)]
pub struct WrittenBag {
    pub bag_dir: PathBuf,
    pub storage_files: Vec<PathBuf>,
    pub topics: Vec<(TopicMetadata, u64)>,
    pub message_count: u64,
    pub start_ns: Option<i64>,
    pub end_ns: Option<i64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TopicCount {
    pub name: String,
    pub type_name: String,
    pub message_count: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FilterReport {
    pub output_path: PathBuf,
    pub storage_files: Vec<PathBuf>,
    pub topics: Vec<TopicCount>,
    /// Messages on the selected topics in the input bag, before time filtering.
    pub messages_read: u64,
    pub messages_written: u64,
    pub start_ns: Option<i64>,
    pub end_ns: Option<i64>,
}
