//! `metadata.yaml` as written next to the storage files of a rosbag2 bag.
//!
//! Only the fields this tool reads or writes are modelled; anything else
//! in an input file (newer distros add `ros_distro`, `custom_data`,
//! type description hashes) is ignored.

use crate::domain::model::WrittenBag;
use crate::utils::error::Result;
use serde::{Deserialize, Serialize};
use std::path::Path;

pub const METADATA_FILE: &str = "metadata.yaml";
pub const SQLITE3_STORAGE_ID: &str = "sqlite3";
pub const METADATA_VERSION: u32 = 5;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetadataDocument {
    pub rosbag2_bagfile_information: BagMetadata,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct BagMetadata {
    pub version: u32,
    pub storage_identifier: String,
    #[serde(default)]
    pub duration: Duration,
    #[serde(default)]
    pub starting_time: StartingTime,
    #[serde(default)]
    pub message_count: u64,
    #[serde(default)]
    pub topics_with_message_count: Vec<TopicWithMessageCount>,
    #[serde(default)]
    pub compression_format: String,
    #[serde(default)]
    pub compression_mode: String,
    #[serde(default)]
    pub relative_file_paths: Vec<String>,
    #[serde(default)]
    pub files: Vec<FileInformation>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Duration {
    pub nanoseconds: i64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StartingTime {
    pub nanoseconds_since_epoch: i64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicWithMessageCount {
    pub topic_metadata: TopicMetadataEntry,
    pub message_count: u64,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TopicMetadataEntry {
    pub name: String,
    #[serde(rename = "type")]
    pub type_name: String,
    pub serialization_format: String,
    #[serde(default)]
    pub offered_qos_profiles: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FileInformation {
    pub path: String,
    pub starting_time: StartingTime,
    pub duration: Duration,
    pub message_count: u64,
}

impl BagMetadata {
    pub fn from_yaml_str(content: &str) -> Result<Self> {
        let document: MetadataDocument = serde_yaml::from_str(content)?;
        Ok(document.rosbag2_bagfile_information)
    }

    /// Reads `metadata.yaml` from a bag directory, `None` if the file is absent.
    pub fn read_from_dir(bag_dir: &Path) -> Result<Option<Self>> {
        let path = bag_dir.join(METADATA_FILE);
        if !path.is_file() {
            return Ok(None);
        }
        let content = std::fs::read_to_string(&path)?;
        Self::from_yaml_str(&content).map(Some)
    }

    pub fn to_yaml_string(&self) -> Result<String> {
        let document = MetadataDocument {
            rosbag2_bagfile_information: self.clone(),
        };
        Ok(serde_yaml::to_string(&document)?)
    }

    pub fn write_to_dir(&self, bag_dir: &Path) -> Result<()> {
        std::fs::write(bag_dir.join(METADATA_FILE), self.to_yaml_string()?)?;
        Ok(())
    }

    /// Describes a freshly written single-file sqlite3 bag.
    pub fn from_written(bag: &WrittenBag) -> Self {
        let starting_time = StartingTime {
            nanoseconds_since_epoch: bag.start_ns.unwrap_or(0),
        };
        let duration = Duration {
            nanoseconds: match (bag.start_ns, bag.end_ns) {
                (Some(start), Some(end)) => end - start,
                _ => 0,
            },
        };

        let relative_file_paths: Vec<String> = bag
            .storage_files
            .iter()
            .filter_map(|p| p.file_name())
            .map(|name| name.to_string_lossy().into_owned())
            .collect();

        let files = relative_file_paths
            .iter()
            .map(|path| FileInformation {
                path: path.clone(),
                starting_time,
                duration,
                message_count: bag.message_count,
            })
            .collect();

        Self {
            version: METADATA_VERSION,
            storage_identifier: SQLITE3_STORAGE_ID.to_string(),
            duration,
            starting_time,
            message_count: bag.message_count,
            topics_with_message_count: bag
                .topics
                .iter()
                .map(|(topic, count)| TopicWithMessageCount {
                    topic_metadata: TopicMetadataEntry {
                        name: topic.name.clone(),
                        type_name: topic.type_name.clone(),
                        serialization_format: topic.serialization_format.clone(),
                        offered_qos_profiles: topic.offered_qos_profiles.clone(),
                    },
                    message_count: *count,
                })
                .collect(),
            compression_format: String::new(),
            compression_mode: String::new(),
            relative_file_paths,
            files,
        }
    }
}
