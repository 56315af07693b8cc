use crate::adapters::metadata::BagMetadata;
use crate::domain::model::{BagMessage, TopicMetadata, WrittenBag};
use crate::domain::ports::BagWriter;
use crate::utils::error::{BagFilterError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::OnceCell;

pub const SCHEMA_VERSION: i64 = 3;
pub const DEFAULT_ROS_DISTRO: &str = "humble";

const CREATE_SCHEMA: [&str; 4] = [
    "CREATE TABLE schema(schema_version INTEGER PRIMARY KEY, ros_distro TEXT NOT NULL)",
    "CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL, \
     serialization_format TEXT NOT NULL, offered_qos_profiles TEXT NOT NULL)",
    "CREATE TABLE messages(id INTEGER PRIMARY KEY, topic_id INTEGER NOT NULL, \
     timestamp INTEGER NOT NULL, data BLOB NOT NULL)",
    "CREATE INDEX timestamp_idx ON messages (timestamp ASC)",
];

#[derive(Debug, Clone)]
pub struct WriterOptions {
    /// Replace a non-empty output directory instead of failing.
    pub overwrite: bool,
    pub ros_distro: String,
}

impl Default for WriterOptions {
    fn default() -> Self {
        Self {
            overwrite: false,
            ros_distro: DEFAULT_ROS_DISTRO.to_string(),
        }
    }
}

#[derive(Debug, Default)]
struct WriterState {
    topics: Vec<(TopicMetadata, u64)>,
    index_by_id: HashMap<i64, usize>,
    message_count: u64,
    start_ns: Option<i64>,
    end_ns: Option<i64>,
}

/// Writes a single-file rosbag2 `sqlite3` bag plus its `metadata.yaml`.
///
/// Nothing touches the disk until the first topic or message is written,
/// so a job that fails during planning leaves no output behind.
pub struct SqliteBagWriter {
    bag_dir: PathBuf,
    options: WriterOptions,
    pool: OnceCell<SqlitePool>,
    state: Mutex<WriterState>,
    /// Files that must survive `--overwrite`, normally the input bag's storage files.
    protected: Vec<PathBuf>,
    created_dir: AtomicBool,
}

impl SqliteBagWriter {
    pub fn new(bag_dir: impl Into<PathBuf>, options: WriterOptions) -> Self {
        Self {
            bag_dir: bag_dir.into(),
            options,
            pool: OnceCell::new(),
            state: Mutex::new(WriterState::default()),
            protected: Vec::new(),
            created_dir: AtomicBool::new(false),
        }
    }

    pub fn with_protected_paths(mut self, paths: impl IntoIterator<Item = PathBuf>) -> Self {
        self.protected.extend(paths);
        self
    }

    pub fn bag_dir(&self) -> &Path {
        &self.bag_dir
    }

    /// `<dir>/<dirname>_0.db3`, the name `ros2 bag record` would use.
    pub fn storage_file(&self) -> PathBuf {
        let stem = self
            .bag_dir
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| "bag".to_string());
        self.bag_dir.join(format!("{}_0.db3", stem))
    }

    async fn prepare_dir(&self) -> Result<()> {
        match tokio::fs::metadata(&self.bag_dir).await {
            Ok(meta) => {
                if !meta.is_dir() {
                    return Err(BagFilterError::OutputExists {
                        path: self.bag_dir.display().to_string(),
                    });
                }
                let mut entries = tokio::fs::read_dir(&self.bag_dir).await?;
                if entries.next_entry().await?.is_some() {
                    if !self.options.overwrite {
                        return Err(BagFilterError::OutputExists {
                            path: self.bag_dir.display().to_string(),
                        });
                    }
                    self.ensure_no_protected_inside().await?;
                    tracing::warn!("⚠️ Replacing existing output {}", self.bag_dir.display());
                    tokio::fs::remove_dir_all(&self.bag_dir).await?;
                    tokio::fs::create_dir_all(&self.bag_dir).await?;
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tokio::fs::create_dir_all(&self.bag_dir).await?;
                self.created_dir.store(true, Ordering::SeqCst);
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    async fn ensure_no_protected_inside(&self) -> Result<()> {
        let root = tokio::fs::canonicalize(&self.bag_dir).await?;
        for path in &self.protected {
            let resolved = tokio::fs::canonicalize(path)
                .await
                .unwrap_or_else(|_| path.clone());
            if resolved.starts_with(&root) {
                return Err(BagFilterError::OutputContainsInput {
                    output: self.bag_dir.display().to_string(),
                    input: path.display().to_string(),
                });
            }
        }
        Ok(())
    }

    async fn create_database(&self) -> Result<SqlitePool> {
        self.prepare_dir().await?;

        let path = self.storage_file();
        tracing::debug!("Creating storage file {}", path.display());

        let options = SqliteConnectOptions::new()
            .filename(&path)
            .create_if_missing(true);
        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .connect_with(options)
            .await?;

        for statement in CREATE_SCHEMA {
            sqlx::query(statement).execute(&pool).await?;
        }
        sqlx::query("INSERT INTO schema (schema_version, ros_distro) VALUES (?, ?)")
            .bind(SCHEMA_VERSION)
            .bind(&self.options.ros_distro)
            .execute(&pool)
            .await?;

        Ok(pool)
    }

    async fn pool(&self) -> Result<&SqlitePool> {
        self.pool.get_or_try_init(|| self.create_database()).await
    }

    fn lock_state(&self) -> Result<std::sync::MutexGuard<'_, WriterState>> {
        self.state.lock().map_err(|_| BagFilterError::ProcessingError {
            message: "bag writer state poisoned".to_string(),
        })
    }
}

#[async_trait]
impl BagWriter for SqliteBagWriter {
    async fn create_topic(&self, topic: &TopicMetadata) -> Result<i64> {
        let existing = self
            .lock_state()?
            .topics
            .iter()
            .find(|(t, _)| t.name == topic.name)
            .map(|(t, _)| t.id);
        if let Some(id) = existing {
            return Ok(id);
        }

        let pool = self.pool().await?;
        let id = sqlx::query(
            "INSERT INTO topics (name, type, serialization_format, offered_qos_profiles) \
             VALUES (?, ?, ?, ?)",
        )
        .bind(&topic.name)
        .bind(&topic.type_name)
        .bind(&topic.serialization_format)
        .bind(&topic.offered_qos_profiles)
        .execute(pool)
        .await?
        .last_insert_rowid();

        tracing::debug!("Created topic {} ({}) with id {}", topic.name, topic.type_name, id);

        let mut state = self.lock_state()?;
        let index = state.topics.len();
        state.topics.push((
            TopicMetadata {
                id,
                ..topic.clone()
            },
            0,
        ));
        state.index_by_id.insert(id, index);
        Ok(id)
    }

    async fn write_batch(&self, messages: &[BagMessage]) -> Result<()> {
        if messages.is_empty() {
            return Ok(());
        }

        {
            let state = self.lock_state()?;
            if let Some(unknown) = messages
                .iter()
                .find(|m| !state.index_by_id.contains_key(&m.topic_id))
            {
                return Err(BagFilterError::ProcessingError {
                    message: format!("topic id {} was never created", unknown.topic_id),
                });
            }
        }

        let pool = self.pool().await?;
        let mut tx = pool.begin().await?;
        for message in messages {
            sqlx::query("INSERT INTO messages (topic_id, timestamp, data) VALUES (?, ?, ?)")
                .bind(message.topic_id)
                .bind(message.timestamp)
                .bind(&message.data)
                .execute(&mut *tx)
                .await?;
        }
        tx.commit().await?;

        let mut state = self.lock_state()?;
        for message in messages {
            if let Some(index) = state.index_by_id.get(&message.topic_id).copied() {
                state.topics[index].1 += 1;
            }
            state.message_count += 1;
            state.start_ns = Some(state.start_ns.map_or(message.timestamp, |s| s.min(message.timestamp)));
            state.end_ns = Some(state.end_ns.map_or(message.timestamp, |e| e.max(message.timestamp)));
        }
        Ok(())
    }

    async fn finish(&self) -> Result<WrittenBag> {
        let pool = self.pool().await?;
        pool.close().await;

        let written = {
            let state = self.lock_state()?;
            WrittenBag {
                bag_dir: self.bag_dir.clone(),
                storage_files: vec![self.storage_file()],
                topics: state.topics.clone(),
                message_count: state.message_count,
                start_ns: state.start_ns,
                end_ns: state.end_ns,
            }
        };

        BagMetadata::from_written(&written).write_to_dir(&self.bag_dir)?;
        tracing::debug!("Wrote metadata.yaml to {}", self.bag_dir.display());

        Ok(written)
    }

    async fn abort(&self) -> Result<()> {
        // 還沒建立資料庫就沒有東西要清
        let Some(pool) = self.pool.get() else {
            return Ok(());
        };
        pool.close().await;

        let storage_file = self.storage_file();
        for suffix in ["", "-journal", "-wal", "-shm"] {
            let mut name = storage_file.clone().into_os_string();
            name.push(suffix);
            match tokio::fs::remove_file(&name).await {
                Ok(()) => {}
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        let mut entries = tokio::fs::read_dir(&self.bag_dir).await?;
        if self.created_dir.load(Ordering::SeqCst) && entries.next_entry().await?.is_none() {
            tokio::fs::remove_dir(&self.bag_dir).await?;
        }
        tracing::warn!("🧹 Removed partial output {}", storage_file.display());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn chatter() -> TopicMetadata {
        TopicMetadata {
            id: 7,
            name: "/chatter".to_string(),
            type_name: "std_msgs/msg/String".to_string(),
            serialization_format: "cdr".to_string(),
            offered_qos_profiles: String::new(),
        }
    }

    #[test]
    fn test_storage_file_name_follows_directory() {
        let writer = SqliteBagWriter::new("/data/trimmed", WriterOptions::default());
        assert_eq!(writer.storage_file(), PathBuf::from("/data/trimmed/trimmed_0.db3"));
    }

    #[tokio::test]
    async fn test_write_creates_bag_and_metadata() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        let writer = SqliteBagWriter::new(&out, WriterOptions::default());

        let id = writer.create_topic(&chatter()).await.unwrap();
        assert_eq!(writer.create_topic(&chatter()).await.unwrap(), id);

        writer
            .write_batch(&[
                BagMessage { topic_id: id, timestamp: 20, data: vec![1] },
                BagMessage { topic_id: id, timestamp: 10, data: vec![2] },
            ])
            .await
            .unwrap();

        let written = writer.finish().await.unwrap();
        assert_eq!(written.message_count, 2);
        assert_eq!(written.start_ns, Some(10));
        assert_eq!(written.end_ns, Some(20));
        assert_eq!(written.topics[0].1, 2);

        assert!(out.join("out_0.db3").is_file());
        let metadata = BagMetadata::read_from_dir(&out).unwrap().unwrap();
        assert_eq!(metadata.message_count, 2);
        assert_eq!(metadata.duration.nanoseconds, 10);
    }

    #[tokio::test]
    async fn test_unknown_topic_id_is_rejected() {
        let temp = TempDir::new().unwrap();
        let writer = SqliteBagWriter::new(temp.path().join("out"), WriterOptions::default());

        let err = writer
            .write_batch(&[BagMessage { topic_id: 99, timestamp: 1, data: vec![] }])
            .await
            .unwrap_err();
        assert!(matches!(err, BagFilterError::ProcessingError { .. }));
        // 沒有寫入任何東西前不應建立輸出目錄
        assert!(!temp.path().join("out").exists());
    }

    #[tokio::test]
    async fn test_existing_output_requires_overwrite() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("out");
        std::fs::create_dir_all(&out).unwrap();
        std::fs::write(out.join("old.txt"), b"old").unwrap();

        let writer = SqliteBagWriter::new(&out, WriterOptions::default());
        assert!(matches!(
            writer.create_topic(&chatter()).await,
            Err(BagFilterError::OutputExists { .. })
        ));

        let writer = SqliteBagWriter::new(
            &out,
            WriterOptions {
                overwrite: true,
                ..WriterOptions::default()
            },
        );
        writer.create_topic(&chatter()).await.unwrap();
        writer.finish().await.unwrap();
        assert!(!out.join("old.txt").exists());
        assert!(out.join("out_0.db3").is_file());
    }

    #[tokio::test]
    async fn test_overwrite_keeps_protected_input() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("bags");
        let input = out.join("run1").join("run1_0.db3");
        std::fs::create_dir_all(input.parent().unwrap()).unwrap();
        std::fs::write(&input, b"input").unwrap();

        let writer = SqliteBagWriter::new(
            &out,
            WriterOptions {
                overwrite: true,
                ..WriterOptions::default()
            },
        )
        .with_protected_paths(vec![input.clone()]);

        assert!(matches!(
            writer.create_topic(&chatter()).await,
            Err(BagFilterError::OutputContainsInput { .. })
        ));
        assert!(input.is_file());
    }

    #[tokio::test]
    async fn test_abort_removes_partial_output() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("partial");
        let writer = SqliteBagWriter::new(&out, WriterOptions::default());

        let id = writer.create_topic(&chatter()).await.unwrap();
        writer
            .write_batch(&[BagMessage { topic_id: id, timestamp: 1, data: vec![1] }])
            .await
            .unwrap();
        assert!(out.join("partial_0.db3").is_file());

        writer.abort().await.unwrap();
        assert!(!out.exists());
    }

    #[tokio::test]
    async fn test_abort_keeps_preexisting_directory() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("kept");
        std::fs::create_dir_all(&out).unwrap();

        let writer = SqliteBagWriter::new(&out, WriterOptions::default());
        writer.create_topic(&chatter()).await.unwrap();
        writer.abort().await.unwrap();

        assert!(out.is_dir());
        assert!(!out.join("kept_0.db3").exists());
    }

    #[tokio::test]
    async fn test_abort_before_any_write_is_a_no_op() {
        let temp = TempDir::new().unwrap();
        let writer = SqliteBagWriter::new(temp.path().join("never"), WriterOptions::default());
        writer.abort().await.unwrap();
        assert!(!temp.path().join("never").exists());
    }

    #[tokio::test]
    async fn test_empty_output_directory_is_reused() {
        let temp = TempDir::new().unwrap();
        let out = temp.path().join("empty");
        std::fs::create_dir_all(&out).unwrap();

        let writer = SqliteBagWriter::new(&out, WriterOptions::default());
        writer.create_topic(&chatter()).await.unwrap();
        let written = writer.finish().await.unwrap();
        assert_eq!(written.message_count, 0);
        assert_eq!(written.start_ns, None);
    }
}
