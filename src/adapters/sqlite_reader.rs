use crate::adapters::discovery::{locate_bag, BagLocation};
use crate::adapters::metadata::SQLITE3_STORAGE_ID;
use crate::domain::model::{BagMessage, BagSummary, NsRange, TopicInfo, TopicMetadata};
use crate::domain::ports::{BagReader, MessageBatch, MessageQuery, ReadCursor};
use crate::utils::error::{BagFilterError, Result};
use async_trait::async_trait;
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use sqlx::{FromRow, QueryBuilder, Sqlite};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

#[derive(Debug, FromRow)]
struct TopicRow {
    id: i64,
    name: String,
    #[sqlx(rename = "type")]
    type_name: String,
    serialization_format: String,
    offered_qos_profiles: String,
    message_count: i64,
}

#[derive(Debug, FromRow)]
struct MessageRow {
    id: i64,
    topic_id: i64,
    timestamp: i64,
    data: Vec<u8>,
}

/// One `.db3` file of a (possibly split) bag.
struct StorageFile {
    path: PathBuf,
    pool: SqlitePool,
    /// file-local topic id -> reader-wide topic id
    to_global: HashMap<i64, i64>,
    to_local: HashMap<i64, i64>,
}

/// Reads rosbag2 `sqlite3` bags. Topics of split files are merged by name.
pub struct SqliteBagReader {
    location: BagLocation,
    files: Vec<StorageFile>,
    topics: Vec<TopicInfo>,
}

impl SqliteBagReader {
    pub async fn open(input: &Path) -> Result<Self> {
        let location = locate_bag(input)?;

        let mut files = Vec::with_capacity(location.storage_files.len());
        let mut topics: Vec<TopicInfo> = Vec::new();
        let mut ids_by_name: HashMap<String, i64> = HashMap::new();

        for path in &location.storage_files {
            tracing::debug!("Opening storage file {}", path.display());
            let pool = open_read_only(path).await?;
            let rows = load_topic_rows(&pool).await?;

            let mut to_global = HashMap::new();
            for row in rows {
                let global_id = match ids_by_name.get(&row.name) {
                    Some(id) => *id,
                    None => {
                        let id = topics.len() as i64 + 1;
                        ids_by_name.insert(row.name.clone(), id);
                        topics.push(TopicInfo {
                            metadata: TopicMetadata {
                                id,
                                name: row.name.clone(),
                                type_name: row.type_name.clone(),
                                serialization_format: row.serialization_format.clone(),
                                offered_qos_profiles: row.offered_qos_profiles.clone(),
                            },
                            message_count: 0,
                        });
                        id
                    }
                };
                topics[(global_id - 1) as usize].message_count += row.message_count.max(0) as u64;
                to_global.insert(row.id, global_id);
            }

            let to_local = to_global.iter().map(|(local, global)| (*global, *local)).collect();
            files.push(StorageFile {
                path: path.clone(),
                pool,
                to_global,
                to_local,
            });
        }

        tracing::info!(
            "📂 Opened bag {} ({} file(s), {} topic(s))",
            location.bag_dir.display(),
            files.len(),
            topics.len()
        );

        Ok(Self {
            location,
            files,
            topics,
        })
    }

    pub fn location(&self) -> &BagLocation {
        &self.location
    }

    pub async fn close(&self) {
        for file in &self.files {
            file.pool.close().await;
        }
    }
}

async fn open_read_only(path: &Path) -> Result<SqlitePool> {
    let options = SqliteConnectOptions::new().filename(path).read_only(true);
    let pool = SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await?;
    Ok(pool)
}

async fn load_topic_rows(pool: &SqlitePool) -> Result<Vec<TopicRow>> {
    let columns: Vec<String> =
        sqlx::query_scalar("SELECT name FROM pragma_table_info('topics')")
            .fetch_all(pool)
            .await?;

    // foxy 之前的 bag 沒有 offered_qos_profiles 欄位
    let qos_column = if columns.iter().any(|c| c == "offered_qos_profiles") {
        "t.offered_qos_profiles"
    } else {
        "''"
    };

    let sql = format!(
        "SELECT t.id, t.name, t.type, t.serialization_format, \
         {} AS offered_qos_profiles, COUNT(m.topic_id) AS message_count \
         FROM topics t LEFT JOIN messages m ON t.id = m.topic_id \
         GROUP BY t.id ORDER BY t.id",
        qos_column
    );

    let rows = sqlx::query_as::<_, TopicRow>(&sql).fetch_all(pool).await?;
    Ok(rows)
}

async fn fetch_messages(
    pool: &SqlitePool,
    topic_ids: &[i64],
    range: &NsRange,
    resume: Option<ReadCursor>,
    limit: usize,
) -> Result<Vec<MessageRow>> {
    let mut qb: QueryBuilder<Sqlite> =
        QueryBuilder::new("SELECT id, topic_id, timestamp, data FROM messages WHERE topic_id IN (");
    {
        let mut ids = qb.separated(", ");
        for id in topic_ids {
            ids.push_bind(*id);
        }
    }
    qb.push(") AND timestamp >= ").push_bind(range.start_ns);
    if let Some(end) = range.end_ns {
        qb.push(" AND timestamp <= ").push_bind(end);
    }
    if let Some(cursor) = resume {
        qb.push(" AND (timestamp > ")
            .push_bind(cursor.timestamp)
            .push(" OR (timestamp = ")
            .push_bind(cursor.timestamp)
            .push(" AND id > ")
            .push_bind(cursor.row_id)
            .push("))");
    }
    qb.push(" ORDER BY timestamp, id LIMIT ")
        .push_bind(limit.max(1) as i64);

    let rows = qb.build_query_as::<MessageRow>().fetch_all(pool).await?;
    Ok(rows)
}

#[async_trait]
impl BagReader for SqliteBagReader {
    async fn topics(&self) -> Result<Vec<TopicInfo>> {
        Ok(self.topics.clone())
    }

    async fn time_bounds(&self) -> Result<Option<(i64, i64)>> {
        let mut bounds: Option<(i64, i64)> = None;
        for file in &self.files {
            let (min, max): (Option<i64>, Option<i64>) =
                sqlx::query_as("SELECT MIN(timestamp), MAX(timestamp) FROM messages")
                    .fetch_one(&file.pool)
                    .await?;
            if let (Some(min), Some(max)) = (min, max) {
                bounds = Some(match bounds {
                    Some((lo, hi)) => (lo.min(min), hi.max(max)),
                    None => (min, max),
                });
            }
        }
        Ok(bounds)
    }

    async fn read_batch(
        &self,
        query: &MessageQuery,
        after: Option<ReadCursor>,
        limit: usize,
    ) -> Result<MessageBatch> {
        let first_file = after.map(|c| c.file_index).unwrap_or(0);

        for (file_index, file) in self.files.iter().enumerate().skip(first_file) {
            let local_ids: Vec<i64> = query
                .topic_ids
                .iter()
                .filter_map(|id| file.to_local.get(id).copied())
                .collect();
            if local_ids.is_empty() {
                continue;
            }

            let resume = after.filter(|c| c.file_index == file_index);
            let rows = fetch_messages(&file.pool, &local_ids, &query.range, resume, limit).await?;
            let Some(last) = rows.last() else {
                continue;
            };

            let next = ReadCursor {
                file_index,
                timestamp: last.timestamp,
                row_id: last.id,
            };
            let messages = rows
                .into_iter()
                .map(|row| {
                    let topic_id = file.to_global.get(&row.topic_id).copied().ok_or_else(|| {
                        BagFilterError::ProcessingError {
                            message: format!(
                                "message {} in {} references unknown topic id {}",
                                row.id,
                                file.path.display(),
                                row.topic_id
                            ),
                        }
                    })?;
                    Ok(BagMessage {
                        topic_id,
                        timestamp: row.timestamp,
                        data: row.data,
                    })
                })
                .collect::<Result<Vec<_>>>()?;

            return Ok(MessageBatch {
                messages,
                next: Some(next),
            });
        }

        Ok(MessageBatch::default())
    }

    async fn summary(&self) -> Result<BagSummary> {
        let bounds = self.time_bounds().await?;
        let message_count = self.topics.iter().map(|t| t.message_count).sum();

        Ok(BagSummary {
            bag_path: self.location.bag_dir.clone(),
            storage_files: self.location.storage_files.clone(),
            storage_identifier: SQLITE3_STORAGE_ID.to_string(),
            topics: self.topics.clone(),
            start_ns: bounds.map(|(start, _)| start),
            end_ns: bounds.map(|(_, end)| end),
            message_count,
        })
    }
}
