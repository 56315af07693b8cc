use crate::core::{
    BagMessage, BagReader, BagSummary, BagWriter, FilterPlan, FilterReport, FilterSettings,
    MessageQuery, Pipeline,
};
use crate::domain::model::TopicCount;
use crate::utils::error::{BagFilterError, Result};
use std::collections::HashMap;

/// Copies the selected topics of one bag, restricted to a time window, into a new bag.
pub struct BagFilterPipeline<R: BagReader, W: BagWriter, C: FilterSettings> {
    reader: R,
    writer: W,
    config: C,
}

impl<R: BagReader, W: BagWriter, C: FilterSettings> BagFilterPipeline<R, W, C> {
    pub fn new(reader: R, writer: W, config: C) -> Self {
        Self {
            reader,
            writer,
            config,
        }
    }

    pub fn reader(&self) -> &R {
        &self.reader
    }

    pub fn config(&self) -> &C {
        &self.config
    }

    /// Creates the selected topics and streams matching messages into the writer.
    async fn copy_messages(&self, plan: &FilterPlan) -> Result<u64> {
        // 輸入 bag 的 topic id -> 輸出 bag 的 topic id
        let mut id_map: HashMap<i64, i64> = HashMap::new();
        for topic in &plan.topics {
            let output_id = self.writer.create_topic(&topic.metadata).await?;
            id_map.insert(topic.metadata.id, output_id);
        }

        // 空 bag 沒有時間範圍，只建立 topic
        let Some(range) = plan.range else {
            return Ok(0);
        };
        let query = MessageQuery {
            topic_ids: plan.topic_ids(),
            range,
        };
        let batch_size = self.config.batch_size();
        let mut cursor = None;
        let mut copied: u64 = 0;

        loop {
            let batch = self.reader.read_batch(&query, cursor, batch_size).await?;
            if batch.messages.is_empty() {
                break;
            }

            // 時間窗已在讀取端套用，這裡只需換成輸出的 topic id
            let messages = batch
                .messages
                .into_iter()
                .map(|m| {
                    let topic_id = id_map.get(&m.topic_id).copied().ok_or_else(|| {
                        BagFilterError::ProcessingError {
                            message: format!("reader returned unselected topic id {}", m.topic_id),
                        }
                    })?;
                    Ok(BagMessage { topic_id, ..m })
                })
                .collect::<Result<Vec<_>>>()?;

            self.writer.write_batch(&messages).await?;
            copied += messages.len() as u64;
            tracing::debug!("Copied {} messages so far", copied);

            cursor = batch.next;
            if cursor.is_none() {
                break;
            }
        }

        Ok(copied)
    }
}

#[async_trait::async_trait]
impl<R: BagReader, W: BagWriter, C: FilterSettings> Pipeline for BagFilterPipeline<R, W, C> {
    async fn scan(&self) -> Result<BagSummary> {
        let summary = self.reader.summary().await?;

        for topic in &summary.topics {
            tracing::debug!("  {}", topic.display_text());
        }

        Ok(summary)
    }

    async fn plan(&self, summary: BagSummary) -> Result<FilterPlan> {
        let window = self.config.time_window();
        window.validate()?;

        let topics = self.config.topic_selection().resolve(&summary.topics)?;

        let range = summary.start_ns.map(|min_ts| window.resolve(min_ts));
        match &range {
            Some(range) => tracing::debug!(
                "Time window: {} ..= {}",
                range.start_ns,
                range
                    .end_ns
                    .map(|e| e.to_string())
                    .unwrap_or_else(|| "end of bag".to_string())
            ),
            None => tracing::warn!("Input bag contains no messages, only topics will be written"),
        }

        Ok(FilterPlan {
            topics,
            range,
            input_message_count: summary.message_count,
        })
    }

    async fn write(&self, plan: FilterPlan) -> Result<FilterReport> {
        match self.copy_messages(&plan).await {
            Ok(copied) => tracing::debug!("Copy finished, {} messages", copied),
            Err(e) => {
                if let Err(cleanup) = self.writer.abort().await {
                    tracing::warn!("⚠️ Could not remove partial output: {}", cleanup);
                }
                return Err(e);
            }
        }

        let written = self.writer.finish().await?;

        Ok(FilterReport {
            output_path: written.bag_dir,
            storage_files: written.storage_files,
            topics: written
                .topics
                .into_iter()
                .map(|(topic, count)| TopicCount {
                    name: topic.name,
                    type_name: topic.type_name,
                    message_count: count,
                })
                .collect(),
            messages_read: plan.topics.iter().map(|t| t.message_count).sum(),
            messages_written: written.message_count,
            start_ns: written.start_ns,
            end_ns: written.end_ns,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::{MessageBatch, ReadCursor, TimeWindow, TopicInfo, TopicSelection};
    use crate::domain::model::{TopicMetadata, WrittenBag};
    use async_trait::async_trait;
    use std::path::PathBuf;
    use std::sync::Arc;
    use tokio::sync::Mutex;

    struct MockReader {
        topics: Vec<TopicInfo>,
        messages: Vec<BagMessage>,
    }

    impl MockReader {
        fn new() -> Self {
            let topic = |id: i64, name: &str, count: u64| TopicInfo {
                metadata: TopicMetadata {
                    id,
                    name: name.to_string(),
                    type_name: "std_msgs/msg/String".to_string(),
                    serialization_format: "cdr".to_string(),
                    offered_qos_profiles: String::new(),
                },
                message_count: count,
            };
            let message = |topic_id: i64, secs: i64| BagMessage {
                topic_id,
                timestamp: 1_000_000_000 + secs * 1_000_000_000,
                data: vec![topic_id as u8, secs as u8],
            };

            Self {
                topics: vec![topic(1, "/odom", 3), topic(2, "/scan", 3)],
                messages: vec![
                    message(1, 0),
                    message(2, 0),
                    message(1, 1),
                    message(2, 2),
                    message(1, 3),
                    message(2, 4),
                ],
            }
        }
    }

    #[async_trait]
    impl BagReader for MockReader {
        async fn topics(&self) -> Result<Vec<TopicInfo>> {
            Ok(self.topics.clone())
        }

        async fn time_bounds(&self) -> Result<Option<(i64, i64)>> {
            let min = self.messages.iter().map(|m| m.timestamp).min();
            let max = self.messages.iter().map(|m| m.timestamp).max();
            Ok(min.zip(max))
        }

        async fn read_batch(
            &self,
            query: &MessageQuery,
            after: Option<ReadCursor>,
            limit: usize,
        ) -> Result<MessageBatch> {
            let start = after.map(|c| c.row_id as usize + 1).unwrap_or(0);
            let picked: Vec<(usize, BagMessage)> = self
                .messages
                .iter()
                .enumerate()
                .skip(start)
                .filter(|(_, m)| query.topic_ids.contains(&m.topic_id))
                .filter(|(_, m)| query.range.contains(m.timestamp))
                .take(limit)
                .map(|(i, m)| (i, m.clone()))
                .collect();

            let next = picked.last().map(|(i, m)| ReadCursor {
                file_index: 0,
                timestamp: m.timestamp,
                row_id: *i as i64,
            });
            Ok(MessageBatch {
                messages: picked.into_iter().map(|(_, m)| m).collect(),
                next,
            })
        }

        async fn summary(&self) -> Result<BagSummary> {
            let bounds = self.time_bounds().await?;
            Ok(BagSummary {
                bag_path: PathBuf::from("input"),
                storage_files: vec![PathBuf::from("input/input_0.db3")],
                storage_identifier: "sqlite3".to_string(),
                topics: self.topics.clone(),
                start_ns: bounds.map(|b| b.0),
                end_ns: bounds.map(|b| b.1),
                message_count: self.messages.len() as u64,
            })
        }
    }

    #[derive(Clone, Default)]
    struct MockWriter {
        topics: Arc<Mutex<Vec<TopicMetadata>>>,
        messages: Arc<Mutex<Vec<BagMessage>>>,
        batches: Arc<Mutex<usize>>,
        fail_on_batch: Option<usize>,
        aborted: Arc<Mutex<bool>>,
    }

    #[async_trait]
    impl BagWriter for MockWriter {
        async fn create_topic(&self, topic: &TopicMetadata) -> Result<i64> {
            let mut topics = self.topics.lock().await;
            let id = 100 + topics.len() as i64;
            topics.push(TopicMetadata {
                id,
                ..topic.clone()
            });
            Ok(id)
        }

        async fn write_batch(&self, messages: &[BagMessage]) -> Result<()> {
            let mut batches = self.batches.lock().await;
            *batches += 1;
            if self.fail_on_batch == Some(*batches) {
                return Err(BagFilterError::ProcessingError {
                    message: "disk full".to_string(),
                });
            }
            drop(batches);
            self.messages.lock().await.extend_from_slice(messages);
            Ok(())
        }

        async fn finish(&self) -> Result<WrittenBag> {
            let topics = self.topics.lock().await.clone();
            let messages = self.messages.lock().await.clone();
            Ok(WrittenBag {
                bag_dir: PathBuf::from("output"),
                storage_files: vec![PathBuf::from("output/output_0.db3")],
                topics: topics
                    .into_iter()
                    .map(|t| {
                        let count = messages.iter().filter(|m| m.topic_id == t.id).count() as u64;
                        (t, count)
                    })
                    .collect(),
                message_count: messages.len() as u64,
                start_ns: messages.iter().map(|m| m.timestamp).min(),
                end_ns: messages.iter().map(|m| m.timestamp).max(),
            })
        }

        async fn abort(&self) -> Result<()> {
            *self.aborted.lock().await = true;
            self.messages.lock().await.clear();
            Ok(())
        }
    }

    struct MockSettings {
        selection: TopicSelection,
        window: TimeWindow,
        batch_size: usize,
    }

    impl FilterSettings for MockSettings {
        fn topic_selection(&self) -> TopicSelection {
            self.selection.clone()
        }

        fn time_window(&self) -> TimeWindow {
            self.window
        }

        fn batch_size(&self) -> usize {
            self.batch_size
        }
    }

    fn pipeline(
        selection: TopicSelection,
        window: TimeWindow,
        batch_size: usize,
    ) -> (BagFilterPipeline<MockReader, MockWriter, MockSettings>, MockWriter) {
        let writer = MockWriter::default();
        let settings = MockSettings {
            selection,
            window,
            batch_size,
        };
        (
            BagFilterPipeline::new(MockReader::new(), writer.clone(), settings),
            writer,
        )
    }

    #[tokio::test]
    async fn test_scan_reports_bag_bounds() {
        let (pipeline, _) = pipeline(TopicSelection::All, TimeWindow::default(), 10);
        let summary = pipeline.scan().await.unwrap();

        assert_eq!(summary.topics.len(), 2);
        assert_eq!(summary.start_ns, Some(1_000_000_000));
        assert_eq!(summary.end_ns, Some(5_000_000_000));
        assert_eq!(summary.duration_ns(), 4_000_000_000);
    }

    #[tokio::test]
    async fn test_plan_rejects_invalid_window() {
        let (pipeline, _) = pipeline(TopicSelection::All, TimeWindow::new(3.0, Some(1.0)), 10);
        let summary = pipeline.scan().await.unwrap();

        let err = pipeline.plan(summary).await.unwrap_err();
        assert!(matches!(err, BagFilterError::InvalidTimeRange { .. }));
    }

    #[tokio::test]
    async fn test_write_filters_topics_and_window() {
        let (pipeline, writer) = pipeline(
            TopicSelection::Named(vec!["/scan".to_string()]),
            TimeWindow::new(1.0, Some(4.0)),
            1,
        );
        let summary = pipeline.scan().await.unwrap();
        let plan = pipeline.plan(summary).await.unwrap();
        assert_eq!(plan.topic_ids(), vec![2]);

        let report = pipeline.write(plan).await.unwrap();

        let messages = writer.messages.lock().await.clone();
        let stamps: Vec<i64> = messages.iter().map(|m| m.timestamp).collect();
        assert_eq!(stamps, vec![3_000_000_000, 5_000_000_000]);
        assert!(messages.iter().all(|m| m.topic_id == 100));

        assert_eq!(report.messages_written, 2);
        // 輸入 bag 中 /scan 共 3 筆，時間窗內 2 筆
        assert_eq!(report.messages_read, 3);
        assert_eq!(report.topics.len(), 1);
        assert_eq!(report.topics[0].name, "/scan");
        // batch_size = 1 -> one batch per message
        assert_eq!(*writer.batches.lock().await, 2);
    }

    #[tokio::test]
    async fn test_selected_topic_without_messages_is_still_created() {
        let (pipeline, writer) = pipeline(TopicSelection::All, TimeWindow::new(0.5, Some(0.9)), 10);
        let summary = pipeline.scan().await.unwrap();
        let plan = pipeline.plan(summary).await.unwrap();
        let report = pipeline.write(plan).await.unwrap();

        assert_eq!(report.messages_written, 0);
        assert_eq!(writer.topics.lock().await.len(), 2);
        assert!(report.topics.iter().all(|t| t.message_count == 0));
    }

    #[tokio::test]
    async fn test_empty_bag_writes_topics_only() {
        let writer = MockWriter::default();
        let reader = MockReader {
            messages: vec![],
            ..MockReader::new()
        };
        let settings = MockSettings {
            selection: TopicSelection::All,
            window: TimeWindow::default(),
            batch_size: 10,
        };
        let pipeline = BagFilterPipeline::new(reader, writer.clone(), settings);

        let summary = pipeline.scan().await.unwrap();
        let plan = pipeline.plan(summary).await.unwrap();
        assert!(plan.range.is_none());

        let report = pipeline.write(plan).await.unwrap();
        assert_eq!(report.messages_written, 0);
        assert_eq!(writer.topics.lock().await.len(), 2);
        assert_eq!(*writer.batches.lock().await, 0);
    }

    #[tokio::test]
    async fn test_failed_copy_aborts_writer() {
        let writer = MockWriter {
            fail_on_batch: Some(2),
            ..MockWriter::default()
        };
        let settings = MockSettings {
            selection: TopicSelection::All,
            window: TimeWindow::default(),
            batch_size: 2,
        };
        let pipeline = BagFilterPipeline::new(MockReader::new(), writer.clone(), settings);

        let summary = pipeline.scan().await.unwrap();
        let plan = pipeline.plan(summary).await.unwrap();
        let err = pipeline.write(plan).await.unwrap_err();

        assert!(matches!(err, BagFilterError::ProcessingError { .. }));
        assert!(*writer.aborted.lock().await);
        assert!(writer.messages.lock().await.is_empty());
    }

    #[tokio::test]
    async fn test_successful_copy_does_not_abort() {
        let (pipeline, writer) = pipeline(TopicSelection::All, TimeWindow::default(), 4);
        let summary = pipeline.scan().await.unwrap();
        let plan = pipeline.plan(summary).await.unwrap();
        let report = pipeline.write(plan).await.unwrap();

        assert_eq!(report.messages_read, 6);
        assert_eq!(report.messages_written, 6);
        assert!(!*writer.aborted.lock().await);
    }
}
