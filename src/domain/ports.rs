use crate::domain::model::{
    BagMessage, BagSummary, FilterPlan, FilterReport, NsRange, TimeWindow, TopicInfo,
    TopicMetadata, TopicSelection, WrittenBag,
};
use crate::utils::error::Result;
use async_trait::async_trait;

/// Which messages a reader should return.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MessageQuery {
    pub topic_ids: Vec<i64>,
    pub range: NsRange,
}

/// Position after the last message handed out: storage file index, timestamp, row id.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadCursor {
    pub file_index: usize,
    pub timestamp: i64,
    pub row_id: i64,
}

#[derive(Debug, Clone, Default)]
pub struct MessageBatch {
    pub messages: Vec<BagMessage>,
    /// `None` once the query is exhausted.
    pub next: Option<ReadCursor>,
}

#[async_trait]
pub trait BagReader: Send + Sync {
    async fn topics(&self) -> Result<Vec<TopicInfo>>;
    async fn time_bounds(&self) -> Result<Option<(i64, i64)>>;
    async fn read_batch(
        &self,
        query: &MessageQuery,
        after: Option<ReadCursor>,
        limit: usize,
    ) -> Result<MessageBatch>;
    async fn summary(&self) -> Result<BagSummary>;
}

#[async_trait]
pub trait BagWriter: Send + Sync {
    /// Registers a topic in the output bag and returns its id there.
    async fn create_topic(&self, topic: &TopicMetadata) -> Result<i64>;
    /// Messages must already carry output topic ids.
    async fn write_batch(&self, messages: &[BagMessage]) -> Result<()>;
    async fn finish(&self) -> Result<WrittenBag>;
    /// Drops whatever was written so far; called when the copy fails.
    async fn abort(&self) -> Result<()>;
}

pub trait FilterSettings: Send + Sync {
    fn topic_selection(&self) -> TopicSelection;
    fn time_window(&self) -> TimeWindow;
    fn batch_size(&self) -> usize;
}

#[async_trait]
pub trait Pipeline: Send + Sync {
    async fn scan(&self) -> Result<BagSummary>;
    async fn plan(&self, summary: BagSummary) -> Result<FilterPlan>;
    async fn write(&self, plan: FilterPlan) -> Result<FilterReport>;
}
