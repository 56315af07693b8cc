pub mod engine;
pub mod pipeline;

pub use crate::domain::model::{
    BagMessage, BagSummary, FilterPlan, FilterReport, NsRange, TimeWindow, TopicInfo,
    TopicSelection,
};
pub use crate::domain::ports::{
    BagReader, BagWriter, FilterSettings, MessageBatch, MessageQuery, Pipeline, ReadCursor,
};
pub use crate::utils::error::Result;
