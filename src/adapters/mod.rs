// Adapters layer: concrete implementations of the domain ports for rosbag2 sqlite3 storage.

pub mod discovery;
pub mod metadata;
pub mod sqlite_reader;
pub mod sqlite_writer;

pub use discovery::{locate_bag, BagLocation};
pub use metadata::BagMetadata;
pub use sqlite_reader::SqliteBagReader;
pub use sqlite_writer::{SqliteBagWriter, WriterOptions};
