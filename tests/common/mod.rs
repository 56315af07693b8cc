#![allow(dead_code)]

use ros2_bag_filter::core::{FilterSettings, TimeWindow, TopicSelection};
use sqlx::sqlite::{SqliteConnectOptions, SqlitePool, SqlitePoolOptions};
use std::path::Path;

pub const BASE_NS: i64 = 1_746_525_600_000_000_000;
pub const SECOND: i64 = 1_000_000_000;

pub struct FixtureTopic {
    pub id: i64,
    pub name: &'static str,
    pub type_name: &'static str,
}

pub struct FixtureMessage {
    pub topic_id: i64,
    pub timestamp: i64,
    pub data: Vec<u8>,
}

pub fn msg(topic_id: i64, offset_secs: f64) -> FixtureMessage {
    let timestamp = BASE_NS + (offset_secs * SECOND as f64) as i64;
    FixtureMessage {
        topic_id,
        timestamp,
        data: format!("{}@{}", topic_id, timestamp).into_bytes(),
    }
}

/// `/odom` (id 1) and `/scan` (id 2).
pub fn default_topics() -> Vec<FixtureTopic> {
    vec![
        FixtureTopic {
            id: 1,
            name: "/odom",
            type_name: "nav_msgs/msg/Odometry",
        },
        FixtureTopic {
            id: 2,
            name: "/scan",
            type_name: "sensor_msgs/msg/LaserScan",
        },
    ]
}

async fn connect(path: &Path, create: bool) -> SqlitePool {
    let options = SqliteConnectOptions::new()
        .filename(path)
        .create_if_missing(create);
    SqlitePoolOptions::new()
        .max_connections(1)
        .connect_with(options)
        .await
        .unwrap()
}

/// Writes a `.db3` file the way rosbag2 does; `with_qos = false` mimics pre-foxy bags.
pub async fn create_db3(
    path: &Path,
    with_qos: bool,
    topics: &[FixtureTopic],
    messages: &[FixtureMessage],
) {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    let pool = connect(path, true).await;

    let topics_table = if with_qos {
        "CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL, serialization_format TEXT NOT NULL, offered_qos_profiles TEXT NOT NULL)"
    } else {
        "CREATE TABLE topics(id INTEGER PRIMARY KEY, name TEXT NOT NULL, type TEXT NOT NULL, serialization_format TEXT NOT NULL)"
    };
    sqlx::query(topics_table).execute(&pool).await.unwrap();
    sqlx::query("CREATE TABLE messages(id INTEGER PRIMARY KEY, topic_id INTEGER NOT NULL, timestamp INTEGER NOT NULL, data BLOB NOT NULL)")
        .execute(&pool)
        .await
        .unwrap();

    for topic in topics {
        if with_qos {
            sqlx::query("INSERT INTO topics (id, name, type, serialization_format, offered_qos_profiles) VALUES (?, ?, ?, 'cdr', ?)")
                .bind(topic.id)
                .bind(topic.name)
                .bind(topic.type_name)
                .bind("- history: 3\n  depth: 0\n")
                .execute(&pool)
                .await
                .unwrap();
        } else {
            sqlx::query("INSERT INTO topics (id, name, type, serialization_format) VALUES (?, ?, ?, 'cdr')")
                .bind(topic.id)
                .bind(topic.name)
                .bind(topic.type_name)
                .execute(&pool)
                .await
                .unwrap();
        }
    }

    for message in messages {
        sqlx::query("INSERT INTO messages (topic_id, timestamp, data) VALUES (?, ?, ?)")
            .bind(message.topic_id)
            .bind(message.timestamp)
            .bind(&message.data)
            .execute(&pool)
            .await
            .unwrap();
    }

    pool.close().await;
}

/// (topic name, timestamp, data) in storage order of the output bag.
pub async fn read_db3(path: &Path) -> Vec<(String, i64, Vec<u8>)> {
    let pool = connect(path, false).await;
    let rows: Vec<(String, i64, Vec<u8>)> = sqlx::query_as(
        "SELECT t.name, m.timestamp, m.data FROM messages m JOIN topics t ON t.id = m.topic_id ORDER BY m.timestamp, m.id",
    )
    .fetch_all(&pool)
    .await
    .unwrap();
    pool.close().await;
    rows
}

pub struct TestSettings {
    pub selection: TopicSelection,
    pub window: TimeWindow,
    pub batch_size: usize,
}

impl TestSettings {
    pub fn new(selection: TopicSelection, window: TimeWindow) -> Self {
        Self {
            selection,
            window,
            batch_size: 2,
        }
    }
}

impl FilterSettings for TestSettings {
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
