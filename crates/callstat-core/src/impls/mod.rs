//! Impls - ports の実装
//!
//! # 本番用実装
//! - **AmqpBroker / AmqpExchange / AmqpQueueSender**: RabbitMQ (lapin)
//! - **JsonArrayRecordSource**: JSON 配列のデータセットをストリーミング読み込み
//! - **JsonFileSnapshotStore**: キャッシュのスナップショットを JSON ファイルに保存
//!
//! # 開発用・テスト用
//! - **InMemoryBroker / InMemoryQueueSender**
//! - **InMemoryRecordSource**
//! - **InMemorySnapshotStore**

pub mod amqp;
pub mod inmem_broker;
pub mod json_records;
pub mod json_snapshot;
pub mod memory_records;
pub mod memory_snapshot;

pub use self::amqp::{AmqpBroker, AmqpDeliveries, AmqpExchange, AmqpQueueSender};
pub use self::inmem_broker::{InMemoryBroker, InMemoryDeliveries, InMemoryQueueSender};
pub use self::json_records::JsonArrayRecordSource;
pub use self::json_snapshot::JsonFileSnapshotStore;
pub use self::memory_records::InMemoryRecordSource;
pub use self::memory_snapshot::InMemorySnapshotStore;
