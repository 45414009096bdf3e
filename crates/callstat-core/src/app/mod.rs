//! App - アプリケーション層
//!
//! ports を組み合わせてレポート処理を実装します。
//!
//! # 主要コンポーネント
//! - **StatsCache**: TTL 付きの電話番号別統計キャッシュ
//! - **Aggregator**: データセットを一度だけ走査して統計を集計
//! - **ReportPublisher**: レポート送信（固定間隔の再試行つき）
//! - **ReportService**: cache → aggregate → build → publish
//! - **ResilientConsumer**: 配送ループ（ack / requeue / throttle）
//! - **Shutdown**: 一度だけ解放できる停止シグナル

pub mod aggregator;
pub mod consumer;
pub mod handler;
pub mod publisher;
pub mod report_service;
pub mod shutdown;
pub mod stats_cache;
pub mod status;

pub use self::aggregator::Aggregator;
pub use self::consumer::{ConsumerError, DEFAULT_PREFETCH, Disposition, ResilientConsumer};
pub use self::handler::MessageHandler;
pub use self::publisher::{PublishError, PublishPolicy, ReportPublisher};
pub use self::report_service::ReportService;
pub use self::shutdown::Shutdown;
pub use self::stats_cache::StatsCache;
pub use self::status::{ConsumerCounts, ConsumerStats};
