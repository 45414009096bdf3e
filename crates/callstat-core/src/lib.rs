//! callstat-core
//!
//! Core of the call-statistics report service: consumes report tasks from a queue,
//! aggregates per-phone call statistics (through a TTL cache backed by a durable
//! snapshot) and publishes one report per task.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（task, stats, report, envelope, decision, errors）
//! - **ports**: 抽象化レイヤー（broker, record source, snapshot store, clock）
//! - **app**: アプリケーションロジック（cache, aggregator, publisher, service, consumer）
//! - **impls**: 実装（AMQP, JSON ファイル, in-memory）
//! - **config**: 設定値とデフォルト

pub mod app;
pub mod config;
pub mod domain;
pub mod impls;
pub mod ports;
