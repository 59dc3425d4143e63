//! bobbin-core
//!
//! Core building blocks for the Bobbin background-task scheduler.
//!
//! # モジュール構成
//! - **domain**: ドメインモデル（ids, spec/record, state, outcome, decision, constraints, backoff, errors）
//! - **graph**: 依存グラフの構築と循環検出
//! - **ports**: 抽象化レイヤー（TaskStore, Executor, Clock, IdGenerator）
//! - **app**: アプリケーションロジック（builder, scheduler, dispatcher, observer）
//! - **typed**: 型付き Work API（Work trait, Handler trait, TypedRegistry, PayloadCodec）
//! - **impls**: 実装（InMemoryTaskStore など開発用）
//! - **config**: TOML 設定

pub mod app;
pub mod config;
pub mod domain;
pub mod graph;
pub mod impls;
pub mod ports;
pub mod typed;

pub use app::{Scheduler, SchedulerBuilder};
