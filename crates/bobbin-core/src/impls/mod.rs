//! Impls - ports の実装（開発用・テスト用）
//!
//! 永続ストアの本番実装は別クレートに置く想定。ここには InMemory のみ。

pub mod memory_store;

pub use self::memory_store::InMemoryTaskStore;
