//! Typed - 型付き Work API
//!
//! work type の typo を型で排除し、Handler との対応付けを静的に保証します。
//!
//! # 二層構造
//! - **表層（Typed）**: `Work` trait, `Handler<T>` trait - 型安全
//! - **内部（Dyn）**: `DynHandler` trait - object-safe, type erasure
//!
//! `TypedRegistry` implements `ports::Executor`, so it plugs straight into
//! the scheduler.

pub mod codec;
pub mod handler;
pub mod registry;
pub mod work;

pub use self::codec::{CodecError, PayloadCodec};
pub use self::handler::{DynHandler, Handler, TypedHandler};
pub use self::registry::{RegistryError, TypedRegistry};
pub use self::work::Work;
