//! Handler trait - Work を実行する Handler の定義
//!
//! # 学習ポイント
//! - ジェネリック trait (Handler<T>)
//! - Object-safe trait (DynHandler)
//! - Type erasure パターン (TypedHandler<T, H> → DynHandler)

use std::marker::PhantomData;

use async_trait::async_trait;

use super::codec::PayloadCodec;
use super::work::Work;
use crate::domain::data::Data;
use crate::domain::outcome::Outcome;
use crate::ports::WorkContext;

/// Handler は Work を実行して Outcome を返す
///
/// # ジェネリクスによる型安全性
/// - `Handler<Resize>` は `Resize` しか受け取れない
/// - コンパイル時に Work と Handler の対応が保証される
#[async_trait]
pub trait Handler<T: Work>: Send + Sync {
    async fn handle(&self, work: T, ctx: &WorkContext) -> Outcome;
}

/// DynHandler は object-safe な Handler の抽象化
///
/// TypedHandler<T> を DynHandler に変換することで、
/// HashMap<String, Arc<dyn DynHandler>> に格納可能にします。
#[async_trait]
pub trait DynHandler: Send + Sync {
    async fn handle_dyn(&self, input: &Data, ctx: WorkContext) -> Outcome;
    fn work_type(&self) -> &'static str;
}

pub struct TypedHandler<T: Work, H: Handler<T>> {
    handler: H,
    codec: PayloadCodec,
    _marker: PhantomData<fn() -> T>,
}

impl<T: Work, H: Handler<T>> TypedHandler<T, H> {
    pub fn new(handler: H) -> Self {
        Self {
            handler,
            codec: PayloadCodec::default(),
            _marker: PhantomData,
        }
    }
}

#[async_trait]
impl<T: Work, H: Handler<T>> DynHandler for TypedHandler<T, H> {
    /// 入力のデコードに失敗したら Failure（`error` キー付き）
    async fn handle_dyn(&self, input: &Data, ctx: WorkContext) -> Outcome {
        match self.codec.decode::<T>(input) {
            Ok(work) => self.handler.handle(work, &ctx).await,
            Err(e) => {
                tracing::warn!(work_type = T::TYPE, task_id = %ctx.task_id(), error = %e, "input decode failed");
                Outcome::failure_reason(format!("input decode: {e}"))
            }
        }
    }

    fn work_type(&self) -> &'static str {
        T::TYPE
    }
}

#[cfg(test)]
pub(crate) mod fixtures {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Double {
        pub value: i64,
    }

    impl Work for Double {
        const TYPE: &'static str = "test.double.v1";
    }

    #[derive(Debug, Clone, Serialize, Deserialize)]
    pub struct Greet {
        pub name: String,
    }

    impl Work for Greet {
        const TYPE: &'static str = "test.greet.v1";
    }

    pub struct DoubleHandler;

    #[async_trait]
    impl Handler<Double> for DoubleHandler {
        async fn handle(&self, work: Double, _ctx: &WorkContext) -> Outcome {
            let output = Data::builder().put("value", work.value * 2).build();
            match output {
                Ok(output) => Outcome::success_with(output),
                Err(e) => Outcome::failure_reason(e.to_string()),
            }
        }
    }

    pub struct GreetHandler;

    #[async_trait]
    impl Handler<Greet> for GreetHandler {
        async fn handle(&self, _work: Greet, _ctx: &WorkContext) -> Outcome {
            Outcome::success()
        }
    }
}
