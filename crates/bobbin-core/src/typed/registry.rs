//! TypedRegistry - Handler の登録と管理（work type -> handler の関数テーブル）
//!
//! # 学習ポイント
//! - HashMap での型消去された trait object の管理
//! - Generic methods での登録と型安全性
//! - Arc による共有所有権

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use super::handler::{DynHandler, Handler, TypedHandler};
use super::work::Work;
use crate::domain::outcome::Outcome;
use crate::domain::task::WorkType;
use crate::ports::{Executor, WorkContext, WorkItem};

/// TypedRegistry は型付き Handler を登録・管理し、`Executor` として振る舞う
///
/// # 内部実装
/// - `register::<T: Work, H>(handler)` で登録
/// - 内部的に TypedHandler でラップして DynHandler に変換
/// - HashMap<String, Arc<dyn DynHandler>> で管理
#[derive(Default)]
pub struct TypedRegistry {
    handlers: HashMap<String, Arc<dyn DynHandler>>,
}

#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    #[error("handler for work type '{0}' is already registered")]
    AlreadyRegistered(String),
}

impl TypedRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register<T: Work, H: Handler<T> + 'static>(
        &mut self,
        handler: H,
    ) -> Result<(), RegistryError> {
        let work_type = T::TYPE.to_string();
        if self.handlers.contains_key(&work_type) {
            return Err(RegistryError::AlreadyRegistered(work_type));
        }
        self.handlers
            .insert(work_type, Arc::new(TypedHandler::new(handler)));
        Ok(())
    }

    pub fn get(&self, work_type: &str) -> Option<Arc<dyn DynHandler>> {
        self.handlers.get(work_type).cloned()
    }

    /// Sorted.
    pub fn registered_types(&self) -> Vec<String> {
        let mut types: Vec<String> = self.handlers.keys().cloned().collect();
        types.sort();
        types
    }
}

#[async_trait]
impl Executor for TypedRegistry {
    async fn execute(&self, item: WorkItem, ctx: WorkContext) -> Outcome {
        match self.get(item.work_type.as_str()) {
            Some(handler) => handler.handle_dyn(&item.input, ctx).await,
            None => Outcome::failure_reason(format!("no handler for '{}'", item.work_type)),
        }
    }

    fn supports(&self, work_type: &WorkType) -> bool {
        self.handlers.contains_key(work_type.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::data::Data;
    use crate::domain::ids::TaskId;
    use crate::typed::handler::fixtures::{Double, DoubleHandler, Greet, GreetHandler};

    #[test]
    fn register_and_get() {
        let mut registry = TypedRegistry::new();
        registry.register::<Double, _>(DoubleHandler).unwrap();

        let handler = registry.get(Double::TYPE).unwrap();
        assert_eq!(handler.work_type(), Double::TYPE);
        assert!(registry.get(Greet::TYPE).is_none());
    }

    #[test]
    fn double_registration_is_an_error() {
        let mut registry = TypedRegistry::new();
        registry.register::<Double, _>(DoubleHandler).unwrap();
        let result = registry.register::<Double, _>(DoubleHandler);
        assert!(matches!(result, Err(RegistryError::AlreadyRegistered(t)) if t == Double::TYPE));
    }

    #[test]
    fn registered_types_are_sorted() {
        let mut registry = TypedRegistry::new();
        registry.register::<Greet, _>(GreetHandler).unwrap();
        registry.register::<Double, _>(DoubleHandler).unwrap();
        assert_eq!(
            registry.registered_types(),
            vec![Double::TYPE.to_string(), Greet::TYPE.to_string()]
        );
    }

    #[tokio::test]
    async fn executes_as_an_executor() {
        let mut registry = TypedRegistry::new();
        registry.register::<Double, _>(DoubleHandler).unwrap();
        assert!(registry.supports(&WorkType::new(Double::TYPE)));
        assert!(!registry.supports(&WorkType::new("other")));

        let id = TaskId::from_u128(1);
        let item = WorkItem {
            id,
            work_type: WorkType::new("other"),
            input: Data::empty(),
            attempt: 0,
        };
        let outcome = registry.execute(item, WorkContext::detached(id)).await;
        assert!(matches!(outcome, Outcome::Failure(_)));
    }
}
