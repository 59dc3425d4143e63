//! SchedulerBuilder - スケジューラの構築とワイヤリング
//!
//! # 学習ポイント
//! - Builder パターンの実装
//! - 起動時検証（Fail-fast 設計）
//! - 差し替え可能な port（store, clock, id, decider）にはデフォルトを用意

use std::sync::Arc;

use super::scheduler::{Parts, Scheduler};
use crate::config::{ConfigError, SchedulerConfig};
use crate::domain::constraints::Environment;
use crate::domain::decision::{Decider, DefaultDecider};
use crate::domain::task::WorkType;
use crate::impls::InMemoryTaskStore;
use crate::ports::{Clock, Executor, IdGenerator, SystemClock, TaskStore, UlidGenerator};
use crate::typed::{Handler, RegistryError, TypedRegistry, Work};

/// SchedulerBuilder はスケジューラを構築
///
/// # 使用例
/// ```
/// use bobbin_core::app::SchedulerBuilder;
/// use bobbin_core::typed::{Handler, Work};
/// use bobbin_core::domain::Outcome;
/// use bobbin_core::ports::WorkContext;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Upload { path: String }
///
/// impl Work for Upload {
///     const TYPE: &'static str = "media.upload.v1";
/// }
///
/// struct UploadHandler;
///
/// #[async_trait::async_trait]
/// impl Handler<Upload> for UploadHandler {
///     async fn handle(&self, _work: Upload, _ctx: &WorkContext) -> Outcome {
///         Outcome::success()
///     }
/// }
///
/// let scheduler = SchedulerBuilder::new()
///     .register::<Upload, _>(UploadHandler)?
///     .expect_work_types(&[Upload::TYPE])
///     .build()?;
/// # let _ = scheduler;
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// ```
///
/// # Fail-fast 設計
/// - expect_work_types() で期待される work type を登録
/// - build() 時に「期待集合 ⊆ 実行可能集合」をチェック
/// - 不足があれば BuildError を返す
pub struct SchedulerBuilder {
    registry: TypedRegistry,
    executor: Option<Arc<dyn Executor>>,
    expected_types: Option<Vec<String>>,
    store: Option<Arc<dyn TaskStore>>,
    clock: Option<Arc<dyn Clock>>,
    ids: Option<Arc<dyn IdGenerator>>,
    decider: Option<Arc<dyn Decider>>,
    config: SchedulerConfig,
    environment: Environment,
}

/// BuildError はスケジューラ構築時のエラー
#[derive(Debug, thiserror::Error)]
pub enum BuildError {
    #[error("Missing work types: {0:?}. These work types were expected but no executor handles them.")]
    MissingWorkTypes(Vec<String>),

    #[error("handlers were registered together with a custom executor; use one or the other")]
    ConflictingExecutors,

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl SchedulerBuilder {
    pub fn new() -> Self {
        Self {
            registry: TypedRegistry::new(),
            executor: None,
            expected_types: None,
            store: None,
            clock: None,
            ids: None,
            decider: None,
            config: SchedulerConfig::default(),
            environment: Environment::default(),
        }
    }

    /// Handler を登録
    pub fn register<W: Work, H: Handler<W> + 'static>(
        mut self,
        handler: H,
    ) -> Result<Self, RegistryError> {
        self.registry.register::<W, H>(handler)?;
        Ok(self)
    }

    /// Run work through `executor` instead of the typed registry.
    pub fn executor(mut self, executor: Arc<dyn Executor>) -> Self {
        self.executor = Some(executor);
        self
    }

    /// 期待される work type のリストを設定
    pub fn expect_work_types(mut self, work_types: &[&str]) -> Self {
        self.expected_types = Some(work_types.iter().map(|t| t.to_string()).collect());
        self
    }

    /// Defaults to [`InMemoryTaskStore`].
    pub fn store(mut self, store: Arc<dyn TaskStore>) -> Self {
        self.store = Some(store);
        self
    }

    /// Defaults to [`SystemClock`].
    pub fn clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Defaults to a [`UlidGenerator`] on the builder's clock.
    pub fn id_generator(mut self, ids: Arc<dyn IdGenerator>) -> Self {
        self.ids = Some(ids);
        self
    }

    /// Defaults to [`DefaultDecider`] capped at the configured max backoff.
    pub fn decider(mut self, decider: Arc<dyn Decider>) -> Self {
        self.decider = Some(decider);
        self
    }

    pub fn config(mut self, config: SchedulerConfig) -> Self {
        self.config = config;
        self
    }

    /// Initial environment snapshot.
    pub fn environment(mut self, environment: Environment) -> Self {
        self.environment = environment;
        self
    }

    /// # 検証
    /// - config の値域
    /// - expect_work_types() の work type を executor が全て扱えるか
    pub fn build(self) -> Result<Scheduler, BuildError> {
        self.config.validate()?;

        let executor: Arc<dyn Executor> = match self.executor {
            Some(_) if !self.registry.registered_types().is_empty() => {
                return Err(BuildError::ConflictingExecutors);
            }
            Some(executor) => executor,
            None => Arc::new(self.registry),
        };

        if let Some(expected) = &self.expected_types {
            let missing: Vec<String> = expected
                .iter()
                .filter(|t| !executor.supports(&WorkType::new(t.as_str())))
                .cloned()
                .collect();
            if !missing.is_empty() {
                return Err(BuildError::MissingWorkTypes(missing));
            }
        }

        let clock = self.clock.unwrap_or_else(|| Arc::new(SystemClock));
        let ids = self
            .ids
            .unwrap_or_else(|| Arc::new(UlidGenerator::new(Arc::clone(&clock))));
        let store = self
            .store
            .unwrap_or_else(|| Arc::new(InMemoryTaskStore::new()));
        let decider = self
            .decider
            .unwrap_or_else(|| Arc::new(DefaultDecider::new(self.config.max_backoff())));

        Ok(Scheduler::from_parts(Parts {
            store,
            executor,
            decider,
            clock,
            ids,
            config: self.config,
            environment: self.environment,
        }))
    }
}

impl Default for SchedulerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
