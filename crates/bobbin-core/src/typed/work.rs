//! Work trait - 型付き work の定義
//!
//! # 学習ポイント
//! - Associated Constants (`const TYPE`)
//! - Trait bounds の組み合わせ (Serialize + DeserializeOwned + Send + Sync + 'static)

use serde::Serialize;
use serde::de::DeserializeOwned;

use super::codec::{CodecError, PayloadCodec};
use crate::domain::task::TaskSpec;

/// Work は work type と入力型を対応付ける
///
/// # 使用例
/// ```
/// use bobbin_core::typed::Work;
/// use serde::{Deserialize, Serialize};
///
/// #[derive(Serialize, Deserialize)]
/// struct Thumbnail {
///     path: String,
///     size: i64,
/// }
///
/// impl Work for Thumbnail {
///     const TYPE: &'static str = "media.thumbnail.v1";
/// }
///
/// let spec = Thumbnail { path: "a.png".into(), size: 128 }.to_spec().unwrap();
/// assert_eq!(spec.work_type.as_str(), "media.thumbnail.v1");
/// ```
///
/// The input is stored as flat `Data`, so fields must be scalars or arrays
/// of scalars.
pub trait Work: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// # 命名規約
    /// - `{namespace}.{action}.v{major}`
    const TYPE: &'static str;

    /// Spec for this work with the value encoded as input.
    fn to_spec(&self) -> Result<TaskSpec, CodecError> {
        let input = PayloadCodec::default().encode(self)?;
        Ok(TaskSpec::new(Self::TYPE).with_input(input))
    }
}
