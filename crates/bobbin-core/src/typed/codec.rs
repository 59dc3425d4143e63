//! PayloadCodec - `Data` と型付き work の相互変換

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::domain::data::{Data, DataError, MAX_DATA_BYTES};

#[derive(Debug, thiserror::Error)]
pub enum CodecError {
    #[error("json: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Data(#[from] DataError),
}

/// serde_json を経由して `Data` <-> T を変換
#[derive(Debug, Clone, Copy)]
pub struct PayloadCodec {
    max_data_bytes: usize,
}

impl Default for PayloadCodec {
    fn default() -> Self {
        Self::new(MAX_DATA_BYTES)
    }
}

impl PayloadCodec {
    pub fn new(max_data_bytes: usize) -> Self {
        Self { max_data_bytes }
    }

    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> Result<Data, CodecError> {
        let data = Data::from_json(serde_json::to_value(value)?)?;
        data.check(self.max_data_bytes)?;
        Ok(data)
    }

    pub fn decode<T: DeserializeOwned>(&self, data: &Data) -> Result<T, CodecError> {
        Ok(serde_json::from_value(data.to_json())?)
    }
}
