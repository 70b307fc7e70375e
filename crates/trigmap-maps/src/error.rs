//! Map aggregation errors.

use trigmap_kernel::{ApiError, ConfigError, SysmapId};
use trigmap_store::StoreError;

#[derive(Debug, thiserror::Error)]
pub enum MapError {
    /// A map reaches itself through its submap elements.
    #[error("map {sysmapid} contains itself through its submaps")]
    SubmapCycle { sysmapid: SysmapId },

    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error(transparent)]
    Store(#[from] StoreError),
}
