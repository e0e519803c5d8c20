pub mod error;
pub mod name_store;
pub mod storage;
pub mod types;
pub mod value;

pub use crate::error::{Error, Result};
pub use crate::name_store::NameStore;
pub use crate::storage::{
    Accessor, EdgeAccessor, EdgesIter, GcStats, IndicesInfo, LabelPropertyVerticesIter,
    LabelVerticesIter, Storage, StorageConfig, VertexAccessor, VerticesIter,
};
pub use crate::types::{Bound, EdgeTypeId, Gid, LabelId, PropertyId, View};
pub use crate::value::{PropertyValue, PropertyValueType};
