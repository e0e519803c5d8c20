use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

/// Errors surfaced by accessor and index operations. The engine never
/// retries internally; a `SerializationConflict` means the caller should
/// abort and re-run the transaction.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum Error {
    #[error("serialization conflict: record written by a concurrent transaction")]
    SerializationConflict,
    #[error("object deleted")]
    DeletedObject,
    #[error("vertex still has edges")]
    VertexHasEdges,
    #[error("property value type mismatch")]
    PropertyTypeMismatch,
    #[error("unknown name id")]
    UnknownId,
    #[error("index already exists")]
    IndexExists,
    #[error("index does not exist")]
    IndexDoesNotExist,
    #[error("invalid property value")]
    InvalidValue,
    #[error("transaction already committed or aborted")]
    TransactionEnded,
}
