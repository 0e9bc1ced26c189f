/// Error types shared by the review-pulse crates.
///
/// These cover infrastructure collaborators (embedding backends). Application errors
/// are defined in the binary crate and wrap `CommonError` via `#[from]`.

#[derive(Debug, thiserror::Error)]
pub enum CommonError {
    #[error("embedding error: {0}")]
    Embedding(String),
}
