//! Read model metadata.

/// A view that can report its name and size, for health output and logs.
pub trait ReadModel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Number of entries. Returns 0 while a writer holds the view.
    fn count(&self) -> usize;
}
