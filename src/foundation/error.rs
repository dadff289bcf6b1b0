/// Convenience alias used throughout the crate.
pub type TileGraphResult<T> = Result<T, TileGraphError>;

/// Engine error taxonomy.
///
/// `Graph` covers invalid wiring detected at construction or erase time,
/// `Region` covers invalid region requests during scheduling, and `Kernel`
/// wraps failures escaping a user-supplied tile computation. Cancellation is
/// not an error; a cancelled `compute` returns cleanly.
#[derive(thiserror::Error, Debug)]
pub enum TileGraphError {
    /// Invalid node wiring (bad input index, dangling parent link, ...).
    #[error("graph error: {0}")]
    Graph(String),

    /// Invalid region request (mismatched channels or formats, missing
    /// dependency tile, ...).
    #[error("region error: {0}")]
    Region(String),

    /// Failure propagated out of a node kernel.
    #[error("kernel error: {0}")]
    Kernel(String),

    /// Anything else.
    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl TileGraphError {
    /// Build a [`TileGraphError::Graph`].
    pub fn graph(msg: impl Into<String>) -> Self {
        Self::Graph(msg.into())
    }

    /// Build a [`TileGraphError::Region`].
    pub fn region(msg: impl Into<String>) -> Self {
        Self::Region(msg.into())
    }

    /// Build a [`TileGraphError::Kernel`].
    pub fn kernel(msg: impl Into<String>) -> Self {
        Self::Kernel(msg.into())
    }
}
