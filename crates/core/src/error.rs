use std::path::PathBuf;

/// Result alias that carries the custom [`VisualizerError`] type.
pub type Result<T> = std::result::Result<T, VisualizerError>;

/// Common error type for the core crate.
#[derive(Debug, thiserror::Error)]
pub enum VisualizerError {
    /// Free-form message for failures that do not warrant their own variant.
    #[error("{0}")]
    Message(String),
    /// Preset names may only contain letters, numbers and spaces.
    #[error("invalid preset name `{0}`: preset names must contain only letters, numbers, and spaces")]
    InvalidName(String),
    /// The caller declined to overwrite an existing preset file.
    #[error("{} already exists and was not overwritten", .0.display())]
    OverwriteDeclined(PathBuf),
    /// The caller declined to delete a preset.
    #[error("deletion of preset `{0}` was cancelled")]
    DeleteDeclined(String),
    #[error("no preset `{name}` for {component} v{version}")]
    PresetNotFound {
        component: String,
        version: u32,
        name: String,
    },
    /// A component produced a layer that cannot be composited onto the frame.
    #[error("layer from `{component}` is {actual:?}, expected {expected:?}")]
    LayerSizeMismatch {
        component: String,
        expected: (u32, u32),
        actual: (u32, u32),
    },
    #[error("component `{component}` failed to render: {message}")]
    Render { component: String, message: String },
    #[error("invalid configuration: {0}")]
    InvalidConfig(&'static str),
    /// The other end of a preview channel has gone away.
    #[error("preview queue has been closed")]
    QueueClosed,
    /// Wrapper around standard IO errors.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    #[error("{0}")]
    Image(#[from] image::ImageError),
    #[error("{0}")]
    Json(#[from] serde_json::Error),
}

impl VisualizerError {
    /// Creates a new error that simply wraps the provided message.
    pub fn msg<T: Into<String>>(msg: T) -> Self {
        Self::Message(msg.into())
    }

    /// Wraps a failure raised while a component renders its layer.
    pub fn render(component: impl Into<String>, message: impl ToString) -> Self {
        Self::Render {
            component: component.into(),
            message: message.to_string(),
        }
    }
}

impl From<&str> for VisualizerError {
    fn from(value: &str) -> Self {
        Self::msg(value)
    }
}

impl From<String> for VisualizerError {
    fn from(value: String) -> Self {
        Self::Message(value)
    }
}
