//! Core library for the Audio Visualizer editor.
//!
//! Two subsystems live here. The preview pipeline coalesces render requests
//! from the editor and flattens the component stack into one frame on a
//! worker thread. The preset store manages versioned parameter snapshots on
//! disk for each component type.

pub mod component;
pub mod config;
pub mod error;
pub mod preset;
pub mod preview;
pub mod render;

pub use component::{Component, ImageLayer, PresetValues, PreviewContext, SolidLayer};
pub use config::{AppConfig, PresetConfig, PreviewConfig};
pub use error::{Result, VisualizerError};
pub use preset::{
    scan, validate_name, Confirm, PresetFile, PresetIndex, PresetKey, PresetStore, Renamed,
    Transfer, ALL_COMPONENTS,
};
pub use preview::{PreviewEvent, PreviewQueue, PreviewWorker, RenderRequest};
pub use render::Compositor;
