use std::{
    collections::BTreeMap,
    path::PathBuf,
    sync::{RwLock, RwLockReadGuard, RwLockWriteGuard},
};

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};
use serde_json::Value;

use crate::{Result, VisualizerError};

/// Parameter snapshot stored inside a preset file.
pub type PresetValues = BTreeMap<String, Value>;

/// Pipeline state handed to components while they render.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PreviewContext {
    pub width: u32,
    pub height: u32,
}

impl PreviewContext {
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Fully transparent layer at the output resolution.
    pub fn blank_layer(&self) -> RgbaImage {
        RgbaImage::from_pixel(self.width, self.height, Rgba([0, 0, 0, 0]))
    }
}

/// A visual layer generator in the editor's component stack.
///
/// Components are shared between the editor and the preview worker, so every
/// method takes `&self`; implementations keep mutable state behind a lock.
pub trait Component: Send + Sync {
    /// Type name, also the preset subdirectory.
    fn name(&self) -> &str;

    /// Version of the component's parameter layout.
    fn version(&self) -> u32;

    /// Name of the preset currently applied, if any.
    fn current_preset(&self) -> Option<String>;

    /// Renders this component's layer at the context's resolution.
    fn render(&self, ctx: &PreviewContext) -> Result<RgbaImage>;

    /// Captures the current parameters so they can be written to a preset.
    fn save_preset(&self) -> PresetValues;

    /// Applies `values` and records `name` as the active preset.
    fn load_preset(&self, name: &str, values: &PresetValues) -> Result<()>;

    /// Forgets the active preset while keeping the current parameters.
    fn clear_preset(&self);
}

#[derive(Debug, Clone, Default)]
struct LayerState<T> {
    params: T,
    preset: Option<String>,
}

fn read<T>(lock: &RwLock<LayerState<T>>) -> RwLockReadGuard<'_, LayerState<T>> {
    lock.read().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn write<T>(lock: &RwLock<LayerState<T>>) -> RwLockWriteGuard<'_, LayerState<T>> {
    lock.write().unwrap_or_else(|poisoned| poisoned.into_inner())
}

/// Component that fills the whole frame with one colour.
#[derive(Debug)]
pub struct SolidLayer {
    state: RwLock<LayerState<[u8; 4]>>,
}

impl SolidLayer {
    pub const NAME: &'static str = "Color";

    pub fn new(rgba: [u8; 4]) -> Self {
        Self {
            state: RwLock::new(LayerState {
                params: rgba,
                preset: None,
            }),
        }
    }

    pub fn color(&self) -> [u8; 4] {
        read(&self.state).params
    }
}

impl Component for SolidLayer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        1
    }

    fn current_preset(&self) -> Option<String> {
        read(&self.state).preset.clone()
    }

    fn render(&self, ctx: &PreviewContext) -> Result<RgbaImage> {
        Ok(RgbaImage::from_pixel(ctx.width, ctx.height, Rgba(self.color())))
    }

    fn save_preset(&self) -> PresetValues {
        let mut values = PresetValues::new();
        values.insert("color".to_string(), Value::from(self.color().to_vec()));
        values
    }

    fn load_preset(&self, name: &str, values: &PresetValues) -> Result<()> {
        let color = values
            .get("color")
            .and_then(Value::as_array)
            .filter(|channels| channels.len() == 4)
            .ok_or_else(|| VisualizerError::msg(format!("preset `{name}` has no valid color")))?;

        let mut rgba = [0u8; 4];
        for (slot, channel) in rgba.iter_mut().zip(color) {
            *slot = channel
                .as_u64()
                .and_then(|c| u8::try_from(c).ok())
                .ok_or_else(|| VisualizerError::msg(format!("preset `{name}` has no valid color")))?;
        }

        let mut state = write(&self.state);
        state.params = rgba;
        state.preset = Some(name.to_string());
        Ok(())
    }

    fn clear_preset(&self) {
        write(&self.state).preset = None;
    }
}

/// Component that draws an image file stretched over the frame.
#[derive(Debug)]
pub struct ImageLayer {
    state: RwLock<LayerState<PathBuf>>,
}

impl ImageLayer {
    pub const NAME: &'static str = "Image";

    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            state: RwLock::new(LayerState {
                params: path.into(),
                preset: None,
            }),
        }
    }

    pub fn path(&self) -> PathBuf {
        read(&self.state).params.clone()
    }
}

impl Component for ImageLayer {
    fn name(&self) -> &str {
        Self::NAME
    }

    fn version(&self) -> u32 {
        1
    }

    fn current_preset(&self) -> Option<String> {
        read(&self.state).preset.clone()
    }

    fn render(&self, ctx: &PreviewContext) -> Result<RgbaImage> {
        let path = self.path();
        let image = image::open(&path)
            .map_err(|err| VisualizerError::render(Self::NAME, format!("{}: {err}", path.display())))?
            .to_rgba8();

        if image.dimensions() == (ctx.width, ctx.height) {
            Ok(image)
        } else {
            Ok(imageops::resize(&image, ctx.width, ctx.height, FilterType::Triangle))
        }
    }

    fn save_preset(&self) -> PresetValues {
        let mut values = PresetValues::new();
        values.insert(
            "image".to_string(),
            Value::from(self.path().to_string_lossy().into_owned()),
        );
        values
    }

    fn load_preset(&self, name: &str, values: &PresetValues) -> Result<()> {
        let path = values
            .get("image")
            .and_then(Value::as_str)
            .ok_or_else(|| VisualizerError::msg(format!("preset `{name}` has no image path")))?;

        let mut state = write(&self.state);
        state.params = PathBuf::from(path);
        state.preset = Some(name.to_string());
        Ok(())
    }

    fn clear_preset(&self) {
        write(&self.state).preset = None;
    }
}
