use std::{path::Path, sync::Arc};

use image::{imageops, imageops::FilterType, Rgba, RgbaImage};

use crate::{
    component::{Component, PreviewContext},
    PreviewConfig, Result, VisualizerError,
};

/// Size of the canvas the background is prepared on before scaling.
pub const BASE_CANVAS: (u32, u32) = (1920, 1080);

/// Flattens a component stack into a single preview frame.
///
/// The background is prepared once on a fixed-size transparent canvas and
/// scaled to the output resolution on demand; the scaled copy is reused until
/// the resolution changes.
#[derive(Debug)]
pub struct Compositor {
    background: RgbaImage,
    scaled: Option<RgbaImage>,
}

impl Compositor {
    /// Compositor with a fully transparent background.
    pub fn new() -> Self {
        let (width, height) = BASE_CANVAS;
        Self {
            background: RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])),
            scaled: None,
        }
    }

    /// Compositor whose base canvas has `image` pasted at the origin.
    pub fn with_background(image: &RgbaImage) -> Self {
        let mut compositor = Self::new();
        imageops::replace(&mut compositor.background, image, 0, 0);
        compositor
    }

    pub fn from_config(config: &PreviewConfig) -> Result<Self> {
        match &config.background {
            Some(path) => Self::load_background(path),
            None => Ok(Self::new()),
        }
    }

    fn load_background(path: &Path) -> Result<Self> {
        let image = image::open(path)?.to_rgba8();
        tracing::debug!(?path, "loaded preview background");
        Ok(Self::with_background(&image))
    }

    /// Background scaled to the requested output size.
    pub fn background(&mut self, width: u32, height: u32) -> &RgbaImage {
        let stale = self
            .scaled
            .as_ref()
            .map(|scaled| scaled.dimensions() != (width, height))
            .unwrap_or(true);

        if stale {
            self.scaled = Some(imageops::resize(
                &self.background,
                width,
                height,
                FilterType::Triangle,
            ));
        }

        self.scaled.get_or_insert_with(|| RgbaImage::new(width, height))
    }

    /// Renders every component and stacks the layers so that the first
    /// component ends up on top.
    pub fn composite(
        &mut self,
        ctx: &PreviewContext,
        components: &[Arc<dyn Component>],
    ) -> Result<RgbaImage> {
        let mut frame = self.background(ctx.width, ctx.height).clone();

        for component in components.iter().rev() {
            let layer = component.render(ctx)?;
            if layer.dimensions() != frame.dimensions() {
                return Err(VisualizerError::LayerSizeMismatch {
                    component: component.name().to_string(),
                    expected: frame.dimensions(),
                    actual: layer.dimensions(),
                });
            }
            imageops::overlay(&mut frame, &layer, 0, 0);
        }

        Ok(frame)
    }
}

impl Default for Compositor {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::component::{PresetValues, SolidLayer};

    const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
    const GREEN: Rgba<u8> = Rgba([0, 255, 0, 255]);
    const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);
    const CLEAR: Rgba<u8> = Rgba([0, 0, 0, 0]);

    /// Paints a single column, leaving the rest transparent.
    struct Stripe {
        column: u32,
        color: Rgba<u8>,
    }

    impl Component for Stripe {
        fn name(&self) -> &str {
            "Stripe"
        }
        fn version(&self) -> u32 {
            1
        }
        fn current_preset(&self) -> Option<String> {
            None
        }
        fn render(&self, ctx: &PreviewContext) -> Result<RgbaImage> {
            let mut layer = ctx.blank_layer();
            for y in 0..ctx.height {
                layer.put_pixel(self.column, y, self.color);
            }
            Ok(layer)
        }
        fn save_preset(&self) -> PresetValues {
            PresetValues::new()
        }
        fn load_preset(&self, _: &str, _: &PresetValues) -> Result<()> {
            Ok(())
        }
        fn clear_preset(&self) {}
    }

    struct Oversized;

    impl Component for Oversized {
        fn name(&self) -> &str {
            "Oversized"
        }
        fn version(&self) -> u32 {
            1
        }
        fn current_preset(&self) -> Option<String> {
            None
        }
        fn render(&self, ctx: &PreviewContext) -> Result<RgbaImage> {
            Ok(RgbaImage::new(ctx.width + 1, ctx.height))
        }
        fn save_preset(&self) -> PresetValues {
            PresetValues::new()
        }
        fn load_preset(&self, _: &str, _: &PresetValues) -> Result<()> {
            Ok(())
        }
        fn clear_preset(&self) {}
    }

    fn stripe(column: u32, color: Rgba<u8>) -> Arc<dyn Component> {
        Arc::new(Stripe { column, color })
    }

    #[test]
    fn first_component_is_topmost() {
        // A covers column 0, B covers 0..=1, C covers 0..=2.
        let ctx = PreviewContext::new(4, 1);
        let a: Arc<dyn Component> = stripe(0, RED);
        let b: Arc<dyn Component> = Arc::new(StackedStripes(vec![(0, GREEN), (1, GREEN)]));
        let c: Arc<dyn Component> =
            Arc::new(StackedStripes(vec![(0, BLUE), (1, BLUE), (2, BLUE)]));

        let frame = Compositor::new().composite(&ctx, &[a, b, c]).unwrap();

        assert_eq!(frame.get_pixel(0, 0), &RED);
        assert_eq!(frame.get_pixel(1, 0), &GREEN);
        assert_eq!(frame.get_pixel(2, 0), &BLUE);
        assert_eq!(frame.get_pixel(3, 0), &CLEAR);
    }

    struct StackedStripes(Vec<(u32, Rgba<u8>)>);

    impl Component for StackedStripes {
        fn name(&self) -> &str {
            "Stripes"
        }
        fn version(&self) -> u32 {
            1
        }
        fn current_preset(&self) -> Option<String> {
            None
        }
        fn render(&self, ctx: &PreviewContext) -> Result<RgbaImage> {
            let mut layer = ctx.blank_layer();
            for &(column, color) in &self.0 {
                layer.put_pixel(column, 0, color);
            }
            Ok(layer)
        }
        fn save_preset(&self) -> PresetValues {
            PresetValues::new()
        }
        fn load_preset(&self, _: &str, _: &PresetValues) -> Result<()> {
            Ok(())
        }
        fn clear_preset(&self) {}
    }

    #[test]
    fn falls_through_to_background() {
        let ctx = PreviewContext::new(3, 2);
        let background = RgbaImage::from_pixel(1920, 1080, Rgba([9, 9, 9, 255]));
        let mut compositor = Compositor::with_background(&background);

        let frame = compositor.composite(&ctx, &[stripe(1, RED)]).unwrap();

        assert_eq!(frame.dimensions(), (3, 2));
        assert_eq!(frame.get_pixel(0, 0), &Rgba([9, 9, 9, 255]));
        assert_eq!(frame.get_pixel(1, 1), &RED);
    }

    #[test]
    fn empty_stack_renders_background_only() {
        let frame = Compositor::new()
            .composite(&PreviewContext::new(2, 2), &[])
            .unwrap();
        assert!(frame.pixels().all(|p| *p == CLEAR));
    }

    #[test]
    fn mismatched_layer_aborts_the_pass() {
        let components: Vec<Arc<dyn Component>> =
            vec![Arc::new(SolidLayer::new([1, 1, 1, 255])), Arc::new(Oversized)];
        let err = Compositor::new()
            .composite(&PreviewContext::new(2, 2), &components)
            .unwrap_err();

        match err {
            VisualizerError::LayerSizeMismatch {
                component, actual, ..
            } => {
                assert_eq!(component, "Oversized");
                assert_eq!(actual, (3, 2));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn translucent_layers_blend() {
        let components: Vec<Arc<dyn Component>> = vec![
            Arc::new(SolidLayer::new([255, 0, 0, 128])),
            Arc::new(SolidLayer::new([0, 0, 255, 255])),
        ];

        let frame = Compositor::new()
            .composite(&PreviewContext::new(1, 1), &components)
            .unwrap();

        let pixel = frame.get_pixel(0, 0);
        assert_eq!(pixel[3], 255);
        assert!((pixel[0] as i32 - 128).abs() <= 1);
        assert_eq!(pixel[1], 0);
        assert!((pixel[2] as i32 - 127).abs() <= 1);
    }

    #[test]
    fn reuses_scaled_background_until_resolution_changes() {
        let mut compositor = Compositor::new();
        assert_eq!(compositor.background(4, 4).dimensions(), (4, 4));
        assert_eq!(compositor.background(4, 4).dimensions(), (4, 4));
        assert_eq!(compositor.background(8, 2).dimensions(), (8, 2));
    }
}
