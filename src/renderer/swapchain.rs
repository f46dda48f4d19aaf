use gfx_hal::{adapter::Adapter, format as f, prelude::*, pso, window, Backend};

use crate::error::ContextError;

/// The window surface, configured for FIFO presentation.
pub struct Swapchain<'a, B: Backend> {
    device: &'a B::Device,
    adapter: &'a Adapter<B>,
    pub surface: &'a mut B::Surface,
    pub format: f::Format,
    /// Extent the surface was last configured with.
    pub dims: window::Extent2D,
    pub viewport: pso::Viewport,
}

impl<'a, B: Backend> Swapchain<'a, B> {
    pub fn new(
        device: &'a B::Device,
        surface: &'a mut B::Surface,
        adapter: &'a Adapter<B>,
        dims: window::Extent2D,
    ) -> Result<Self, ContextError> {
        let format = surface_format(surface.supported_formats(&adapter.physical_device));
        let mut swapchain = Swapchain {
            device,
            adapter,
            surface,
            format,
            dims,
            viewport: full_viewport(dims),
        };
        swapchain.recreate()?;
        Ok(swapchain)
    }

    /// Reconfigures the surface, taking the extent the platform reports when
    /// it differs from the requested one.
    pub fn recreate(&mut self) -> Result<(), ContextError> {
        let caps = self.surface.capabilities(&self.adapter.physical_device);
        let mut config = window::SwapchainConfig::from_caps(&caps, self.format, self.dims);
        config.present_mode = window::PresentMode::FIFO;
        let extent = config.extent;

        unsafe { self.surface.configure_swapchain(self.device, config) }
            .map_err(|err| ContextError::resource("swapchain", err))?;

        self.dims = extent;
        self.viewport = full_viewport(extent);
        log::debug!(
            "swapchain configured: {}x{} {:?}",
            extent.width,
            extent.height,
            self.format
        );
        Ok(())
    }
}

/// First sRGB format the surface offers, else its first one. A surface
/// without preferences gets `Rgba8Srgb`.
fn surface_format(supported: Option<Vec<f::Format>>) -> f::Format {
    let supported = supported.unwrap_or_default();
    supported
        .iter()
        .find(|format| format.base_format().1 == f::ChannelType::Srgb)
        .or_else(|| supported.first())
        .copied()
        .unwrap_or(f::Format::Rgba8Srgb)
}

fn full_viewport(extent: window::Extent2D) -> pso::Viewport {
    pso::Viewport {
        rect: pso::Rect {
            x: 0,
            y: 0,
            w: extent.width as i16,
            h: extent.height as i16,
        },
        depth: 0.0..1.0,
    }
}

impl<'a, B: Backend> Drop for Swapchain<'a, B> {
    fn drop(&mut self) {
        unsafe { self.surface.unconfigure_swapchain(self.device) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn srgb_formats_are_preferred() {
        let supported = vec![f::Format::Bgra8Unorm, f::Format::Bgra8Srgb];
        assert_eq!(surface_format(Some(supported)), f::Format::Bgra8Srgb);
    }

    #[test]
    fn falls_back_to_the_first_or_a_default_format() {
        assert_eq!(
            surface_format(Some(vec![f::Format::Bgra8Unorm])),
            f::Format::Bgra8Unorm
        );
        assert_eq!(surface_format(Some(vec![])), f::Format::Rgba8Srgb);
        assert_eq!(surface_format(None), f::Format::Rgba8Srgb);
    }

    #[test]
    fn viewport_covers_the_extent() {
        let viewport = full_viewport(window::Extent2D {
            width: 1024,
            height: 768,
        });
        assert_eq!((viewport.rect.w, viewport.rect.h), (1024, 768));
        assert_eq!(viewport.depth, 0.0..1.0);
    }
}
