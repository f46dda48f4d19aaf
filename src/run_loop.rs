use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::gl::GraphicsContext;
use crate::scene::Scene;

/// Requests a [`RunLoop`] to stop before its next frame.
#[derive(Debug, Clone, Default)]
pub struct StopHandle(Arc<AtomicBool>);

impl StopHandle {
    pub fn stop(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    pub fn is_stopped(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }
}

/// Drives a scene one frame at a time until stopped. Pacing comes from
/// [`GraphicsContext::composite`].
#[derive(Debug, Default)]
pub struct RunLoop {
    stop: StopHandle,
    frame_limit: Option<u64>,
}

impl RunLoop {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_frame_limit(frames: u64) -> Self {
        RunLoop {
            frame_limit: Some(frames),
            ..Self::default()
        }
    }

    pub fn stop_handle(&self) -> StopHandle {
        self.stop.clone()
    }

    /// Returns the number of frames that were run.
    pub fn run<C: GraphicsContext>(&self, scene: &mut Scene, ctx: &mut C) -> u64 {
        let mut fps = fps_counter::FPSCounter::new();
        let mut frames = 0;
        log::info!("entering the frame loop");

        while !self.stop.is_stopped() && self.frame_limit.map_or(true, |limit| frames < limit) {
            scene.frame(ctx);
            ctx.composite();
            frames += 1;
            log::trace!("frame {}: {} fps", frames, fps.tick());
        }

        log::info!("frame loop stopped after {} frames", frames);
        log::debug!("angle {} deg, model {:?}", scene.angle(), scene.model());
        frames
    }
}
