/// Compile-time settings for the window, the swapchain and the scene.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Config {
    pub title: &'static str,
    pub width: u32,
    pub height: u32,
    pub min_size: f64,
    pub frames_in_flight: usize,
    /// GL default clear color, transparent black.
    pub clear_color: [f32; 4],
    /// Degrees added to the rotation angle every frame.
    pub angle_step: f32,
    /// Stop after this many frames; `None` runs until the window closes.
    pub frame_limit: Option<u64>,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            title: "spinning triangles",
            width: 1024,
            height: 768,
            min_size: 64.0,
            frames_in_flight: 2,
            clear_color: [0.0, 0.0, 0.0, 0.0],
            angle_step: 1.0,
            frame_limit: None,
        }
    }
}
