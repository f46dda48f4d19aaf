use bytemuck::{Pod, Zeroable};

const GREEN: [f32; 3] = [0.4, 1.0, 0.4];
const RED: [f32; 3] = [1.0, 0.4, 0.4];
const YELLOW: [f32; 3] = [1.0, 1.0, 0.4];
const BLUE: [f32; 3] = [0.4, 0.4, 1.0];

#[repr(C)]
#[derive(Debug, Clone, Copy, PartialEq, Pod, Zeroable)]
#[allow(non_snake_case)]
pub struct Vertex {
    pub a_Position: [f32; 3],
    pub a_Color: [f32; 3],
}

const fn v(position: [f32; 3], color: [f32; 3]) -> Vertex {
    Vertex {
        a_Position: position,
        a_Color: color,
    }
}

/// Three disjoint triangles, back to front.
pub const TRIANGLES: [Vertex; 9] = [
    v([0.0, 0.5, -0.4], GREEN),
    v([-0.5, -0.5, -0.4], GREEN),
    v([0.5, -0.5, -0.4], RED),
    v([0.5, 0.4, -0.2], RED),
    v([-0.5, 0.4, -0.2], YELLOW),
    v([0.0, -0.6, -0.2], YELLOW),
    v([0.0, 0.5, 0.0], BLUE),
    v([-0.5, -0.5, 0.0], BLUE),
    v([0.5, -0.5, 0.0], RED),
];
