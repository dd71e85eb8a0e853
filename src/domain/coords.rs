//! Graph-space coordinates and the sphere projection used by the renderer.
//!
//! Nodes are placed on the surface of a sphere. `a` is the longitude and
//! `b` the polar angle, both in degrees before the stretch multipliers are
//! applied. `bmod` nudges a node along `b` so that siblings do not overlap.

/// Distance (in `b` units) contributed by each step of `bmod`.
pub const BMOD_MAGNITUDE: f32 = 2.0;

/// Semantic position of a node in graph space.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct VCoord {
    pub a: i32,
    pub b: i32,
    pub bmod: i32,
}

impl VCoord {
    pub fn new(a: i32, b: i32, bmod: i32) -> Self {
        Self { a, b, bmod }
    }

    /// `b` after the modifier has been folded in.
    pub fn adjusted_b(&self) -> f32 {
        self.b as f32 + self.bmod as f32 * BMOD_MAGNITUDE
    }
}

/// A point in render space.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct FCoord {
    pub x: f32,
    pub y: f32,
    pub z: f32,
}

/// A projected screen position; `z` is the depth-buffer value.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct DCoord {
    pub x: f64,
    pub y: f64,
    pub z: f64,
}

/// Sphere size and stretch factors supplied by the renderer.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Multipliers {
    pub radius: f32,
    /// Degrees of longitude per unit of `a`.
    pub h_multiplier: f32,
    /// Degrees of polar angle per unit of `b`.
    pub v_multiplier: f32,
}

impl Default for Multipliers {
    fn default() -> Self {
        Self {
            radius: 5000.0,
            h_multiplier: 1.0,
            v_multiplier: 1.0,
        }
    }
}

/// Map a longitude/polar pair onto the sphere described by `dims`.
///
/// `diam_modifier` grows or shrinks the radius for this call only, which is
/// how the renderer lifts some nodes slightly off the surface.
pub fn sphere_coord(a: i32, b: f32, dims: &Multipliers, diam_modifier: f32) -> FCoord {
    let r = dims.radius + diam_modifier;
    let longitude = (a as f32 * dims.h_multiplier).to_radians();
    let polar = (b * dims.v_multiplier).to_radians();

    FCoord {
        x: r * polar.sin() * longitude.cos(),
        y: r * polar.cos(),
        z: r * polar.sin() * longitude.sin(),
    }
}
