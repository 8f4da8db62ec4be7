use serde::{Deserialize, Serialize};

///Represents a vector in 3D space.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec3 {
    ///Value along the x-axis.
    /// Positive direction is to the right.
    pub x: f32,
    ///Value along the y-axis.
    /// Positive direction is up.
    pub y: f32,
    ///Value along the z-axis.
    /// Positive direction is forward.
    pub z: f32,
}

impl Vec3 {
    pub const ZERO: Vec3 = Vec3 {
        x: 0.0,
        y: 0.0,
        z: 0.0,
    };

    pub fn new(x: f32, y: f32, z: f32) -> Self {
        Self { x, y, z }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y + self.z * self.z).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vec3 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vec3::ZERO
        } else {
            Vec3 {
                x: self.x / mag,
                y: self.y / mag,
                z: self.z / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vec3 {
        Vec3 {
            x: self.x * scalar,
            y: self.y * scalar,
            z: self.z * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vec3) -> Vec3 {
        Vec3 {
            x: self.x + other.x,
            y: self.y + other.y,
            z: self.z + other.z,
        }
    }

    ///Returns the vector with its vertical component removed.
    pub fn horizontal(&self) -> Vec3 {
        Vec3 {
            x: self.x,
            y: 0.0,
            z: self.z,
        }
    }

    ///Returns the point `t` of the way from `self` to `other`.
    pub fn lerp(&self, other: &Vec3, t: f32) -> Vec3 {
        Vec3 {
            x: self.x + (other.x - self.x) * t,
            y: self.y + (other.y - self.y) * t,
            z: self.z + (other.z - self.z) * t,
        }
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite() && self.z.is_finite()
    }

    /// Per-axis comparison within `epsilon`.
    pub fn approx_eq(&self, other: &Vec3, epsilon: f32) -> bool {
        approx_eq(self.x, other.x, epsilon)
            && approx_eq(self.y, other.y, epsilon)
            && approx_eq(self.z, other.z, epsilon)
    }
}

/// Returns true if both values are strictly closer than `epsilon`.
pub fn approx_eq(a: f32, b: f32, epsilon: f32) -> bool {
    (a - b).abs() < epsilon
}

/// Wraps an angle in degrees into `[0, 360)`.
pub fn wrap_degrees(degrees: f32) -> f32 {
    let wrapped = degrees.rem_euclid(360.0);
    // rem_euclid can round up to exactly 360.0 for tiny negative inputs
    if wrapped >= 360.0 {
        0.0
    } else {
        wrapped
    }
}

/// Compares two headings in degrees, treating 359.9995 and 0.0 as neighbours.
pub fn angle_approx_eq(a: f32, b: f32, epsilon: f32) -> bool {
    let diff = (wrap_degrees(a) - wrap_degrees(b)).abs();
    diff < epsilon || (360.0 - diff) < epsilon
}

/// Interpolates between two headings along the shorter arc, wrapped into
/// `[0, 360)`.
pub fn lerp_degrees(from: f32, to: f32, t: f32) -> f32 {
    let delta = (to - from + 180.0).rem_euclid(360.0) - 180.0;
    wrap_degrees(from + delta * t)
}
