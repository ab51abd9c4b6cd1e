use serde::{Deserialize, Serialize};

///Represents a point or direction on the ground plane of the circuit.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vector2 {
    ///Value along the x-axis.
    pub x: f32,
    ///Value along the y-axis.
    /// Maps to the forward (z) axis of the 3D world; height is ignored.
    pub y: f32,
}

impl Vector2 {
    pub const fn new(x: f32, y: f32) -> Self {
        Vector2 { x, y }
    }

    ///Returns the magnitude of the vector.
    pub fn magnitude(&self) -> f32 {
        (self.x * self.x + self.y * self.y).sqrt()
    }

    ///Returns the normalized vector.
    pub fn normalize(&self) -> Vector2 {
        let mag = self.magnitude();
        if mag == 0.0 {
            Vector2 { x: 0.0, y: 0.0 }
        } else {
            Vector2 {
                x: self.x / mag,
                y: self.y / mag,
            }
        }
    }

    ///Returns the scaled vector.
    pub fn scale(&self, scalar: f32) -> Vector2 {
        Vector2 {
            x: self.x * scalar,
            y: self.y * scalar,
        }
    }

    ///Returns the sum of two vectors.
    pub fn add(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x + other.x,
            y: self.y + other.y,
        }
    }

    ///Returns `self - other`.
    pub fn sub(&self, other: &Vector2) -> Vector2 {
        Vector2 {
            x: self.x - other.x,
            y: self.y - other.y,
        }
    }

    pub fn dot(&self, other: &Vector2) -> f32 {
        self.x * other.x + self.y * other.y
    }

    ///Euclidean distance between two points.
    pub fn distance(&self, other: &Vector2) -> f32 {
        self.sub(other).magnitude()
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl From<[f32; 2]> for Vector2 {
    fn from(value: [f32; 2]) -> Self {
        Vector2::new(value[0], value[1])
    }
}

impl From<Vector2> for [f32; 2] {
    fn from(value: Vector2) -> Self {
        [value.x, value.y]
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use assert_approx_eq::assert_approx_eq;

    #[test]
    fn test_magnitude_and_normalize() {
        let v = Vector2::new(3.0, 4.0);
        assert_approx_eq!(v.magnitude(), 5.0);

        let n = v.normalize();
        assert_approx_eq!(n.x, 0.6);
        assert_approx_eq!(n.y, 0.8);
    }

    #[test]
    fn test_normalize_zero_vector() {
        let n = Vector2::default().normalize();
        assert_eq!(n, Vector2::new(0.0, 0.0));
    }

    #[test]
    fn test_dot_and_distance() {
        let a = Vector2::new(1.0, 2.0);
        let b = Vector2::new(4.0, 6.0);
        assert_approx_eq!(a.dot(&b), 16.0);
        assert_approx_eq!(a.distance(&b), 5.0);
        assert_eq!(b.sub(&a), Vector2::new(3.0, 4.0));
        assert_eq!(a.add(&b).scale(0.5), Vector2::new(2.5, 4.0));
    }

    #[test]
    fn test_array_conversion() {
        let v: Vector2 = [1.5, -2.0].into();
        assert_eq!(v, Vector2::new(1.5, -2.0));
        let arr: [f32; 2] = v.into();
        assert_eq!(arr, [1.5, -2.0]);
    }
}
