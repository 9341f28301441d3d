//! Math types.
//!
//! This module intentionally stays small and deterministic.
//! It avoids SIMD/unsafe and focuses on stable semantics.

use std::ops::{Add, AddAssign, Mul, Sub};

use serde::{Deserialize, Serialize};

/// 2D vector, used for both positions and velocities.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize, Default)]
pub struct Vec2 {
    pub x: f32,
    pub y: f32,
}

impl Vec2 {
    pub const ZERO: Self = Self { x: 0.0, y: 0.0 };

    pub const fn new(x: f32, y: f32) -> Self {
        Self { x, y }
    }

    pub fn length(self) -> f32 {
        self.x.hypot(self.y)
    }

    /// Returns the unit vector pointing the same way, or `None` for a
    /// zero-length or non-finite vector.
    pub fn try_normalize(self) -> Option<Self> {
        let len = self.length();
        if len == 0.0 || !len.is_finite() {
            return None;
        }
        Some(Self::new(self.x / len, self.y / len))
    }

    pub fn is_finite(self) -> bool {
        self.x.is_finite() && self.y.is_finite()
    }
}

impl Add for Vec2 {
    type Output = Self;

    fn add(self, rhs: Self) -> Self {
        Self::new(self.x + rhs.x, self.y + rhs.y)
    }
}

impl AddAssign for Vec2 {
    fn add_assign(&mut self, rhs: Self) {
        self.x += rhs.x;
        self.y += rhs.y;
    }
}

impl Sub for Vec2 {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

impl Mul<f32> for Vec2 {
    type Output = Self;

    fn mul(self, rhs: f32) -> Self {
        Self::new(self.x * rhs, self.y * rhs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn vec2_normalize_has_unit_length() {
        let n = Vec2::new(3.0, 4.0).try_normalize().unwrap();
        assert_eq!(n, Vec2::new(0.6, 0.8));
        assert!((n.length() - 1.0).abs() < 1e-6);
    }

    #[test]
    fn vec2_normalize_rejects_degenerate() {
        assert_eq!(Vec2::ZERO.try_normalize(), None);
        assert_eq!(Vec2::new(f32::INFINITY, 0.0).try_normalize(), None);
        assert_eq!(Vec2::new(f32::NAN, 1.0).try_normalize(), None);
    }

    #[test]
    fn vec2_ops() {
        let mut p = Vec2::new(1.0, 2.0);
        p += Vec2::new(0.5, -1.0) * 2.0;
        assert_eq!(p, Vec2::new(2.0, 0.0));
        assert_eq!(p - Vec2::new(2.0, 0.0), Vec2::ZERO);
    }
}
