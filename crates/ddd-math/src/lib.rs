#![warn(missing_docs)]

//! Math types for the ddd scene graph.
//!
//! Thin wrappers around nalgebra providing the node-local transform
//! (position, rotation quaternion, scale), common point/vector aliases
//! and tolerance constants shared by the geometry crates.

use nalgebra::{Matrix4, Translation3, Unit, UnitQuaternion, Vector2, Vector3};

/// A point in 3D space.
pub type Point3 = nalgebra::Point3<f64>;

/// A vector in 3D space.
pub type Vec3 = Vector3<f64>;

/// A unit (normalized) direction vector in 3D space.
pub type Dir3 = Unit<Vector3<f64>>;

/// A point in the XY plane.
pub type Point2 = nalgebra::Point2<f64>;

/// A vector in the XY plane.
pub type Vec2 = Vector2<f64>;

/// A rotation stored as a unit quaternion.
pub type Rotation = UnitQuaternion<f64>;

/// Local transform of a scene node.
///
/// Rotation and scale are stored separately from the position so that
/// exporters can emit a translation/rotation matrix and bake scale into
/// vertex data.
#[derive(Debug, Clone, PartialEq)]
pub struct Transform {
    /// Translation relative to the parent frame.
    pub position: Vec3,
    /// Orientation relative to the parent frame.
    pub rotation: Rotation,
    /// Per-axis scale factors.
    pub scale: Vec3,
}

impl Transform {
    /// Identity transform.
    pub fn identity() -> Self {
        Self {
            position: Vec3::zeros(),
            rotation: Rotation::identity(),
            scale: Vec3::new(1.0, 1.0, 1.0),
        }
    }

    /// Pure translation by `v`.
    pub fn from_position(v: Vec3) -> Self {
        Self {
            position: v,
            ..Self::identity()
        }
    }

    /// Builds a rotation quaternion from roll/pitch/yaw angles in radians.
    pub fn euler(euler: Vec3) -> Rotation {
        Rotation::from_euler_angles(euler.x, euler.y, euler.z)
    }

    /// Moves the position by `v`.
    pub fn translate(&mut self, v: Vec3) {
        self.position += v;
    }

    /// Left-multiplies the rotation by the quaternion built from `euler`.
    pub fn rotate(&mut self, euler: Vec3) {
        self.rotation = Self::euler(euler) * self.rotation;
    }

    /// Left-multiplies the rotation by `q`.
    pub fn rotate_quat(&mut self, q: Rotation) {
        self.rotation = q * self.rotation;
    }

    /// Multiplies the scale component-wise by `v`.
    pub fn scale_by(&mut self, v: Vec3) {
        self.scale.component_mul_assign(&v);
    }

    /// Homogeneous matrix `translation * rotation`.
    ///
    /// Scale is not part of this matrix; it is baked into geometry by
    /// exporters.
    pub fn to_matrix(&self) -> Matrix4<f64> {
        Translation3::from(self.position).to_homogeneous() * self.rotation.to_homogeneous()
    }

    /// Homogeneous matrix `translation * rotation * scale`.
    pub fn to_matrix_scaled(&self) -> Matrix4<f64> {
        self.to_matrix() * Matrix4::new_nonuniform_scaling(&self.scale)
    }

    /// Applies scale, rotation, then translation to a point.
    pub fn transform_point(&self, p: &Point3) -> Point3 {
        let scaled = p.coords.component_mul(&self.scale);
        Point3::from(self.rotation * scaled + self.position)
    }

    /// Applies scale and rotation to a direction (no translation).
    pub fn transform_vector(&self, v: &Vec3) -> Vec3 {
        self.rotation * v.component_mul(&self.scale)
    }

    /// Transform of `child` expressed in the frame that contains `self`.
    ///
    /// Exact for uniform scales; for non-uniform parent scale combined with
    /// child rotation the result only approximates the affine product.
    pub fn compose(&self, child: &Transform) -> Transform {
        Transform {
            position: self.transform_point(&Point3::from(child.position)).coords,
            rotation: self.rotation * child.rotation,
            scale: self.scale.component_mul(&child.scale),
        }
    }

    /// True when all scale components are equal within [`Tolerance::DEFAULT`].
    pub fn is_uniform_scale(&self) -> bool {
        let tol = Tolerance::DEFAULT;
        tol.is_zero(self.scale.x - self.scale.y) && tol.is_zero(self.scale.y - self.scale.z)
    }

    /// True when the transform leaves every point unchanged.
    pub fn is_identity(&self) -> bool {
        let tol = Tolerance::DEFAULT;
        tol.is_zero(self.position.norm())
            && self.rotation.angle() < tol.angular
            && tol.is_zero((self.scale - Vec3::new(1.0, 1.0, 1.0)).norm())
    }
}

impl Default for Transform {
    fn default() -> Self {
        Self::identity()
    }
}

/// Tolerance constants for geometric comparisons.
#[derive(Debug, Clone, Copy)]
pub struct Tolerance {
    /// Linear distance tolerance in scene units (metres).
    pub linear: f64,
    /// Angular tolerance in radians.
    pub angular: f64,
}

impl Tolerance {
    /// Default tolerances (1e-6 linear, 1e-9 rad angular).
    pub const DEFAULT: Self = Self {
        linear: 1e-6,
        angular: 1e-9,
    };

    /// Check if two points are coincident within tolerance.
    pub fn points_equal(&self, a: &Point3, b: &Point3) -> bool {
        (a - b).norm() < self.linear
    }

    /// Check if a scalar distance is effectively zero.
    pub fn is_zero(&self, d: f64) -> bool {
        d.abs() < self.linear
    }
}

impl Default for Tolerance {
    fn default() -> Self {
        Self::DEFAULT
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use std::f64::consts::FRAC_PI_2;

    #[test]
    fn test_identity_transform() {
        let t = Transform::identity();
        let p = Point3::new(1.0, 2.0, 3.0);
        assert_eq!(t.transform_point(&p), p);
        assert!(t.is_identity());
    }

    #[test]
    fn test_translate_accumulates() {
        let mut t = Transform::identity();
        t.translate(Vec3::new(1.0, 0.0, 0.0));
        t.translate(Vec3::new(0.0, 2.0, 0.0));
        assert_eq!(t.position, Vec3::new(1.0, 2.0, 0.0));
    }

    #[test]
    fn test_rotate_left_multiplies() {
        let mut t = Transform::identity();
        t.rotate(Vec3::new(0.0, 0.0, FRAC_PI_2));
        let p = t.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 1.0, epsilon = 1e-12);

        // A second rotation about X is applied after the first (left side).
        t.rotate(Vec3::new(FRAC_PI_2, 0.0, 0.0));
        let p = t.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.z, 1.0, epsilon = 1e-12);
    }

    #[test]
    fn test_matrix_omits_scale() {
        let mut t = Transform::from_position(Vec3::new(5.0, 0.0, 0.0));
        t.scale_by(Vec3::new(2.0, 2.0, 2.0));
        let m = t.to_matrix();
        assert_relative_eq!(m[(0, 0)], 1.0);
        assert_relative_eq!(m[(0, 3)], 5.0);
        let ms = t.to_matrix_scaled();
        assert_relative_eq!(ms[(0, 0)], 2.0);
    }

    #[test]
    fn test_transform_point_order() {
        let mut t = Transform::from_position(Vec3::new(0.0, 0.0, 10.0));
        t.scale_by(Vec3::new(2.0, 1.0, 1.0));
        t.rotate(Vec3::new(0.0, 0.0, FRAC_PI_2));
        let p = t.transform_point(&Point3::new(1.0, 0.0, 0.0));
        assert_relative_eq!(p.x, 0.0, epsilon = 1e-12);
        assert_relative_eq!(p.y, 2.0, epsilon = 1e-12);
        assert_relative_eq!(p.z, 10.0, epsilon = 1e-12);
    }

    #[test]
    fn test_compose_matches_nested_application() {
        let mut parent = Transform::from_position(Vec3::new(1.0, 0.0, 0.0));
        parent.rotate(Vec3::new(0.0, 0.0, FRAC_PI_2));
        let child = Transform::from_position(Vec3::new(2.0, 0.0, 0.0));
        let p = Point3::new(0.5, 0.0, 0.0);
        let nested = parent.transform_point(&child.transform_point(&p));
        let composed = parent.compose(&child).transform_point(&p);
        assert_relative_eq!(nested, composed, epsilon = 1e-12);
    }

    #[test]
    fn test_uniform_scale_check() {
        let mut t = Transform::identity();
        assert!(t.is_uniform_scale());
        t.scale_by(Vec3::new(1.0, 2.0, 1.0));
        assert!(!t.is_uniform_scale());
    }
}
