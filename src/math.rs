//! Pose and matrix helpers for the view/projection updates.
//!
//! Matrices are row-major `[[f32; 4]; 4]` acting on column vectors, with a
//! right-handed eye space (looking down -Z) and zero-to-one clip depth.

use crate::runtime::{Fov, Pose};

pub type Mat4 = [[f32; 4]; 4];

pub fn identity() -> Mat4 {
    [
        [1.0, 0.0, 0.0, 0.0],
        [0.0, 1.0, 0.0, 0.0],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]
}

/// 3x3 rotation part of a unit quaternion (x, y, z, w).
fn rotation_from_quat(q: [f32; 4]) -> [[f32; 3]; 3] {
    let [x, y, z, w] = q;
    let (x2, y2, z2) = (x + x, y + y, z + z);
    let (xx, yy, zz) = (x * x2, y * y2, z * z2);
    let (xy, xz, yz) = (x * y2, x * z2, y * z2);
    let (wx, wy, wz) = (w * x2, w * y2, w * z2);
    [
        [1.0 - (yy + zz), xy - wz, xz + wy],
        [xy + wz, 1.0 - (xx + zz), yz - wx],
        [xz - wy, yz + wx, 1.0 - (xx + yy)],
    ]
}

/// View matrix for an eye or head pose: the inverse of the rigid transform
/// described by the pose.
pub fn view_from_pose(pose: &Pose) -> Mat4 {
    let r = rotation_from_quat(pose.orientation);
    let p = pose.position;
    // Transpose of the rotation, translation rotated back and negated.
    let mut view = identity();
    for row in 0..3 {
        for col in 0..3 {
            view[row][col] = r[col][row];
        }
        view[row][3] = -(r[0][row] * p[0] + r[1][row] * p[1] + r[2][row] * p[2]);
    }
    view
}

/// Asymmetric projection from per-eye FOV half angles and clip planes.
pub fn projection_from_fov(fov: &Fov, nearz: f32, farz: f32) -> Mat4 {
    let tan_left = fov.angle_left.tan();
    let tan_right = fov.angle_right.tan();
    let tan_up = fov.angle_up.tan();
    let tan_down = fov.angle_down.tan();

    let width = tan_right - tan_left;
    let height = tan_up - tan_down;
    let depth = farz - nearz;

    let mut m = [[0.0f32; 4]; 4];
    m[0][0] = 2.0 / width;
    m[0][2] = (tan_right + tan_left) / width;
    m[1][1] = 2.0 / height;
    m[1][2] = (tan_up + tan_down) / height;
    m[2][2] = -farz / depth;
    m[2][3] = -(farz * nearz) / depth;
    m[3][2] = -1.0;
    m
}

/// Transform a point by a matrix (w assumed 1, no perspective divide).
pub fn transform_point(m: &Mat4, p: [f32; 3]) -> [f32; 3] {
    let mut out = [0.0f32; 3];
    for row in 0..3 {
        out[row] = m[row][0] * p[0] + m[row][1] * p[1] + m[row][2] * p[2] + m[row][3];
    }
    out
}
