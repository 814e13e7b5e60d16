//! Least-squares fitting helpers: weighted centroid, 3x3 covariance, and
//! the dominant-eigenvector extraction used to orient the cluster fit.

use cgmath::{InnerSpace, Vector3};

/// Weighted centroid of a point set. `metric` scales each axis before the
/// covariance accumulation, matching the channel weights of the caller.
pub fn compute_centroid(points: &[Vector3<f32>], weights: &[f32]) -> Vector3<f32> {
    let mut centroid = Vector3::new(0.0, 0.0, 0.0);
    let mut total = 0.0;
    for (p, &w) in points.iter().zip(weights) {
        total += w;
        centroid += *p * w;
    }
    if total > 0.0 {
        centroid /= total;
    }
    centroid
}

/// Weighted covariance as the six unique elements
/// `[xx, xy, xz, yy, yz, zz]`. Returns the centroid as well.
pub fn compute_covariance(
    points: &[Vector3<f32>],
    weights: &[f32],
    metric: Vector3<f32>,
) -> (Vector3<f32>, [f32; 6]) {
    let centroid = compute_centroid(points, weights);

    let mut covariance = [0.0f32; 6];
    for (p, &w) in points.iter().zip(weights) {
        let a = Vector3::new(
            (p.x - centroid.x) * metric.x,
            (p.y - centroid.y) * metric.y,
            (p.z - centroid.z) * metric.z,
        );
        let b = a * w;

        covariance[0] += a.x * b.x;
        covariance[1] += a.x * b.y;
        covariance[2] += a.x * b.z;
        covariance[3] += a.y * b.y;
        covariance[4] += a.y * b.z;
        covariance[5] += a.z * b.z;
    }

    (centroid, covariance)
}

/// Seed for the power method: the covariance row with the largest norm.
fn estimate_principal_component(matrix: &[f32; 6]) -> Vector3<f32> {
    let row0 = Vector3::new(matrix[0], matrix[1], matrix[2]);
    let row1 = Vector3::new(matrix[1], matrix[3], matrix[4]);
    let row2 = Vector3::new(matrix[2], matrix[4], matrix[5]);

    let r0 = row0.magnitude2();
    let r1 = row1.magnitude2();
    let r2 = row2.magnitude2();

    if r0 > r1 && r0 > r2 {
        row0
    } else if r1 > r2 {
        row1
    } else {
        row2
    }
}

/// Dominant eigenvector by eight iterations of the power method. Returns
/// the zero vector for a degenerate (single-point) covariance.
pub fn first_eigen_vector(matrix: &[f32; 6]) -> Vector3<f32> {
    if matrix[0] == 0.0 && matrix[3] == 0.0 && matrix[5] == 0.0 {
        return Vector3::new(0.0, 0.0, 0.0);
    }

    let mut v = estimate_principal_component(matrix);
    for _ in 0..8 {
        let x = v.x * matrix[0] + v.y * matrix[1] + v.z * matrix[2];
        let y = v.x * matrix[1] + v.y * matrix[3] + v.z * matrix[4];
        let z = v.x * matrix[2] + v.y * matrix[4] + v.z * matrix[5];

        let norm = x.max(y).max(z);
        if norm == 0.0 {
            break;
        }
        v = Vector3::new(x, y, z) / norm;
    }

    v
}

/// Principal axis of a weighted point set.
pub fn compute_principal_component(
    points: &[Vector3<f32>],
    weights: &[f32],
    metric: Vector3<f32>,
) -> Vector3<f32> {
    let (_, covariance) = compute_covariance(points, weights, metric);
    first_eigen_vector(&covariance)
}
