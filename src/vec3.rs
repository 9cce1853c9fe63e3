// src/vec3.rs

pub type Mat3 = [[f64; 3]; 3];

/// 3D vector dot product.
#[inline]
pub fn dot(a: [f64; 3], b: [f64; 3]) -> f64 {
    a[0] * b[0] + a[1] * b[1] + a[2] * b[2]
}

/// 3D vector cross product: a × b.
#[inline]
pub fn cross(a: [f64; 3], b: [f64; 3]) -> [f64; 3] {
    [
        a[1] * b[2] - a[2] * b[1],
        a[2] * b[0] - a[0] * b[2],
        a[0] * b[1] - a[1] * b[0],
    ]
}

#[inline]
pub fn norm(v: [f64; 3]) -> f64 {
    dot(v, v).sqrt()
}

/// Normalise a 3D vector to unit length. If zero, return (0, 0, 1).
#[inline]
pub fn normalize(v: [f64; 3]) -> [f64; 3] {
    let n2 = dot(v, v);
    if n2 == 0.0 {
        return [0.0, 0.0, 1.0];
    }
    let inv = 1.0 / n2.sqrt();
    [v[0] * inv, v[1] * inv, v[2] * inv]
}

#[inline]
pub fn scale(v: [f64; 3], s: f64) -> [f64; 3] {
    [v[0] * s, v[1] * s, v[2] * s]
}

/// a + s b
#[inline]
pub fn madd(a: [f64; 3], b: [f64; 3], s: f64) -> [f64; 3] {
    [a[0] + s * b[0], a[1] + s * b[1], a[2] + s * b[2]]
}

/// y = A x
#[inline]
pub fn mat_vec(a: &Mat3, x: [f64; 3]) -> [f64; 3] {
    [dot(a[0], x), dot(a[1], x), dot(a[2], x)]
}

/// y = Aᵀ x
#[inline]
pub fn mat_t_vec(a: &Mat3, x: [f64; 3]) -> [f64; 3] {
    [
        a[0][0] * x[0] + a[1][0] * x[1] + a[2][0] * x[2],
        a[0][1] * x[0] + a[1][1] * x[1] + a[2][1] * x[2],
        a[0][2] * x[0] + a[1][2] * x[1] + a[2][2] * x[2],
    ]
}

/// A B
pub fn mat_mul(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut c = [[0.0; 3]; 3];
    for (i, row) in c.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = a[i][0] * b[0][j] + a[i][1] * b[1][j] + a[i][2] * b[2][j];
        }
    }
    c
}

/// A Bᵀ
pub fn mat_mul_t(a: &Mat3, b: &Mat3) -> Mat3 {
    let mut c = [[0.0; 3]; 3];
    for (i, row) in c.iter_mut().enumerate() {
        for (j, v) in row.iter_mut().enumerate() {
            *v = dot(a[i], b[j]);
        }
    }
    c
}

/// Matrix of the linear map x -> m × x.
pub fn cross_matrix(m: [f64; 3]) -> Mat3 {
    [
        [0.0, -m[2], m[1]],
        [m[2], 0.0, -m[0]],
        [-m[1], m[0], 0.0],
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cross_matrix_matches_cross_product() {
        let m = [0.3, -0.4, 0.5];
        let x = [1.5, 2.0, -0.7];
        let a = mat_vec(&cross_matrix(m), x);
        let b = cross(m, x);
        for c in 0..3 {
            assert!((a[c] - b[c]).abs() < 1e-15);
        }
    }

    #[test]
    fn transpose_products_agree() {
        let a = [[1.0, 2.0, 3.0], [4.0, 5.0, 6.0], [7.0, 8.0, 10.0]];
        let x = [0.1, -0.2, 0.3];
        let at = [
            [a[0][0], a[1][0], a[2][0]],
            [a[0][1], a[1][1], a[2][1]],
            [a[0][2], a[1][2], a[2][2]],
        ];
        assert_eq!(mat_t_vec(&a, x), mat_vec(&at, x));
        assert_eq!(mat_mul_t(&a, &a), mat_mul(&a, &at));
    }
}
