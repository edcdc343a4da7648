use nalgebra::{Matrix2, Matrix2x3, Matrix3, Point2, Vector2, Vector3};
use serde::{Deserialize, Serialize};

const MIN_DETERMINANT: f64 = 1e-12;

/// Errors from affine construction and estimation.
#[derive(thiserror::Error, Debug, Clone, PartialEq)]
pub enum AffineError {
    #[error("affine transform is singular (det={det:e})")]
    Singular { det: f64 },
    #[error("need at least 3 correspondences, got {got}")]
    TooFewPoints { got: usize },
    #[error("correspondence count mismatch ({src} source vs {dst} destination points)")]
    LengthMismatch { src: usize, dst: usize },
    #[error("degenerate point configuration (collinear or coincident points)")]
    Degenerate,
}

/// 2×3 affine map `p' = A p + t`, invertible by construction.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
#[serde(try_from = "[f64; 6]", into = "[f64; 6]")]
pub struct AffineTransform {
    m: Matrix2x3<f64>,
}

impl TryFrom<[f64; 6]> for AffineTransform {
    type Error = AffineError;

    fn try_from(c: [f64; 6]) -> Result<Self, Self::Error> {
        Self::from_coefficients(c)
    }
}

impl From<AffineTransform> for [f64; 6] {
    fn from(t: AffineTransform) -> Self {
        t.coefficients()
    }
}

impl AffineTransform {
    pub fn new(m: Matrix2x3<f64>) -> Result<Self, AffineError> {
        let det = m[(0, 0)] * m[(1, 1)] - m[(0, 1)] * m[(1, 0)];
        if !det.is_finite() || det.abs() < MIN_DETERMINANT {
            return Err(AffineError::Singular { det });
        }
        Ok(Self { m })
    }

    /// Row-major coefficients `[a, b, tx, c, d, ty]`.
    pub fn from_coefficients(c: [f64; 6]) -> Result<Self, AffineError> {
        Self::new(Matrix2x3::new(c[0], c[1], c[2], c[3], c[4], c[5]))
    }

    pub fn identity() -> Self {
        Self {
            m: Matrix2x3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0),
        }
    }

    /// Quarter turn of the unit square onto itself sending `(0,0)` to corner
    /// `k % 4` of TL, TR, BR, BL (clockwise on screen).
    pub fn unit_square_turn(k: usize) -> Self {
        let m = match k % 4 {
            0 => Matrix2x3::new(1.0, 0.0, 0.0, 0.0, 1.0, 0.0),
            1 => Matrix2x3::new(0.0, -1.0, 1.0, 1.0, 0.0, 0.0),
            2 => Matrix2x3::new(-1.0, 0.0, 1.0, 0.0, -1.0, 1.0),
            _ => Matrix2x3::new(0.0, 1.0, 0.0, -1.0, 0.0, 1.0),
        };
        Self { m }
    }

    /// Rotation (radians, counter-clockwise in math axes, i.e. clockwise on
    /// screen), uniform scale and translation.
    pub fn from_similarity(
        rotation: f64,
        scale: f64,
        translation: Vector2<f64>,
    ) -> Result<Self, AffineError> {
        let (s, c) = rotation.sin_cos();
        Self::new(Matrix2x3::new(
            scale * c,
            -scale * s,
            translation.x,
            scale * s,
            scale * c,
            translation.y,
        ))
    }

    #[inline]
    pub fn matrix(&self) -> &Matrix2x3<f64> {
        &self.m
    }

    pub fn coefficients(&self) -> [f64; 6] {
        [
            self.m[(0, 0)],
            self.m[(0, 1)],
            self.m[(0, 2)],
            self.m[(1, 0)],
            self.m[(1, 1)],
            self.m[(1, 2)],
        ]
    }

    #[inline]
    pub fn linear(&self) -> Matrix2<f64> {
        self.m.fixed_view::<2, 2>(0, 0).into_owned()
    }

    #[inline]
    pub fn translation(&self) -> Vector2<f64> {
        Vector2::new(self.m[(0, 2)], self.m[(1, 2)])
    }

    #[inline]
    pub fn determinant(&self) -> f64 {
        self.linear().determinant()
    }

    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.m * Vector3::new(p.x as f64, p.y as f64, 1.0);
        Point2::new(v[0] as f32, v[1] as f32)
    }

    /// Map a direction (translation ignored).
    #[inline]
    pub fn apply_vector(&self, v: Vector2<f32>) -> Vector2<f32> {
        let r = self.linear() * Vector2::new(v.x as f64, v.y as f64);
        Vector2::new(r.x as f32, r.y as f32)
    }

    /// Map a surface normal: uses the inverse transpose of the linear part.
    pub fn apply_normal(&self, n: Vector2<f32>) -> Vector2<f32> {
        let a = self.linear();
        // (A^-T) n = adj(A)^T n / det; only the direction matters here
        let adj_t = Matrix2::new(a[(1, 1)], -a[(1, 0)], -a[(0, 1)], a[(0, 0)]);
        let r = adj_t * Vector2::new(n.x as f64, n.y as f64) * self.determinant().signum();
        Vector2::new(r.x as f32, r.y as f32)
    }

    fn to_homogeneous(self) -> Matrix3<f64> {
        let mut h = Matrix3::identity();
        h.fixed_view_mut::<2, 3>(0, 0).copy_from(&self.m);
        h
    }

    fn from_homogeneous(h: &Matrix3<f64>) -> Self {
        Self {
            m: h.fixed_view::<2, 3>(0, 0).into_owned(),
        }
    }

    pub fn inverse(&self) -> Self {
        let a = self.linear();
        let det = a.determinant();
        let inv = Matrix2::new(a[(1, 1)], -a[(0, 1)], -a[(1, 0)], a[(0, 0)]) / det;
        let t = -(inv * self.translation());
        Self {
            m: Matrix2x3::new(inv[(0, 0)], inv[(0, 1)], t.x, inv[(1, 0)], inv[(1, 1)], t.y),
        }
    }

    /// `self ∘ inner`: apply `inner` first, then `self`.
    pub fn compose(&self, inner: &AffineTransform) -> Self {
        Self::from_homogeneous(&(self.to_homogeneous() * inner.to_homogeneous()))
    }

    /// Angle of the mapped x axis, `atan2(a10, a00)`.
    pub fn rotation(&self) -> f64 {
        self.m[(1, 0)].atan2(self.m[(0, 0)])
    }

    /// Lengths of the mapped unit x and y axes.
    pub fn axis_scales(&self) -> (f64, f64) {
        let a = self.linear();
        (a.column(0).norm(), a.column(1).norm())
    }
}

fn normalization(pts: &[Point2<f32>]) -> Matrix3<f64> {
    let n = pts.len() as f64;
    let (mut cx, mut cy) = (0.0f64, 0.0f64);
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0f64;
    for p in pts {
        let dx = p.x as f64 - cx;
        let dy = p.y as f64 - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let s = if mean_dist > 1e-12 {
        std::f64::consts::SQRT_2 / mean_dist
    } else {
        1.0
    };
    Matrix3::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

/// Least-squares affine estimate such that `dst ~ A * src`.
///
/// Closed form over normalized coordinates; three correspondences give an
/// exact fit, more give the least-squares solution.
pub fn estimate_affine(
    src: &[Point2<f32>],
    dst: &[Point2<f32>],
) -> Result<AffineTransform, AffineError> {
    if src.len() != dst.len() {
        return Err(AffineError::LengthMismatch {
            src: src.len(),
            dst: dst.len(),
        });
    }
    if src.len() < 3 {
        return Err(AffineError::TooFewPoints { got: src.len() });
    }

    let ts = normalization(src);
    let td = normalization(dst);

    let mut ata = Matrix3::<f64>::zeros();
    let mut atu = Vector3::<f64>::zeros();
    let mut atv = Vector3::<f64>::zeros();
    for (s, d) in src.iter().zip(dst) {
        let a = ts * Vector3::new(s.x as f64, s.y as f64, 1.0);
        let b = td * Vector3::new(d.x as f64, d.y as f64, 1.0);
        ata += a * a.transpose();
        atu += a * b.x;
        atv += a * b.y;
    }

    let eig = ata.symmetric_eigenvalues();
    let (lo, hi) = (eig.min(), eig.max());
    if hi <= 0.0 || lo <= 1e-9 * hi {
        return Err(AffineError::Degenerate);
    }
    let chol = ata.cholesky().ok_or(AffineError::Degenerate)?;
    let row_u = chol.solve(&atu);
    let row_v = chol.solve(&atv);

    let an = Matrix3::new(
        row_u[0], row_u[1], row_u[2], //
        row_v[0], row_v[1], row_v[2], //
        0.0, 0.0, 1.0,
    );
    let td_inv = td.try_inverse().ok_or(AffineError::Degenerate)?;
    let h = td_inv * an * ts;
    AffineTransform::new(h.fixed_view::<2, 3>(0, 0).into_owned())
}
