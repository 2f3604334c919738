//! Gilbert–Johnson–Keerthi distance queries between support-mapped convex sets.
//!
//! The simplex sub-problem is solved uniformly for every dimension: each subset of
//! the current simplex is projected onto its affine hull through a small Gram
//! system, and the shortest projection with strictly positive barycentric
//! coordinates is kept.

use crate::math::{Dim, Real, Vector};

const MAX_ITERATIONS: usize = 64;
const REL_TOLERANCE: Real = 1.0e-6;
const ABS_TOLERANCE: Real = 1.0e-7;

/// Vertex of the Minkowski difference `A - B` together with its witnesses.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SupportPoint<D: Dim> {
    pub point: D::Vector,
    pub a: D::Vector,
    pub b: D::Vector,
}

impl<D: Dim> SupportPoint<D> {
    pub fn new(a: D::Vector, b: D::Vector) -> Self {
        Self { point: a - b, a, b }
    }
}

/// Outcome of a GJK distance query.
#[derive(Debug, Clone, PartialEq)]
pub enum GjkResult<D: Dim> {
    /// The sets overlap; the simplex encloses the origin (completed to `DIM + 1` points when possible).
    Intersecting(Vec<SupportPoint<D>>),
    /// Closest points. `normal` points from A toward B.
    Closest {
        distance: Real,
        normal: D::Vector,
        point_a: D::Vector,
        point_b: D::Vector,
    },
    /// The sets are provably farther apart than the requested maximum distance.
    Distant,
}

/// Minkowski support in direction `dir`: `support_a(dir) - support_b(-dir)`.
pub fn minkowski_support<D, FA, FB>(support_a: &FA, support_b: &FB, dir: D::Vector) -> SupportPoint<D>
where
    D: Dim,
    FA: Fn(D::Vector) -> D::Vector,
    FB: Fn(D::Vector) -> D::Vector,
{
    SupportPoint::new(support_a(dir), support_b(-dir))
}

/// Runs GJK between two support maps given in world space.
pub fn gjk<D, FA, FB>(
    support_a: &FA,
    support_b: &FB,
    initial_dir: D::Vector,
    max_distance: Real,
) -> GjkResult<D>
where
    D: Dim,
    FA: Fn(D::Vector) -> D::Vector,
    FB: Fn(D::Vector) -> D::Vector,
{
    let mut dir = initial_dir;
    if dir.length_squared() <= ABS_TOLERANCE {
        dir = D::basis(0);
    }

    let mut simplex = vec![minkowski_support::<D, _, _>(support_a, support_b, -dir)];
    let mut best = closest_on_simplex(&simplex);

    for _ in 0..MAX_ITERATIONS {
        let x = best.point;
        let x_len2 = x.length_squared();
        if x_len2 <= ABS_TOLERANCE {
            return GjkResult::Intersecting(complete_simplex(best.subset(&simplex), support_a, support_b));
        }

        let w = minkowski_support::<D, _, _>(support_a, support_b, -x);
        let x_len = x_len2.sqrt();
        if w.point.dot(x) / x_len > max_distance {
            return GjkResult::Distant;
        }

        let improvement = x_len2 - x.dot(w.point);
        let duplicate = simplex
            .iter()
            .any(|s| (s.point - w.point).length_squared() <= ABS_TOLERANCE);
        if improvement <= REL_TOLERANCE * x_len2 || duplicate {
            return closest_result(&best, &simplex);
        }

        let mut next = best.subset(&simplex);
        next.push(w);
        let candidate = closest_on_simplex(&next);
        if candidate.point.length_squared() >= x_len2 {
            // No progress: numerical floor reached.
            return closest_result(&best, &simplex);
        }
        simplex = next;
        best = candidate;
    }

    if best.point.length_squared() <= ABS_TOLERANCE {
        GjkResult::Intersecting(complete_simplex(best.subset(&simplex), support_a, support_b))
    } else {
        closest_result(&best, &simplex)
    }
}

/// Distance between a point and a support-mapped set; negative values are never produced.
pub fn point_distance<D, F>(support: &F, point: D::Vector) -> (Real, D::Vector)
where
    D: Dim,
    F: Fn(D::Vector) -> D::Vector,
{
    let point_map = |_: D::Vector| point;
    match gjk::<D, _, _>(support, &point_map, point - support(D::basis(0)), Real::MAX) {
        GjkResult::Closest {
            distance, point_a, ..
        } => (distance, point_a),
        _ => (0.0, point),
    }
}

#[derive(Debug, Clone)]
struct SimplexProjection<D: Dim> {
    point: D::Vector,
    indices: Vec<usize>,
    barycentric: Vec<Real>,
}

impl<D: Dim> SimplexProjection<D> {
    fn subset(&self, simplex: &[SupportPoint<D>]) -> Vec<SupportPoint<D>> {
        self.indices.iter().map(|&i| simplex[i]).collect()
    }
}

fn closest_result<D: Dim>(best: &SimplexProjection<D>, simplex: &[SupportPoint<D>]) -> GjkResult<D> {
    let mut point_a = D::Vector::ZERO;
    let mut point_b = D::Vector::ZERO;
    for (&index, &weight) in best.indices.iter().zip(best.barycentric.iter()) {
        point_a += simplex[index].a * weight;
        point_b += simplex[index].b * weight;
    }
    let distance = best.point.length();
    GjkResult::Closest {
        distance,
        normal: -best.point / distance,
        point_a,
        point_b,
    }
}

/// Closest point to the origin on the convex hull of `simplex`.
fn closest_on_simplex<D: Dim>(simplex: &[SupportPoint<D>]) -> SimplexProjection<D> {
    let count = simplex.len();
    let mut best: Option<SimplexProjection<D>> = None;

    for mask in 1u32..(1u32 << count) {
        let indices: Vec<usize> = (0..count).filter(|i| mask & (1 << i) != 0).collect();
        let points: Vec<D::Vector> = indices.iter().map(|&i| simplex[i].point).collect();
        let Some(barycentric) = affine_projection::<D>(&points) else {
            continue;
        };
        if barycentric.iter().any(|&w| w <= 0.0) {
            continue;
        }
        let mut point = D::Vector::ZERO;
        for (p, w) in points.iter().zip(barycentric.iter()) {
            point += *p * *w;
        }
        let better = best
            .as_ref()
            .map(|b| point.length_squared() < b.point.length_squared())
            .unwrap_or(true);
        if better {
            best = Some(SimplexProjection {
                point,
                indices,
                barycentric,
            });
        }
    }

    // Singletons always project with weight 1, so `best` is only empty for an empty simplex.
    best.unwrap_or(SimplexProjection {
        point: D::Vector::ZERO,
        indices: Vec::new(),
        barycentric: Vec::new(),
    })
}

/// Barycentric coordinates of the origin's projection on the affine hull of `points`.
fn affine_projection<D: Dim>(points: &[D::Vector]) -> Option<Vec<Real>> {
    let n = points.len();
    if n == 1 {
        return Some(vec![1.0]);
    }
    let base = points[0];
    let edges: Vec<D::Vector> = points[1..].iter().map(|p| *p - base).collect();
    let m = edges.len();

    let mut gram = vec![vec![0.0; m + 1]; m];
    for row in 0..m {
        for col in 0..m {
            gram[row][col] = edges[row].dot(edges[col]);
        }
        gram[row][m] = -base.dot(edges[row]);
    }
    let scale = edges.iter().map(|e| e.length_squared()).fold(0.0, Real::max);
    let mu = solve_linear(gram, scale * 1.0e-6)?;

    let mut weights = Vec::with_capacity(n);
    weights.push(1.0 - mu.iter().sum::<Real>());
    weights.extend(mu);
    Some(weights)
}

/// Gaussian elimination with partial pivoting on an augmented matrix.
pub(crate) fn solve_linear(mut rows: Vec<Vec<Real>>, tolerance: Real) -> Option<Vec<Real>> {
    let n = rows.len();
    for col in 0..n {
        let pivot = (col..n).max_by(|&a, &b| rows[a][col].abs().total_cmp(&rows[b][col].abs()))?;
        if rows[pivot][col].abs() <= tolerance.max(Real::MIN_POSITIVE) {
            return None;
        }
        rows.swap(col, pivot);
        for row in (col + 1)..n {
            let factor = rows[row][col] / rows[col][col];
            for k in col..=n {
                rows[row][k] -= factor * rows[col][k];
            }
        }
    }
    let mut solution = vec![0.0; n];
    for row in (0..n).rev() {
        let mut value = rows[row][n];
        for k in (row + 1)..n {
            value -= rows[row][k] * solution[k];
        }
        solution[row] = value / rows[row][row];
    }
    Some(solution)
}

/// Whether `candidate` increases the affine rank of `points`.
fn increases_rank<D: Dim>(points: &[D::Vector], candidate: D::Vector) -> bool {
    if points.is_empty() {
        return true;
    }
    let base = points[0];
    let mut basis: Vec<D::Vector> = Vec::new();
    for p in points[1..].iter().chain(std::iter::once(&candidate)) {
        let mut v = *p - base;
        for b in &basis {
            v -= *b * v.dot(*b);
        }
        let length = v.length();
        if length <= 1.0e-5 {
            if std::ptr::eq(p, &candidate) {
                return false;
            }
            continue;
        }
        basis.push(v / length);
    }
    basis.len() == points.len()
}

/// Grows a simplex that touches the origin into a full-dimensional one for EPA.
fn complete_simplex<D, FA, FB>(
    mut simplex: Vec<SupportPoint<D>>,
    support_a: &FA,
    support_b: &FB,
) -> Vec<SupportPoint<D>>
where
    D: Dim,
    FA: Fn(D::Vector) -> D::Vector,
    FB: Fn(D::Vector) -> D::Vector,
{
    let mut axis = 0;
    while simplex.len() < D::DIM + 1 && axis < 2 * D::DIM {
        let dir = if axis % 2 == 0 {
            D::basis(axis / 2)
        } else {
            -D::basis(axis / 2)
        };
        axis += 1;
        let candidate = minkowski_support::<D, _, _>(support_a, support_b, dir);
        let points: Vec<D::Vector> = simplex.iter().map(|s| s.point).collect();
        if increases_rank::<D>(&points, candidate.point) {
            simplex.push(candidate);
        }
    }
    simplex
}
