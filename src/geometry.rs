//! Pure planar geometry over lon/lat coordinate sequences.
//!
//! All functions are stateless and deterministic. Areas are in squared
//! degrees, an accepted approximation at city scale; none of these routines
//! attempt antimeridian or polar correctness.

use geo_types::Coord;

/// Cross products below this magnitude are treated as collinear, absorbing
/// floating-point error in degree-scale arithmetic.
pub const COLLINEAR_TOLERANCE: f64 = 1e-10;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Orientation {
    Collinear,
    Clockwise,
    CounterClockwise,
}

/// Turn direction of the ordered triple (p, q, r).
pub fn orientation(p: Coord<f64>, q: Coord<f64>, r: Coord<f64>) -> Orientation {
    let cross = (q.y - p.y) * (r.x - q.x) - (q.x - p.x) * (r.y - q.y);
    if cross.abs() < COLLINEAR_TOLERANCE {
        Orientation::Collinear
    } else if cross > 0.0 {
        Orientation::Clockwise
    } else {
        Orientation::CounterClockwise
    }
}

/// Ray-casting containment test against a closed ring (first vertex not
/// repeated). Rings with fewer than 3 vertices contain nothing.
///
/// Tie-break rule: the crossing comparison is a strict `<`, so a point lying
/// exactly on a right-hand or upper boundary edge tests outside. The rule is
/// arbitrary but consistent for all inputs.
pub fn point_in_polygon(point: Coord<f64>, ring: &[Coord<f64>]) -> bool {
    if ring.len() < 3 {
        return false;
    }
    let mut inside = false;
    let mut j = ring.len() - 1;
    for i in 0..ring.len() {
        let vi = ring[i];
        let vj = ring[j];
        // Horizontal edges never satisfy this test; crossings interpolate x.
        if (vi.y > point.y) != (vj.y > point.y) {
            let crossing_x = (vj.x - vi.x) * (point.y - vi.y) / (vj.y - vi.y) + vi.x;
            if point.x < crossing_x {
                inside = !inside;
            }
        }
        j = i;
    }
    inside
}

/// Whether q lies within the bounding box of the segment p-r. Only
/// meaningful when the three points are collinear.
fn on_segment(p: Coord<f64>, q: Coord<f64>, r: Coord<f64>) -> bool {
    q.x <= p.x.max(r.x) && q.x >= p.x.min(r.x) && q.y <= p.y.max(r.y) && q.y >= p.y.min(r.y)
}

/// Segment intersection: general case via differing orientations on both
/// pairs, collinear overlap via the on-segment test.
pub fn segments_intersect(
    p1: Coord<f64>,
    q1: Coord<f64>,
    p2: Coord<f64>,
    q2: Coord<f64>,
) -> bool {
    let o1 = orientation(p1, q1, p2);
    let o2 = orientation(p1, q1, q2);
    let o3 = orientation(p2, q2, p1);
    let o4 = orientation(p2, q2, q1);

    if o1 != o2 && o3 != o4 {
        return true;
    }

    (o1 == Orientation::Collinear && on_segment(p1, p2, q1))
        || (o2 == Orientation::Collinear && on_segment(p1, q2, q1))
        || (o3 == Orientation::Collinear && on_segment(p2, p1, q2))
        || (o4 == Orientation::Collinear && on_segment(p2, q1, q2))
}

/// True when any vertex of either ring lies inside the other, or any pair of
/// edges cross. Covers overlap without vertex containment. Degenerate rings
/// (<3 vertices) intersect nothing.
pub fn polygons_intersect(a: &[Coord<f64>], b: &[Coord<f64>]) -> bool {
    if a.len() < 3 || b.len() < 3 {
        return false;
    }
    if a.iter().any(|&v| point_in_polygon(v, b)) || b.iter().any(|&v| point_in_polygon(v, a)) {
        return true;
    }
    for i in 0..a.len() {
        let a1 = a[i];
        let a2 = a[(i + 1) % a.len()];
        for j in 0..b.len() {
            let b1 = b[j];
            let b2 = b[(j + 1) % b.len()];
            if segments_intersect(a1, a2, b1, b2) {
                return true;
            }
        }
    }
    false
}

/// Unsigned shoelace area in squared degrees. Not a surface area.
pub fn approximate_polygon_area(ring: &[Coord<f64>]) -> f64 {
    if ring.len() < 3 {
        return 0.0;
    }
    let mut sum = 0.0;
    for i in 0..ring.len() {
        let a = ring[i];
        let b = ring[(i + 1) % ring.len()];
        sum += a.x * b.y - b.x * a.y;
    }
    (sum / 2.0).abs()
}

fn bounding_box(ring: &[Coord<f64>]) -> (Coord<f64>, Coord<f64>) {
    ring.iter().fold(
        (
            Coord {
                x: f64::INFINITY,
                y: f64::INFINITY,
            },
            Coord {
                x: f64::NEG_INFINITY,
                y: f64::NEG_INFINITY,
            },
        ),
        |(min, max), c| {
            (
                Coord {
                    x: min.x.min(c.x),
                    y: min.y.min(c.y),
                },
                Coord {
                    x: max.x.max(c.x),
                    y: max.y.max(c.y),
                },
            )
        },
    )
}

/// Intersection area approximated by the overlap of the two axis-aligned
/// bounding boxes; 0 when the polygons do not intersect at all. Deliberately
/// not exact clipping.
pub fn intersection_area(a: &[Coord<f64>], b: &[Coord<f64>]) -> f64 {
    if !polygons_intersect(a, b) {
        return 0.0;
    }
    let (a_min, a_max) = bounding_box(a);
    let (b_min, b_max) = bounding_box(b);
    let width = (a_max.x.min(b_max.x) - a_min.x.max(b_min.x)).max(0.0);
    let height = (a_max.y.min(b_max.y) - a_min.y.max(b_min.y)).max(0.0);
    width * height
}

/// Intersection-over-union using the approximate areas above. 0 when either
/// ring has zero area. Symmetric in its arguments.
pub fn overlap_ratio(a: &[Coord<f64>], b: &[Coord<f64>]) -> f64 {
    let area_a = approximate_polygon_area(a);
    let area_b = approximate_polygon_area(b);
    if area_a == 0.0 || area_b == 0.0 {
        return 0.0;
    }
    let intersection = intersection_area(a, b);
    let union = area_a + area_b - intersection;
    if union <= 0.0 {
        return 0.0;
    }
    intersection / union
}

/// Monotone-chain convex hull. Points are sorted by (latitude, longitude);
/// only strictly-left turns are retained, so collinear interior points are
/// dropped. Fewer than 3 distinct input points are returned unchanged.
pub fn convex_hull(points: &[Coord<f64>]) -> Vec<Coord<f64>> {
    if points.len() < 3 {
        return points.to_vec();
    }
    let mut sorted = points.to_vec();
    sorted.sort_by(|a, b| a.y.total_cmp(&b.y).then_with(|| a.x.total_cmp(&b.x)));
    sorted.dedup();
    if sorted.len() < 3 {
        return sorted;
    }

    let mut lower: Vec<Coord<f64>> = Vec::with_capacity(sorted.len());
    for &p in &sorted {
        while lower.len() >= 2
            && orientation(lower[lower.len() - 2], lower[lower.len() - 1], p)
                != Orientation::CounterClockwise
        {
            lower.pop();
        }
        lower.push(p);
    }

    let mut upper: Vec<Coord<f64>> = Vec::with_capacity(sorted.len());
    for &p in sorted.iter().rev() {
        while upper.len() >= 2
            && orientation(upper[upper.len() - 2], upper[upper.len() - 1], p)
                != Orientation::CounterClockwise
        {
            upper.pop();
        }
        upper.push(p);
    }

    lower.pop();
    upper.pop();
    lower.extend(upper);
    lower
}

/// Approximate union: a single ring passes through unchanged; multiple rings
/// collapse to the convex hull of all their vertices. Not a true polygonal
/// union.
pub fn union_polygons(polygons: &[Vec<Coord<f64>>]) -> Vec<Coord<f64>> {
    match polygons {
        [] => Vec::new(),
        [only] => only.clone(),
        many => {
            let vertices: Vec<Coord<f64>> = many.iter().flatten().copied().collect();
            convex_hull(&vertices)
        }
    }
}

/// Like [`union_polygons`], but each vertex additionally contributes four
/// buffered points at half of `buffer_degrees`, offset at 90-degree
/// increments, so overlapping shapes merge with smoother boundaries. Still
/// an approximation, not clipping.
pub fn precise_union_polygons(polygons: &[Vec<Coord<f64>>], buffer_degrees: f64) -> Vec<Coord<f64>> {
    if polygons.len() < 2 {
        return union_polygons(polygons);
    }
    let offset = buffer_degrees * 0.5;
    let mut vertices = Vec::new();
    for ring in polygons {
        for &v in ring {
            vertices.push(v);
            vertices.push(Coord {
                x: v.x + offset,
                y: v.y,
            });
            vertices.push(Coord {
                x: v.x,
                y: v.y + offset,
            });
            vertices.push(Coord {
                x: v.x - offset,
                y: v.y,
            });
            vertices.push(Coord {
                x: v.x,
                y: v.y - offset,
            });
        }
    }
    convex_hull(&vertices)
}
