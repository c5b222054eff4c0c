use nalgebra as na;
use num_traits::Float;

/// Value at `x` on the segment from `(x0, y0)` to `(x1, y1)`.
#[inline]
pub fn lerp<T: Float>(x0: T, y0: T, x1: T, y1: T, x: T) -> T {
    if x1 == x0 {
        return y0;
    }

    let t = (x - x0) / (x1 - x0);
    y0 + (y1 - y0) * t
}

/// Element with the smallest summed distance to all others. Unlike a
/// per-axis median it is always one of the inputs, so it never invents a
/// vector longer than every observation.
pub fn medoid(points: &[na::Vector2<f32>]) -> Option<na::Vector2<f32>> {
    let mut best: Option<(f32, na::Vector2<f32>)> = None;

    for p in points {
        let cost: f32 = points.iter().map(|q| (p - q).norm()).sum();

        match best {
            Some((c, _)) if c <= cost => {}
            _ => best = Some((cost, *p)),
        }
    }

    best.map(|(_, p)| p)
}
