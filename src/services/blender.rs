use ndarray::{ArrayD, ArrayViewD, Zip};

use crate::models::error::AppError;

/// Linear interpolation between two bottlenecks: `a * (1 - ratio) + b * ratio`.
///
/// `ratio` is not clamped; values outside `[0, 1]` extrapolate. Both operands
/// must have exactly the same shape.
pub fn interpolate(
    a: ArrayViewD<'_, f32>,
    b: ArrayViewD<'_, f32>,
    ratio: f32,
) -> Result<ArrayD<f32>, AppError> {
    if a.shape() != b.shape() {
        return Err(AppError::ShapeMismatch {
            left: a.shape().to_vec(),
            right: b.shape().to_vec(),
        });
    }

    let keep = 1.0 - ratio;
    Ok(Zip::from(&a)
        .and(&b)
        .map_collect(|&x, &y| x * keep + y * ratio))
}
