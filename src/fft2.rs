use crate::Shape;
use ndarray::parallel::prelude::{IntoParallelIterator, ParallelIterator};
use ndarray::{Array2, ArrayViewMut1, ArrayViewMut2, Zip};
use num_complex::Complex;
use rustfft::num_traits::Zero;
use rustfft::{Fft, FftDirection, FftPlanner};
use std::sync::Arc;

/// Direction of a 2D transform.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum Direction {
    Forward,
    Inverse,
}

impl From<Direction> for FftDirection {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Forward => FftDirection::Forward,
            Direction::Inverse => FftDirection::Inverse,
        }
    }
}

/// Row and column plans for one grid shape and direction.
#[derive(Clone)]
pub struct Fft2Plan {
    rows: Arc<dyn Fft<f32>>,
    cols: Arc<dyn Fft<f32>>,
}

impl Fft2Plan {
    pub fn new(planner: &mut FftPlanner<f32>, shape: Shape, direction: Direction) -> Self {
        Fft2Plan {
            rows: planner.plan_fft(shape.width, direction.into()),
            cols: planner.plan_fft(shape.height, direction.into()),
        }
    }

    pub fn shape(&self) -> Shape {
        Shape::new(self.cols.len(), self.rows.len())
    }
}

pub fn fft2(mut input: Array2<Complex<f32>>) -> Array2<Complex<f32>> {
    _fft2(input.view_mut(), Direction::Forward);
    input
}
pub fn ifft2(mut input: Array2<Complex<f32>>) -> Array2<Complex<f32>> {
    _fft2(input.view_mut(), Direction::Inverse);
    input
}
fn _fft2(input: ArrayViewMut2<Complex<f32>>, direction: Direction) {
    let (h, w) = input.dim();
    let plan = Fft2Plan::new(&mut FftPlanner::new(), Shape::new(h, w), direction);
    fft2_inplace(input, &plan);
}

/// Unitary 2D transform in place. Both directions scale by 1/sqrt(H·W), so inverse(forward(x)) == x.
///
/// The input must have the shape the plan was made for.
pub fn fft2_inplace(mut input: ArrayViewMut2<Complex<f32>>, plan: &Fft2Plan) {
    debug_assert_eq!(input.dim(), plan.shape().dims());
    let normalisation = 1.0 / ((input.shape()[0] * input.shape()[1]) as f32).sqrt();

    let fft_row = &plan.rows;
    Zip::from(input.rows_mut()).into_par_iter().for_each_init(
        || {
            (
                vec![Zero::zero(); fft_row.len()],
                vec![Zero::zero(); fft_row.get_inplace_scratch_len()],
            )
        },
        |(temp, scratch), row| {
            process_lane(row.0, fft_row.as_ref(), temp, scratch, 1.0);
        },
    );

    let fft_col = &plan.cols;
    Zip::from(input.columns_mut())
        .into_par_iter()
        .for_each_init(
            || {
                (
                    vec![Zero::zero(); fft_col.len()],
                    vec![Zero::zero(); fft_col.get_inplace_scratch_len()],
                )
            },
            |(temp, scratch), col| {
                process_lane(col.0, fft_col.as_ref(), temp, scratch, normalisation);
            },
        );
}

// lanes are copied through a contiguous buffer so strided columns and rows share one path
fn process_lane(
    mut lane: ArrayViewMut1<Complex<f32>>,
    fft: &dyn Fft<f32>,
    temp: &mut [Complex<f32>],
    scratch: &mut [Complex<f32>],
    scale: f32,
) {
    debug_assert_eq!(lane.len(), temp.len());
    for (t, e) in temp.iter_mut().zip(lane.iter()) {
        *t = *e;
    }
    fft.process_with_scratch(temp, scratch);
    for (e, t) in lane.iter_mut().zip(temp.iter()) {
        *e = *t * scale;
    }
}
