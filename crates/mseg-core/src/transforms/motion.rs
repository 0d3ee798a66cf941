//! MRI motion artefact simulation in k-space.

use burn::tensor::backend::Backend;
use num_complex::Complex32;
use rand::RngCore;
use rustfft::FftPlanner;

use super::affine::voxel_affine;
use super::{check_probability, should_apply, uniform, Result, SubjectTransform, TransformError};
use crate::filter::{FillValue, ResampleFilter};
use crate::image::Volume;
use crate::interpolation::Interpolation;
use crate::subject::Subject;
use crate::transform::AffineTransform;

/// Simulated patient motion during acquisition.
///
/// The intensity volume is resampled under the identity and
/// `num_transforms` random rigid movements. The k-space of the result is
/// assembled from contiguous segments of each movement's spectrum along the
/// last axis, split at sorted random times, and transformed back.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RandomMotion {
    degrees: f64,
    translation: f64,
    num_transforms: usize,
    p: f64,
}

impl RandomMotion {
    pub fn new() -> Self {
        Self {
            degrees: 10.0,
            translation: 10.0,
            num_transforms: 2,
            p: 0.1,
        }
    }

    pub fn with_degrees(mut self, degrees: f64) -> Self {
        self.degrees = degrees;
        self
    }

    pub fn with_translation(mut self, translation: f64) -> Self {
        self.translation = translation;
        self
    }

    pub fn with_num_transforms(mut self, num_transforms: usize) -> Self {
        self.num_transforms = num_transforms;
        self
    }

    pub fn with_probability(mut self, p: f64) -> Self {
        self.p = p;
        self
    }
}

impl Default for RandomMotion {
    fn default() -> Self {
        Self::new()
    }
}

/// Rigid movement and the fraction of the acquisition after which it applies.
#[derive(Debug, Clone, Copy)]
struct Movement {
    degrees: [f64; 3],
    translation: [f64; 3],
    time: f64,
}

impl<B: Backend> SubjectTransform<B> for RandomMotion {
    fn name(&self) -> &'static str {
        "RandomMotion"
    }

    fn apply(&self, subject: Subject<B>, rng: &mut dyn RngCore) -> Result<Subject<B>> {
        check_probability(self.p)?;
        if self.num_transforms == 0 {
            return Err(TransformError::invalid_parameter("num_transforms must be positive"));
        }
        if !should_apply(rng, self.p) {
            return Ok(subject);
        }

        let step = 1.0 / (self.num_transforms + 1) as f64;
        let movements: Vec<Movement> = (0..self.num_transforms)
            .map(|i| Movement {
                degrees: [(); 3].map(|_| uniform(&mut *rng, -self.degrees, self.degrees)),
                translation: [(); 3].map(|_| uniform(&mut *rng, -self.translation, self.translation)),
                time: (i + 1) as f64 * step + uniform(&mut *rng, -step / 4.0, step / 4.0),
            })
            .collect();
        tracing::trace!(?movements, subject = subject.id(), "random motion");

        subject.map_volumes(|_, volume| {
            if volume.is_label() {
                Ok(volume)
            } else {
                corrupt(volume, &movements)
            }
        })
    }
}

fn corrupt<B: Backend>(volume: Volume<B>, movements: &[Movement]) -> Result<Volume<B>> {
    let [c, d, h, w] = volume.shape();
    let device = volume.data().device();

    let mut versions = Vec::with_capacity(movements.len() + 1);
    versions.push(volume.voxels()?);
    for movement in movements {
        let matrix = voxel_affine(
            volume.metadata(),
            [d, h, w],
            movement.degrees,
            [1.0; 3],
            movement.translation,
        );
        let moved = ResampleFilter::new(AffineTransform::from_homogeneous(&matrix, &device))
            .with_interpolation(Interpolation::Linear)
            .with_fill(FillValue::Minimum)
            .apply(volume.clone());
        versions.push(moved.voxels()?);
    }

    // Segment boundaries in centred k-space along X
    let mut bounds = Vec::with_capacity(movements.len() + 2);
    bounds.push(0);
    for movement in movements {
        bounds.push(((movement.time * w as f64).floor().max(0.0) as usize).min(w));
    }
    bounds.push(w);
    let segment_of = |k: usize| -> usize {
        let shifted = (k + w / 2) % w;
        bounds
            .windows(2)
            .position(|b| shifted >= b[0] && shifted < b[1])
            .unwrap_or(0)
    };
    let owner: Vec<usize> = (0..w).map(segment_of).collect();

    let spatial = d * h * w;
    let mut planner = FftPlanner::<f32>::new();
    let mut output = Vec::with_capacity(c * spatial);
    for channel in 0..c {
        let range = channel * spatial..(channel + 1) * spatial;
        let spectra: Vec<Vec<Complex32>> = versions
            .iter()
            .map(|values| {
                let mut buffer: Vec<Complex32> =
                    values[range.clone()].iter().map(|&v| Complex32::new(v, 0.0)).collect();
                fft3(&mut buffer, [d, h, w], &mut planner, false);
                buffer
            })
            .collect();

        let mut combined: Vec<Complex32> = (0..spatial).map(|i| spectra[owner[i % w]][i]).collect();
        fft3(&mut combined, [d, h, w], &mut planner, true);
        output.extend(combined.iter().map(|z| z.re));
    }

    let metadata = *volume.metadata();
    let kind = volume.kind();
    Volume::from_voxels(output, [c, d, h, w], kind, metadata, &device)
}

/// In-place 3D DFT of a row-major `[Z, Y, X]` buffer.
///
/// The inverse is normalised by `1 / N`.
fn fft3(buffer: &mut [Complex32], shape: [usize; 3], planner: &mut FftPlanner<f32>, inverse: bool) {
    let [d, h, w] = shape;
    let plan = |planner: &mut FftPlanner<f32>, n: usize| {
        if inverse {
            planner.plan_fft_inverse(n)
        } else {
            planner.plan_fft_forward(n)
        }
    };

    // X rows are contiguous
    plan(planner, w).process(buffer);

    let fft_y = plan(planner, h);
    let mut line = vec![Complex32::new(0.0, 0.0); h];
    for z in 0..d {
        for x in 0..w {
            for y in 0..h {
                line[y] = buffer[(z * h + y) * w + x];
            }
            fft_y.process(&mut line);
            for y in 0..h {
                buffer[(z * h + y) * w + x] = line[y];
            }
        }
    }

    let fft_z = plan(planner, d);
    let mut line = vec![Complex32::new(0.0, 0.0); d];
    for y in 0..h {
        for x in 0..w {
            for z in 0..d {
                line[z] = buffer[(z * h + y) * w + x];
            }
            fft_z.process(&mut line);
            for z in 0..d {
                buffer[(z * h + y) * w + x] = line[z];
            }
        }
    }

    if inverse {
        let scale = 1.0 / (d * h * w) as f32;
        buffer.iter_mut().for_each(|z| *z *= scale);
    }
}
