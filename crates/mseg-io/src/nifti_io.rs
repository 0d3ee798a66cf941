use anyhow::{bail, Context, Result};
use burn::tensor::backend::Backend;
use burn::tensor::{Tensor, TensorData};
use mseg_core::image::{ImageKind, ImageMetadata, Volume};
use mseg_core::spatial::{Direction, Point, Spacing};
use mseg_core::subject::ImageSource;
use nalgebra::{SMatrix, Vector3};
use ndarray::{Array3, IxDyn};
use nifti::{IntoNdArray, NiftiHeader, NiftiObject, ReaderOptions};
use std::path::Path;

/// Physical metadata of a NIfTI header, in world order `(x, y, z)`.
///
/// Uses the sform when present, then the qform, then plain pixdim scaling.
pub fn header_metadata(header: &NiftiHeader) -> ImageMetadata<3> {
    let affine = if header.sform_code > 0 {
        [header.srow_x, header.srow_y, header.srow_z]
    } else if header.qform_code > 0 {
        let b = header.quatern_b;
        let c = header.quatern_c;
        let d = header.quatern_d;
        let a = (1.0 - (b * b + c * c + d * d).min(1.0)).sqrt();

        let qfac = if header.pixdim[0] == 0.0 { 1.0 } else { header.pixdim[0] };
        let dx = header.pixdim[1];
        let dy = header.pixdim[2];
        let dz = header.pixdim[3] * qfac;

        [
            [
                (a * a + b * b - c * c - d * d) * dx,
                (2.0 * b * c - 2.0 * a * d) * dy,
                (2.0 * b * d + 2.0 * a * c) * dz,
                header.quatern_x,
            ],
            [
                (2.0 * b * c + 2.0 * a * d) * dx,
                (a * a + c * c - b * b - d * d) * dy,
                (2.0 * c * d - 2.0 * a * b) * dz,
                header.quatern_y,
            ],
            [
                (2.0 * b * d - 2.0 * a * c) * dx,
                (2.0 * c * d + 2.0 * a * b) * dy,
                (a * a + d * d - c * c - b * b) * dz,
                header.quatern_z,
            ],
        ]
    } else {
        let [_, dx, dy, dz, ..] = header.pixdim;
        [
            [dx, 0.0, 0.0, 0.0],
            [0.0, dy, 0.0, 0.0],
            [0.0, 0.0, dz, 0.0],
        ]
    };

    let origin = Point::new([affine[0][3] as f64, affine[1][3] as f64, affine[2][3] as f64]);

    // Columns are direction cosines scaled by spacing
    let columns =
        [0, 1, 2].map(|c| Vector3::new(affine[0][c] as f64, affine[1][c] as f64, affine[2][c] as f64));
    let spacing = columns.map(|col| col.norm());
    let axes = [Vector3::x(), Vector3::y(), Vector3::z()];
    let unit = [0, 1, 2].map(|i| {
        if spacing[i] > 1e-9 {
            columns[i] / spacing[i]
        } else {
            axes[i]
        }
    });
    let spacing = spacing.map(|s| if s > 1e-9 { s } else { 1.0 });

    let direction = Direction(SMatrix::<f64, 3, 3>::from_columns(&unit));
    ImageMetadata::new(origin, Spacing::new(spacing), direction)
}

/// Spatial shape `[Z, Y, X]` read from the header only.
pub fn read_spatial_shape<P: AsRef<Path>>(path: P) -> Result<[usize; 3]> {
    let path = path.as_ref();
    let header = NiftiHeader::from_file(path)
        .with_context(|| format!("Failed to read NIfTI header {}", path.display()))?;
    let dim = header.dim;
    if dim[0] < 3 {
        bail!("Expected a 3D NIfTI image in {}, found {} dimensions", path.display(), dim[0]);
    }
    Ok([dim[3] as usize, dim[2] as usize, dim[1] as usize])
}

/// Read a NIfTI file as a `[C, Z, Y, X]` volume.
///
/// 3D files become single-channel volumes; 4D files map their fourth axis
/// to channels.
pub fn read_volume<B: Backend>(source: &ImageSource, device: &B::Device) -> Result<Volume<B>> {
    read_nifti(source.path(), source.kind, device)
}

pub fn read_nifti<B: Backend, P: AsRef<Path>>(path: P, kind: ImageKind, device: &B::Device) -> Result<Volume<B>> {
    let path = path.as_ref();
    let obj = ReaderOptions::new()
        .read_file(path)
        .with_context(|| format!("Failed to read NIfTI file {}", path.display()))?;
    let metadata = header_metadata(obj.header());

    let array = obj
        .into_volume()
        .into_ndarray::<f32>()
        .context("Failed to convert volume to ndarray")?;

    // NIfTI axes are [X, Y, Z, (C)]; reverse them so X varies fastest.
    let (array, shape) = match array.ndim() {
        3 => {
            let s = array.shape().to_vec();
            (array.permuted_axes(IxDyn(&[2, 1, 0])), [1, s[2], s[1], s[0]])
        }
        4 => {
            let s = array.shape().to_vec();
            (array.permuted_axes(IxDyn(&[3, 2, 1, 0])), [s[3], s[2], s[1], s[0]])
        }
        n => bail!("Expected a 3D or 4D NIfTI image in {}, found {} dimensions", path.display(), n),
    };
    let values: Vec<f32> = array.iter().copied().collect();

    tracing::debug!(path = %path.display(), ?shape, "read NIfTI volume");
    let data = TensorData::new(values, shape).convert::<B::FloatElem>();
    Ok(Volume::new(Tensor::from_data(data, device), kind, metadata))
}

/// Header carrying `metadata` as an sform, for writing.
pub fn metadata_header(metadata: &ImageMetadata<3>) -> NiftiHeader {
    let mut header = NiftiHeader::default();
    let spacing = metadata.spacing();
    let direction = metadata.direction();
    let origin = metadata.origin();

    let mut rows = [[0.0f32; 4]; 3];
    for (r, row) in rows.iter_mut().enumerate() {
        for c in 0..3 {
            row[c] = (direction[(r, c)] * spacing[c]) as f32;
        }
        row[3] = origin[r] as f32;
    }
    header.srow_x = rows[0];
    header.srow_y = rows[1];
    header.srow_z = rows[2];
    header.sform_code = 1;
    header.qform_code = 0;
    header.pixdim = [1.0, spacing[0] as f32, spacing[1] as f32, spacing[2] as f32, 1.0, 1.0, 1.0, 1.0];
    header
}

/// Write the first channel of a volume to a NIfTI file.
pub fn write_volume<B: Backend, P: AsRef<Path>>(path: P, volume: &Volume<B>) -> Result<()> {
    use nifti::writer::WriterOptions;

    let path = path.as_ref();
    let [_, nz, ny, nx] = volume.shape();
    let values = volume
        .voxels()
        .map_err(|e| anyhow::anyhow!("Failed to get tensor data: {}", e))?;

    let array = Array3::from_shape_fn((nx, ny, nz), |(x, y, z)| values[(z * ny + y) * nx + x]);
    let header = metadata_header(volume.metadata());

    WriterOptions::new(path)
        .reference_header(&header)
        .write_nifti(&array)
        .with_context(|| format!("Failed to write NIfTI file {}", path.display()))?;

    tracing::debug!(path = %path.display(), shape = ?[nz, ny, nx], "wrote NIfTI volume");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use anyhow::Result;
    use burn_ndarray::NdArray;
    use nifti::writer::WriterOptions;
    use tempfile::tempdir;

    type TestBackend = NdArray<f32>;

    #[test]
    fn test_read_nifti_axis_order() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("test.nii");

        // X=3, Y=4, Z=5, value encodes the index
        let array = Array3::from_shape_fn((3, 4, 5), |(x, y, z)| (x + 10 * y + 100 * z) as f32);
        WriterOptions::new(&file_path).write_nifti(&array)?;

        let device = Default::default();
        let volume = read_nifti::<TestBackend, _>(&file_path, ImageKind::Intensity, &device)?;
        assert_eq!(volume.shape(), [1, 5, 4, 3]);

        let values = volume.voxels()?;
        // [z=0, y=0, x=1]
        assert_eq!(values[1], 1.0);
        // [z=0, y=1, x=0]
        assert_eq!(values[3], 10.0);
        // [z=1, y=0, x=0]
        assert_eq!(values[12], 100.0);
        assert_eq!(values[59], 2.0 + 30.0 + 400.0);

        Ok(())
    }

    #[test]
    fn test_write_read_keeps_metadata() -> Result<()> {
        let dir = tempdir()?;
        let file_path = dir.path().join("roundtrip.nii.gz");
        let device = Default::default();

        let metadata = ImageMetadata::new(
            Point::new([-10.0, 4.5, 30.0]),
            Spacing::new([1.0, 1.5, 2.0]),
            Direction::identity(),
        );
        let values: Vec<f32> = (0..24).map(|v| v as f32).collect();
        let volume = Volume::<TestBackend>::from_voxels(values.clone(), [1, 2, 3, 4], ImageKind::Label, metadata, &device)?;
        write_volume(&file_path, &volume)?;

        assert_eq!(read_spatial_shape(&file_path)?, [2, 3, 4]);

        let back = read_nifti::<TestBackend, _>(&file_path, ImageKind::Label, &device)?;
        assert_eq!(back.shape(), [1, 2, 3, 4]);
        assert_eq!(back.voxels()?, values);
        assert!(back.is_label());

        let meta = back.metadata();
        assert!((meta.origin()[0] + 10.0).abs() < 1e-5);
        assert!((meta.spacing()[1] - 1.5).abs() < 1e-5);
        assert!((meta.spacing()[2] - 2.0).abs() < 1e-5);
        Ok(())
    }

    #[test]
    fn test_pixdim_fallback() {
        let mut header = NiftiHeader::default();
        header.sform_code = 0;
        header.qform_code = 0;
        header.pixdim = [1.0, 0.5, 0.75, 3.0, 0.0, 0.0, 0.0, 0.0];
        let meta = header_metadata(&header);
        assert_eq!(meta.spacing()[0], 0.5);
        assert_eq!(meta.spacing()[2], 3.0);
        assert_eq!(meta.origin()[0], 0.0);
    }
}
