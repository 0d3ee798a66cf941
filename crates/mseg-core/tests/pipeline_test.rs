use burn_ndarray::NdArray;
use mseg_core::image::{ImageKind, ImageMetadata, Volume};
use mseg_core::subject::{Subject, IMAGE, LABEL};
use mseg_core::transforms::{
    Compose, CropOrPad, EnsureShapeMultiple, OneHot, RandomAffine, RandomBiasField, RandomGamma,
    RandomMotion, RandomNoise, RescaleIntensity, SubjectTransform,
};
use rand::rngs::StdRng;
use rand::SeedableRng;

type Backend = NdArray<f32>;

fn synthetic_subject(id: &str, shape: [usize; 3]) -> Subject<Backend> {
    let device = Default::default();
    let [d, h, w] = shape;
    let n = d * h * w;
    let image: Vec<f32> = (0..n).map(|i| ((i * 7) % 101) as f32).collect();
    let label: Vec<f32> = (0..n).map(|i| if i % 5 == 0 { 1.0 } else if i % 7 == 0 { 2.0 } else { 0.0 }).collect();
    Subject::new(id)
        .with_image(
            IMAGE,
            Volume::from_voxels(image, [1, d, h, w], ImageKind::Intensity, ImageMetadata::default(), &device).unwrap(),
        )
        .with_image(
            LABEL,
            Volume::from_voxels(label, [1, d, h, w], ImageKind::Label, ImageMetadata::default(), &device).unwrap(),
        )
}

fn preprocessing(max_shape: [usize; 3]) -> Compose<Backend> {
    Compose::new(vec![
        Box::new(RescaleIntensity::new(-1.0, 1.0)),
        Box::new(CropOrPad::new(max_shape)),
        Box::new(EnsureShapeMultiple::new(8)),
        Box::new(OneHot::with_num_classes(3)),
    ])
}

fn augmentation() -> Compose<Backend> {
    Compose::new(vec![
        Box::new(RandomAffine::new()),
        Box::new(RandomGamma::new().with_probability(1.0)),
        Box::new(RandomNoise::new().with_probability(1.0)),
        Box::new(RandomMotion::new().with_probability(1.0)),
        Box::new(RandomBiasField::new().with_probability(1.0)),
    ])
}

#[test]
fn test_subjects_share_shape_divisible_by_eight() {
    let shapes = [[9, 13, 10], [11, 12, 7], [10, 15, 9]];
    let max_shape = [0, 1, 2].map(|a| shapes.iter().map(|s| s[a]).max().unwrap());
    let pipeline = preprocessing(max_shape).then(augmentation());
    let mut rng = StdRng::seed_from_u64(42);

    for (i, shape) in shapes.iter().enumerate() {
        let out = pipeline
            .apply(synthetic_subject(&format!("s{}", i), *shape), &mut rng)
            .unwrap();
        let image = out.get(IMAGE).unwrap();
        let label = out.get(LABEL).unwrap();

        assert_eq!(image.spatial_shape(), [16, 16, 16]);
        assert_eq!(label.shape(), [3, 16, 16, 16]);
        assert!(image.spatial_shape().iter().all(|n| n % 8 == 0));

        let sums = label.data().clone().sum_dim(0).into_data();
        assert!(sums.as_slice::<f32>().unwrap().iter().all(|&s| s == 1.0));
    }
}

#[test]
fn test_preprocessing_is_deterministic() {
    let pipeline = preprocessing([8, 8, 8]);
    let a = pipeline
        .apply(synthetic_subject("a", [6, 9, 8]), &mut StdRng::seed_from_u64(1))
        .unwrap();
    let b = pipeline
        .apply(synthetic_subject("a", [6, 9, 8]), &mut StdRng::seed_from_u64(2))
        .unwrap();
    assert_eq!(
        a.get(IMAGE).unwrap().voxels().unwrap(),
        b.get(IMAGE).unwrap().voxels().unwrap()
    );
}
