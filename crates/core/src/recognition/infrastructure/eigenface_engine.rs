use std::io::{Read, Write};

use nalgebra::{DMatrix, SymmetricEigen};
use ndarray::{Array1, Array2, Axis};
use serde::{Deserialize, Serialize};

use crate::recognition::domain::recognition_engine::{
    Prediction, RecognitionEngine, RecognitionModel,
};
use crate::shared::error::FaceIdError;
use crate::shared::face_image::FaceImage;
use crate::shared::label::IdentityLabel;

const FORMAT_VERSION: u32 = 1;

/// Eigenvalues below this fraction of the largest are numerical noise.
const RELATIVE_EIGENVALUE_FLOOR: f64 = 1e-10;

/// PCA ("eigenfaces") recognition with nearest-neighbour matching.
///
/// Training solves the small N×N Gram matrix instead of the D×D pixel
/// covariance, then lifts the eigenvectors back into pixel space.
pub struct EigenfaceEngine {
    num_components: usize,
}

impl EigenfaceEngine {
    pub fn new(num_components: usize) -> Self {
        Self { num_components }
    }
}

pub struct EigenfaceModel {
    width: u32,
    height: u32,
    mean: Array1<f32>,
    /// K×D, one unit eigenface per row.
    eigenfaces: Array2<f32>,
    /// N×K, one training projection per row.
    projections: Array2<f32>,
    labels: Vec<IdentityLabel>,
}

#[derive(Serialize, Deserialize)]
struct EigenfaceModelFile {
    format_version: u32,
    width: u32,
    height: u32,
    mean: Vec<f32>,
    eigenfaces: Vec<Vec<f32>>,
    projections: Vec<Vec<f32>>,
    labels: Vec<u32>,
}

fn to_vector(face: &FaceImage) -> Array1<f32> {
    face.data().iter().map(|&p| p as f32 / 255.0).collect()
}

impl RecognitionEngine for EigenfaceEngine {
    fn train(
        &self,
        images: &[FaceImage],
        labels: &[IdentityLabel],
    ) -> Result<Box<dyn RecognitionModel>, FaceIdError> {
        if images.is_empty() {
            return Err(FaceIdError::Training("no training images".into()));
        }
        if images.len() != labels.len() {
            return Err(FaceIdError::Training(format!(
                "{} images but {} labels",
                images.len(),
                labels.len()
            )));
        }
        let (width, height) = images[0].dimensions();
        if let Some(odd) = images.iter().find(|img| img.dimensions() != (width, height)) {
            return Err(FaceIdError::Training(format!(
                "mixed image shapes: {width}x{height} and {}x{}",
                odd.width(),
                odd.height()
            )));
        }

        let n = images.len();
        let d = (width * height) as usize;
        let mut data = Array2::<f32>::zeros((n, d));
        for (mut row, img) in data.rows_mut().into_iter().zip(images) {
            row.assign(&to_vector(img));
        }

        let mean = data
            .mean_axis(Axis(0))
            .ok_or_else(|| FaceIdError::Training("empty training matrix".into()))?;
        let centered = &data - &mean;

        let centered64 = centered.mapv(f64::from);
        let gram = centered64.dot(&centered64.t());
        let eigen = SymmetricEigen::new(DMatrix::from_fn(n, n, |i, j| gram[[i, j]]));

        let mut order: Vec<usize> = (0..n).collect();
        order.sort_by(|&a, &b| eigen.eigenvalues[b].total_cmp(&eigen.eigenvalues[a]));
        let largest = eigen.eigenvalues[order[0]];
        let kept: Vec<usize> = order
            .into_iter()
            .filter(|&k| {
                largest > 0.0 && eigen.eigenvalues[k] > largest * RELATIVE_EIGENVALUE_FLOOR
            })
            .take(self.num_components)
            .collect();

        let mut eigenfaces = Array2::<f32>::zeros((kept.len(), d));
        for (row, &k) in kept.iter().enumerate() {
            let coefficients: Array1<f64> = eigen.eigenvectors.column(k).iter().copied().collect();
            let lifted = centered64.t().dot(&coefficients);
            let norm = lifted.dot(&lifted).sqrt();
            eigenfaces
                .row_mut(row)
                .assign(&lifted.mapv(|x| (x / norm) as f32));
        }

        let projections = centered.dot(&eigenfaces.t());

        log::info!(
            "Trained eigenface model: {n} image(s), {} component(s), {width}x{height}",
            kept.len()
        );

        Ok(Box::new(EigenfaceModel {
            width,
            height,
            mean,
            eigenfaces,
            projections,
            labels: labels.to_vec(),
        }))
    }

    fn read_model(
        &self,
        reader: &mut dyn Read,
    ) -> Result<Box<dyn RecognitionModel>, Box<dyn std::error::Error>> {
        let file: EigenfaceModelFile = serde_json::from_reader(reader)?;
        Ok(Box::new(EigenfaceModel::from_file(file)?))
    }
}

impl EigenfaceModel {
    fn from_file(file: EigenfaceModelFile) -> Result<Self, Box<dyn std::error::Error>> {
        if file.format_version != FORMAT_VERSION {
            return Err(format!(
                "unsupported model format version {} (expected {FORMAT_VERSION})",
                file.format_version
            )
            .into());
        }
        let d = (file.width as usize) * (file.height as usize);
        if file.mean.len() != d {
            return Err(format!("mean has {} values, expected {d}", file.mean.len()).into());
        }
        if file.projections.len() != file.labels.len() || file.labels.is_empty() {
            return Err(format!(
                "{} projections for {} labels",
                file.projections.len(),
                file.labels.len()
            )
            .into());
        }
        let k = file.eigenfaces.len();

        let eigenfaces = stack_rows(&file.eigenfaces, d, "eigenface")?;
        let projections = stack_rows(&file.projections, k, "projection")?;

        Ok(Self {
            width: file.width,
            height: file.height,
            mean: Array1::from(file.mean),
            eigenfaces,
            projections,
            labels: file.labels.into_iter().map(IdentityLabel::new).collect(),
        })
    }
}

fn stack_rows(
    rows: &[Vec<f32>],
    len: usize,
    what: &str,
) -> Result<Array2<f32>, Box<dyn std::error::Error>> {
    let mut out = Array2::<f32>::zeros((rows.len(), len));
    for (i, row) in rows.iter().enumerate() {
        if row.len() != len {
            return Err(format!("{what} {i} has {} values, expected {len}", row.len()).into());
        }
        out.row_mut(i).assign(&Array1::from(row.clone()));
    }
    Ok(out)
}

impl RecognitionModel for EigenfaceModel {
    fn predict(&self, probe: &FaceImage) -> Result<Prediction, FaceIdError> {
        if probe.dimensions() != (self.width, self.height) {
            return Err(FaceIdError::Training(format!(
                "probe is {}x{}, model expects {}x{}",
                probe.width(),
                probe.height(),
                self.width,
                self.height
            )));
        }
        let centered = to_vector(probe) - &self.mean;
        let projected = self.eigenfaces.dot(&centered);

        let mut best: Option<(usize, f32)> = None;
        for (i, row) in self.projections.rows().into_iter().enumerate() {
            let dist_sq: f32 = row
                .iter()
                .zip(projected.iter())
                .map(|(a, b)| (a - b) * (a - b))
                .sum();
            if best.map_or(true, |(_, best_sq)| dist_sq < best_sq) {
                best = Some((i, dist_sq));
            }
        }

        let (index, dist_sq) =
            best.ok_or_else(|| FaceIdError::Training("model holds no training samples".into()))?;
        Ok(Prediction {
            label: self.labels[index],
            distance: f64::from(dist_sq).sqrt(),
        })
    }

    fn write_to(&self, writer: &mut dyn Write) -> Result<(), Box<dyn std::error::Error>> {
        let file = EigenfaceModelFile {
            format_version: FORMAT_VERSION,
            width: self.width,
            height: self.height,
            mean: self.mean.to_vec(),
            eigenfaces: self.eigenfaces.rows().into_iter().map(|r| r.to_vec()).collect(),
            projections: self.projections.rows().into_iter().map(|r| r.to_vec()).collect(),
            labels: self.labels.iter().map(|l| l.value()).collect(),
        };
        serde_json::to_writer(writer, &file)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use rstest::rstest;

    const W: u32 = 12;
    const H: u32 = 10;

    /// Cluster 1 is bright on the left, cluster 2 bright on the right. The
    /// variant adds a small deterministic texture.
    fn synthetic_face(cluster: u32, variant: u32) -> FaceImage {
        let data = (0..H)
            .flat_map(|y| (0..W).map(move |x| (x, y)))
            .map(|(x, y)| {
                let bright = if cluster == 1 { x < W / 2 } else { x >= W / 2 };
                let base: u32 = if bright { 200 } else { 40 };
                let texture = (x * 7 + y * 3 + variant * 11) % 13;
                (base + texture) as u8
            })
            .collect();
        FaceImage::from_raw(W, H, data).unwrap()
    }

    fn training_set() -> (Vec<FaceImage>, Vec<IdentityLabel>) {
        let specs = [(1, 0), (1, 1), (1, 2), (2, 0), (2, 1)];
        let images = specs.iter().map(|&(c, v)| synthetic_face(c, v)).collect();
        let labels = specs.iter().map(|&(c, _)| IdentityLabel::new(c)).collect();
        (images, labels)
    }

    #[test]
    fn test_training_images_predict_their_own_label() {
        let (images, labels) = training_set();
        let model = EigenfaceEngine::new(80).train(&images, &labels).unwrap();

        for (img, label) in images.iter().zip(&labels) {
            let prediction = model.predict(img).unwrap();
            assert_eq!(prediction.label, *label);
            assert_abs_diff_eq!(prediction.distance, 0.0, epsilon = 1e-3);
        }
    }

    #[test]
    fn test_held_out_image_matches_nearest_cluster() {
        let (images, labels) = training_set();
        let model = EigenfaceEngine::new(80).train(&images, &labels).unwrap();

        let prediction = model.predict(&synthetic_face(1, 5)).unwrap();
        assert_eq!(prediction.label, IdentityLabel::new(1));
        assert!(prediction.distance >= 0.0);
    }

    #[test]
    fn test_write_then_read_preserves_predictions() {
        let (images, labels) = training_set();
        let engine = EigenfaceEngine::new(80);
        let model = engine.train(&images, &labels).unwrap();

        let mut buf = Vec::new();
        model.write_to(&mut buf).unwrap();
        let restored = engine.read_model(&mut buf.as_slice()).unwrap();

        for (img, label) in images.iter().zip(&labels) {
            assert_eq!(restored.predict(img).unwrap().label, *label);
        }
        let probe = synthetic_face(2, 4);
        assert_abs_diff_eq!(
            restored.predict(&probe).unwrap().distance,
            model.predict(&probe).unwrap().distance,
            epsilon = 1e-5
        );
    }

    #[test]
    fn test_component_count_is_capped() {
        let (images, labels) = training_set();
        let engine = EigenfaceEngine::new(2);
        let model = engine.train(&images, &labels).unwrap();

        let mut buf = Vec::new();
        model.write_to(&mut buf).unwrap();
        let file: EigenfaceModelFile = serde_json::from_slice(&buf).unwrap();
        assert_eq!(file.eigenfaces.len(), 2);
        assert!(file.projections.iter().all(|p| p.len() == 2));
    }

    #[test]
    fn test_components_are_ordered_by_variance() {
        let (images, labels) = training_set();
        let model = EigenfaceEngine::new(80).train(&images, &labels).unwrap();

        let mut buf = Vec::new();
        model.write_to(&mut buf).unwrap();
        let file: EigenfaceModelFile = serde_json::from_slice(&buf).unwrap();
        let variance = |k: usize| -> f32 { file.projections.iter().map(|p| p[k] * p[k]).sum() };

        assert!(file.eigenfaces.len() >= 2);
        for k in 1..file.eigenfaces.len() {
            assert!(variance(k - 1) + 1e-4 >= variance(k));
        }
    }

    #[test]
    fn test_leading_component_separates_clusters() {
        let (images, labels) = training_set();
        let model = EigenfaceEngine::new(1).train(&images, &labels).unwrap();

        assert_eq!(model.predict(&synthetic_face(1, 6)).unwrap().label, IdentityLabel::new(1));
        assert_eq!(model.predict(&synthetic_face(2, 6)).unwrap().label, IdentityLabel::new(2));
    }

    #[test]
    fn test_single_image_model_predicts_that_label() {
        let engine = EigenfaceEngine::new(80);
        let model = engine
            .train(&[synthetic_face(1, 0)], &[IdentityLabel::new(9)])
            .unwrap();
        let prediction = model.predict(&synthetic_face(2, 3)).unwrap();
        assert_eq!(prediction.label, IdentityLabel::new(9));
    }

    #[rstest]
    #[case::empty(vec![], vec![])]
    #[case::length_mismatch(vec![synthetic_face(1, 0)], vec![])]
    #[case::mixed_shapes(
        vec![synthetic_face(1, 0), FaceImage::from_raw(2, 2, vec![0; 4]).unwrap()],
        vec![IdentityLabel::new(1), IdentityLabel::new(1)]
    )]
    fn test_invalid_training_input_is_rejected(
        #[case] images: Vec<FaceImage>,
        #[case] labels: Vec<IdentityLabel>,
    ) {
        let result = EigenfaceEngine::new(80).train(&images, &labels);
        assert!(matches!(result, Err(FaceIdError::Training(_))));
    }

    #[test]
    fn test_wrong_probe_shape_is_rejected() {
        let (images, labels) = training_set();
        let model = EigenfaceEngine::new(80).train(&images, &labels).unwrap();
        let probe = FaceImage::from_raw(3, 3, vec![0; 9]).unwrap();
        assert!(matches!(model.predict(&probe), Err(FaceIdError::Training(_))));
    }

    #[rstest]
    #[case::not_json(b"garbage".to_vec())]
    #[case::wrong_version(
        br#"{"format_version":99,"width":1,"height":1,"mean":[0.0],"eigenfaces":[],"projections":[[]],"labels":[1]}"#.to_vec()
    )]
    #[case::short_mean(
        br#"{"format_version":1,"width":2,"height":2,"mean":[0.0],"eigenfaces":[],"projections":[[]],"labels":[1]}"#.to_vec()
    )]
    fn test_read_rejects_bad_model_files(#[case] bytes: Vec<u8>) {
        let result = EigenfaceEngine::new(80).read_model(&mut bytes.as_slice());
        assert!(result.is_err());
    }
}
