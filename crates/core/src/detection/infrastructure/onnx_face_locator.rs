/// YOLO face locator using ONNX Runtime via `ort`.
///
/// Handles downscaling, letterbox preprocessing of the grayscale frame,
/// inference and neighbour-counting NMS post-processing.
use std::path::Path;

use image::imageops::FilterType;
use image::GrayImage;

use crate::detection::domain::face_locator::FaceLocator;
use crate::shared::config::LocatorParams;
use crate::shared::region::Region;

/// Fallback YOLO model input resolution when the model doesn't specify dimensions.
const DEFAULT_INPUT_SIZE: u32 = 640;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f64 = 0.45;

/// YOLO letterbox padding value.
const PAD_VALUE: f32 = 114.0 / 255.0;

pub struct OnnxFaceLocator {
    session: ort::session::Session,
    params: LocatorParams,
    input_size: u32,
}

impl OnnxFaceLocator {
    /// Load a YOLO face model and prepare for inference.
    ///
    /// The input resolution is read from the model's input shape (expecting NCHW).
    /// Falls back to 640 if the shape is dynamic or unreadable.
    pub fn new(
        model_path: &Path,
        params: LocatorParams,
    ) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?
            .with_execution_providers(platform_execution_providers())?
            .commit_from_file(model_path)?;

        let input_size = session
            .inputs()
            .first()
            .and_then(|input| {
                if let ort::value::ValueType::Tensor { ref shape, .. } = input.dtype() {
                    if shape.len() >= 4 && shape[2] > 0 {
                        Some(shape[2] as u32)
                    } else {
                        None
                    }
                } else {
                    None
                }
            })
            .unwrap_or(DEFAULT_INPUT_SIZE);

        log::info!(
            "Face locator ready ({input_size}px input, scale {}, min neighbors {})",
            params.scale_factor,
            params.min_neighbors
        );

        Ok(Self {
            session,
            params,
            input_size,
        })
    }
}

impl FaceLocator for OnnxFaceLocator {
    fn locate(&mut self, gray: &GrayImage) -> Result<Vec<Region>, Box<dyn std::error::Error>> {
        let scale_factor = self.params.scale_factor.max(1.0);
        let shrunk;
        let detect_on = if scale_factor > 1.0 {
            let w = ((gray.width() as f64 / scale_factor).round() as u32).max(1);
            let h = ((gray.height() as f64 / scale_factor).round() as u32).max(1);
            shrunk = image::imageops::resize(gray, w, h, FilterType::Triangle);
            &shrunk
        } else {
            gray
        };

        let (input_tensor, scale, pad_x, pad_y) = letterbox(detect_on, self.input_size);

        let input_value = ort::value::Tensor::from_array(input_tensor)?;
        let outputs = self.session.run(ort::inputs![input_value])?;
        if outputs.len() == 0 {
            return Err("Face model produced no outputs".into());
        }
        let tensor = outputs[0].try_extract_array::<f32>()?;
        let shape = tensor.shape().to_vec();

        // Output is [1, features, detections] (transposed) or [1, detections, features].
        if shape.len() != 3 {
            return Err(format!("Unexpected face model output shape: {shape:?}").into());
        }
        let transposed = shape[1] < shape[2];
        let (num_dets, num_feats) = if transposed {
            (shape[2], shape[1])
        } else {
            (shape[1], shape[2])
        };
        if num_feats < 5 {
            return Err(format!("Face model output has only {num_feats} features").into());
        }

        let data = tensor.as_slice().ok_or("Cannot get tensor slice")?;
        let feature = |det: usize, f: usize| -> f64 {
            if transposed {
                data[f * num_dets + det] as f64
            } else {
                data[det * num_feats + f] as f64
            }
        };

        let mut candidates = Vec::new();
        for i in 0..num_dets {
            let conf = feature(i, 4);
            if conf < self.params.confidence {
                continue;
            }
            let (cx, cy, w, h) = (feature(i, 0), feature(i, 1), feature(i, 2), feature(i, 3));

            // letterbox coords -> detection-frame coords -> full-frame coords
            let to_frame = |v: f64, pad: u32| (v - pad as f64) / scale * scale_factor;
            candidates.push(Candidate {
                x1: to_frame(cx - w / 2.0, pad_x),
                y1: to_frame(cy - h / 2.0, pad_y),
                x2: to_frame(cx + w / 2.0, pad_x),
                y2: to_frame(cy + h / 2.0, pad_y),
                confidence: conf,
            });
        }

        let kept = grouped_nms(&mut candidates, NMS_IOU_THRESH, self.params.min_neighbors);
        Ok(kept
            .iter()
            .map(|c| Region::from_corners(c.x1, c.y1, c.x2, c.y2))
            .collect())
    }
}

/// Hardware acceleration where the platform offers it. ONNX Runtime falls
/// back to CPU when a listed provider fails to register.
fn platform_execution_providers() -> Vec<ort::execution_providers::ExecutionProviderDispatch> {
    #[cfg(target_os = "macos")]
    let providers = vec![ort::execution_providers::CoreMLExecutionProvider::default().build()];
    #[cfg(target_os = "windows")]
    let providers = vec![ort::execution_providers::DirectMLExecutionProvider::default().build()];
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let providers = Vec::new();
    providers
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Letterbox-resize a grayscale image to `target_size` × `target_size`,
/// replicating luma into the three model input channels.
///
/// Returns `(NCHW float32 tensor, scale, pad_x, pad_y)`.
fn letterbox(gray: &GrayImage, target_size: u32) -> (ndarray::Array4<f32>, f64, u32, u32) {
    let fw = gray.width() as f64;
    let fh = gray.height() as f64;
    let target = target_size as f64;

    let scale = (target / fw).min(target / fh);
    let new_w = ((fw * scale).round() as u32).min(target_size);
    let new_h = ((fh * scale).round() as u32).min(target_size);
    let pad_x = (target_size - new_w) / 2;
    let pad_y = (target_size - new_h) / 2;

    let mut tensor = ndarray::Array4::<f32>::from_elem(
        (1, 3, target_size as usize, target_size as usize),
        PAD_VALUE,
    );

    let src_w = gray.width();
    let src_h = gray.height();

    // Nearest-neighbor resize + copy into padded region
    for y in 0..new_h {
        let src_y = ((y as f64 / scale) as u32).min(src_h - 1);
        for x in 0..new_w {
            let src_x = ((x as f64 / scale) as u32).min(src_w - 1);
            let value = gray.get_pixel(src_x, src_y).0[0] as f32 / 255.0;
            let ty = (pad_y + y) as usize;
            let tx = (pad_x + x) as usize;
            for c in 0..3 {
                tensor[[0, c, ty, tx]] = value;
            }
        }
    }

    (tensor, scale, pad_x, pad_y)
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct Candidate {
    x1: f64,
    y1: f64,
    x2: f64,
    y2: f64,
    confidence: f64,
}

impl Candidate {
    fn bbox(&self) -> [f64; 4] {
        [self.x1, self.y1, self.x2, self.y2]
    }
}

/// Greedy NMS that also counts how many candidates each survivor absorbed.
///
/// Survivors supported by fewer than `min_neighbors` suppressed candidates
/// are dropped. Output is ordered by confidence, highest first.
fn grouped_nms(
    candidates: &mut [Candidate],
    iou_thresh: f64,
    min_neighbors: u32,
) -> Vec<Candidate> {
    candidates.sort_by(|a, b| {
        b.confidence
            .partial_cmp(&a.confidence)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; candidates.len()];

    for i in 0..candidates.len() {
        if suppressed[i] {
            continue;
        }
        let mut neighbors = 0u32;
        for j in (i + 1)..candidates.len() {
            if suppressed[j] {
                continue;
            }
            if bbox_iou(&candidates[i].bbox(), &candidates[j].bbox()) > iou_thresh {
                suppressed[j] = true;
                neighbors += 1;
            }
        }
        if neighbors >= min_neighbors {
            keep.push(candidates[i].clone());
        }
    }
    keep
}

fn bbox_iou(a: &[f64; 4], b: &[f64; 4]) -> f64 {
    let x1 = a[0].max(b[0]);
    let y1 = a[1].max(b[1]);
    let x2 = a[2].min(b[2]);
    let y2 = a[3].min(b[3]);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a[2] - a[0]) * (a[3] - a[1]);
    let area_b = (b[2] - b[0]) * (b[3] - b[1]);
    inter / (area_a + area_b - inter)
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
