//! BlazeFace face-detection graph node using ONNX Runtime via `ort`.
//!
//! Consumes image packets and emits detection packets with *relative*
//! (normalized) bounding boxes; pixel mapping is the adapter's job.

use std::path::Path;

use crate::detection::domain::detection::Detection;
use crate::graph::calculator::Calculator;
use crate::graph::config::NodeConfig;
use crate::graph::packet::{Packet, PacketPayload};
use crate::graph::runner::GraphError;
use crate::shared::frame::Frame;

pub const CALCULATOR_NAME: &str = "BlazeFaceCalculator";

/// BlazeFace model input resolution.
const INPUT_SIZE: u32 = 128;

/// Default confidence threshold, overridable via the `min_score` option.
pub const DEFAULT_MIN_SCORE: f32 = 0.5;

/// NMS IoU threshold.
const NMS_IOU_THRESH: f32 = 0.3;

/// Number of BlazeFace anchors (short-range model).
const NUM_ANCHORS: usize = 896;

pub struct BlazeFaceCalculator {
    session: ort::session::Session,
    min_score: f32,
    anchors: Vec<[f32; 2]>,
}

impl BlazeFaceCalculator {
    /// Builds the node from its graph-config options: `model_path`
    /// (required) and `min_score` (optional).
    pub fn from_node_config(node: &NodeConfig) -> Result<Self, GraphError> {
        let model_path = node
            .option("model_path")
            .ok_or_else(|| GraphError::Calculator("BlazeFaceCalculator requires a model_path option".to_string()))?;
        let min_score = match node.option("min_score") {
            Some(raw) => raw.parse::<f32>().map_err(|_| {
                GraphError::Calculator(format!("invalid min_score '{raw}'"))
            })?,
            None => DEFAULT_MIN_SCORE,
        };
        Self::new(Path::new(model_path), min_score)
            .map_err(|e| GraphError::Calculator(e.to_string()))
    }

    /// Load a BlazeFace ONNX model.
    pub fn new(model_path: &Path, min_score: f32) -> Result<Self, Box<dyn std::error::Error>> {
        let session = ort::session::Session::builder()?.commit_from_file(model_path)?;
        log::info!("loaded BlazeFace model from {}", model_path.display());
        Ok(Self {
            session,
            min_score,
            anchors: generate_anchors(),
        })
    }

    fn infer(&mut self, frame: &Frame) -> Result<Vec<Detection>, Box<dyn std::error::Error + Send + Sync>> {
        let input_tensor = preprocess(frame, INPUT_SIZE);
        let input_value = ort::value::Tensor::from_array(input_tensor)
            .map_err(|e| e.to_string())?;
        let outputs = self
            .session
            .run(ort::inputs![input_value])
            .map_err(|e| e.to_string())?;

        // BlazeFace outputs two tensors:
        // - regressors: [1, 896, 16] (box deltas + keypoints)
        // - classificators: [1, 896, 1] (confidence scores)
        if outputs.len() < 2 {
            return Err(format!("BlazeFace model expected 2 outputs, got {}", outputs.len()).into());
        }

        let regressors = outputs[0]
            .try_extract_array::<f32>()
            .map_err(|e| e.to_string())?;
        let scores = outputs[1]
            .try_extract_array::<f32>()
            .map_err(|e| e.to_string())?;
        let reg_data = regressors.as_slice().ok_or("cannot get regressor slice")?;
        let score_data = scores.as_slice().ok_or("cannot get score slice")?;

        Ok(decode(
            &self.anchors,
            reg_data,
            score_data,
            self.min_score,
        ))
    }
}

impl Calculator for BlazeFaceCalculator {
    fn process(
        &mut self,
        packet: Packet,
    ) -> Result<Packet, Box<dyn std::error::Error + Send + Sync>> {
        match packet.payload {
            PacketPayload::Image(frame) => {
                let frame = frame.into_rgb();
                let detections = self.infer(&frame)?;
                log::debug!(
                    "frame {}: {} face(s) at t={}us",
                    frame.index(),
                    detections.len(),
                    packet.timestamp.micros()
                );
                Ok(Packet::detections(detections, packet.timestamp))
            }
            PacketPayload::Detections(_) => Err("BlazeFaceCalculator expects image packets".into()),
        }
    }
}

// ---------------------------------------------------------------------------
// Preprocessing
// ---------------------------------------------------------------------------

/// Resize frame to `size × size` and normalize to [0,1] NCHW float32.
fn preprocess(frame: &Frame, size: u32) -> ndarray::Array4<f32> {
    let src = frame.as_ndarray();
    let src_h = frame.height() as usize;
    let src_w = frame.width() as usize;
    let s = size as usize;

    let mut tensor = ndarray::Array4::<f32>::zeros((1, 3, s, s));

    for y in 0..s {
        let src_y = (((y as f64 + 0.5) * src_h as f64 / s as f64) as usize).min(src_h - 1);
        for x in 0..s {
            let src_x = (((x as f64 + 0.5) * src_w as f64 / s as f64) as usize).min(src_w - 1);
            for c in 0..3 {
                tensor[[0, c, y, x]] = src[[src_y, src_x, c]] as f32 / 255.0;
            }
        }
    }

    tensor
}

// ---------------------------------------------------------------------------
// Anchor decode
// ---------------------------------------------------------------------------

/// Decode anchor-relative regressors into normalized detections, filter by
/// score, and suppress overlaps. All box math stays in [0,1] space.
fn decode(
    anchors: &[[f32; 2]],
    reg_data: &[f32],
    score_data: &[f32],
    min_score: f32,
) -> Vec<Detection> {
    let mut raw = Vec::new();
    let num_anchors = anchors.len().min(NUM_ANCHORS);

    for (i, &raw_score) in score_data.iter().enumerate().take(num_anchors) {
        let score = sigmoid(raw_score);
        if score < min_score {
            continue;
        }

        let anchor = &anchors[i];
        let reg_offset = i * 16;
        if reg_offset + 4 > reg_data.len() {
            break;
        }

        // Box center + size relative to the anchor, in normalized units
        let cx = anchor[0] + reg_data[reg_offset] / INPUT_SIZE as f32;
        let cy = anchor[1] + reg_data[reg_offset + 1] / INPUT_SIZE as f32;
        let w = reg_data[reg_offset + 2] / INPUT_SIZE as f32;
        let h = reg_data[reg_offset + 3] / INPUT_SIZE as f32;

        let x1 = (cx - w / 2.0).max(0.0);
        let y1 = (cy - h / 2.0).max(0.0);
        let x2 = (cx + w / 2.0).min(1.0);
        let y2 = (cy + h / 2.0).min(1.0);

        raw.push(RawDet {
            x1,
            y1,
            x2,
            y2,
            score,
        });
    }

    nms(&mut raw, NMS_IOU_THRESH)
        .into_iter()
        .map(|d| Detection::relative(d.score, d.x1, d.y1, d.x2 - d.x1, d.y2 - d.y1))
        .collect()
}

/// Generate BlazeFace anchors for the short-range model.
///
/// The short-range model uses two feature map sizes: 16×16 and 8×8,
/// with 2 and 6 anchors per cell respectively.
fn generate_anchors() -> Vec<[f32; 2]> {
    let strides = [(8, 2), (16, 6)]; // (stride, anchors_per_cell)
    let mut anchors = Vec::with_capacity(NUM_ANCHORS);

    for &(stride, num) in &strides {
        let grid_size = INPUT_SIZE as usize / stride;
        for y in 0..grid_size {
            for x in 0..grid_size {
                let cx = (x as f32 + 0.5) / grid_size as f32;
                let cy = (y as f32 + 0.5) / grid_size as f32;
                for _ in 0..num {
                    anchors.push([cx, cy]);
                }
            }
        }
    }

    anchors
}

// ---------------------------------------------------------------------------
// NMS
// ---------------------------------------------------------------------------

#[derive(Clone, Debug)]
struct RawDet {
    x1: f32,
    y1: f32,
    x2: f32,
    y2: f32,
    score: f32,
}

fn nms(dets: &mut [RawDet], iou_thresh: f32) -> Vec<RawDet> {
    dets.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(std::cmp::Ordering::Equal)
    });

    let mut keep = Vec::new();
    let mut suppressed = vec![false; dets.len()];

    for i in 0..dets.len() {
        if suppressed[i] {
            continue;
        }
        keep.push(dets[i].clone());
        for j in (i + 1)..dets.len() {
            if suppressed[j] {
                continue;
            }
            if bbox_iou(&dets[i], &dets[j]) > iou_thresh {
                suppressed[j] = true;
            }
        }
    }
    keep
}

fn bbox_iou(a: &RawDet, b: &RawDet) -> f32 {
    let x1 = a.x1.max(b.x1);
    let y1 = a.y1.max(b.y1);
    let x2 = a.x2.min(b.x2);
    let y2 = a.y2.min(b.y2);

    let inter = (x2 - x1).max(0.0) * (y2 - y1).max(0.0);
    if inter == 0.0 {
        return 0.0;
    }
    let area_a = (a.x2 - a.x1) * (a.y2 - a.y1);
    let area_b = (b.x2 - b.x1) * (b.y2 - b.y1);
    inter / (area_a + area_b - inter)
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
