use std::path::Path;
use std::time::Duration;

use thiserror::Error;

use crate::detection::domain::face_detector::FaceDetector;
use crate::graph::calculator::CalculatorRegistry;
use crate::graph::config::{GraphConfig, GraphConfigError};
use crate::graph::packet::{MonotonicClock, Packet, PacketPayload};
use crate::graph::runner::{CalculatorGraph, GraphError, OutputStreamPoller};
use crate::shared::frame::Frame;
use crate::shared::rect::Rect;

#[derive(Error, Debug)]
pub enum DetectorError {
    #[error(transparent)]
    Config(#[from] GraphConfigError),
    #[error(transparent)]
    Graph(#[from] GraphError),
    #[error("output packet did not contain detections")]
    UnexpectedPayload,
    #[error("a previous detect timed out with its output still in flight; close the adapter")]
    Poisoned,
}

/// Face detector backed by a running [`CalculatorGraph`].
///
/// This is the adapter between raw frames and the graph's packet/stream
/// protocol: per call it submits one timestamped image packet to the
/// config's input stream, blocks for exactly one packet on the output
/// stream, and maps the returned detections into pixel-space rectangles.
///
/// The adapter exclusively owns its graph and is move-only; dropping it
/// shuts the graph down. `close` does the same but surfaces shutdown
/// errors, and consuming `self` makes re-initialization unrepresentable.
pub struct GraphFaceDetector {
    graph: CalculatorGraph,
    poller: Option<OutputStreamPoller>,
    clock: MonotonicClock,
    timeout: Option<Duration>,
    poisoned: bool,
}

impl GraphFaceDetector {
    /// Reads and parses the graph config file and initializes the graph.
    ///
    /// Any failure here is fatal: no detector exists to call `detect` on.
    pub fn from_config_file(
        path: &Path,
        registry: &CalculatorRegistry,
    ) -> Result<Self, DetectorError> {
        let config = GraphConfig::from_file(path)?;
        Self::new(config, registry)
    }

    pub fn new(
        config: GraphConfig,
        registry: &CalculatorRegistry,
    ) -> Result<Self, DetectorError> {
        let graph = CalculatorGraph::initialize(config, registry)?;
        Ok(Self {
            graph,
            poller: None,
            clock: MonotonicClock::new(),
            timeout: None,
            poisoned: false,
        })
    }

    /// Bounds each `detect` call's wait for its output packet.
    ///
    /// Without a timeout the wait is unbounded, matching the engine's
    /// native behavior. After a deadline miss the timed-out frame's
    /// output is still in flight and could no longer be paired with the
    /// right input, so further `detect` calls fail with
    /// [`DetectorError::Poisoned`]; close the adapter instead.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Runs one frame through the graph and returns pixel-space boxes.
    ///
    /// The first call registers the output poller and starts the run.
    /// The frame is copied once; the copy is converted to RGB if needed
    /// and handed to the graph. Exactly one output packet is consumed per
    /// call, in submission order.
    pub fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, DetectorError> {
        if self.poisoned {
            return Err(DetectorError::Poisoned);
        }
        if self.poller.is_none() {
            let output_stream = self.graph.output_stream().to_string();
            self.poller = Some(self.graph.add_output_stream_poller(&output_stream)?);
            self.graph.start_run()?;
            log::info!("graph run started");
        }

        let width = frame.width();
        let height = frame.height();
        let rgb = frame.clone().into_rgb();

        let timestamp = self.clock.next();
        let input_stream = self.graph.input_stream().to_string();
        self.graph
            .add_packet_to_input_stream(&input_stream, Packet::image(rgb, timestamp))?;

        let poller = self.poller.as_mut().ok_or(GraphError::NotStarted)?;
        let packet = match self.timeout {
            Some(deadline) => match poller.next_deadline(deadline) {
                // The frame's output will still arrive on the stream; a
                // later poll would pair it with the wrong input.
                Err(GraphError::DeadlineExceeded) => {
                    self.poisoned = true;
                    return Err(GraphError::DeadlineExceeded.into());
                }
                other => other?,
            },
            None => poller.next()?,
        };

        match packet.payload {
            PacketPayload::Detections(detections) => Ok(detections
                .iter()
                .map(|d| d.to_rect(width, height))
                .collect()),
            PacketPayload::Image(_) => Err(DetectorError::UnexpectedPayload),
        }
    }

    /// Closes the input stream, then blocks until the graph has drained
    /// all in-flight packets and shut down.
    ///
    /// Safe to call right after construction, before any `detect`.
    pub fn close(mut self) -> Result<(), DetectorError> {
        let input_stream = self.graph.input_stream().to_string();
        self.graph.close_input_stream(&input_stream)?;
        self.graph.wait_until_done()?;
        log::info!("graph shut down");
        Ok(())
    }
}

impl FaceDetector for GraphFaceDetector {
    fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
        GraphFaceDetector::detect(self, frame).map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::detection::domain::detection::Detection;
    use crate::graph::calculator::Calculator;

    struct StaticDetections {
        detections: Vec<Detection>,
    }

    impl Calculator for StaticDetections {
        fn process(
            &mut self,
            packet: Packet,
        ) -> Result<Packet, Box<dyn std::error::Error + Send + Sync>> {
            match packet.payload {
                PacketPayload::Image(_) => {
                    Ok(Packet::detections(self.detections.clone(), packet.timestamp))
                }
                PacketPayload::Detections(_) => Err("expected an image".into()),
            }
        }
    }

    struct Stall;

    impl Calculator for Stall {
        fn process(
            &mut self,
            packet: Packet,
        ) -> Result<Packet, Box<dyn std::error::Error + Send + Sync>> {
            std::thread::sleep(Duration::from_millis(200));
            Ok(packet)
        }
    }

    /// Stalls on the first packet only, so a timed-out frame's output is
    /// sitting on the stream when the next packet comes through quickly.
    struct StallOnce {
        stalled: bool,
    }

    impl Calculator for StallOnce {
        fn process(
            &mut self,
            packet: Packet,
        ) -> Result<Packet, Box<dyn std::error::Error + Send + Sync>> {
            if !self.stalled {
                self.stalled = true;
                std::thread::sleep(Duration::from_millis(100));
            }
            Ok(Packet::detections(vec![], packet.timestamp))
        }
    }

    fn stub_config() -> GraphConfig {
        GraphConfig::parse(
            "input_stream: \"input_video\"\noutput_stream: \"output_detections\"\nnode {\n  calculator: \"Stub\"\n}",
        )
        .unwrap()
    }

    fn stub_registry(detections: Vec<Detection>) -> CalculatorRegistry {
        let mut registry = CalculatorRegistry::empty();
        registry.register("Stub", move |_| {
            Ok(Box::new(StaticDetections {
                detections: detections.clone(),
            }))
        });
        registry
    }

    fn frame_640x480() -> Frame {
        Frame::new(vec![0u8; 640 * 480 * 3], 640, 480, 0)
    }

    #[test]
    fn test_detect_maps_relative_box_to_pixels() {
        let registry = stub_registry(vec![Detection::relative(0.9, 0.25, 0.25, 0.5, 0.5)]);
        let mut detector = GraphFaceDetector::new(stub_config(), &registry).unwrap();

        let rects = detector.detect(&frame_640x480()).unwrap();
        assert_eq!(rects, vec![Rect::new(160, 120, 320, 240)]);
        detector.close().unwrap();
    }

    #[test]
    fn test_detect_with_no_faces_returns_empty() {
        let registry = stub_registry(vec![]);
        let mut detector = GraphFaceDetector::new(stub_config(), &registry).unwrap();

        let rects = detector.detect(&frame_640x480()).unwrap();
        assert!(rects.is_empty());
        detector.close().unwrap();
    }

    #[test]
    fn test_detect_preserves_count_and_order() {
        let registry = stub_registry(vec![
            Detection::relative(0.9, 0.0, 0.0, 0.1, 0.1),
            Detection::relative(0.8, 0.5, 0.5, 0.2, 0.2),
            Detection::relative(0.7, 0.25, 0.25, 0.5, 0.5),
        ]);
        let mut detector = GraphFaceDetector::new(stub_config(), &registry).unwrap();

        let rects = detector.detect(&frame_640x480()).unwrap();
        assert_eq!(rects.len(), 3);
        assert_eq!(rects[0], Rect::new(0, 0, 64, 48));
        assert_eq!(rects[1], Rect::new(320, 240, 128, 96));
        assert_eq!(rects[2], Rect::new(160, 120, 320, 240));
        detector.close().unwrap();
    }

    #[test]
    fn test_absolute_boxes_pass_through_unscaled() {
        let registry = stub_registry(vec![Detection::absolute(0.9, 10.0, 20.0, 30.0, 40.0)]);
        let mut detector = GraphFaceDetector::new(stub_config(), &registry).unwrap();

        let rects = detector.detect(&frame_640x480()).unwrap();
        assert_eq!(rects, vec![Rect::new(10, 20, 30, 40)]);
        detector.close().unwrap();
    }

    #[test]
    fn test_repeated_detects_reuse_the_run() {
        let registry = stub_registry(vec![Detection::relative(0.9, 0.1, 0.1, 0.2, 0.2)]);
        let mut detector = GraphFaceDetector::new(stub_config(), &registry).unwrap();

        for _ in 0..5 {
            let rects = detector.detect(&frame_640x480()).unwrap();
            assert_eq!(rects.len(), 1);
        }
        detector.close().unwrap();
    }

    #[test]
    fn test_close_without_detect_does_not_hang() {
        let registry = stub_registry(vec![]);
        let detector = GraphFaceDetector::new(stub_config(), &registry).unwrap();
        detector.close().unwrap();
    }

    #[test]
    fn test_drop_without_close_shuts_down() {
        let registry = stub_registry(vec![]);
        let mut detector = GraphFaceDetector::new(stub_config(), &registry).unwrap();
        detector.detect(&frame_640x480()).unwrap();
        drop(detector);
    }

    #[test]
    fn test_deadline_miss_is_a_distinct_error() {
        let mut registry = CalculatorRegistry::empty();
        registry.register("Stub", |_| Ok(Box::new(Stall)));
        let mut detector = GraphFaceDetector::new(stub_config(), &registry)
            .unwrap()
            .with_timeout(Duration::from_millis(20));

        let err = detector.detect(&frame_640x480()).unwrap_err();
        assert!(matches!(
            err,
            DetectorError::Graph(GraphError::DeadlineExceeded)
        ));
    }

    #[test]
    fn test_detect_after_deadline_miss_fails_fast() {
        let mut registry = CalculatorRegistry::empty();
        registry.register("Stub", |_| Ok(Box::new(StallOnce { stalled: false })));
        let mut detector = GraphFaceDetector::new(stub_config(), &registry)
            .unwrap()
            .with_timeout(Duration::from_millis(20));

        let Err(first) = detector.detect(&frame_640x480()) else {
            panic!("first detect must time out");
        };
        assert!(matches!(
            first,
            DetectorError::Graph(GraphError::DeadlineExceeded)
        ));

        // The timed-out frame's output is still in flight; consuming it
        // here would pair it with the wrong frame's dimensions.
        let Err(second) = detector.detect(&frame_640x480()) else {
            panic!("detect after a deadline miss must not return stale output");
        };
        assert!(matches!(second, DetectorError::Poisoned));
    }

    #[test]
    fn test_unreadable_config_fails_init() {
        let registry = CalculatorRegistry::empty();
        let Err(err) =
            GraphFaceDetector::from_config_file(Path::new("/nonexistent/graph.txt"), &registry)
        else {
            panic!("init must fail on an unreadable config");
        };
        assert!(matches!(err, DetectorError::Config(_)));
    }

    #[test]
    fn test_bgr_frames_are_converted_before_submission() {
        use crate::shared::frame::PixelOrder;

        // A calculator that asserts it received RGB-tagged data
        struct ExpectRgb;
        impl Calculator for ExpectRgb {
            fn process(
                &mut self,
                packet: Packet,
            ) -> Result<Packet, Box<dyn std::error::Error + Send + Sync>> {
                match packet.payload {
                    PacketPayload::Image(frame) => {
                        if frame.order() != PixelOrder::Rgb {
                            return Err("frame was not converted to RGB".into());
                        }
                        Ok(Packet::detections(vec![], packet.timestamp))
                    }
                    PacketPayload::Detections(_) => Err("expected an image".into()),
                }
            }
        }

        let mut registry = CalculatorRegistry::empty();
        registry.register("Stub", |_| Ok(Box::new(ExpectRgb)));
        let mut detector = GraphFaceDetector::new(stub_config(), &registry).unwrap();

        let bgr = Frame::with_order(vec![0u8; 12], 2, 2, PixelOrder::Bgr, 0);
        detector.detect(&bgr).unwrap();
        detector.close().unwrap();
    }
}
