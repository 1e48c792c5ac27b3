use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use crate::detection::domain::face_detector::FaceDetector;
use crate::pipeline::overlay::draw_rects;
use crate::pipeline::rotation::Rotation;
use crate::shared::video_metadata::VideoMetadata;
use crate::video::domain::video_reader::VideoReader;
use crate::video::domain::video_writer::VideoWriter;

/// Counters reported after a run.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct RunStats {
    pub frames: usize,
    pub faces: usize,
}

/// Frame loop: read → rotate → detect → overlay → write.
///
/// Runs synchronously on the calling thread. A shared `cancelled` flag
/// stops the loop cleanly between frames (set from a window keypress or
/// Ctrl-C); the progress callback can also abort by returning `false`.
pub struct DetectOverlayUseCase {
    reader: Box<dyn VideoReader>,
    writer: Box<dyn VideoWriter>,
    detector: Box<dyn FaceDetector>,
    rotation: Rotation,
    on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
    cancelled: Arc<AtomicBool>,
}

impl DetectOverlayUseCase {
    pub fn new(
        reader: Box<dyn VideoReader>,
        writer: Box<dyn VideoWriter>,
        detector: Box<dyn FaceDetector>,
        rotation: Rotation,
        on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>>,
        cancelled: Option<Arc<AtomicBool>>,
    ) -> Self {
        Self {
            reader,
            writer,
            detector,
            rotation,
            on_progress,
            cancelled: cancelled.unwrap_or_else(|| Arc::new(AtomicBool::new(false))),
        }
    }

    /// Runs the loop over an already-opened reader.
    pub fn execute(
        &mut self,
        metadata: &VideoMetadata,
        output_path: &Path,
    ) -> Result<RunStats, Box<dyn std::error::Error>> {
        let output_metadata = if self.rotation.swaps_dimensions() {
            metadata.transposed()
        } else {
            metadata.clone()
        };
        if let Err(e) = self.writer.open(output_path, &output_metadata) {
            self.reader.close();
            return Err(e);
        }

        let total = metadata.total_frames;
        let result = self.run_loop(total);

        self.reader.close();
        let close_result = self.writer.close();

        let stats = result?;
        close_result?;
        Ok(stats)
    }

    fn run_loop(&mut self, total: usize) -> Result<RunStats, Box<dyn std::error::Error>> {
        let mut stats = RunStats::default();

        for result in self.reader.frames() {
            if self.cancelled.load(Ordering::Relaxed) {
                log::info!("cancelled after {} frame(s)", stats.frames);
                break;
            }

            let frame = result?;
            let mut frame = self.rotation.apply(frame);

            let rects = self.detector.detect(&frame)?;
            stats.faces += rects.len();
            draw_rects(&mut frame, &rects);

            self.writer.write(&frame)?;
            stats.frames += 1;

            if let Some(ref on_progress) = self.on_progress {
                if !on_progress(stats.frames, total) {
                    return Err("Aborted by progress callback".into());
                }
            }
        }

        Ok(stats)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shared::constants::OVERLAY_COLOR;
    use crate::shared::frame::Frame;
    use crate::shared::rect::Rect;
    use std::collections::HashMap;
    use std::sync::Mutex;

    // --- Stubs ---

    struct StubReader {
        frames: Vec<Frame>,
        width: u32,
        height: u32,
        closed: Arc<Mutex<bool>>,
    }

    impl StubReader {
        fn new(frames: Vec<Frame>, width: u32, height: u32) -> Self {
            Self {
                frames,
                width,
                height,
                closed: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl VideoReader for StubReader {
        fn open(&mut self, _path: &Path) -> Result<VideoMetadata, Box<dyn std::error::Error>> {
            Ok(VideoMetadata {
                width: self.width,
                height: self.height,
                fps: 30.0,
                total_frames: self.frames.len(),
                codec: String::new(),
            })
        }

        fn frames(
            &mut self,
        ) -> Box<dyn Iterator<Item = Result<Frame, Box<dyn std::error::Error>>> + '_> {
            Box::new(self.frames.drain(..).map(Ok))
        }

        fn close(&mut self) {
            *self.closed.lock().unwrap() = true;
        }
    }

    struct StubWriter {
        written: Arc<Mutex<Vec<Frame>>>,
        open_metadata: Arc<Mutex<Option<VideoMetadata>>>,
        closed: Arc<Mutex<bool>>,
    }

    impl StubWriter {
        fn new() -> Self {
            Self {
                written: Arc::new(Mutex::new(Vec::new())),
                open_metadata: Arc::new(Mutex::new(None)),
                closed: Arc::new(Mutex::new(false)),
            }
        }
    }

    impl VideoWriter for StubWriter {
        fn open(
            &mut self,
            _path: &Path,
            metadata: &VideoMetadata,
        ) -> Result<(), Box<dyn std::error::Error>> {
            *self.open_metadata.lock().unwrap() = Some(metadata.clone());
            Ok(())
        }

        fn write(&mut self, frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            self.written.lock().unwrap().push(frame.clone());
            Ok(())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            *self.closed.lock().unwrap() = true;
            Ok(())
        }
    }

    struct FailingWriter;

    impl VideoWriter for FailingWriter {
        fn open(
            &mut self,
            _path: &Path,
            _metadata: &VideoMetadata,
        ) -> Result<(), Box<dyn std::error::Error>> {
            Err("writer open failed".into())
        }

        fn write(&mut self, _frame: &Frame) -> Result<(), Box<dyn std::error::Error>> {
            Err("writer write failed".into())
        }

        fn close(&mut self) -> Result<(), Box<dyn std::error::Error>> {
            Ok(())
        }
    }

    struct StubDetector {
        results: HashMap<usize, Vec<Rect>>,
    }

    impl FaceDetector for StubDetector {
        fn detect(&mut self, frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
            Ok(self
                .results
                .get(&frame.index())
                .cloned()
                .unwrap_or_default())
        }
    }

    struct FailingDetector;

    impl FaceDetector for FailingDetector {
        fn detect(&mut self, _frame: &Frame) -> Result<Vec<Rect>, Box<dyn std::error::Error>> {
            Err("detector error".into())
        }
    }

    // --- Helpers ---

    fn make_frame(index: usize, w: u32, h: u32) -> Frame {
        Frame::new(vec![128; (w * h * 3) as usize], w, h, index)
    }

    fn make_frames(count: usize) -> Vec<Frame> {
        (0..count).map(|i| make_frame(i, 40, 40)).collect()
    }

    fn meta(width: u32, height: u32, total_frames: usize) -> VideoMetadata {
        VideoMetadata {
            width,
            height,
            fps: 30.0,
            total_frames,
            codec: String::new(),
        }
    }

    fn no_detections() -> Box<StubDetector> {
        Box::new(StubDetector {
            results: HashMap::new(),
        })
    }

    // --- Tests ---

    #[test]
    fn test_processes_all_frames_in_order() {
        let writer = StubWriter::new();
        let written = writer.written.clone();

        let mut uc = DetectOverlayUseCase::new(
            Box::new(StubReader::new(make_frames(5), 40, 40)),
            Box::new(writer),
            no_detections(),
            Rotation::None,
            None,
            None,
        );

        let stats = uc.execute(&meta(40, 40, 5), Path::new("out.mp4")).unwrap();
        assert_eq!(stats.frames, 5);
        assert_eq!(stats.faces, 0);

        let written = written.lock().unwrap();
        for (i, frame) in written.iter().enumerate() {
            assert_eq!(frame.index(), i);
        }
    }

    #[test]
    fn test_overlay_is_applied_to_written_frames() {
        let writer = StubWriter::new();
        let written = writer.written.clone();

        let mut results = HashMap::new();
        results.insert(0, vec![Rect::new(10, 10, 20, 20)]);

        let mut uc = DetectOverlayUseCase::new(
            Box::new(StubReader::new(make_frames(1), 40, 40)),
            Box::new(writer),
            Box::new(StubDetector { results }),
            Rotation::None,
            None,
            None,
        );

        let stats = uc.execute(&meta(40, 40, 1), Path::new("out.mp4")).unwrap();
        assert_eq!(stats.faces, 1);

        let written = written.lock().unwrap();
        let frame = &written[0];
        let i = ((10 * frame.width() + 10) * 3) as usize;
        assert_eq!(&frame.data()[i..i + 3], &OVERLAY_COLOR);
    }

    #[test]
    fn test_rotation_swaps_output_metadata() {
        let writer = StubWriter::new();
        let open_metadata = writer.open_metadata.clone();
        let written = writer.written.clone();

        let frames = vec![make_frame(0, 40, 30)];
        let mut uc = DetectOverlayUseCase::new(
            Box::new(StubReader::new(frames, 40, 30)),
            Box::new(writer),
            no_detections(),
            Rotation::Deg90,
            None,
            None,
        );

        uc.execute(&meta(40, 30, 1), Path::new("out.mp4")).unwrap();

        let meta = open_metadata.lock().unwrap().clone().unwrap();
        assert_eq!((meta.width, meta.height), (30, 40));

        let written = written.lock().unwrap();
        assert_eq!((written[0].width(), written[0].height()), (30, 40));
    }

    #[test]
    fn test_empty_source() {
        let writer = StubWriter::new();
        let written = writer.written.clone();

        let mut uc = DetectOverlayUseCase::new(
            Box::new(StubReader::new(vec![], 40, 40)),
            Box::new(writer),
            no_detections(),
            Rotation::None,
            None,
            None,
        );

        let stats = uc.execute(&meta(40, 40, 0), Path::new("out.mp4")).unwrap();
        assert_eq!(stats.frames, 0);
    }

    #[test]
    fn test_closes_reader_and_writer() {
        let reader = StubReader::new(make_frames(2), 40, 40);
        let reader_closed = reader.closed.clone();
        let writer = StubWriter::new();
        let writer_closed = writer.closed.clone();

        let mut uc = DetectOverlayUseCase::new(
            Box::new(reader),
            Box::new(writer),
            no_detections(),
            Rotation::None,
            None,
            None,
        );

        uc.execute(&meta(40, 40, 2), Path::new("out.mp4")).unwrap();

        assert!(*reader_closed.lock().unwrap());
        assert!(*writer_closed.lock().unwrap());
    }

    #[test]
    fn test_closes_on_detector_error() {
        let reader = StubReader::new(make_frames(3), 40, 40);
        let reader_closed = reader.closed.clone();
        let writer = StubWriter::new();
        let writer_closed = writer.closed.clone();

        let mut uc = DetectOverlayUseCase::new(
            Box::new(reader),
            Box::new(writer),
            Box::new(FailingDetector),
            Rotation::None,
            None,
            None,
        );

        assert!(uc.execute(&meta(40, 40, 3), Path::new("out.mp4")).is_err());
        assert!(*reader_closed.lock().unwrap());
        assert!(*writer_closed.lock().unwrap());
    }

    #[test]
    fn test_writer_open_failure_closes_reader() {
        let reader = StubReader::new(make_frames(1), 40, 40);
        let reader_closed = reader.closed.clone();

        let mut uc = DetectOverlayUseCase::new(
            Box::new(reader),
            Box::new(FailingWriter),
            no_detections(),
            Rotation::None,
            None,
            None,
        );

        assert!(uc.execute(&meta(40, 40, 1), Path::new("out.mp4")).is_err());
        assert!(*reader_closed.lock().unwrap());
    }

    #[test]
    fn test_cancellation_stops_between_frames() {
        let cancelled = Arc::new(AtomicBool::new(false));
        let cancelled_clone = cancelled.clone();
        let writer = StubWriter::new();
        let written = writer.written.clone();

        let mut uc = DetectOverlayUseCase::new(
            Box::new(StubReader::new(make_frames(10), 40, 40)),
            Box::new(writer),
            no_detections(),
            Rotation::None,
            Some(Box::new(move |current, _total| {
                if current >= 3 {
                    cancelled_clone.store(true, Ordering::Relaxed);
                }
                true
            })),
            Some(cancelled),
        );

        let stats = uc.execute(&meta(40, 40, 10), Path::new("out.mp4")).unwrap();
        assert_eq!(stats.frames, 3);
        assert_eq!(written.lock().unwrap().len(), 3);
    }

    #[test]
    fn test_progress_callback_false_aborts() {
        let mut uc = DetectOverlayUseCase::new(
            Box::new(StubReader::new(make_frames(10), 40, 40)),
            Box::new(StubWriter::new()),
            no_detections(),
            Rotation::None,
            Some(Box::new(|current, _total| current < 3)),
            None,
        );

        assert!(uc.execute(&meta(40, 40, 10), Path::new("out.mp4")).is_err());
    }

    #[test]
    fn test_progress_reports_total_from_metadata() {
        let calls = Arc::new(Mutex::new(Vec::new()));
        let calls_clone = calls.clone();

        let mut uc = DetectOverlayUseCase::new(
            Box::new(StubReader::new(make_frames(4), 40, 40)),
            Box::new(StubWriter::new()),
            no_detections(),
            Rotation::None,
            Some(Box::new(move |current, total| {
                calls_clone.lock().unwrap().push((current, total));
                true
            })),
            None,
        );

        uc.execute(&meta(40, 40, 4), Path::new("out.mp4")).unwrap();

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 4);
        assert_eq!(calls[0], (1, 4));
        assert_eq!(calls[3], (4, 4));
    }

    #[test]
    fn test_face_count_accumulates() {
        let mut results = HashMap::new();
        results.insert(0, vec![Rect::new(1, 1, 5, 5), Rect::new(10, 10, 5, 5)]);
        results.insert(2, vec![Rect::new(20, 20, 5, 5)]);

        let mut uc = DetectOverlayUseCase::new(
            Box::new(StubReader::new(make_frames(3), 40, 40)),
            Box::new(StubWriter::new()),
            Box::new(StubDetector { results }),
            Rotation::None,
            None,
            None,
        );

        let stats = uc.execute(&meta(40, 40, 3), Path::new("out.mp4")).unwrap();
        assert_eq!(stats.faces, 3);
    }
}
