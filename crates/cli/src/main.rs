use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;

use facepipe_core::detection::domain::face_detector::FaceDetector;
use facepipe_core::detection::infrastructure::graph_face_detector::GraphFaceDetector;
use facepipe_core::graph::calculator::CalculatorRegistry;
use facepipe_core::pipeline::detect_overlay_use_case::DetectOverlayUseCase;
use facepipe_core::pipeline::rotation::Rotation;
use facepipe_core::shared::video_metadata::VideoMetadata;
use facepipe_core::video::domain::video_reader::VideoReader;
use facepipe_core::video::domain::video_writer::VideoWriter;
use facepipe_core::video::infrastructure::camera_reader::CameraReader;
use facepipe_core::video::infrastructure::ffmpeg_reader::FfmpegReader;
use facepipe_core::video::infrastructure::ffmpeg_writer::FfmpegWriter;
use facepipe_core::video::infrastructure::image_folder_reader::{
    list_image_files, ImageFolderReader,
};
use facepipe_core::video::infrastructure::image_folder_writer::ImageFolderWriter;

mod window;
use window::WindowSink;

const WINDOW_TITLE: &str = "facepipe";

/// Face detection over videos, image folders, or a webcam.
#[derive(Parser)]
#[command(name = "facepipe")]
struct Cli {
    /// Calculator graph config file.
    #[arg(long)]
    graph_config: PathBuf,

    /// Input video file. When absent, the webcam is used.
    #[arg(long)]
    input_video: Option<PathBuf>,

    /// Output video file. When absent, frames are shown in a window.
    #[arg(long)]
    output_video: Option<PathBuf>,

    /// Folder of input images, processed in name order.
    /// Takes precedence over --input-video.
    #[arg(long)]
    input_images: Option<PathBuf>,

    /// Folder for per-frame JPEG output. Takes precedence over --output-video.
    #[arg(long)]
    output_images: Option<PathBuf>,

    /// Clockwise rotation applied before detection: 0, 90, 180 or 270.
    #[arg(long, default_value = "0")]
    rotate: u32,

    /// Webcam device index.
    #[arg(long, default_value = "0")]
    camera: u32,

    /// Per-frame detection timeout in milliseconds. Unset waits forever.
    #[arg(long)]
    timeout_ms: Option<u64>,
}

/// An error carrying the process exit code to report it with.
struct AppError {
    code: i32,
    source: Box<dyn std::error::Error>,
}

impl AppError {
    fn new(code: i32, source: Box<dyn std::error::Error>) -> Self {
        Self { code, source }
    }
}

impl From<Box<dyn std::error::Error>> for AppError {
    fn from(source: Box<dyn std::error::Error>) -> Self {
        Self::new(1, source)
    }
}

#[show_image::main]
fn main() {
    env_logger::init();

    let cli = Cli::parse();
    match run(cli) {
        Ok(()) => show_image::exit(0),
        Err(e) => {
            eprintln!("Error: {}", e.source);
            show_image::exit(e.code);
        }
    }
}

fn run(cli: Cli) -> Result<(), AppError> {
    let rotation = Rotation::from_degrees(cli.rotate)
        .ok_or_else(|| -> Box<dyn std::error::Error> { "--rotate must be 0, 90, 180 or 270".into() })?;

    let registry = CalculatorRegistry::with_defaults();
    let mut detector = GraphFaceDetector::from_config_file(&cli.graph_config, &registry)
        .map_err(|e| AppError::new(1, Box::new(e)))?;
    if let Some(ms) = cli.timeout_ms {
        detector = detector.with_timeout(Duration::from_millis(ms));
    }

    let cancelled = Arc::new(AtomicBool::new(false));

    let (mut reader, input_path): (Box<dyn VideoReader>, PathBuf) =
        if let Some(dir) = cli.input_images.clone() {
            (Box::new(ImageFolderReader::new()), dir)
        } else if let Some(path) = cli.input_video.clone() {
            (Box::new(FfmpegReader::new()), path)
        } else {
            (Box::new(CameraReader::new(cli.camera)), PathBuf::new())
        };

    let metadata = open_input(reader.as_mut(), &input_path)?;

    let (writer, output_path): (Box<dyn VideoWriter>, PathBuf) =
        if let Some(dir) = cli.output_images.clone() {
            (build_folder_writer(cli.input_images.as_deref())?, dir)
        } else if let Some(path) = cli.output_video.clone() {
            (Box::new(FfmpegWriter::new()), path)
        } else {
            (
                Box::new(WindowSink::new(WINDOW_TITLE, cancelled.clone())),
                PathBuf::new(),
            )
        };

    let total = metadata.total_frames;
    let on_progress: Option<Box<dyn Fn(usize, usize) -> bool + Send>> = if total > 0 {
        Some(Box::new(move |current, _| {
            eprint!("\rProcessing frame {current}/{total}");
            true
        }))
    } else {
        None
    };

    let detector: Box<dyn FaceDetector> = Box::new(detector);
    let mut use_case = DetectOverlayUseCase::new(
        reader,
        writer,
        detector,
        rotation,
        on_progress,
        Some(cancelled),
    );

    let stats = use_case.execute(&metadata, &output_path)?;
    if total > 0 {
        eprintln!();
    }
    log::info!(
        "processed {} frame(s), {} face detection(s)",
        stats.frames,
        stats.faces
    );
    Ok(())
}

/// An unopenable input source (camera, video file, image folder) exits
/// with code -1; writer failures exit 1.
fn open_input(reader: &mut dyn VideoReader, path: &Path) -> Result<VideoMetadata, AppError> {
    reader.open(path).map_err(|e| AppError::new(-1, e))
}

/// Folder sinks name frames after their source image when there is one.
fn build_folder_writer(
    input_images: Option<&std::path::Path>,
) -> Result<Box<dyn VideoWriter>, AppError> {
    match input_images {
        Some(dir) => {
            let names: Vec<Option<String>> = list_image_files(dir)?
                .iter()
                .map(|p| {
                    p.file_name()
                        .and_then(|n| n.to_str())
                        .map(String::from)
                })
                .collect();
            Ok(Box::new(ImageFolderWriter::new(move |i| {
                names.get(i).cloned().flatten()
            })))
        }
        None => Ok(Box::new(ImageFolderWriter::indexed())),
    }
}
