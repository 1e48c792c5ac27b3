pub mod camera_reader;
pub mod ffmpeg_reader;
pub mod ffmpeg_writer;
pub mod image_folder_reader;
pub mod image_folder_writer;
