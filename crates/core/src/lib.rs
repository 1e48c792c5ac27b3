pub mod detection;
pub mod graph;
pub mod pipeline;
pub mod shared;
pub mod video;
