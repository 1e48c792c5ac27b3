pub mod blazeface_calculator;
pub mod graph_face_detector;
