pub mod detect_overlay_use_case;
pub mod overlay;
pub mod rotation;
