pub mod hash;
pub mod projector;
pub mod vips;
