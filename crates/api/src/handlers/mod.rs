pub mod annotation;
pub mod compression;
pub mod rooms;
