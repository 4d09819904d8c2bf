pub mod engine;
pub mod hocr;
pub mod job;
