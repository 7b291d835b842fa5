pub mod context;
pub mod dialcode;
pub mod envelope;
pub mod job;
pub mod manifest;
pub mod outcome;
pub mod render;
