pub mod archive;
pub mod content;
pub mod manifest;
pub mod queue;
pub mod registry;
pub mod renderer;
pub mod scheduler;
pub mod storage;
pub mod tracker;
pub mod upstream;
pub mod workflow;
