pub mod dialcode;
pub mod health;
pub mod metrics;
