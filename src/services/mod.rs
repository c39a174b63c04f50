pub mod analysis;
pub mod ingest;
pub mod janitor;
pub mod pose_detector;
pub mod render;
pub mod worker;
