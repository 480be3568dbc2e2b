mod analysis_loop;
mod capture_loop;
mod controller;
mod phash;
mod snapshot_store;

pub use analysis_loop::{analysis_loop, AnalysisContext};
pub use capture_loop::{capture_loop, CaptureContext};
pub use controller::SensingController;
pub use phash::{compute_hamming_distance, compute_phash};
pub use snapshot_store::LatestSnapshots;
