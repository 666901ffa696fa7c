/// Run-length source-to-output frame mapping.
pub mod resample;
