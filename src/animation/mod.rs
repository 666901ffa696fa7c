/// Lottie payload plus derived rate, frame count and size.
pub mod descriptor;
