pub mod icons;
pub mod progress;
pub mod render;

pub use progress::{Pending, with_spinner};
