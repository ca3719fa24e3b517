pub mod camera;
pub mod engine;
pub mod features;
pub mod picking;
pub mod selection;
pub mod sim;

pub use camera::*;
pub use engine::*;
pub use features::*;
pub use picking::*;
pub use selection::*;
