pub mod backend;
pub mod backends;
pub mod controller;
pub mod renderer;
pub mod view_state;

pub use backend::*;
pub use backends::{CanvasBackend, DefaultBackendFactory, GlobeBackend, TiledMapBackend};
pub use controller::*;
pub use renderer::*;
pub use view_state::*;
