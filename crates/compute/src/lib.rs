pub mod adapter;
pub mod field_calc;
pub mod locks;
pub mod pipeline;
pub mod planar;
pub mod request;
pub mod units;

pub use adapter::*;
pub use pipeline::*;
pub use planar::PlanarAdapter;
pub use request::*;
pub use units::*;
