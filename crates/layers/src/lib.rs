pub mod feature;
pub mod layer;
pub mod registry;
pub mod symbology;

pub use feature::*;
pub use layer::*;
pub use registry::*;
pub use symbology::*;
