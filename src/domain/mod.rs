pub mod actuator;
pub mod enums;
pub mod forecast;
pub mod layout;
pub mod sensor;
pub mod types;
pub mod versioned;

pub use actuator::*;
pub use enums::*;
pub use forecast::*;
pub use layout::{ChannelRole, ChannelSpec, Layout, LayoutError};
pub use sensor::*;
pub use types::*;
pub use versioned::*;
