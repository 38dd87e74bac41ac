pub mod core;
pub mod features;

pub use self::core::*;
pub use self::features::*;
