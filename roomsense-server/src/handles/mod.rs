mod connection_handle;
mod reading_handle;

pub use connection_handle::*;
pub use reading_handle::*;
