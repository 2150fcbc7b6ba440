mod connection;
mod reading;

pub use connection::*;
pub use reading::*;
