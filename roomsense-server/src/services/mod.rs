mod subscriber_service;

pub use subscriber_service::*;
