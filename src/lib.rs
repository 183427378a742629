pub mod config;
pub mod error;
pub mod node;

pub use config::Config;
pub use error::{O3FsError, Result};
pub use node::Node;

pub use api;
pub use network;
pub use storage;
