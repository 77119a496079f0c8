// Core error modeling shared by the registry and the container.
pub mod error;
