pub mod bootstrap;
pub mod refresh;
pub mod setup;
