pub mod directory;
pub mod fixture;
pub mod systemd;

pub use fixture::{FixtureManager, ManagerCall};
pub use systemd::{SystemdConfig, SystemdManager};
