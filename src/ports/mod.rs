pub mod resource_manager;

pub use resource_manager::{ManagerError, ManagerResult, ResourceManager};
