pub mod driver;
pub mod error;
pub mod fake;
pub mod registry;

pub use driver::{
    ConsoleInterface, DeployInterface, DriverBundle, PowerInterface, VendorInterface,
};
pub use error::DriverError;
pub use fake::fake_driver;
pub use registry::DriverRegistry;
