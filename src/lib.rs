pub mod app;
pub mod cli;
pub mod logging;

pub use app::Application;
pub use cli::{build_cli, execute};
pub use logging::init_logging;
