pub mod loader;
pub mod schema;

pub use loader::load_settings_from_env;
pub use schema::Settings;
