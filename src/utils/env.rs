// src/utils/env.rs

use log::{debug, info};

/// Loads environment variables from a .env file if one is present.
/// Missing files are fine; existing process variables are never
/// overwritten.
pub fn load_env() {
    match dotenv::dotenv() {
        Ok(path) => info!("Loaded environment from {}", path.display()),
        Err(e) => debug!("No .env file loaded: {}", e),
    }
}
