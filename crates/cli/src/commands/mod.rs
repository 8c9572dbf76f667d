//! CLI command implementations.

pub mod admin;
pub mod migrate;

use secrecy::SecretString;

/// The storefront database URL, read after loading `.env`.
pub fn database_url() -> Option<SecretString> {
    dotenvy::dotenv().ok();
    std::env::var("RIGHT_WATER_DATABASE_URL")
        .or_else(|_| std::env::var("DATABASE_URL"))
        .ok()
        .map(SecretString::from)
}
