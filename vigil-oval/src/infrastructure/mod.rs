//! Infrastructure Layer - OVAL data sources

pub mod driver;
pub mod http_client;

pub use driver::OvalDriver;
pub use http_client::OvalHttpClient;
