pub mod callback;
pub mod error;
pub mod profiles;
pub mod rest;
pub mod signing;
pub mod symbol;

pub use error::{to_engine_error, VenueAdapterError};
pub use profiles::{build_adapter, SUPPORTED_VENUES};
pub use rest::{RestAdapter, SigningScheme, VenueProfile};
