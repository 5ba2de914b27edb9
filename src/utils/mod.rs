//! The `utils` module collects the pieces shared by the hub, transport and
//! client: the error types and the tracing setup.

pub mod error;
pub mod logging;

pub use error::{ClientError, DeliveryError, HubError, InvocationError, ServerError};
