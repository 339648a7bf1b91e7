//! Middleware that adds tracing to a [`Service`].
//!
//! [`Service`]: tower_service::Service

#[doc(inline)]
pub use self::carrier::{Carrier, HeaderInjector};
#[doc(inline)]
pub use self::http::{Http, HttpLayer};
#[doc(inline)]
pub use self::wrap::{Traced, TracedLayer};

pub mod carrier;
pub mod http;
pub mod wrap;
