//! Admin authentication: stateless signed sessions and login throttling.
//!
//! ## Sessions
//!
//! A successful `POST /api/login` mints a token with [`codec::SessionCodec`]
//! and hands it to the browser as an `HttpOnly` cookie. Handlers that need an
//! authenticated admin take a [`principal::AdminSession`] argument.
//!
//! ## Login Throttling
//!
//! Failed logins are counted per client IP by [`throttle::LoginThrottle`].
//!
//! - **Attempt Limit:** 5 failures (configurable) block the address.
//! - **Block Window:** 15 minutes (configurable), not extended by further attempts.
//! - **Reset:** a successful login clears the address history.

pub mod codec;
pub(crate) mod login;
pub mod principal;
pub(crate) mod session;
mod state;
pub mod storage;
pub mod throttle;
pub(crate) mod types;
mod utils;

pub use principal::AdminSession;
pub use state::{AuthConfig, AuthState, DEFAULT_ADMIN_USER};
pub use utils::ClientIp;
