#![deny(unsafe_op_in_unsafe_fn)]
#![warn(clippy::unwrap_used, clippy::expect_used)]

//! Client for the private API behind the Wiener Netze smart meter portal.
//!
//! [`Smartmeter`] is the async client; [`blocking::Smartmeter`] wraps it for
//! callers without a runtime.
//!
//! ```no_run
//! # async fn run() -> smartmeter_api::error::Result<()> {
//! use smartmeter_api::{Smartmeter, SmartmeterConfig};
//!
//! let client = Smartmeter::connect(SmartmeterConfig::from_env()?).await?;
//! let meters = client.zaehlpunkte().await?;
//! println!("{meters}");
//! # Ok(())
//! # }
//! ```

pub mod auth;
pub mod blocking;
pub mod client;
pub mod common;
pub mod error;
pub mod transport;

pub use client::{Smartmeter, SmartmeterConfig};
pub use error::{Result, SmartmeterError};
