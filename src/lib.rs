//! OAuth 1.0a signing for brokerage REST APIs, plus the small trading loop
//! built on top of it.
//!
//! The signer ([`v1a::RequestSigner`]) is the core: it turns a method, URL and
//! request parameters into an `Authorization: OAuth ...` header value.
//! Everything else (market data, order placement, EMA-crossover signals,
//! static risk checks, the polling loop) consumes it.
//!
//! ```rust,ignore
//! use brokersign::{Credentials, RequestParams, RequestSigner};
//!
//! let signer = RequestSigner::new(Credentials::new("ck", "cs", "at", "ats"));
//! let params = RequestParams::new().with("detailFlag", "ALL");
//! let header = signer.sign("GET", "https://api.etrade.com/v1/market/quote/AAPL.json", &params)?;
//! ```

pub mod bot;
#[cfg(feature = "reqwest")]
pub mod broker;
pub mod config;
pub mod credentials;
pub mod error;
pub mod parameters;
pub mod risk;
pub mod strategy;
pub mod util;
pub mod v1a;

pub use credentials::Credentials;
pub use error::{Error, Result};
pub use parameters::{ParamValue, RequestParams};
pub use v1a::{OAuthParameterSet, RequestSigner, SignError, SigningRequest};
