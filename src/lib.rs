//! DNSSEC chain-of-trust construction and verification.
//!
//! A [`Validator`] resolves a record, builds the data chain from its zone up
//! to the root, derives the tree of possible verification paths and evaluates
//! it against a set of trust anchors. Keys may also come from X.509
//! certificates held in a [`keys::KeyStore`].

pub mod config;
pub mod dns;
pub mod dnssec;
pub mod error;
pub mod keys;
pub mod resolver;

pub use config::{Config, ConfigError};
pub use dns::{DomainName, RecordType};
pub use dnssec::{TrustAnchors, TrustedKey, ValidationOptions, Validator, Verdict};
pub use error::{Error, Result};
pub use resolver::{ResolveError, Resolver, StaticResolver, UdpResolver};
