//! Propolis - signed message envelopes for federated identities
//!
//! Every identity owns a P-256 keypair. Its identifier is derived from the
//! public key, its private key is sealed under the account password, and
//! everything it publishes travels as a signed three-segment envelope that
//! any holder of the public key can verify.
//!
//! ## Modules
//!
//! - **keys**: keypair generation, key encoding, private key vault
//! - **identity**: identifiers, identity records, the identity service
//! - **envelope**: building, parsing and verifying envelopes; payload dispatch
//! - **store**: identity stores and the public key cache
//! - **config** / **logging**: binary configuration and tracing setup

pub mod config;
pub mod envelope;
pub mod identity;
pub mod keys;
pub mod logging;
pub mod store;
pub mod types;

pub use config::Args;
pub use envelope::{Envelope, EnvelopeError, Header, KeyResolver, SignedEnvelope};
pub use identity::{Address, Identity, IdentityError, IdentityId, IdentityService};
pub use types::{Error, ErrorClass, Result};
