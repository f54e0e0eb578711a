//! Identity provider
//!
//! Each running instance generates one Ed25519 keypair at startup. Its
//! public address (`beacon:z{base58}`) is what peers paste into their chat
//! to address messages, and what discovery signals announce.
//!
//! ```rust
//! use beacon_core::identity::{Address, Identity};
//!
//! let identity = Identity::generate().unwrap();
//! let address = identity.address().clone();
//!
//! // Addresses round-trip through their string form
//! assert_eq!(Address::parse(address.as_str()).unwrap(), address);
//! ```

mod address;
mod keypair;

pub use address::Address;
pub use keypair::Identity;
