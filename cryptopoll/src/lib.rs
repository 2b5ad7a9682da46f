//! Private polls with homomorphically tallied ballots.
//!
//! Each poll has its own Paillier keypair. A ballot is a one-hot vector of ciphertexts, one per
//! poll option, signed by the voter's RSA key. The tally multiplies together the ciphertexts of
//! every ballot whose signature verifies, then decrypts one aggregate per option, so no single
//! ballot is ever decrypted.

mod ballot;
mod error;
mod keyvault;
mod ledger;
mod paillier;
mod poll;
mod serde_hex;
mod signature;
mod store;
mod tally;
mod voter;

pub use ballot::*;
pub use error::*;
pub use keyvault::*;
pub use ledger::*;
pub use paillier::*;
pub use poll::*;
pub use serde_hex::*;
pub use signature::*;
pub use store::*;
pub use tally::*;
pub use voter::*;
