pub mod builder;
pub mod compact;
pub mod cookbook;
pub mod format;
pub mod header;
pub mod jose;
pub mod keypair;
pub mod render;
pub mod signer;

pub use k256;
