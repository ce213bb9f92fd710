mod models;

pub use models::{CredentialRecord, TokenPair, EXPIRY_BUFFER};
