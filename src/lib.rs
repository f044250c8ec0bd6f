pub mod authenticator;
pub mod ceremony;
pub mod error;
pub mod http;
pub mod settings;
pub mod webauthn;
