pub mod encoding;
pub mod normalizer;
pub mod options;
pub mod platform;
