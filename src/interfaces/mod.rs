pub mod channel;
pub mod media;
