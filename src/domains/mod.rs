pub mod correlation;
pub mod message;
pub mod resource;
