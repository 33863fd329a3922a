pub mod audio;
pub mod classifier;
pub mod correlator;
pub mod dedup;
pub mod gossip;
pub mod memory_channel;
pub mod relay_channel;
pub mod resolver;
