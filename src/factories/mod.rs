pub mod channel_factory;
