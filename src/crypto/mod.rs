pub mod aead;
pub mod hash;
pub mod key_exchange;
pub mod key_schedule;
pub mod signature;
pub mod suite;
