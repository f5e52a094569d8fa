pub mod expiration;
