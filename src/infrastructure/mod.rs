//! Infrastructure layer - Technical implementations
//!
//! This layer contains:
//! - Directory store implementations (memory, PostgreSQL)
//! - SIP protocol boundary (parsing, digest authentication, UDP context)

pub mod persistence;
pub mod protocols;
