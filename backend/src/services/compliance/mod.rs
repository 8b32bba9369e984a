//! Compliance engine: pure regulation checks and the HMDA data paths.
//!
//! The checks never touch the database; a thin gatherer assembles their
//! inputs from lending data, and approvals gate on the recorded verdict.
//! HMDA writes go exclusively through the compliance connection pool.

pub mod checks;
pub mod hmda;
