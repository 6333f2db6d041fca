//! Prefix-preserving IP/AS anonymization for NetFlow/IPFIX archive files.
//!
//! The core (see the module-level docs on each of these) is the parallel
//! record-transformation pipeline: [`pipeline`] streams data blocks through
//! a fixed pool of [`worker`] threads coordinated by a custom [`barrier`],
//! each of which walks its partition of one block's records ([`partition`],
//! [`record`]) and anonymizes address-bearing fields via an injected
//! [`anonymizer::Anonymizer`]. [`archive`] and [`cli`] are the ambient file
//! format and command-line front end that make this a runnable tool.

pub mod anonymizer;
pub mod archive;
pub mod barrier;
pub mod block;
pub mod cli;
pub mod error;
pub mod partition;
pub mod pipeline;
pub mod record;
pub mod worker;
