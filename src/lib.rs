// bdiiq: failover-aware BDII resolution and query client
// Exposes the resolver, query executor and helpers as a library

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod dns;
pub mod endpoint;
pub mod error;
pub mod ldif;
pub mod query;
pub mod resolver;
pub mod srm;
pub mod uri;
