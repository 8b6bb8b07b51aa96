pub mod config;
pub mod error;
pub mod net;
pub mod proto;
pub mod sim;
pub mod topo;
pub mod traffic;
pub mod viz;

#[cfg(test)]
mod test;
