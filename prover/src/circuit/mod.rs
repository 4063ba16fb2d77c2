pub mod gadgets;
pub mod transfer;

pub use transfer::TransferCircuit;
