pub mod deployment;
pub mod production;
pub mod resolve;
pub mod workflow;
