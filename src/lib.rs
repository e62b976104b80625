pub mod agent;
pub mod agents;
pub mod ask;
pub mod cli;
pub mod completion;
pub mod config;
pub mod credentials;
pub mod doctor;
pub mod error;
pub mod orchestrator;
pub mod output;
pub mod profiles;
pub mod remote;
pub mod roster;
pub mod runtime;
pub mod telemetry;

#[cfg(test)]
mod tests;
