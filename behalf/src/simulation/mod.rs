pub mod states;
pub mod params;
pub mod barnes_hut;
pub mod forces;
pub mod integrator;
pub mod partition;
pub mod transport;
pub mod coordinator;
pub mod initial_conditions;
