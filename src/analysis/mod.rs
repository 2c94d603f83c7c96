pub mod monte_carlo;
pub mod scenario;
pub mod sensitivity;
pub mod stats;
