pub mod economy;
pub mod growth;
pub mod power;

pub use economy::{CityStats, EconomySystem};
pub use growth::GrowthSystem;
pub use power::{PowerGridState, PowerStatus, PowerSystem};
