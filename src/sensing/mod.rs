pub mod headless;
pub mod simulator;

pub use headless::{LoggingHaptics, LoggingIdleSleep, SyntheticSnapshots};
pub use simulator::{SimulatedSensor, SimulationProfile};
