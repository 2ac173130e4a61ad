//! JACK-backed audio io: a realtime processor that renders the shared
//! signal graph into the client's output ports, plus a capture bridge
//! feeding the hardware input into the engine's microphone source.

pub mod capture;
pub mod manager;
pub mod processor;

pub use manager::AudioManager;
