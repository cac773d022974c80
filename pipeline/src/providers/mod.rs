//! External provider clients.

pub mod events;
pub mod weather;

pub use events::{EventClient, EventError, EventSource, ProviderEvent, SecretResolver};
pub use weather::{HourlyForecast, WeatherClient, WeatherError, WeatherSource};
