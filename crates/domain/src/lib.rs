pub mod entities;
pub mod events;
pub mod ports;
pub mod repositories;
pub mod state;

pub use entities::*;
pub use events::*;
pub use formfill_errors::{FillError, FillResult};
pub use ports::*;
pub use repositories::*;
pub use state::*;
