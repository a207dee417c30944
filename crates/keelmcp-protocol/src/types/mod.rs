//! MCP protocol type set.
//!
//! One module per protocol feature; wire names are camelCase via serde
//! renames and all optional fields are omitted when `None`.

pub mod capabilities;
pub mod completion;
pub mod content;
pub mod core;
pub mod elicitation;
pub mod initialization;
pub mod logging;
pub mod methods;
pub mod prompts;
pub mod resources;
pub mod roots;
pub mod sampling;
pub mod tools;

pub use capabilities::*;
pub use completion::*;
pub use content::*;
pub use core::*;
pub use elicitation::*;
pub use initialization::*;
pub use logging::*;
pub use prompts::*;
pub use resources::*;
pub use roots::*;
pub use sampling::*;
pub use tools::*;
