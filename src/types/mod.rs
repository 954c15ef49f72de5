mod errors;
mod product_tokens;
mod resource_type;
mod udn;

pub use errors::TypeError;
pub use product_tokens::{server_token, ProductToken, ProductTokens};
pub use resource_type::{ResourceKind, ResourceType};
pub use udn::{Udn, ValidationLevel};
