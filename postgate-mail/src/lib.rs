pub mod adapter;
pub mod address;
pub mod message;
pub mod payload;

// An inbound email goes through 3 steps:
// - parsing, with its addresses normalized (message, address)
// - adaptation to the provider's form fields (adapter)
// - the resulting payload is handed to the delivery client (payload)
pub use adapter::{adapt, AdapterError};
pub use address::Address;
pub use message::{FilePart, ParseError, ParsedMessage};
pub use payload::{DeliveryPayload, FileField, FileUpload};
