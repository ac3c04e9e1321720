pub mod error;
pub mod events;
pub mod pipeline;
pub mod record;
pub mod schema;
pub mod store;
pub mod validation;

pub use error::{ColonyError, Result};
pub use events::{ChangeKind, StoreEvent};
pub use record::{Record, ID_FIELD};
pub use schema::{parse_schema_str, FieldSpec, FieldType, IdStrategy, Schema};
pub use store::{Colony, Needle, SortKey, SortOrder};
pub use validation::{ErrorMessages, ValidationError};
