pub mod types;
pub mod filter;
pub mod filter_where;
pub mod filter_order;
pub mod filter_select;
pub mod matcher;
pub mod error;

pub use types::*;
pub use error::FilterError;
pub use filter::{validate_collection_name, Filter};
pub use filter_order::FilterOrder;
pub use filter_select::Projection;
pub use filter_where::FilterWhere;
