pub mod composer;
pub mod error;
pub mod filter_order;
pub mod filter_where;
pub mod query;
pub mod types;

pub use composer::FilterComposer;
pub use error::FilterError;
pub use filter_order::{FilterOrder, SortSpec};
pub use filter_where::FilterWhere;
pub use query::Query;
pub use types::*;
