mod errors;
pub use errors::{AgencyError, Result};

mod key;
pub use key::AgencyKey;

mod store;
pub use store::Agency;

mod transaction;
pub use transaction::{Condition, ConditionsMap, KeyOp, Transaction};
