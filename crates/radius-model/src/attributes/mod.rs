mod attribute;
mod set;

pub use attribute::{Avp, AvpValue};
pub use set::AttributeSet;
