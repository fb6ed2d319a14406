//! Opaque host data
//!
//! User-data values carry host state through the VM without the VM ever
//! looking inside. Deinitialization is the `Drop` impl of the concrete
//! type; hosts recover their data with `Any` downcasting.

use std::any::Any;

pub trait UserData: Any {
    /// Label shown by `print` and `type`.
    fn kind(&self) -> &'static str {
        "userdata"
    }

    fn as_any(&self) -> &dyn Any;
}
