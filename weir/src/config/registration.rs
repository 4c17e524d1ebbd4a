use super::{ConfigSpec, ItemType, RegisteredItem, ENV};
use crate::{Callback, Error};
use tracing::{debug, error};

/// Registers a transform factory under `name` for the given [`ItemType`].
///
/// A factory MUST already have validated that its `ConfigSpec` compiles;
/// `register_plugin` itself only guards against duplicate registration.
/// Plugins are typically registered once, at process startup, by each
/// transform module's `register_*` function (see
/// `transforms::register_plugins`).
///
/// ```compile_fail
/// use weir::config::{register_plugin, ConfigSpec, ItemType};
/// use weir::ExecutionType;
///
/// let spec = ConfigSpec::from_schema("type: object").unwrap();
/// register_plugin("noop".into(), ItemType::Transform, spec, |_v| {
///     Ok(ExecutionType::Transform(Box::new(MyTransform {})))
/// }).unwrap();
/// ```
pub fn register_plugin(
    name: String,
    itype: ItemType,
    format: ConfigSpec,
    creator: Callback,
) -> Result<(), Error> {
    let item = RegisteredItem { creator, format };

    let mut lock = ENV.lock().map_err(|_| {
        error!(kind = "unable to secure lock", "internal server error");
        Error::UnableToSecureLock
    })?;

    let bucket = lock.get_mut(&itype).ok_or(Error::UnableToSecureLock)?;
    if bucket.insert(name.clone(), item).is_some() {
        error!(name = %name, "transform is already registered");
        return Err(Error::DuplicateRegisteredName(name));
    }

    debug!(name = %name, plugin_type = %itype, "transform registered");
    Ok(())
}
