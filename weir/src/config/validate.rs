use super::{ItemType, ParsedRegisteredItem, ENV};
use crate::Error;
use serde_yaml::Value;
use tracing::error;

/// Looks up `type_tag` in the registry, validates `settings` against its
/// `ConfigSpec`, and returns a placeholder ready for the factory to be
/// invoked at pipeline-assembly time.
///
/// Schema validation happens here, eagerly, so a misconfigured pipeline
/// fails before any transform (and its possibly-expensive external
/// resources) is constructed.
pub(crate) async fn parse_configuration_item(
    itype: ItemType,
    type_tag: &str,
    settings: &Value,
) -> Result<ParsedRegisteredItem, Error> {
    let item = {
        let lock = ENV.lock().map_err(|_| Error::UnableToSecureLock)?;
        let bucket = lock.get(&itype).ok_or(Error::UnableToSecureLock)?;
        match bucket.get(type_tag) {
            Some(item) => item.clone(),
            None => {
                error!(type_tag = %type_tag, "transform not registered");
                return Err(Error::TransformNotFound(type_tag.to_string()));
            }
        }
    };

    item.format.validate(settings)?;

    Ok(ParsedRegisteredItem {
        creator: item.creator,
        config: settings.clone(),
        type_tag: type_tag.to_string(),
    })
}
