use serde::Serialize;
use serde::de::DeserializeOwned;

/// A typed application event that can travel over the bus.
///
/// The implementing type *is* the payload shape registered for [`Event::TYPE`];
/// publishing or subscribing through the generic API is therefore checked at
/// compile time. Only the inbound transport path deals with untyped tags.
///
/// ```ignore
/// #[derive(Debug, Clone, Serialize, Deserialize)]
/// struct FileChanged {
///     file: String,
/// }
///
/// impl Event for FileChanged {
///     const TYPE: &'static str = "file.changed";
/// }
/// ```
pub trait Event: Serialize + DeserializeOwned + Clone + core::fmt::Debug + Send + Sync + 'static {
    /// Stable wire tag for this event (e.g. "stacks.built").
    const TYPE: &'static str;
}
