use crate::common::error::WsFilterError;

/// Result alias used throughout the crate
///
/// # Examples
///
/// ```
/// use workspaces_filter::common::result::WsFilterResult;
/// use workspaces_filter::common::error::WsFilterError;
///
/// fn example_with_error() -> WsFilterResult<()> {
///     Err(WsFilterError::internal_error("Something went wrong"))
/// }
/// assert!(example_with_error().is_err());
/// ```
pub type WsFilterResult<T> = Result<T, WsFilterError>;

/// Conversion helpers from `Option` into [`WsFilterResult`]
pub trait OptionExt<T> {
    /// Convert `None` into an internal error carrying `message`
    ///
    /// ```
    /// use workspaces_filter::common::result::{OptionExt, WsFilterResult};
    ///
    /// let none_value: Option<&str> = None;
    /// let result: WsFilterResult<&str> = none_value.ok_or_internal_error("value required");
    /// assert!(result.is_err());
    /// ```
    fn ok_or_internal_error(self, message: impl Into<String>) -> WsFilterResult<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_internal_error(self, message: impl Into<String>) -> WsFilterResult<T> {
        self.ok_or_else(|| WsFilterError::internal_error(message))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_option_ext_some() {
        let value = Some(3);
        assert_eq!(value.ok_or_internal_error("missing").unwrap(), 3);
    }

    #[test]
    fn test_option_ext_none() {
        let value: Option<u8> = None;
        let error = value.ok_or_internal_error("empty").unwrap_err();
        assert_eq!(error.to_string(), "Internal error: empty");
    }
}
