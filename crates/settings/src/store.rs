use cg_domain::error::{Error, Result};

/// Longest accepted feature name or parameter key, in characters.
pub const MAX_KEY_LEN: usize = 50;
/// Longest accepted parameter value, in characters.
pub const MAX_VALUE_LEN: usize = 2500;

/// Durable per-user feature flags and parameters.
///
/// Rows are private to `user_id`. Flags are never deleted: disabling keeps
/// the row with `enabled = false`. Parameter writes are last-writer-wins.
pub trait SettingsStore: Send + Sync {
    /// Whether `kind` is enabled for the user. Unknown rows read as `false`.
    fn is_enabled(&self, user_id: &str, kind: &str) -> Result<bool>;

    fn set_enabled(&self, user_id: &str, kind: &str, enabled: bool) -> Result<()>;

    /// The stored value for `key`, or `None` when never set.
    fn get_parameter(&self, user_id: &str, key: &str) -> Result<Option<String>>;

    fn set_parameter(&self, user_id: &str, key: &str, value: &str) -> Result<()>;
}

/// Reject keys and values that exceed the column bounds.
pub(crate) fn check_bounds(key: &str, value: Option<&str>) -> Result<()> {
    if key.is_empty() {
        return Err(Error::InvalidParameter {
            key: key.to_owned(),
            message: "must not be empty".into(),
        });
    }
    if key.chars().count() > MAX_KEY_LEN {
        return Err(Error::InvalidParameter {
            key: key.to_owned(),
            message: format!("key longer than {MAX_KEY_LEN} characters"),
        });
    }
    if let Some(value) = value {
        if value.chars().count() > MAX_VALUE_LEN {
            return Err(Error::InvalidParameter {
                key: key.to_owned(),
                message: format!("value longer than {MAX_VALUE_LEN} characters"),
            });
        }
    }
    Ok(())
}
