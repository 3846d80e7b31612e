//! Validated stream volume scalar.

use paclient_core::error::ClientError;

/// A volume in `[0.0, 1.0]`. Constructing one outside that range is
/// rejected the same way a negative frame count or null callback is: a
/// synchronous `-EINVAL`-class error with no state change.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Volume(f32);

impl Volume {
    pub const SILENT: Self = Self(0.0);
    pub const FULL: Self = Self(1.0);

    pub fn new(value: f32) -> Result<Self, ClientError> {
        if !(0.0..=1.0).contains(&value) {
            return Err(ClientError::invalid_parameter(format!(
                "volume {value} is outside [0.0, 1.0]"
            )));
        }
        Ok(Self(value))
    }

    #[must_use]
    pub const fn get(self) -> f32 {
        self.0
    }
}
