use std::fmt;

use super::error::FaceIdError;

/// Key of one enrolled person.
///
/// Labels are typed in by the user and recovered from stored image file
/// names, so they round-trip through their decimal string form.
#[derive(Clone, Copy, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct IdentityLabel(u32);

impl IdentityLabel {
    pub fn new(value: u32) -> Self {
        Self(value)
    }

    pub fn value(&self) -> u32 {
        self.0
    }

    /// Parses user input. Surrounding whitespace is ignored; anything else
    /// that is not a plain non-negative integer is rejected.
    pub fn parse(input: &str) -> Result<Self, FaceIdError> {
        let trimmed = input.trim();
        if trimmed.is_empty() || !trimmed.bytes().all(|b| b.is_ascii_digit()) {
            return Err(FaceIdError::InvalidLabel(input.to_string()));
        }
        trimmed
            .parse::<u32>()
            .map(Self)
            .map_err(|_| FaceIdError::InvalidLabel(input.to_string()))
    }
}

impl fmt::Display for IdentityLabel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}
