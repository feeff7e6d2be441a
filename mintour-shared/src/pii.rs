use serde::{Deserialize, Serialize, Serializer};
use std::fmt;

/// Wraps personal data and credentials so that `Debug`/`Display` never print them.
///
/// Serialization still emits the real value: API responses and outbound gateway
/// requests need it. The wrapper only guards against `tracing::info!("{:?}", ..)`.
#[derive(Clone, PartialEq, Eq, Default, Deserialize)]
#[serde(transparent)]
pub struct Masked<T>(pub T);

impl<T> fmt::Debug for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T> fmt::Display for Masked<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "********")
    }
}

impl<T: Serialize> Serialize for Masked<T> {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: Serializer,
    {
        self.0.serialize(serializer)
    }
}

impl<T> Masked<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn expose(&self) -> &T {
        &self.0
    }
}

impl From<String> for Masked<String> {
    fn from(value: String) -> Self {
        Self(value)
    }
}

impl From<&str> for Masked<String> {
    fn from(value: &str) -> Self {
        Self(value.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn debug_and_display_hide_the_value() {
        let phone = Masked::new("010-1234-5678".to_string());
        assert_eq!(format!("{:?}", phone), "********");
        assert_eq!(format!("{}", phone), "********");
        assert_eq!(phone.expose(), "010-1234-5678");
    }

    #[test]
    fn serializes_the_real_value() {
        let secret: Masked<String> = "test_sk_abc".into();
        let json = serde_json::to_string(&secret).unwrap();
        assert_eq!(json, "\"test_sk_abc\"");

        let back: Masked<String> = serde_json::from_str(&json).unwrap();
        assert_eq!(back, secret);
    }
}
