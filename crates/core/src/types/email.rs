//! Email address type with structural validation.

use core::fmt;

use serde::{Deserialize, Serialize};

/// Errors that can occur when parsing an [`Email`].
#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
pub enum EmailAddressError {
    /// The input string is empty.
    #[error("email address cannot be empty")]
    Empty,
    /// The input string exceeds the RFC 5321 length limit.
    #[error("email address must be at most {max} characters")]
    TooLong {
        /// Maximum allowed length.
        max: usize,
    },
    /// The input does not contain exactly one @ symbol.
    #[error("email address must contain a single @ symbol")]
    MalformedAtSymbol,
    /// The local part (before @) is empty.
    #[error("email address local part cannot be empty")]
    EmptyLocalPart,
    /// The domain part (after @) is empty or has no dot.
    #[error("email address domain is missing or incomplete")]
    BadDomain,
}

/// A syntactically valid email address.
///
/// Validation is structural only (shape, not deliverability): the ledger
/// uses this to distinguish "malformed input" from "valid but unregistered
/// address", which carry different severities in the purchase flow.
///
/// ## Constraints
///
/// - Length: 1-254 characters (RFC 5321 limit)
/// - Exactly one @ symbol
/// - Non-empty local part
/// - Domain must be non-empty and contain a dot
///
/// ## Examples
///
/// ```
/// use storescribe_core::Email;
///
/// assert!(Email::parse("staff@acme-corp.com").is_ok());
/// assert!(Email::parse("owner+billing@shop.co.uk").is_ok());
///
/// assert!(Email::parse("").is_err());
/// assert!(Email::parse("not-an-address").is_err());
/// assert!(Email::parse("a@b@c.com").is_err());
/// assert!(Email::parse("user@localhost").is_err()); // no dot in domain
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(transparent)]
pub struct Email(String);

impl Email {
    /// Maximum length of an email address (RFC 5321).
    pub const MAX_LENGTH: usize = 254;

    /// Parse an `Email` from a string.
    ///
    /// # Errors
    ///
    /// Returns [`EmailAddressError`] if the input is empty, too long, has a
    /// malformed @ structure, an empty local part, or a dotless domain.
    pub fn parse(s: &str) -> Result<Self, EmailAddressError> {
        if s.is_empty() {
            return Err(EmailAddressError::Empty);
        }

        if s.len() > Self::MAX_LENGTH {
            return Err(EmailAddressError::TooLong {
                max: Self::MAX_LENGTH,
            });
        }

        let mut parts = s.split('@');
        let (local, domain) = match (parts.next(), parts.next(), parts.next()) {
            (Some(local), Some(domain), None) => (local, domain),
            _ => return Err(EmailAddressError::MalformedAtSymbol),
        };

        if local.is_empty() {
            return Err(EmailAddressError::EmptyLocalPart);
        }

        if domain.is_empty() || !domain.contains('.') {
            return Err(EmailAddressError::BadDomain);
        }

        Ok(Self(s.to_owned()))
    }

    /// Whether a string is a syntactically valid email address.
    #[must_use]
    pub fn is_valid(s: &str) -> bool {
        Self::parse(s).is_ok()
    }

    /// Returns the email address as a string slice.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Consumes the `Email` and returns its inner string.
    #[must_use]
    pub fn into_inner(self) -> String {
        self.0
    }
}

impl fmt::Display for Email {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl std::str::FromStr for Email {
    type Err = EmailAddressError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl AsRef<str> for Email {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

// SQLx support (with postgres feature)
#[cfg(feature = "postgres")]
impl sqlx::Type<sqlx::Postgres> for Email {
    fn type_info() -> sqlx::postgres::PgTypeInfo {
        <String as sqlx::Type<sqlx::Postgres>>::type_info()
    }

    fn compatible(ty: &sqlx::postgres::PgTypeInfo) -> bool {
        <String as sqlx::Type<sqlx::Postgres>>::compatible(ty)
    }
}

#[cfg(feature = "postgres")]
impl<'r> sqlx::Decode<'r, sqlx::Postgres> for Email {
    fn decode(value: sqlx::postgres::PgValueRef<'r>) -> Result<Self, sqlx::error::BoxDynError> {
        let s = <String as sqlx::Decode<sqlx::Postgres>>::decode(value)?;
        // Database values are assumed valid
        Ok(Self(s))
    }
}

#[cfg(feature = "postgres")]
impl sqlx::Encode<'_, sqlx::Postgres> for Email {
    fn encode_by_ref(
        &self,
        buf: &mut sqlx::postgres::PgArgumentBuffer,
    ) -> Result<sqlx::encode::IsNull, sqlx::error::BoxDynError> {
        <String as sqlx::Encode<'_, sqlx::Postgres>>::encode_by_ref(&self.0, buf)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_valid_addresses() {
        assert!(Email::parse("staff@example.com").is_ok());
        assert!(Email::parse("owner+billing@shop.co.uk").is_ok());
        assert!(Email::parse("a.b.c@sub.domain.io").is_ok());
    }

    #[test]
    fn test_parse_empty() {
        assert_eq!(Email::parse(""), Err(EmailAddressError::Empty));
    }

    #[test]
    fn test_parse_too_long() {
        let long = format!("{}@example.com", "x".repeat(250));
        assert!(matches!(
            Email::parse(&long),
            Err(EmailAddressError::TooLong { .. })
        ));
    }

    #[test]
    fn test_parse_missing_or_doubled_at() {
        assert_eq!(
            Email::parse("plain-string"),
            Err(EmailAddressError::MalformedAtSymbol)
        );
        assert_eq!(
            Email::parse("a@b@c.com"),
            Err(EmailAddressError::MalformedAtSymbol)
        );
    }

    #[test]
    fn test_parse_empty_local_part() {
        assert_eq!(
            Email::parse("@example.com"),
            Err(EmailAddressError::EmptyLocalPart)
        );
    }

    #[test]
    fn test_parse_bad_domain() {
        assert_eq!(Email::parse("user@"), Err(EmailAddressError::BadDomain));
        assert_eq!(
            Email::parse("user@localhost"),
            Err(EmailAddressError::BadDomain)
        );
    }

    #[test]
    fn test_is_valid() {
        assert!(Email::is_valid("staff@example.com"));
        assert!(!Email::is_valid("nope"));
    }

    #[test]
    fn test_display_roundtrip() {
        let email = Email::parse("staff@example.com").unwrap();
        assert_eq!(email.to_string(), "staff@example.com");
        assert_eq!(email.as_str(), "staff@example.com");
    }
}
