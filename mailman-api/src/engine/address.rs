//! Subscriber address validation.

use validator::ValidateEmail;

/// Characters that must never appear in an address handed to the engine.
const HOSTILE_CHARS: &[char] = &[
    '\'', '"', '`', '$', ';', '|', '&', '<', '>', '(', ')', '\\', '{', '}', '!', '*',
];

/// Why an address was rejected.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressProblem {
    /// Not a syntactically valid email address.
    Bad,
    /// Contains shell or header metacharacters.
    Hostile,
}

/// Check that `address` looks like a deliverable address.
pub fn validate(address: &str) -> Result<(), AddressProblem> {
    if address.contains(HOSTILE_CHARS) {
        return Err(AddressProblem::Hostile);
    }

    if !address.to_string().validate_email() {
        return Err(AddressProblem::Bad);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_validate_accepts_plain_address() {
        assert_eq!(validate("alice@example.com"), Ok(()));
        assert_eq!(validate("a.b+tag@mail.example.org"), Ok(()));
        assert_eq!(validate("root@localhost"), Ok(()));
    }

    #[test]
    fn test_validate_bad() {
        assert_eq!(validate(""), Err(AddressProblem::Bad));
        assert_eq!(validate("alice"), Err(AddressProblem::Bad));
        assert_eq!(validate("@example.com"), Err(AddressProblem::Bad));
        assert_eq!(validate("a@b@example.com"), Err(AddressProblem::Bad));
        assert_eq!(validate("alice @example.com"), Err(AddressProblem::Bad));
    }

    #[test]
    fn test_validate_hostile() {
        assert_eq!(validate("a;rm@example.com"), Err(AddressProblem::Hostile));
        assert_eq!(validate("$(id)@example.com"), Err(AddressProblem::Hostile));
        assert_eq!(
            validate("\"quoted\"@example.com"),
            Err(AddressProblem::Hostile)
        );
    }
}
