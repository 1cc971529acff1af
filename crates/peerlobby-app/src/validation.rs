//! Front-end input validation.
//!
//! Checks user-typed nicknames and room codes before they reach a session.
//! The protocol core accepts any display name; these rules only keep the
//! lobby readable.

use peerlobby_core::{IdentityError, ROOM_CODE_LEN, RoomCode};
use thiserror::Error;

/// Shortest accepted nickname, in characters.
pub const NICKNAME_MIN_LEN: usize = 2;

/// Longest accepted nickname, in characters.
pub const NICKNAME_MAX_LEN: usize = 20;

/// Rejected user input.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ValidationError {
    /// Nickname is too short or too long.
    #[error("nickname must be between {NICKNAME_MIN_LEN} and {NICKNAME_MAX_LEN} characters")]
    NicknameLength(usize),

    /// Nickname contains a disallowed character.
    #[error(
        "nickname can only contain Hangul, letters, numbers, underscores, and hyphens (found {0:?})"
    )]
    NicknameCharacter(char),

    /// Nickname starts or ends with `_` or `-`.
    #[error("nickname cannot start or end with an underscore or hyphen")]
    NicknameEdge,

    /// Nickname has two separators in a row.
    #[error("nickname cannot contain consecutive underscores or hyphens")]
    NicknameRepeatedSeparator,

    /// Room code is not [`ROOM_CODE_LEN`] characters.
    #[error("room code must be {ROOM_CODE_LEN} characters")]
    RoomCodeLength(usize),

    /// Room code has the right length but is not a valid code.
    #[error(transparent)]
    RoomCode(#[from] IdentityError),
}

fn is_separator(c: char) -> bool {
    c == '_' || c == '-'
}

fn is_hangul_syllable(c: char) -> bool {
    ('\u{AC00}'..='\u{D7A3}').contains(&c)
}

fn is_nickname_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || is_hangul_syllable(c) || is_separator(c)
}

/// Check a nickname.
///
/// # Errors
///
/// - `ValidationError::NicknameLength` unless 2 to 20 characters
/// - `ValidationError::NicknameCharacter` for anything but Hangul syllables,
///   ASCII letters and digits, `_`, and `-`
/// - `ValidationError::NicknameEdge` if it starts or ends with `_` or `-`
/// - `ValidationError::NicknameRepeatedSeparator` for `__`, `--`, `_-`, `-_`
pub fn validate_nickname(input: &str) -> Result<&str, ValidationError> {
    let len = input.chars().count();
    if !(NICKNAME_MIN_LEN..=NICKNAME_MAX_LEN).contains(&len) {
        return Err(ValidationError::NicknameLength(len));
    }

    if let Some(bad) = input.chars().find(|c| !is_nickname_char(*c)) {
        return Err(ValidationError::NicknameCharacter(bad));
    }

    if input.starts_with(is_separator) || input.ends_with(is_separator) {
        return Err(ValidationError::NicknameEdge);
    }

    let chars: Vec<char> = input.chars().collect();
    if chars.windows(2).any(|pair| is_separator(pair[0]) && is_separator(pair[1])) {
        return Err(ValidationError::NicknameRepeatedSeparator);
    }

    Ok(input)
}

/// Check and normalize a typed room code.
///
/// # Errors
///
/// - `ValidationError::RoomCodeLength` unless exactly five characters
/// - `ValidationError::RoomCode` if a character is not alphanumeric
pub fn validate_room_code(input: &str) -> Result<RoomCode, ValidationError> {
    let len = input.chars().count();
    if len != ROOM_CODE_LEN {
        return Err(ValidationError::RoomCodeLength(len));
    }
    Ok(RoomCode::parse(input)?)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accepts_mixed_scripts() {
        for name in ["Alice", "bob_42", "김철수", "dev-ops", "A1"] {
            assert_eq!(validate_nickname(name), Ok(name), "{name}");
        }
    }

    #[test]
    fn rejects_bad_lengths() {
        assert_eq!(validate_nickname("a"), Err(ValidationError::NicknameLength(1)));
        assert!(validate_nickname(&"x".repeat(21)).is_err());
        assert!(validate_nickname(&"가".repeat(20)).is_ok());
    }

    #[test]
    fn rejects_spaces_and_symbols() {
        assert_eq!(validate_nickname("al ice"), Err(ValidationError::NicknameCharacter(' ')));
        assert_eq!(validate_nickname("al!ce"), Err(ValidationError::NicknameCharacter('!')));
        assert_eq!(validate_nickname("ㄱㄴ"), Err(ValidationError::NicknameCharacter('ㄱ')));
    }

    #[test]
    fn rejects_separator_edges_and_runs() {
        assert_eq!(validate_nickname("_alice"), Err(ValidationError::NicknameEdge));
        assert_eq!(validate_nickname("alice-"), Err(ValidationError::NicknameEdge));
        assert_eq!(validate_nickname("al__ice"), Err(ValidationError::NicknameRepeatedSeparator));
        assert_eq!(validate_nickname("al-_ice"), Err(ValidationError::NicknameRepeatedSeparator));
    }

    #[test]
    fn room_code_must_be_five() {
        assert_eq!(validate_room_code("abcd"), Err(ValidationError::RoomCodeLength(4)));
        assert_eq!(validate_room_code("abcde").map(|c| c.to_string()), Ok("ABCDE".to_string()));
        assert!(matches!(validate_room_code("ab de"), Err(ValidationError::RoomCode(_))));
    }
}
