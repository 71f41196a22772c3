//! `next` / `previous` semantics for strings and characters
//!
//! Ranges over strings step by incrementing the last character, so `"a".."d"`
//! enumerates four values while `"009".."010"` would never terminate (the
//! successor of `"009"` is `"00:"`). [`check_string_range`] rejects such bounds
//! when the range is built rather than when it is iterated.

use crate::error::TypeError;

const SURROGATE_START: u32 = 0xD800;
const SURROGATE_END: u32 = 0xDFFF;

/// Successor of a character, wrapping from `char::MAX` to `'\0'`
pub fn next_char(c: char) -> char {
    let code = c as u32;
    if c == char::MAX {
        return '\0';
    }
    let next = if code + 1 == SURROGATE_START {
        SURROGATE_END + 1
    } else {
        code + 1
    };
    char::from_u32(next).unwrap_or('\0')
}

/// Predecessor of a character, wrapping from `'\0'` to `char::MAX`
pub fn previous_char(c: char) -> char {
    let code = c as u32;
    if code == 0 {
        return char::MAX;
    }
    let prev = if code - 1 == SURROGATE_END {
        SURROGATE_START - 1
    } else {
        code - 1
    };
    char::from_u32(prev).unwrap_or(char::MAX)
}

/// Successor of a string
///
/// The empty string steps to `"\0"`. Otherwise the last character is
/// incremented, except that a last character of `char::MAX` gets `'\0'`
/// appended instead of wrapping.
pub fn next_string(s: &str) -> String {
    let mut chars: Vec<char> = s.chars().collect();
    match chars.last_mut() {
        None => chars.push('\0'),
        Some(last) if *last == char::MAX => chars.push('\0'),
        Some(last) => *last = next_char(*last),
    }
    chars.into_iter().collect()
}

/// Predecessor of a string
///
/// A trailing `'\0'` is removed; any other last character is decremented.
/// The empty string has no predecessor.
pub fn previous_string(s: &str) -> Result<String, TypeError> {
    let mut chars: Vec<char> = s.chars().collect();
    match chars.last_mut() {
        None => return Err(TypeError::NoPredecessor { value: String::new() }),
        Some(last) if *last == '\0' => {
            chars.pop();
        }
        Some(last) => *last = previous_char(*last),
    }
    Ok(chars.into_iter().collect())
}

/// Reject string bounds whose successor sequence cannot reach `end`
pub fn check_string_range(start: &str, end: &str) -> Result<(), TypeError> {
    let start: Vec<char> = start.chars().collect();
    let end: Vec<char> = end.chars().collect();

    if start.len() > end.len() {
        return Err(TypeError::IncompatibleRange {
            reason: "starting String is longer than ending string".to_string(),
        });
    }

    let length = start.len().min(end.len());
    let common = start
        .iter()
        .zip(end.iter())
        .take_while(|(a, b)| a == b)
        .count();
    if length > 0 && common < length - 1 {
        return Err(TypeError::IncompatibleRange {
            reason: "String#next() will not reach the expected value".to_string(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_next_string() {
        assert_eq!(next_string("a"), "b");
        assert_eq!(next_string("aa1"), "aa2");
        assert_eq!(next_string("009"), "00:");
        assert_eq!(next_string(""), "\0");
        assert_eq!(next_string(&char::MAX.to_string()), format!("{}\0", char::MAX));
    }

    #[test]
    fn test_previous_string() {
        assert_eq!(previous_string("b").unwrap(), "a");
        assert_eq!(previous_string("ab\0").unwrap(), "ab");
        assert!(matches!(
            previous_string(""),
            Err(TypeError::NoPredecessor { .. })
        ));
    }

    #[test]
    fn test_char_successors_skip_surrogates() {
        assert_eq!(next_char('a'), 'b');
        assert_eq!(next_char('\u{D7FF}'), '\u{E000}');
        assert_eq!(previous_char('\u{E000}'), '\u{D7FF}');
        assert_eq!(next_char(char::MAX), '\0');
        assert_eq!(previous_char('\0'), char::MAX);
    }

    #[test]
    fn test_check_string_range() {
        assert!(check_string_range("a", "d").is_ok());
        assert!(check_string_range("aa1", "aa4").is_ok());
        assert!(check_string_range("a", "zz").is_ok());

        let err = check_string_range("abc", "ab").unwrap_err();
        assert!(err.to_string().contains("longer than ending"));

        let err = check_string_range("009", "010").unwrap_err();
        assert!(err.to_string().contains("will not reach"));
    }
}
