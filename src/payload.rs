use crate::error::SessionError;

/// Parse user-typed byte values such as `"252, 252, 001"`.
///
/// Accepted shapes: comma separated, space separated, comma+space separated,
/// or one bare value of at most three characters. Every token must be a byte;
/// one bad token rejects the whole input.
pub fn parse_bytes_text(text: &str) -> Result<Vec<u8>, SessionError> {
    let text = text.trim();
    let invalid = |reason: &str| SessionError::InvalidSendPayload {
        input: text.to_string(),
        reason: reason.to_string(),
    };

    if text.is_empty() {
        return Err(invalid("nothing to send"));
    }

    let has_commas = text.contains(',');
    let has_spaces = text.contains(' ');

    let tokens: Vec<&str> = match (has_commas, has_spaces) {
        (true, false) => text.split(',').collect(),
        (false, true) => text.split(' ').collect(),
        (true, true) => text.split(", ").collect(),
        (false, false) if text.len() <= 3 => vec![text],
        (false, false) => {
            return Err(invalid(
                "looks like several bytes but is not split on ' ', ',' or ', '",
            ));
        }
    };

    tokens
        .iter()
        .map(|token| {
            token
                .parse::<u8>()
                .map_err(|_| invalid(&format!("'{token}' is not a byte value (0-255)")))
        })
        .collect()
}

/// Canonical text form of a payload, which [`parse_bytes_text`] reads back unchanged.
pub fn format_bytes_text(bytes: &[u8]) -> String {
    bytes
        .iter()
        .map(|b| format!("{b:03}"))
        .collect::<Vec<_>>()
        .join(", ")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn comma_space_list() {
        assert_eq!(parse_bytes_text("252, 252, 001").unwrap(), vec![252, 252, 1]);
    }

    #[test]
    fn single_separator_schemes() {
        assert_eq!(parse_bytes_text("1,2,3").unwrap(), vec![1, 2, 3]);
        assert_eq!(parse_bytes_text("10 20 255").unwrap(), vec![10, 20, 255]);
    }

    #[test]
    fn bare_value() {
        assert_eq!(parse_bytes_text("7").unwrap(), vec![7]);
        assert_eq!(parse_bytes_text("160").unwrap(), vec![160]);
    }

    #[test]
    fn long_unseparated_text_is_rejected() {
        assert!(matches!(
            parse_bytes_text("1234"),
            Err(SessionError::InvalidSendPayload { .. })
        ));
    }

    #[test]
    fn mixed_separators_are_rejected() {
        assert!(parse_bytes_text("1,2 3").is_err());
        assert!(parse_bytes_text("1 ,2").is_err());
    }

    #[test]
    fn one_bad_token_fails_everything() {
        assert!(parse_bytes_text("1, 256, 3").is_err());
        assert!(parse_bytes_text("1,,3").is_err());
        assert!(parse_bytes_text("a").is_err());
        assert!(parse_bytes_text("   ").is_err());
    }

    #[test]
    fn canonical_form_reparses_to_the_same_bytes() {
        let bytes = parse_bytes_text("252 252 1 160 0 0 0 0 161 250").unwrap();
        let canonical = format_bytes_text(&bytes);
        assert_eq!(canonical, "252, 252, 001, 160, 000, 000, 000, 000, 161, 250");
        assert_eq!(parse_bytes_text(&canonical).unwrap(), bytes);
        assert_eq!(format_bytes_text(&parse_bytes_text(&canonical).unwrap()), canonical);
    }
}
