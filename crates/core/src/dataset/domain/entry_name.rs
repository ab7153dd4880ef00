//! File naming for stored face images: `<label>.<sequence>.<ext>`.

use crate::shared::label::IdentityLabel;

pub fn format_entry_name(label: IdentityLabel, sequence: u32, extension: &str) -> String {
    format!("{label}.{sequence}.{extension}")
}

/// Recovers `(label, sequence)` from a stored file name.
///
/// The error string describes which segment is malformed.
pub fn parse_entry_name(name: &str) -> Result<(IdentityLabel, u32), String> {
    let parts: Vec<&str> = name.split('.').collect();
    if parts.len() != 3 {
        return Err(format!(
            "expected <label>.<sequence>.<ext>, got {} segment(s)",
            parts.len()
        ));
    }
    let (label_part, sequence_part) = (parts[0], parts[1]);

    if label_part.trim() != label_part {
        return Err(format!("label segment {label_part:?} is not a number"));
    }
    let label = IdentityLabel::parse(label_part)
        .map_err(|_| format!("label segment {label_part:?} is not a number"))?;

    if sequence_part.is_empty() || !sequence_part.bytes().all(|b| b.is_ascii_digit()) {
        return Err(format!("sequence segment {sequence_part:?} is not a number"));
    }
    let sequence = sequence_part
        .parse::<u32>()
        .map_err(|_| format!("sequence segment {sequence_part:?} is out of range"))?;

    Ok((label, sequence))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_format_then_parse() {
        let name = format_entry_name(IdentityLabel::new(12), 3, "png");
        assert_eq!(name, "12.3.png");
        assert_eq!(parse_entry_name(&name).unwrap(), (IdentityLabel::new(12), 3));
    }

    #[test]
    fn test_parse_accepts_any_extension() {
        assert_eq!(
            parse_entry_name("4.17.jpg").unwrap(),
            (IdentityLabel::new(4), 17)
        );
    }

    #[rstest]
    #[case::word_label("alice.1.png")]
    #[case::empty_label(".1.png")]
    #[case::padded_label(" 1.1.png")]
    #[case::negative_label("-1.1.png")]
    #[case::word_sequence("1.first.png")]
    #[case::empty_sequence("1..png")]
    #[case::missing_sequence("1.png")]
    #[case::extra_segment("1.2.3.png")]
    fn test_parse_rejects_malformed_names(#[case] name: &str) {
        assert!(parse_entry_name(name).is_err());
    }
}
