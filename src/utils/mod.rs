const MAX_FILENAME_CHARS: usize = 100;

pub fn format_number(num: u64) -> String {
    let num_str = num.to_string();
    let chars: Vec<char> = num_str.chars().collect();
    let mut result = String::new();

    for (i, c) in chars.iter().enumerate() {
        if i > 0 && (chars.len() - i).is_multiple_of(3) {
            result.push(',');
        }
        result.push(*c);
    }

    result
}

/// Renders a byte count as mebibytes with two decimals.
pub fn format_megabytes(bytes: Option<u64>) -> String {
    match bytes {
        Some(b) => format!("{:.2} MB", b as f64 / (1024.0 * 1024.0)),
        None => "unknown".to_string(),
    }
}

pub fn format_duration(seconds: u64) -> String {
    let (h, m, s) = (seconds / 3600, (seconds % 3600) / 60, seconds % 60);
    if h > 0 {
        format!("{h}:{m:02}:{s:02}")
    } else {
        format!("{m}:{s:02}")
    }
}

/// Strips characters that are illegal in filenames and caps the length.
pub fn sanitize_filename(title: &str) -> String {
    let cleaned: String = title
        .chars()
        .filter(|c| !matches!(c, '/' | '\\' | '?' | '%' | '*' | ':' | '|' | '"' | '<' | '>'))
        .filter(|c| !c.is_control())
        .take(MAX_FILENAME_CHARS)
        .collect();

    let trimmed = cleaned.trim();
    if trimmed.is_empty() {
        "download".to_string()
    } else {
        trimmed.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_format_number() {
        assert_eq!(format_number(0), "0");
        assert_eq!(format_number(100), "100");
        assert_eq!(format_number(1000), "1,000");
        assert_eq!(format_number(10000), "10,000");
        assert_eq!(format_number(100000), "100,000");
        assert_eq!(format_number(1000000), "1,000,000");
        assert_eq!(format_number(1234567890), "1,234,567,890");
    }

    #[test]
    fn test_format_megabytes() {
        assert_eq!(format_megabytes(None), "unknown");
        assert_eq!(format_megabytes(Some(0)), "0.00 MB");
        assert_eq!(format_megabytes(Some(1024 * 1024)), "1.00 MB");
        assert_eq!(format_megabytes(Some(3_456_789)), "3.30 MB");
    }

    #[test]
    fn test_format_duration() {
        assert_eq!(format_duration(0), "0:00");
        assert_eq!(format_duration(212), "3:32");
        assert_eq!(format_duration(3725), "1:02:05");
    }

    #[test]
    fn test_sanitize_filename() {
        assert_eq!(
            sanitize_filename("AC/DC: \"Live\" <at> Wembley?*|%"),
            "ACDC Live at Wembley"
        );
        assert_eq!(sanitize_filename("  spaced  "), "spaced");
        assert_eq!(sanitize_filename("???"), "download");
        assert_eq!(sanitize_filename("line\nbreak"), "linebreak");
    }

    #[test]
    fn test_sanitize_filename_truncates() {
        let long = "x".repeat(250);
        assert_eq!(sanitize_filename(&long).chars().count(), 100);

        let unicode = "é".repeat(150);
        assert_eq!(sanitize_filename(&unicode).chars().count(), 100);
    }
}
