use super::types::MediaReference;
use url::Url;

const ID_LEN: usize = 11;

/// Video IDs are exactly 11 characters of `[A-Za-z0-9_-]`.
pub fn is_valid_id(id: &str) -> bool {
    id.len() == ID_LEN
        && id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

/// Validates a user-supplied link and rewrites it to the canonical watch URL.
///
/// Accepts watch, short, embed, shorts/live and legacy user/channel links, with
/// or without a scheme. Anything else, including a malformed ID, is `None`.
pub fn normalize(input: &str) -> Option<MediaReference> {
    let input = input.trim();
    if input.is_empty() {
        return None;
    }

    let with_scheme = if input.contains("://") {
        input.to_string()
    } else {
        format!("https://{input}")
    };

    let url = Url::parse(&with_scheme).ok()?;
    if !matches!(url.scheme(), "http" | "https") {
        return None;
    }

    let host = url.host_str()?.to_ascii_lowercase();
    let host = host
        .strip_prefix("www.")
        .or_else(|| host.strip_prefix("m."))
        .unwrap_or(&host);

    let segments: Vec<&str> = url
        .path_segments()
        .map(|s| s.filter(|p| !p.is_empty()).collect())
        .unwrap_or_default();

    let candidate = match host {
        "youtu.be" => segments.first().map(|s| s.to_string()),
        "youtube.com" | "youtube-nocookie.com" => match segments.as_slice() {
            ["watch"] => url
                .query_pairs()
                .find(|(key, _)| key == "v")
                .map(|(_, value)| value.into_owned()),
            ["embed" | "v" | "e" | "shorts" | "live", token, ..] => Some(token.to_string()),
            ["user" | "channel", _, token, ..] => Some(token.to_string()),
            _ => None,
        },
        _ => None,
    }?;

    let token = candidate.get(..ID_LEN)?;
    if is_valid_id(token) {
        Some(MediaReference::from_id(token))
    } else {
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const CANONICAL: &str = "https://www.youtube.com/watch?v=dQw4w9WgXcQ";

    fn canonical(input: &str) -> Option<String> {
        normalize(input).map(|r| r.canonical_url)
    }

    #[test]
    fn test_accepted_shapes_share_canonical_form() {
        let inputs = [
            "https://www.youtube.com/watch?v=dQw4w9WgXcQ",
            "http://youtube.com/watch?v=dQw4w9WgXcQ&t=42s",
            "youtube.com/watch?feature=share&v=dQw4w9WgXcQ",
            "https://m.youtube.com/watch?v=dQw4w9WgXcQ",
            "https://youtu.be/dQw4w9WgXcQ",
            "youtu.be/dQw4w9WgXcQ?si=abcdef",
            "https://www.youtube.com/embed/dQw4w9WgXcQ",
            "https://www.youtube.com/v/dQw4w9WgXcQ",
            "https://www.youtube.com/e/dQw4w9WgXcQ",
            "https://www.youtube.com/shorts/dQw4w9WgXcQ",
            "https://www.youtube.com/user/rick/dQw4w9WgXcQ",
            "https://www.youtube.com/channel/UCabc/dQw4w9WgXcQ",
            "  https://youtu.be/dQw4w9WgXcQ  ",
        ];

        for input in inputs {
            assert_eq!(canonical(input).as_deref(), Some(CANONICAL), "{input}");
        }
    }

    #[test]
    fn test_reference_carries_id() {
        let r = normalize("https://youtu.be/dQw4w9WgXcQ").unwrap();
        assert_eq!(r.id, "dQw4w9WgXcQ");
    }

    #[test]
    fn test_rejections() {
        let inputs = [
            "",
            "   ",
            "not a url",
            "https://youtu.be/",
            "https://youtu.be/short",
            "https://www.youtube.com/watch?v=abc",
            "https://www.youtube.com/watch?list=PL123",
            "https://www.youtube.com/watch?v=dQw4w9Wg$XcQ",
            "https://vimeo.com/dQw4w9WgXcQ",
            "ftp://youtube.com/watch?v=dQw4w9WgXcQ",
            "https://www.youtube.com/results?search_query=dQw4w9WgXcQ",
        ];

        for input in inputs {
            assert_eq!(canonical(input), None, "{input}");
        }
    }

    #[test]
    fn test_long_token_is_truncated_to_id() {
        assert_eq!(
            canonical("https://youtu.be/dQw4w9WgXcQextra").as_deref(),
            Some(CANONICAL)
        );
    }

    #[test]
    fn test_is_valid_id() {
        assert!(is_valid_id("dQw4w9WgXcQ"));
        assert!(is_valid_id("a-b_c-d_e-f"));
        assert!(!is_valid_id("dQw4w9WgXc"));
        assert!(!is_valid_id("dQw4w9WgXcQQ"));
        assert!(!is_valid_id("dQw4w9WgXc!"));
    }
}
