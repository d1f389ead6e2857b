//! `:shortcode:` expansion using the GitHub/Slack shortcode set.

/// Glyph for a shortcode name (without colons).
fn glyph(name: &str) -> Option<&'static str> {
    emojis::get_by_shortcode(name).map(emojis::Emoji::as_str)
}

fn is_shortcode_char(c: char) -> bool {
    c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')
}

/// Replace every known `:name:` with its glyph; unknown names are kept.
pub fn emojize(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;

    while let Some(start) = rest.find(':') {
        out.push_str(&rest[..start]);
        let after = &rest[start + 1..];
        let name_len = after
            .find(|c: char| !is_shortcode_char(c))
            .unwrap_or(after.len());
        let name = &after[..name_len];

        match (after[name_len..].starts_with(':'), glyph(name)) {
            (true, Some(g)) if !name.is_empty() => {
                out.push_str(g);
                rest = &after[name_len + 1..];
            },
            // The closing colon may open the next shortcode.
            _ => {
                out.push(':');
                rest = after;
            },
        }
    }
    out.push_str(rest);
    out
}
