use once_cell::sync::Lazy;
use regex::Regex;

static SCRIPT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<script\b[^>]*>.*?</script>").unwrap());
static STYLE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?is)<style\b[^>]*>.*?</style>").unwrap());
static BLOCK_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)<br\s*/?>|</(?:p|div|h[1-6]|li|tr)>").unwrap());
static TAG_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?s)<[^>]+>").unwrap());

/// Reduce page markup to plain text: drop script/style subtrees, turn
/// block-closing tags and `<br>` into newlines, strip the remaining tags,
/// then decode the six entities the pages actually use. Anything richer is
/// out of scope.
pub fn strip_html(html: &str) -> String {
    let without_scripts = SCRIPT_RE.replace_all(html, "");
    let without_styles = STYLE_RE.replace_all(&without_scripts, "");
    let with_breaks = BLOCK_BREAK_RE.replace_all(&without_styles, "\n");
    let without_tags = TAG_RE.replace_all(&with_breaks, "");
    decode_entities(&without_tags)
}

fn decode_entities(text: &str) -> String {
    text.replace("&nbsp;", " ")
        .replace("&lt;", "<")
        .replace("&gt;", ">")
        .replace("&quot;", "\"")
        .replace("&#39;", "'")
        .replace("&amp;", "&")
}
