//! Merge-tag and inline-image token substitution.
//!
//! Templates carry `{{name}}` merge tags and `[[image:path="…" alt="…"]]`
//! inline-image tokens. Substitution is best-effort by contract: an
//! unmatched merge tag stays in the output as literal text, a broken
//! image token collapses to an empty string, and nothing in this module
//! ever returns an error: a template authoring mistake must not abort
//! a send.

use std::collections::HashMap;
use std::sync::LazyLock;

use regex::{Captures, Regex};
use tracing::warn;

use crate::storage::StorageResolver;

/// `{{name}}` merge tags. Names are word characters only.
static MERGE_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\{\{([A-Za-z0-9_]+)\}\}").expect("valid regex"));

/// `[[image:…]]` tokens. Rich-text editors sometimes entity-escape the
/// brackets, so both spellings terminate the token.
static IMAGE_TOKEN_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?s)(?:\[\[|&#91;&#91;)\s*image\s*:(.*?)(?:\]\]|&#93;&#93;)")
        .expect("valid regex")
});

static PATH_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"path\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex"));

static ALT_ATTR_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r#"alt\s*=\s*(?:"([^"]*)"|'([^']*)')"#).expect("valid regex"));

/// `<img …>` tags, for the empty-`src` safety net.
static IMG_TAG_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?is)<img\b[^>]*>").expect("valid regex"));

static IMG_SRC_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r#"(?i)\bsrc\s*=\s*(?:"([^"]*)"|'([^']*)'|([^\s>"']+))"#).expect("valid regex")
});

/// Replace `{{name}}` tags with values from `vars`.
///
/// Tags without a matching variable are left untouched.
pub fn substitute_merge_tags(text: &str, vars: &HashMap<String, String>) -> String {
    MERGE_TAG_RE
        .replace_all(text, |caps: &Captures| match vars.get(&caps[1]) {
            Some(value) => value.clone(),
            None => caps[0].to_string(),
        })
        .into_owned()
}

/// True when `text` contains the literal merge tag `{{name}}`.
pub fn contains_merge_tag(text: &str, name: &str) -> bool {
    text.contains(&format!("{{{{{name}}}}}"))
}

/// Expand inline-image tokens into `<img>` tags.
///
/// `alt_catalog` maps stored image paths to default alt text for tokens
/// that carry none. A token whose `path` attribute is missing, or whose
/// path does not resolve to a URL, is deleted entirely; an `<img>` with
/// an empty `src` is never emitted.
pub fn expand_image_tokens(
    body: &str,
    resolver: &dyn StorageResolver,
    alt_catalog: &HashMap<String, String>,
) -> String {
    IMAGE_TOKEN_RE
        .replace_all(body, |caps: &Captures| {
            let attrs = normalize_quote_entities(&caps[1]);

            let path = match attr_value(&PATH_ATTR_RE, &attrs) {
                Some(p) if !p.trim().is_empty() => p,
                _ => {
                    warn!(token = &caps[0], "image_token_missing_path");
                    return String::new();
                }
            };

            let url = match resolver.public_url(&path) {
                Some(url) => url,
                None => {
                    warn!(path = %path, "image_token_unresolvable_path");
                    return String::new();
                }
            };

            let alt = attr_value(&ALT_ATTR_RE, &attrs)
                .or_else(|| alt_catalog.get(path.trim()).cloned())
                .unwrap_or_default();

            format!(
                "<br />\n<img src=\"{}\" alt=\"{}\" style=\"width:100%;max-width:600px;height:auto;display:block;margin:0 auto;border:0;\" />\n<br />",
                escape_attr(&url),
                escape_attr(&alt)
            )
        })
        .into_owned()
}

/// Strip any `<img>` tag whose `src` attribute is empty or absent.
///
/// Safety net for dangling tags left behind by token substitution.
pub fn strip_empty_images(html: &str) -> String {
    IMG_TAG_RE
        .replace_all(html, |caps: &Captures| {
            let tag = &caps[0];
            let src = IMG_SRC_RE.captures(tag).and_then(|c| {
                c.get(1)
                    .or_else(|| c.get(2))
                    .or_else(|| c.get(3))
                    .map(|m| m.as_str())
            });
            match src {
                Some(src) if !src.trim().is_empty() => tag.to_string(),
                _ => {
                    warn!("stripped_empty_src_img");
                    String::new()
                }
            }
        })
        .into_owned()
}

/// Escape a string for use inside a double-quoted HTML attribute.
pub fn escape_attr(value: &str) -> String {
    value
        .replace('&', "&amp;")
        .replace('<', "&lt;")
        .replace('>', "&gt;")
        .replace('"', "&quot;")
}

fn attr_value(re: &Regex, attrs: &str) -> Option<String> {
    re.captures(attrs).and_then(|c| {
        c.get(1)
            .or_else(|| c.get(2))
            .map(|m| m.as_str().to_string())
    })
}

/// Undo quote entities the rich-text editor may have baked into a token.
fn normalize_quote_entities(attrs: &str) -> String {
    attrs
        .replace("&quot;", "\"")
        .replace("&#34;", "\"")
        .replace("&#39;", "'")
        .replace("&apos;", "'")
}

#[cfg(test)]
mod tests {
    use super::*;

    struct FixedResolver;

    impl StorageResolver for FixedResolver {
        fn public_url(&self, path: &str) -> Option<String> {
            let path = path.trim();
            if path.is_empty() {
                return None;
            }
            if crate::storage::is_absolute_url(path) {
                return Some(path.to_string());
            }
            Some(format!("https://cdn.test/{path}"))
        }
    }

    fn vars(pairs: &[(&str, &str)]) -> HashMap<String, String> {
        pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect()
    }

    #[test]
    fn test_substitute_known_tags() {
        let out = substitute_merge_tags(
            "Hi {{first_name}}, welcome to {{venue_name}}!",
            &vars(&[("first_name", "Ada"), ("venue_name", "The Crown")]),
        );
        assert_eq!(out, "Hi Ada, welcome to The Crown!");
    }

    #[test]
    fn test_unmatched_tags_left_as_is() {
        let out = substitute_merge_tags("Hi {{first_name}}", &vars(&[]));
        assert_eq!(out, "Hi {{first_name}}");
    }

    #[test]
    fn test_substitution_is_idempotent_on_plain_values() {
        let v = vars(&[("first_name", "Ada")]);
        let once = substitute_merge_tags("Hi {{first_name}}", &v);
        let twice = substitute_merge_tags(&once, &v);
        assert_eq!(once, twice);
    }

    #[test]
    fn test_contains_merge_tag() {
        assert!(contains_merge_tag("x {{brand_logo_url}} y", "brand_logo_url"));
        assert!(!contains_merge_tag("x {{hero_image_url}} y", "brand_logo_url"));
    }

    #[test]
    fn test_expand_image_token_double_quotes() {
        let out = expand_image_tokens(
            r#"before [[image:path="pics/a.png" alt="A pic"]] after"#,
            &FixedResolver,
            &HashMap::new(),
        );
        assert!(out.contains(r#"src="https://cdn.test/pics/a.png""#));
        assert!(out.contains(r#"alt="A pic""#));
        assert!(!out.contains("[[image"));
    }

    #[test]
    fn test_expand_image_token_single_quotes_and_reversed_attrs() {
        let out = expand_image_tokens(
            r#"[[image:alt='B pic' path='pics/b.png']]"#,
            &FixedResolver,
            &HashMap::new(),
        );
        assert!(out.contains(r#"src="https://cdn.test/pics/b.png""#));
        assert!(out.contains(r#"alt="B pic""#));
    }

    #[test]
    fn test_expand_image_token_entity_escaped() {
        let out = expand_image_tokens(
            r#"&#91;&#91;image:path=&quot;pics/c.png&quot; alt=&#39;C&#39;&#93;&#93;"#,
            &FixedResolver,
            &HashMap::new(),
        );
        assert!(out.contains(r#"src="https://cdn.test/pics/c.png""#));
        assert!(out.contains(r#"alt="C""#));
    }

    #[test]
    fn test_image_token_missing_path_is_deleted() {
        let out = expand_image_tokens(
            r#"x [[image:alt="no path"]] y"#,
            &FixedResolver,
            &HashMap::new(),
        );
        assert_eq!(out, "x  y");
        assert!(!out.contains("<img"));
        assert!(!out.contains("[[image"));
    }

    #[test]
    fn test_image_token_alt_falls_back_to_catalog() {
        let mut catalog = HashMap::new();
        catalog.insert("pics/d.png".to_string(), "Catalog alt".to_string());
        let out = expand_image_tokens(r#"[[image:path="pics/d.png"]]"#, &FixedResolver, &catalog);
        assert!(out.contains(r#"alt="Catalog alt""#));
    }

    #[test]
    fn test_image_token_alt_is_escaped() {
        let out = expand_image_tokens(
            r#"[[image:path="pics/e.png" alt='a <b> & "c"']]"#,
            &FixedResolver,
            &HashMap::new(),
        );
        assert!(out.contains(r#"alt="a &lt;b&gt; &amp; &quot;c&quot;""#));
    }

    #[test]
    fn test_strip_empty_images() {
        let html = r#"<p>a</p><img src=""><img src=''/><img><img src="https://x.test/ok.png">"#;
        let out = strip_empty_images(html);
        assert!(out.contains(r#"src="https://x.test/ok.png""#));
        assert!(!out.contains(r#"src="""#));
        assert!(!out.contains("src=''"));
        assert_eq!(out.matches("<img").count(), 1);
    }

    #[test]
    fn test_strip_keeps_unquoted_src() {
        let html = "<img src=https://x.test/a.png>";
        assert_eq!(strip_empty_images(html), html);
    }
}
