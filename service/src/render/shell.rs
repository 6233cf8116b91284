//! Email document shell.
//!
//! Every rendered email is a complete standalone document: a fixed
//! 600px-wide, single-column, table-based layout that old email clients
//! render predictably. Three optional image rows (logo, hero, footer
//! banner) bracket the mandatory body row and footer-text row; a social
//! links row is appended when any configured link is a real URL.

use std::collections::HashMap;

use url::Url;

use super::tokens::escape_attr;

/// Variable keys probed for the social links row, with display labels.
pub const SOCIAL_KEYS: &[(&str, &str)] = &[
    ("facebook_url", "Facebook"),
    ("instagram_url", "Instagram"),
    ("twitter_url", "Twitter"),
    ("website_url", "Website"),
];

/// Inputs to the document shell, already resolved and substituted.
pub struct ShellInputs<'a> {
    pub logo_url: Option<&'a str>,
    pub hero_url: Option<&'a str>,
    pub footer_banner_url: Option<&'a str>,
    pub body_html: &'a str,
    pub venue_name: &'a str,
    pub venue_address: &'a str,
    /// `(label, url)` pairs, already filtered to http(s) URLs.
    pub social_links: &'a [(String, String)],
}

/// Pick the social links out of a variable map.
///
/// A link participates only when its value parses as an http(s) URL, so
/// placeholder text like "tbd" never reaches the document.
pub fn social_links(vars: &HashMap<String, String>) -> Vec<(String, String)> {
    SOCIAL_KEYS
        .iter()
        .filter_map(|(key, label)| {
            let value = vars.get(*key)?;
            let parsed = Url::parse(value).ok()?;
            match parsed.scheme() {
                "http" | "https" => Some((label.to_string(), value.clone())),
                _ => None,
            }
        })
        .collect()
}

/// Assemble the complete HTML document.
pub fn build_document(inputs: &ShellInputs) -> String {
    let mut rows = String::new();

    if let Some(logo) = inputs.logo_url {
        rows.push_str(&format!(
            concat!(
                "<tr><td align=\"center\" style=\"padding:24px 0 8px 0;\">",
                "<img src=\"{}\" alt=\"{}\" width=\"180\" ",
                "style=\"display:block;max-width:180px;height:auto;border:0;\" />",
                "</td></tr>\n"
            ),
            escape_attr(logo),
            escape_attr(inputs.venue_name)
        ));
    }

    if let Some(hero) = inputs.hero_url {
        rows.push_str(&format!(
            concat!(
                "<tr><td align=\"center\" style=\"padding:0;\">",
                "<img src=\"{}\" alt=\"\" width=\"600\" ",
                "style=\"display:block;width:100%;max-width:600px;height:auto;border:0;\" />",
                "</td></tr>\n"
            ),
            escape_attr(hero)
        ));
    }

    rows.push_str(&format!(
        concat!(
            "<tr><td style=\"padding:24px 32px;font-family:Arial,Helvetica,sans-serif;",
            "font-size:15px;line-height:1.6;color:#333333;\">{}</td></tr>\n"
        ),
        inputs.body_html
    ));

    if let Some(banner) = inputs.footer_banner_url {
        rows.push_str(&format!(
            concat!(
                "<tr><td align=\"center\" style=\"padding:0;\">",
                "<img src=\"{}\" alt=\"\" width=\"600\" ",
                "style=\"display:block;width:100%;max-width:600px;height:auto;border:0;\" />",
                "</td></tr>\n"
            ),
            escape_attr(banner)
        ));
    }

    if !inputs.social_links.is_empty() {
        let links = inputs
            .social_links
            .iter()
            .map(|(label, url)| {
                format!(
                    "<a href=\"{}\" style=\"color:#666666;text-decoration:underline;\">{}</a>",
                    escape_attr(url),
                    label
                )
            })
            .collect::<Vec<_>>()
            .join("&nbsp;&middot;&nbsp;");
        rows.push_str(&format!(
            concat!(
                "<tr><td align=\"center\" style=\"padding:8px 32px;",
                "font-family:Arial,Helvetica,sans-serif;font-size:12px;\">{}</td></tr>\n"
            ),
            links
        ));
    }

    rows.push_str(&format!(
        concat!(
            "<tr><td align=\"center\" style=\"padding:16px 32px 32px 32px;",
            "font-family:Arial,Helvetica,sans-serif;font-size:12px;color:#999999;\">",
            "{}{}You received this email because you joined our guest Wi-Fi.",
            "</td></tr>\n"
        ),
        footer_line(inputs.venue_name),
        footer_line(inputs.venue_address)
    ));

    format!(
        concat!(
            "<!DOCTYPE html>\n",
            "<html>\n<head>\n",
            "<meta charset=\"utf-8\" />\n",
            "<meta name=\"viewport\" content=\"width=device-width, initial-scale=1.0\" />\n",
            "</head>\n",
            "<body style=\"margin:0;padding:0;background-color:#f4f4f4;\">\n",
            "<table role=\"presentation\" width=\"100%\" cellpadding=\"0\" cellspacing=\"0\" ",
            "style=\"background-color:#f4f4f4;\">\n",
            "<tr><td align=\"center\" style=\"padding:16px 0;\">\n",
            "<table role=\"presentation\" width=\"600\" cellpadding=\"0\" cellspacing=\"0\" ",
            "style=\"width:600px;max-width:100%;background-color:#ffffff;\">\n",
            "{}",
            "</table>\n</td></tr>\n</table>\n</body>\n</html>\n"
        ),
        rows
    )
}

fn footer_line(text: &str) -> String {
    if text.trim().is_empty() {
        String::new()
    } else {
        format!("{}<br />", escape_attr(text))
    }
}
