//! Email render pipeline.
//!
//! Takes a stored template, branding defaults, and a per-recipient
//! variable map, and produces a final subject plus a complete standalone
//! HTML document. Pure with respect to its inputs and the storage
//! resolver; rendering twice with identical inputs yields byte-identical
//! output.

pub mod shell;
pub mod tokens;

use std::collections::HashMap;

use crate::storage::StorageResolver;
use crate::store::{Branding, Template};

/// Reserved tokens, always injected into the variable set from resolved
/// branding/override paths. A literal occurrence of one of these in the
/// template body supplies the image inline, so the matching shell row is
/// suppressed to avoid a duplicate.
pub const RESERVED_LOGO: &str = "brand_logo_url";
pub const RESERVED_HERO: &str = "hero_image_url";
pub const RESERVED_FOOTER: &str = "footer_banner_url";

/// Per-call overrides, highest precedence in image-slot resolution.
#[derive(Debug, Clone, Default)]
pub struct RenderOverrides {
    pub subject: Option<String>,
    pub hero_path: Option<String>,
    pub footer_path: Option<String>,
}

/// The rendered output. Derived, never persisted by the renderer itself.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RenderedEmail {
    pub subject: String,
    pub html: String,
}

/// Render a template into a final subject and HTML document.
///
/// Never fails: malformed merge syntax degrades to literal text or empty
/// string rather than aborting a send.
pub fn render(
    template: &Template,
    branding: &Branding,
    variables: &HashMap<String, String>,
    overrides: &RenderOverrides,
    resolver: &dyn StorageResolver,
) -> RenderedEmail {
    let logo_url = resolve_slot(&[branding.logo_path.as_deref()], resolver);
    let hero_url = resolve_slot(
        &[
            overrides.hero_path.as_deref(),
            template.hero_image_path.as_deref(),
            branding.default_hero_path.as_deref(),
        ],
        resolver,
    );
    let footer_url = resolve_slot(
        &[
            overrides.footer_path.as_deref(),
            template.footer_image_path.as_deref(),
            branding.footer_banner_path.as_deref(),
        ],
        resolver,
    );

    let mut vars = variables.clone();
    vars.insert(
        RESERVED_LOGO.to_string(),
        logo_url.clone().unwrap_or_default(),
    );
    vars.insert(
        RESERVED_HERO.to_string(),
        hero_url.clone().unwrap_or_default(),
    );
    vars.insert(
        RESERVED_FOOTER.to_string(),
        footer_url.clone().unwrap_or_default(),
    );

    let subject_source = overrides.subject.as_deref().unwrap_or(&template.subject);
    let subject = tokens::substitute_merge_tags(subject_source, &vars);

    // Row suppression is decided against the body before substitution,
    // while the reserved tokens are still literal.
    let body_source = &template.body_html;
    let logo_in_body = tokens::contains_merge_tag(body_source, RESERVED_LOGO);
    let hero_in_body = tokens::contains_merge_tag(body_source, RESERVED_HERO);
    let footer_in_body = tokens::contains_merge_tag(body_source, RESERVED_FOOTER);

    let alt_catalog: HashMap<String, String> = template
        .inline_images
        .iter()
        .filter_map(|img| img.alt.clone().map(|alt| (img.path.clone(), alt)))
        .collect();

    let body = tokens::substitute_merge_tags(body_source, &vars);
    let body = tokens::expand_image_tokens(&body, resolver, &alt_catalog);
    let body = tokens::strip_empty_images(&body);

    let social = shell::social_links(&vars);
    let empty = String::new();
    let html = shell::build_document(&shell::ShellInputs {
        logo_url: logo_url.as_deref().filter(|_| !logo_in_body),
        hero_url: hero_url.as_deref().filter(|_| !hero_in_body),
        footer_banner_url: footer_url.as_deref().filter(|_| !footer_in_body),
        body_html: &body,
        venue_name: vars.get("venue_name").unwrap_or(&empty),
        venue_address: vars.get("venue_address").unwrap_or(&empty),
        social_links: &social,
    });

    RenderedEmail { subject, html }
}

/// Resolve an image slot: first non-empty candidate wins, then the path
/// goes through the resolver. An unresolvable winner omits the row.
fn resolve_slot(candidates: &[Option<&str>], resolver: &dyn StorageResolver) -> Option<String> {
    candidates
        .iter()
        .flatten()
        .find(|path| !path.trim().is_empty())
        .and_then(|path| resolver.public_url(path))
}
