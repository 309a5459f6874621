//! Light extraction helpers for paginated Armory pages
//!
//! Schema-aware parsing of the individual page formats belongs to the
//! entity parsers, not the crawler core. The driver only needs two things
//! from a raw page: the `maxPage` pagination attribute, and the values of a
//! named attribute (team or guild names) so it can stub out further work.

use regex::Regex;
use std::sync::OnceLock;

/// Returns the number of pages a paginated resource advertises.
///
/// Pages carry a `maxPage="N"` attribute on their list element. Pages
/// without one (error pages, empty ladders) count as a single page.
pub fn max_pages(source: &str) -> u32 {
    static MAX_PAGE: OnceLock<Regex> = OnceLock::new();
    let re = MAX_PAGE.get_or_init(|| Regex::new(r#"maxPage="(\d+)""#).unwrap());

    re.captures(source)
        .and_then(|caps| caps[1].parse().ok())
        .unwrap_or(1)
}

/// Collects every value of `attribute="…"` in document order.
///
/// Used to pull team names off ladder pages and `guildName` values off
/// roster pages. XML attribute escapes are left alone: the values round-trip
/// back into URLs and database keys exactly as the Armory printed them.
pub fn extract_attribute_values(source: &str, attribute: &str) -> Vec<String> {
    // Attribute names are crawler-internal constants, never user input.
    let re = Regex::new(&format!(r#"\b{}="([^"]+)""#, regex::escape(attribute))).unwrap();

    re.captures_iter(source)
        .map(|caps| caps[1].to_string())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_max_pages_present() {
        let source = r#"<arenaLadder maxPage="17" page="1">...</arenaLadder>"#;
        assert_eq!(max_pages(source), 17);
    }

    #[test]
    fn test_max_pages_defaults_to_one() {
        assert_eq!(max_pages("<errorPage/>"), 1);
        assert_eq!(max_pages(""), 1);
    }

    #[test]
    fn test_extract_team_names() {
        let source = r#"
            <arenaTeam name="Gnome Mercy" realm="Test" size="2"/>
            <arenaTeam name="Critical Thinkers" realm="Test" size="2"/>
        "#;
        assert_eq!(
            extract_attribute_values(source, "name"),
            vec!["Gnome Mercy", "Critical Thinkers"]
        );
    }

    #[test]
    fn test_extract_does_not_match_suffixed_attributes() {
        let source = r#"<character guildName="Alpha" name="Moulin"/>"#;
        assert_eq!(extract_attribute_values(source, "guildName"), vec!["Alpha"]);
        // `name` must not also match the tail of `guildName`.
        assert_eq!(extract_attribute_values(source, "name"), vec!["Moulin"]);
    }

    #[test]
    fn test_extract_empty_source() {
        assert!(extract_attribute_values("", "name").is_empty());
    }
}
