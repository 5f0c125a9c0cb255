//! Robots.txt generation.

use inkpress_core::Config;

use crate::sitemap::SITEMAP_PATH;

pub const ROBOTS_PATH: &str = "robots.txt";

/// Allow-all robots.txt, pointing at the sitemap when the site URL is known.
pub fn generate(config: &Config) -> String {
    let mut out = String::from("User-agent: *\nAllow: /\n");
    if !config.site.url.is_empty() {
        out.push_str(&format!("Sitemap: {}\n", config.url_for(SITEMAP_PATH)));
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_with_site_url() {
        let mut config = Config::new("Test", ".");
        config.site.url = "https://example.com/".into();
        assert_eq!(
            generate(&config),
            "User-agent: *\nAllow: /\nSitemap: https://example.com/sitemap.xml\n"
        );
    }

    #[test]
    fn test_without_site_url() {
        let config = Config::new("Test", ".");
        assert_eq!(generate(&config), "User-agent: *\nAllow: /\n");
    }
}
