// src/seo/sitemap.rs

//! `sitemap.xml` and `robots.txt` generation.

use std::fmt::Write;

use crate::error::Result;
use crate::models::{Category, Review};
use crate::services::Services;

/// One `<url>` entry.
#[derive(Debug, Clone, Copy, PartialEq)]
struct Entry<'a> {
    path: &'a str,
    changefreq: &'static str,
    priority: f32,
}

const STATIC_PAGES: [Entry<'static>; 4] = [
    Entry { path: "", changefreq: "daily", priority: 1.0 },
    Entry { path: "/about", changefreq: "monthly", priority: 0.5 },
    Entry { path: "/categories", changefreq: "weekly", priority: 0.7 },
    Entry { path: "/search", changefreq: "weekly", priority: 0.6 },
];

/// Build the sitemap for `domain`. A trailing slash on the domain is ignored.
pub fn generate_sitemap<C, R>(domain: &str, category_slugs: C, review_slugs: R) -> String
where
    C: IntoIterator,
    C::Item: AsRef<str>,
    R: IntoIterator,
    R::Item: AsRef<str>,
{
    let domain = domain.trim_end_matches('/');
    let mut xml = String::from(
        "<?xml version=\"1.0\" encoding=\"UTF-8\"?>\n\
         <urlset xmlns=\"http://www.sitemaps.org/schemas/sitemap/0.9\">\n",
    );

    for entry in STATIC_PAGES {
        push_url(&mut xml, domain, &entry);
    }
    for slug in category_slugs {
        let path = Category::path_for(slug.as_ref());
        push_url(
            &mut xml,
            domain,
            &Entry { path: &path, changefreq: "weekly", priority: 0.7 },
        );
    }
    for slug in review_slugs {
        let path = Review::path_for(slug.as_ref());
        push_url(
            &mut xml,
            domain,
            &Entry { path: &path, changefreq: "monthly", priority: 0.8 },
        );
    }

    xml.push_str("</urlset>\n");
    xml
}

fn push_url(xml: &mut String, domain: &str, entry: &Entry<'_>) {
    // Writing into a String cannot fail
    let _ = write!(
        xml,
        "  <url>\n    <loc>{}</loc>\n    <changefreq>{}</changefreq>\n    <priority>{:.1}</priority>\n  </url>\n",
        escape_xml(&format!("{domain}{}", entry.path)),
        entry.changefreq,
        entry.priority,
    );
}

fn escape_xml(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&apos;"),
            _ => out.push(c),
        }
    }
    out
}

/// `robots.txt` allowing everything public and pointing at the sitemap.
pub fn generate_robots_txt(sitemap_url: &str) -> String {
    format!(
        "User-agent: *\nAllow: /\nDisallow: /profile\nDisallow: /api/\n\nSitemap: {sitemap_url}\n"
    )
}

/// Sitemap over every category and review currently in the backend.
pub async fn build_sitemap(services: &Services, domain: &str) -> Result<String> {
    let categories = services.categories.list().await?;
    let reviews = services.reviews.all_slugs().await?;
    log::info!(
        "Building sitemap with {} categories and {} reviews",
        categories.len(),
        reviews.len()
    );
    Ok(generate_sitemap(
        domain,
        categories.iter().map(|c| c.slug.as_str()),
        &reviews,
    ))
}
