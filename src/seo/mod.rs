//! Search-engine output: keywords, JSON-LD, sitemap, robots and the SEO
//! backfill.

mod keywords;
pub mod migration;
mod sitemap;
mod structured_data;

pub use keywords::{MAX_KEYWORDS, generate_keywords};
pub use sitemap::{build_sitemap, generate_robots_txt, generate_sitemap};
pub use structured_data::{
    BreadcrumbItem, breadcrumb_structured_data, review_breadcrumbs, review_structured_data,
};
