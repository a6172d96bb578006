//! schema.org JSON-LD documents.

use serde::{Deserialize, Serialize};
use serde_json::{Value, json};

use crate::models::{ReviewDetail, SiteConfig};

/// One step of a breadcrumb trail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BreadcrumbItem {
    pub name: String,
    /// Absolute URL of the step
    pub url: String,
}

impl BreadcrumbItem {
    pub fn new(name: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            url: url.into(),
        }
    }
}

/// `Product` document carrying the site's review and an aggregate rating.
pub fn review_structured_data(review: &ReviewDetail, site: &SiteConfig) -> Value {
    let mut data = json!({
        "@context": "https://schema.org",
        "@type": "Product",
        "name": review.title,
        "description": review.description.as_ref().or(review.meta_description.as_ref()),
        "review": {
            "@type": "Review",
            "reviewRating": {
                "@type": "Rating",
                "ratingValue": review.rating,
                "bestRating": "5",
            },
            "author": {
                "@type": "Organization",
                "name": site.name,
            },
            "reviewBody": review.content,
        },
        "aggregateRating": {
            "@type": "AggregateRating",
            "ratingValue": review.rating,
            "reviewCount": review.comments_count.max(1),
            "bestRating": "5",
        },
        "image": review.image_url.as_ref().or(review.og_image.as_ref()),
    });

    let brand = review
        .product
        .get("brand")
        .and_then(Value::as_str)
        .filter(|b| !b.trim().is_empty());
    if let (Some(brand), Some(object)) = (brand, data.as_object_mut()) {
        object.insert(
            "brand".to_string(),
            json!({ "@type": "Brand", "name": brand }),
        );
    }
    data
}

/// `BreadcrumbList` document with 1-based positions.
pub fn breadcrumb_structured_data(items: &[BreadcrumbItem]) -> Value {
    let elements: Vec<Value> = items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            json!({
                "@type": "ListItem",
                "position": index + 1,
                "name": item.name,
                "item": item.url,
            })
        })
        .collect();

    json!({
        "@context": "https://schema.org",
        "@type": "BreadcrumbList",
        "itemListElement": elements,
    })
}

/// Home → category → review trail for a review page.
pub fn review_breadcrumbs(review: &ReviewDetail, site: &SiteConfig) -> Vec<BreadcrumbItem> {
    let origin = site.origin();
    vec![
        BreadcrumbItem::new("Home", format!("{origin}/")),
        BreadcrumbItem::new(
            review.category.name.as_str(),
            format!("{origin}/category/{}", review.category.slug),
        ),
        BreadcrumbItem::new(review.title.as_str(), format!("{origin}{}", review.canonical_url)),
    ]
}
