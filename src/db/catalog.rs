//! The product catalog.
//!
//! The catalog is a fixed literal list; queries filter, sort and page a copy
//! of it per request.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::sync::OnceLock;

use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use super::utils::{paginate, PageQuery, Pagination};

pub const DEFAULT_CATALOG_LIMIT: usize = 12;

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductSize {
    pub size: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    pub in_stock: bool,
    pub stock_quantity: u32,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Product {
    pub id: u32,
    pub name: String,
    pub brand: String,
    pub category: String,
    pub price: Decimal,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub original_price: Option<Decimal>,
    pub description: String,
    pub image: String,
    pub images: Vec<String>,
    pub sizes: Vec<ProductSize>,
    pub in_stock: bool,
    pub stock_quantity: u32,
    pub rating: f64,
    pub review_count: u32,
    pub tags: Vec<String>,
    pub specifications: BTreeMap<String, String>,
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Category {
    pub id: &'static str,
    pub name: &'static str,
    pub description: &'static str,
    pub product_count: usize,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Brand {
    pub id: String,
    pub name: String,
    pub product_count: usize,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum SortKey {
    #[default]
    Name,
    Price,
    Rating,
    ReviewCount,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProductQuery {
    pub category: Option<String>,
    pub brand: Option<String>,
    pub search: Option<String>,
    pub min_price: Option<Decimal>,
    pub max_price: Option<Decimal>,
    pub min_rating: Option<f64>,
    pub in_stock: Option<bool>,
    #[serde(default)]
    pub sort_by: SortKey,
    #[serde(default)]
    pub sort_order: SortOrder,
    pub page: Option<usize>,
    pub limit: Option<usize>,
}

impl ProductQuery {
    fn matches(&self, product: &Product) -> bool {
        if let Some(category) = non_empty(&self.category) {
            if product.category != category {
                return false;
            }
        }
        if let Some(brand) = non_empty(&self.brand) {
            if !product.brand.eq_ignore_ascii_case(brand) {
                return false;
            }
        }
        if let Some(search) = non_empty(&self.search) {
            let needle = search.to_lowercase();
            let hit = [&product.name, &product.brand, &product.description]
                .iter()
                .any(|field| field.to_lowercase().contains(&needle));
            if !hit {
                return false;
            }
        }
        if self.min_price.is_some_and(|min| product.price < min) {
            return false;
        }
        if self.max_price.is_some_and(|max| product.price > max) {
            return false;
        }
        if self.min_rating.is_some_and(|min| product.rating < min) {
            return false;
        }
        if self.in_stock.is_some_and(|in_stock| product.in_stock != in_stock) {
            return false;
        }
        true
    }

    fn compare(&self, a: &Product, b: &Product) -> Ordering {
        let ordering = match self.sort_by {
            SortKey::Name => a.name.to_lowercase().cmp(&b.name.to_lowercase()),
            SortKey::Price => a.price.cmp(&b.price),
            SortKey::Rating => a.rating.total_cmp(&b.rating),
            SortKey::ReviewCount => a.review_count.cmp(&b.review_count),
        }
        .then_with(|| a.id.cmp(&b.id));

        match self.sort_order {
            SortOrder::Asc => ordering,
            SortOrder::Desc => ordering.reverse(),
        }
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().map(str::trim).filter(|value| !value.is_empty())
}

#[derive(Debug, Clone, Copy, Serialize)]
pub struct PriceRange {
    pub min: Decimal,
    pub max: Decimal,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CatalogFacets {
    pub categories: Vec<&'static str>,
    pub brands: Vec<String>,
    pub price_range: Option<PriceRange>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProductPage {
    pub products: Vec<Product>,
    pub pagination: Pagination,
    pub filters: CatalogFacets,
}

/// Applies every predicate of `query` to `products`, then sorts and pages.
pub fn search(products: &[Product], query: &ProductQuery) -> ProductPage {
    let mut matched: Vec<Product> = products
        .iter()
        .filter(|product| query.matches(product))
        .cloned()
        .collect();
    matched.sort_by(|a, b| query.compare(a, b));

    let price_range = matched
        .iter()
        .map(|product| product.price)
        .min()
        .zip(matched.iter().map(|product| product.price).max())
        .map(|(min, max)| PriceRange { min, max });

    let page_query = PageQuery {
        page: query.page,
        limit: query.limit,
    }
    .with_default_limit(DEFAULT_CATALOG_LIMIT);
    let (page, pagination) = paginate(&matched, page_query);

    ProductPage {
        products: page,
        pagination,
        filters: CatalogFacets {
            categories: CATEGORIES.iter().map(|(id, ..)| *id).collect(),
            brands: brands(products).into_iter().map(|brand| brand.name).collect(),
            price_range,
        },
    }
}

pub fn find(id: u32) -> Option<Product> {
    products().iter().find(|product| product.id == id).cloned()
}

const CATEGORIES: [(&str, &str, &str); 4] = [
    ("clear_coat", "Clear Coat", "Protective clear coatings"),
    ("base_coat", "Base Coat", "Color base coats"),
    ("primer", "Primer", "Primer and surfacers"),
    ("thinner", "Thinner & Reducer", "Thinners and reducers"),
];

pub fn categories(products: &[Product]) -> Vec<Category> {
    CATEGORIES
        .iter()
        .map(|&(id, name, description)| Category {
            id,
            name,
            description,
            product_count: products.iter().filter(|p| p.category == id).count(),
        })
        .collect()
}

pub fn brands(products: &[Product]) -> Vec<Brand> {
    let mut counts: BTreeMap<&str, usize> = BTreeMap::new();
    for product in products {
        *counts.entry(product.brand.as_str()).or_default() += 1;
    }
    counts
        .into_iter()
        .map(|(name, product_count)| Brand {
            id: name.to_lowercase().replace(' ', "-"),
            name: name.to_string(),
            product_count,
        })
        .collect()
}

pub fn products() -> &'static [Product] {
    static CATALOG: OnceLock<Vec<Product>> = OnceLock::new();
    CATALOG.get_or_init(build_catalog)
}

struct Listing<'a> {
    id: u32,
    name: &'a str,
    brand: &'a str,
    category: &'a str,
    description: &'a str,
    rating: f64,
    review_count: u32,
    // (size, price, original price, stock)
    sizes: &'a [(&'a str, i64, Option<i64>, u32)],
    tags: &'a [&'a str],
    specifications: &'a [(&'a str, &'a str)],
    features: &'a [&'a str],
}

impl Listing<'_> {
    fn into_product(self) -> Product {
        let sizes: Vec<ProductSize> = self
            .sizes
            .iter()
            .map(|(size, price, original, stock)| ProductSize {
                size: size.to_string(),
                price: Decimal::from(*price),
                original_price: original.map(Decimal::from),
                in_stock: *stock > 0,
                stock_quantity: *stock,
            })
            .collect();

        // The headline price is the first listed size
        let headline = sizes.first();
        let price = headline.map(|size| size.price).unwrap_or_default();
        let original_price = headline.and_then(|size| size.original_price);
        let stock_quantity = sizes.iter().map(|size| size.stock_quantity).sum();
        let image = format!("/api/placeholder/300/300?product={}", self.id);

        Product {
            id: self.id,
            name: self.name.to_string(),
            brand: self.brand.to_string(),
            category: self.category.to_string(),
            price,
            original_price,
            description: self.description.to_string(),
            images: vec![image.clone(), image.clone()],
            image,
            sizes,
            in_stock: stock_quantity > 0,
            stock_quantity,
            rating: self.rating,
            review_count: self.review_count,
            tags: self.tags.iter().map(|tag| tag.to_string()).collect(),
            specifications: self
                .specifications
                .iter()
                .map(|(key, value)| (key.to_string(), value.to_string()))
                .collect(),
            features: self.features.iter().map(|f| f.to_string()).collect(),
        }
    }
}

fn build_catalog() -> Vec<Product> {
    vec![
        Listing {
            id: 1,
            name: "PPG Deltron DG Performance Clear Coat",
            brand: "PPG",
            category: "clear_coat",
            description: "High-performance clear coat for automotive applications",
            rating: 4.8,
            review_count: 156,
            sizes: &[
                ("1L", 850_000, Some(950_000), 8),
                ("500ml", 450_000, None, 15),
                ("4L", 3_200_000, Some(3_600_000), 3),
            ],
            tags: &["premium", "automotive", "clear coat"],
            specifications: &[
                ("type", "Acrylic Urethane"),
                ("coverage", "12-15 m²/L"),
                ("dryTime", "30 minutes"),
                ("recoatTime", "4-6 hours"),
            ],
            features: &["Excellent gloss retention", "Superior weather resistance"],
        },
        Listing {
            id: 2,
            name: "Sikkens Autocryl 2K Base Coat - Pearl White",
            brand: "Sikkens",
            category: "base_coat",
            description: "Premium pearl white base coat with excellent coverage",
            rating: 4.7,
            review_count: 89,
            sizes: &[("500ml", 650_000, None, 20), ("1L", 1_200_000, None, 12)],
            tags: &["pearl", "white", "base coat"],
            specifications: &[
                ("type", "2K Base Coat"),
                ("coverage", "8-10 m²/L"),
                ("dryTime", "20 minutes"),
                ("recoatTime", "2-4 hours"),
            ],
            features: &["Deep pearl effect", "Excellent hiding power"],
        },
        Listing {
            id: 3,
            name: "BASF R-M Agilis Primer Surfacer",
            brand: "BASF",
            category: "primer",
            description: "High-build primer surfacer for excellent adhesion",
            rating: 4.6,
            review_count: 124,
            sizes: &[("1L", 425_000, Some(475_000), 30), ("4L", 1_550_000, None, 2)],
            tags: &["primer", "surfacer", "high-build"],
            specifications: &[
                ("type", "Primer Surfacer"),
                ("coverage", "6-8 m²/L"),
                ("dryTime", "45 minutes"),
                ("sandingTime", "2-3 hours"),
            ],
            features: &["High build", "Easy sanding"],
        },
        Listing {
            id: 4,
            name: "Spies Hecker Permahyd Hi-TEC Base Coat - Metallic Silver",
            brand: "Spies Hecker",
            category: "base_coat",
            description: "Waterborne metallic silver base coat",
            rating: 4.9,
            review_count: 67,
            sizes: &[("500ml", 720_000, None, 0), ("1L", 1_350_000, None, 0)],
            tags: &["metallic", "silver", "waterborne"],
            specifications: &[
                ("type", "Waterborne Base Coat"),
                ("coverage", "8-10 m²/L"),
                ("dryTime", "15 minutes"),
                ("recoatTime", "1-2 hours"),
            ],
            features: &["Low VOC", "Accurate metallic flop"],
        },
        Listing {
            id: 5,
            name: "Nippon Paint Thinner Standard Grade",
            brand: "Nippon Paint",
            category: "thinner",
            description: "General purpose thinner for lacquer and synthetic paints",
            rating: 4.5,
            review_count: 212,
            sizes: &[("1L", 125_000, None, 50), ("4L", 450_000, None, 25)],
            tags: &["thinner", "reducer"],
            specifications: &[("type", "Lacquer Thinner"), ("mixingRatio", "1:1")],
            features: &["Fast evaporation", "Clean spray pattern"],
        },
        Listing {
            id: 6,
            name: "Sikkens Autocryl 2K Base - Midnight Black",
            brand: "Sikkens",
            category: "base_coat",
            description: "Solid midnight black base coat for full resprays",
            rating: 4.8,
            review_count: 45,
            sizes: &[("500ml", 580_000, None, 0)],
            tags: &["black", "solid", "base coat"],
            specifications: &[("type", "2K Base Coat"), ("coverage", "8-10 m²/L")],
            features: &["Deep jet finish"],
        },
    ]
    .into_iter()
    .map(Listing::into_product)
    .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ids(page: &ProductPage) -> Vec<u32> {
        page.products.iter().map(|product| product.id).collect()
    }

    fn query() -> ProductQuery {
        ProductQuery {
            limit: Some(100),
            ..Default::default()
        }
    }

    #[test]
    fn every_filter_combination_yields_a_matching_subset() {
        let catalog = products();
        let brands = [None, Some("ppg"), Some("Sikkens"), Some("Unknown")];
        let min_prices = [None, Some(400_000), Some(700_000)];
        let max_prices = [None, Some(650_000), Some(2_000_000)];
        let ratings = [None, Some(4.7), Some(4.9)];
        let stock = [None, Some(true), Some(false)];

        for brand in brands {
            for min_price in min_prices {
                for max_price in max_prices {
                    for min_rating in ratings {
                        for in_stock in stock {
                            let q = ProductQuery {
                                brand: brand.map(str::to_string),
                                min_price: min_price.map(Decimal::from),
                                max_price: max_price.map(Decimal::from),
                                min_rating,
                                in_stock,
                                ..query()
                            };
                            for product in search(catalog, &q).products {
                                assert!(catalog.contains(&product));
                                if let Some(brand) = brand {
                                    assert!(product.brand.eq_ignore_ascii_case(brand));
                                }
                                if let Some(min) = min_price {
                                    assert!(product.price >= Decimal::from(min));
                                }
                                if let Some(max) = max_price {
                                    assert!(product.price <= Decimal::from(max));
                                }
                                if let Some(min) = min_rating {
                                    assert!(product.rating >= min);
                                }
                                if let Some(in_stock) = in_stock {
                                    assert_eq!(product.in_stock, in_stock);
                                }
                            }
                        }
                    }
                }
            }
        }
    }

    #[test]
    fn brand_filter_is_case_insensitive() {
        let page = search(products(), &ProductQuery { brand: Some("sikkens".into()), ..query() });
        assert_eq!(ids(&page), vec![6, 2]);
    }

    #[test]
    fn search_looks_at_description() {
        let page = search(products(), &ProductQuery { search: Some("WATERBORNE".into()), ..query() });
        assert_eq!(ids(&page), vec![4]);
    }

    #[test]
    fn sorts_by_price_descending() {
        let page = search(
            products(),
            &ProductQuery {
                sort_by: SortKey::Price,
                sort_order: SortOrder::Desc,
                ..query()
            },
        );
        let prices: Vec<Decimal> = page.products.iter().map(|p| p.price).collect();
        let mut sorted = prices.clone();
        sorted.sort_by(|a, b| b.cmp(a));
        assert_eq!(prices, sorted);
    }

    #[test]
    fn pages_with_catalog_default_limit() {
        let page = search(products(), &ProductQuery { page: Some(2), ..Default::default() });
        assert_eq!(page.pagination.limit, DEFAULT_CATALOG_LIMIT);
        assert!(page.products.is_empty());
        assert_eq!(page.pagination.total, products().len());
    }

    #[test]
    fn price_range_follows_the_filtered_set() {
        let page = search(products(), &ProductQuery { category: Some("primer".into()), ..query() });
        let range = page.filters.price_range.unwrap();
        assert_eq!(range.min, Decimal::from(425_000));
        assert_eq!(range.max, Decimal::from(425_000));

        let empty = search(products(), &ProductQuery { brand: Some("nobody".into()), ..query() });
        assert!(empty.filters.price_range.is_none());
    }

    #[test]
    fn stock_is_derived_from_sizes() {
        let silver = find(4).unwrap();
        assert!(!silver.in_stock);
        assert_eq!(silver.stock_quantity, 0);
        assert_eq!(find(1).unwrap().stock_quantity, 26);
        assert!(find(99).is_none());
    }

    #[test]
    fn brands_and_categories_count_products() {
        let brands = brands(products());
        let sikkens = brands.iter().find(|b| b.name == "Sikkens").unwrap();
        assert_eq!(sikkens.product_count, 2);
        assert_eq!(sikkens.id, "sikkens");

        let categories = categories(products());
        let base = categories.iter().find(|c| c.id == "base_coat").unwrap();
        assert_eq!(base.product_count, 3);
    }
}
